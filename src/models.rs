use serde::{Deserialize, Serialize};
use chrono::{DateTime, NaiveDate, Utc};
use uuid::Uuid;


#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct User {
    pub id: Uuid,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub coins: i64,
    pub total_taps: i64,
    pub energy: i64,
    pub max_energy: i64,
    pub energy_regen_rate: i64,
    pub coins_per_tap: i64,
    pub last_energy_update: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Profile sent by the Mini App when a player opens the game.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelegramUser {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Upgrade {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub upgrade_type: String,
    pub base_cost: i64,
    pub cost_multiplier: f64,
    pub base_effect: i64,
    pub max_level: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserUpgradeRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upgrade_id: Uuid,
    pub current_level: i32,
    pub total_spent: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserUpgrade {
    pub id: Uuid,
    pub user_id: Uuid,
    pub upgrade_id: Uuid,
    pub current_level: i32,
    pub total_spent: i64,
    pub upgrade: Upgrade,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Booster {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub booster_type: String,
    pub effect_value: f64,
    pub duration_seconds: i64,
    pub cost: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ActiveBoosterRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub booster_id: Uuid,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActiveBooster {
    pub id: Uuid,
    pub user_id: Uuid,
    pub booster_id: Uuid,
    pub activated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_active: bool,
    pub booster: Booster,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DailyReward {
    pub id: Uuid,
    pub user_id: Uuid,
    pub last_claim_date: Option<NaiveDate>,
    pub current_streak: i32,
    pub total_days_claimed: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyRewardStatus {
    pub can_claim: bool,
    pub current_streak: i32,
    pub next_reward: i64,
    pub streak_broken: bool,
    pub days_until_next_claim: i32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RewardTier {
    pub day: i32,
    pub coins: i64,
    pub bonus: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimedReward {
    pub coins: i64,
    pub bonus: String,
    pub new_streak: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReferredUser {
    pub id: Uuid,
    pub first_name: String,
    pub username: Option<String>,
    pub bonus_coins: i64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralStats {
    pub total_referrals: i64,
    pub total_bonus_earned: i64,
    pub referral_code: String,
    pub referred_users: Vec<ReferredUser>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralValidation {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referrer_name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    pub id: Uuid,
    pub telegram_id: i64,
    pub username: Option<String>,
    pub first_name: String,
    pub last_name: Option<String>,
    pub coins: i64,
    pub total_taps: i64,
    pub rank: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct UserRank {
    pub rank: i64,
    pub total_players: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardStats {
    pub total_players: i64,
    pub total_coins: i64,
    pub total_taps: i64,
}

fn one_tap() -> i64 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TapRequest {
    pub user_id: Uuid,
    pub coins_earned: i64,
    #[serde(default = "one_tap")]
    pub taps: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseUpgradeRequest {
    pub user_id: Uuid,
    pub upgrade_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseBoosterRequest {
    pub user_id: Uuid,
    pub booster_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRewardRequest {
    pub user_id: Uuid,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateReferralRequest {
    #[serde(default)]
    pub referral_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UseReferralRequest {
    pub user_id: Uuid,
    pub referral_code: String,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub limit: Option<i64>,
}
