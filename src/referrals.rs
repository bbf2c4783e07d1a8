//! Friend referrals.
//!
//! A code is `RC`, the referrer's telegram id in upper-case base 36, then four
//! random base 36 characters. The random tail only makes codes look distinct;
//! the id is recoverable from any code.

use log::{error, info};
use rand::Rng;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ReferralStats, ReferralValidation, ReferredUser, User};
use crate::users;

pub const REFERRAL_BONUS: i64 = 1000;

const PREFIX: &str = "RC";
const SUFFIX_LEN: usize = 4;
const ALPHABET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

pub fn generate_code<R: Rng>(telegram_id: i64, rng: &mut R) -> String {
    let suffix: String = (0..SUFFIX_LEN)
        .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
        .collect();
    format!("{}{}{}", PREFIX, to_base36(telegram_id.unsigned_abs()), suffix)
}

/// Recovers the referrer's telegram id from a code.
pub fn decode_code(code: &str) -> Option<i64> {
    let body = code.trim().to_ascii_uppercase();
    let body = body.strip_prefix(PREFIX)?;
    if body.len() <= SUFFIX_LEN || !body.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    let id_part = &body[..body.len() - SUFFIX_LEN];
    i64::from_str_radix(id_part, 36).ok().filter(|id| *id > 0)
}

fn display_name(user: &User) -> String {
    match &user.username {
        Some(username) if !username.is_empty() => format!("@{}", username),
        _ => user.first_name.clone(),
    }
}

pub async fn validate(pool: &PgPool, code: &str) -> ApiResult<ReferralValidation> {
    let invalid = ReferralValidation {
        valid: false,
        referrer_name: None,
    };

    let Some(telegram_id) = decode_code(code) else {
        return Ok(invalid);
    };

    Ok(match users::find_by_telegram_id(pool, telegram_id).await? {
        Some(referrer) => ReferralValidation {
            valid: true,
            referrer_name: Some(display_name(&referrer)),
        },
        None => invalid,
    })
}

pub async fn already_referred(pool: &PgPool, referred_id: Uuid) -> ApiResult<bool> {
    let exists = sqlx::query_scalar::<_, bool>("SELECT EXISTS (SELECT 1 FROM referrals WHERE referred_id = $1)")
        .bind(referred_id)
        .fetch_one(pool)
        .await?;
    Ok(exists)
}

/// Redeems a code for `referred_id` and pays both sides the bonus.
pub async fn redeem(pool: &PgPool, referred_id: Uuid, code: &str) -> ApiResult<()> {
    let telegram_id = decode_code(code).ok_or(ApiError::InvalidReferralCode)?;
    let referrer = users::find_by_telegram_id(pool, telegram_id)
        .await?
        .ok_or(ApiError::NotFound("Referrer"))?;

    if referrer.id == referred_id {
        return Err(ApiError::SelfReferral);
    }
    users::require(pool, referred_id).await?;

    if already_referred(pool, referred_id).await? {
        return Err(ApiError::AlreadyReferred);
    }

    // referred_id is unique, so a racing second redemption fails here.
    let inserted = sqlx::query(
        r#"
        INSERT INTO referrals (id, referrer_id, referred_id, referral_code, bonus_coins)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (referred_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(referrer.id)
    .bind(referred_id)
    .bind(code.trim().to_ascii_uppercase())
    .bind(REFERRAL_BONUS)
    .execute(pool)
    .await
    .map_err(|e| {
        error!("Error creating referral for {}: {}", referred_id, e);
        ApiError::from(e)
    })?;

    if inserted.rows_affected() == 0 {
        return Err(ApiError::AlreadyReferred);
    }

    sqlx::query("UPDATE users SET coins = coins + $1, updated_at = NOW() WHERE id = ANY($2)")
        .bind(REFERRAL_BONUS)
        .bind(vec![referrer.id, referred_id])
        .execute(pool)
        .await?;

    info!("User {} joined through referral from {}", referred_id, referrer.id);
    Ok(())
}

pub async fn stats(pool: &PgPool, user_id: Uuid) -> ApiResult<ReferralStats> {
    let user = users::require(pool, user_id).await?;
    let referral_code = generate_code(user.telegram_id, &mut rand::thread_rng());

    let referred_users = sqlx::query_as::<_, ReferredUser>(
        r#"
        SELECT r.referred_id AS id, u.first_name, u.username, r.bonus_coins, r.created_at
        FROM referrals r
        JOIN users u ON u.id = r.referred_id
        WHERE r.referrer_id = $1
        ORDER BY r.created_at DESC
        "#,
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let total_referrals = referred_users.len() as i64;
    Ok(ReferralStats {
        total_referrals,
        total_bonus_earned: total_referrals * REFERRAL_BONUS,
        referral_code,
        referred_users,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn code_carries_the_telegram_id() {
        let mut rng = StdRng::seed_from_u64(7);
        let code = generate_code(123_456_789, &mut rng);
        assert!(code.starts_with("RC21I3V9"));
        assert_eq!(code.len(), "RC21I3V9".len() + 4);
        assert_eq!(decode_code(&code), Some(123_456_789));
    }

    #[test]
    fn lower_case_codes_decode() {
        assert_eq!(decode_code("rc21i3v9abcd"), Some(123_456_789));
    }

    #[test]
    fn malformed_codes_are_rejected() {
        assert_eq!(decode_code(""), None);
        assert_eq!(decode_code("RC"), None);
        assert_eq!(decode_code("RCABCD"), None);
        assert_eq!(decode_code("XX21I3V9ABCD"), None);
        assert_eq!(decode_code("RC21-3V9ABCD"), None);
        assert_eq!(decode_code("RC0ABCD"), None);
    }

    #[test]
    fn base36_matches_known_values() {
        assert_eq!(to_base36(0), "0");
        assert_eq!(to_base36(35), "Z");
        assert_eq!(to_base36(36), "10");
    }

    async fn player(pool: &PgPool, telegram_id: i64) -> User {
        let profile = crate::models::TelegramUser {
            id: telegram_id,
            first_name: "Ravi".to_string(),
            last_name: None,
            username: None,
            language_code: None,
        };
        users::get_or_create(pool, &profile, chrono::Utc::now()).await.unwrap()
    }

    fn code_for(telegram_id: i64) -> String {
        generate_code(telegram_id, &mut StdRng::seed_from_u64(1))
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn second_redemption_is_rejected(pool: PgPool) {
        let referrer = player(&pool, 4001).await;
        let friend = player(&pool, 4002).await;
        let other = player(&pool, 4003).await;

        redeem(&pool, friend.id, &code_for(referrer.telegram_id)).await.unwrap();
        let err = redeem(&pool, friend.id, &code_for(other.telegram_id)).await.unwrap_err();
        assert!(matches!(err, ApiError::AlreadyReferred));

        assert_eq!(users::require(&pool, referrer.id).await.unwrap().coins, REFERRAL_BONUS);
        assert_eq!(users::require(&pool, friend.id).await.unwrap().coins, REFERRAL_BONUS);
        assert_eq!(users::require(&pool, other.id).await.unwrap().coins, 0);

        let stats = stats(&pool, referrer.id).await.unwrap();
        assert_eq!(stats.total_referrals, 1);
        assert_eq!(stats.total_bonus_earned, REFERRAL_BONUS);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn own_code_is_rejected(pool: PgPool) {
        let user = player(&pool, 4004).await;

        let err = redeem(&pool, user.id, &code_for(user.telegram_id)).await.unwrap_err();
        assert!(matches!(err, ApiError::SelfReferral));
        assert!(!already_referred(&pool, user.id).await.unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn codes_for_unknown_players_are_invalid(pool: PgPool) {
        let validation = validate(&pool, &code_for(4999)).await.unwrap();
        assert!(!validation.valid);
        assert!(validation.referrer_name.is_none());
    }
}
