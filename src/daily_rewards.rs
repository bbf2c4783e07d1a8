//! Daily login rewards.
//!
//! Streaks are counted in UTC calendar days. Claiming on the day after the
//! last claim continues the streak, skipping a day resets it to day 1.

use chrono::{DateTime, NaiveDate, Utc};
use log::info;
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ClaimedReward, DailyReward, DailyRewardStatus, RewardTier};
use crate::users;

const WEEK: [(i64, &str); 7] = [
    (100, "Welcome bonus!"),
    (150, "Keep it up!"),
    (200, "Great streak!"),
    (300, "Amazing!"),
    (500, "Fantastic!"),
    (750, "Incredible!"),
    (1000, "Weekly champion!"),
];

const WEEKLY_BONUS: i64 = 200;

pub fn reward_for_streak(streak: i32) -> RewardTier {
    let day = streak.max(1);
    let index = ((day - 1) as usize).min(WEEK.len() - 1);
    let (coins, bonus) = WEEK[index];

    if day > WEEK.len() as i32 {
        let weeks = i64::from((day - 1) / 7);
        return RewardTier {
            day,
            coins: coins + weeks * WEEKLY_BONUS,
            bonus: format!("{} week streak!", weeks + 1),
        };
    }

    RewardTier {
        day,
        coins,
        bonus: bonus.to_string(),
    }
}

pub fn upcoming(current_streak: i32) -> Vec<RewardTier> {
    (1..=7).map(|offset| reward_for_streak(current_streak + offset)).collect()
}

pub fn evaluate(record: Option<&DailyReward>, today: NaiveDate) -> DailyRewardStatus {
    let fresh = |streak: i32| DailyRewardStatus {
        can_claim: true,
        current_streak: streak,
        next_reward: reward_for_streak(streak + 1).coins,
        streak_broken: false,
        days_until_next_claim: 0,
    };

    let Some(record) = record else {
        return fresh(0);
    };
    let Some(last_claim) = record.last_claim_date else {
        return fresh(record.current_streak);
    };

    match (today - last_claim).num_days() {
        days if days <= 0 => DailyRewardStatus {
            can_claim: false,
            days_until_next_claim: 1,
            ..fresh(record.current_streak)
        },
        1 => fresh(record.current_streak),
        _ => DailyRewardStatus {
            streak_broken: true,
            ..fresh(0)
        },
    }
}

pub async fn find(pool: &PgPool, user_id: Uuid) -> ApiResult<Option<DailyReward>> {
    let record = sqlx::query_as::<_, DailyReward>("SELECT * FROM daily_rewards WHERE user_id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;
    Ok(record)
}

pub async fn status(pool: &PgPool, user_id: Uuid, now: DateTime<Utc>) -> ApiResult<DailyRewardStatus> {
    let record = find(pool, user_id).await?;
    Ok(evaluate(record.as_ref(), now.date_naive()))
}

pub async fn claim(pool: &PgPool, user_id: Uuid, now: DateTime<Utc>) -> ApiResult<ClaimedReward> {
    users::require(pool, user_id).await?;

    let today = now.date_naive();
    let current = evaluate(find(pool, user_id).await?.as_ref(), today);
    if !current.can_claim {
        return Err(ApiError::AlreadyClaimed);
    }

    let new_streak = if current.streak_broken { 1 } else { current.current_streak + 1 };
    let reward = reward_for_streak(new_streak);

    sqlx::query(
        r#"
        INSERT INTO daily_rewards (id, user_id, last_claim_date, current_streak, total_days_claimed)
        VALUES ($1, $2, $3, $4, 1)
        ON CONFLICT (user_id) DO UPDATE
        SET last_claim_date = EXCLUDED.last_claim_date,
            current_streak = EXCLUDED.current_streak,
            total_days_claimed = daily_rewards.total_days_claimed + 1
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(today)
    .bind(new_streak)
    .execute(pool)
    .await?;

    sqlx::query("UPDATE users SET coins = coins + $1, updated_at = NOW() WHERE id = $2")
        .bind(reward.coins)
        .bind(user_id)
        .execute(pool)
        .await?;

    info!("User {} claimed day {} reward of {} coins", user_id, new_streak, reward.coins);

    Ok(ClaimedReward {
        coins: reward.coins,
        bonus: reward.bonus,
        new_streak,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn record(last_claim: Option<NaiveDate>, streak: i32) -> DailyReward {
        DailyReward {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            last_claim_date: last_claim,
            current_streak: streak,
            total_days_claimed: streak,
        }
    }

    #[test]
    fn first_week_follows_the_table() {
        let coins: Vec<i64> = (1..=7).map(|s| reward_for_streak(s).coins).collect();
        assert_eq!(coins, vec![100, 150, 200, 300, 500, 750, 1000]);
        assert_eq!(reward_for_streak(7).bonus, "Weekly champion!");
    }

    #[test]
    fn long_streaks_earn_weekly_bonus() {
        assert_eq!(reward_for_streak(8).coins, 1200);
        assert_eq!(reward_for_streak(8).bonus, "2 week streak!");
        assert_eq!(reward_for_streak(14).coins, 1200);
        assert_eq!(reward_for_streak(15).coins, 1400);
        assert_eq!(reward_for_streak(15).bonus, "3 week streak!");
    }

    #[test]
    fn new_player_can_claim_day_one() {
        let status = evaluate(None, day(10));
        assert!(status.can_claim);
        assert_eq!(status.current_streak, 0);
        assert_eq!(status.next_reward, 100);
    }

    #[test]
    fn never_claimed_record_keeps_its_streak() {
        let status = evaluate(Some(&record(None, 0)), day(10));
        assert!(status.can_claim);
        assert_eq!(status.next_reward, 100);
    }

    #[test]
    fn same_day_claim_is_blocked() {
        let status = evaluate(Some(&record(Some(day(10)), 3)), day(10));
        assert!(!status.can_claim);
        assert_eq!(status.days_until_next_claim, 1);
        assert_eq!(status.current_streak, 3);
        assert_eq!(status.next_reward, 300);
    }

    #[test]
    fn next_day_continues_the_streak() {
        let status = evaluate(Some(&record(Some(day(9)), 3)), day(10));
        assert!(status.can_claim);
        assert!(!status.streak_broken);
        assert_eq!(status.current_streak, 3);
        assert_eq!(status.next_reward, 300);
    }

    #[test]
    fn gap_of_two_days_resets() {
        let status = evaluate(Some(&record(Some(day(8)), 5)), day(10));
        assert!(status.can_claim);
        assert!(status.streak_broken);
        assert_eq!(status.current_streak, 0);
        assert_eq!(status.next_reward, 100);
    }

    #[test]
    fn future_claim_date_counts_as_claimed() {
        let status = evaluate(Some(&record(Some(day(11)), 2)), day(10));
        assert!(!status.can_claim);
    }

    #[test]
    fn upcoming_lists_the_next_week() {
        let rewards = upcoming(6);
        assert_eq!(rewards.len(), 7);
        assert_eq!(rewards[0].day, 7);
        assert_eq!(rewards[0].coins, 1000);
        assert_eq!(rewards[1].day, 8);
        assert_eq!(rewards[1].coins, 1200);
    }
}
