use chrono::{DateTime, Utc};
use log::{error, info, warn};
use sqlx::PgPool;
use uuid::Uuid;

use crate::boosters;
use crate::energy::{regenerated, settle_taps};
use crate::error::{ApiError, ApiResult};
use crate::models::{TapRequest, TelegramUser, User};

pub const STARTING_ENERGY: i64 = 1000;
pub const STARTING_REGEN_RATE: i64 = 1;
pub const STARTING_COINS_PER_TAP: i64 = 1;

pub async fn find_by_id(pool: &PgPool, id: Uuid) -> ApiResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn find_by_telegram_id(pool: &PgPool, telegram_id: i64) -> ApiResult<Option<User>> {
    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE telegram_id = $1")
        .bind(telegram_id)
        .fetch_optional(pool)
        .await?;
    Ok(user)
}

pub async fn require(pool: &PgPool, id: Uuid) -> ApiResult<User> {
    find_by_id(pool, id).await?.ok_or(ApiError::NotFound("User"))
}

pub async fn load_fresh(pool: &PgPool, id: Uuid, now: DateTime<Utc>) -> ApiResult<User> {
    let user = require(pool, id).await?;
    Ok(refresh_energy(pool, user, now).await)
}

/// Applies regeneration and persists it when the value moved.
///
/// A failed write is logged and the stored row is returned as-is.
pub async fn refresh_energy(pool: &PgPool, user: User, now: DateTime<Utc>) -> User {
    let energy = regenerated(
        user.energy,
        user.max_energy,
        user.energy_regen_rate,
        user.last_energy_update,
        now,
    );

    if energy == user.energy {
        return user;
    }

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET energy = $1, last_energy_update = $2, updated_at = NOW()
        WHERE id = $3
        RETURNING *
        "#,
    )
    .bind(energy)
    .bind(now)
    .bind(user.id)
    .fetch_one(pool)
    .await;

    match updated {
        Ok(user) => user,
        Err(e) => {
            error!("Error updating energy for user {}: {}", user.id, e);
            user
        }
    }
}

pub async fn get_or_create(pool: &PgPool, profile: &TelegramUser, now: DateTime<Utc>) -> ApiResult<User> {
    if let Some(existing) = find_by_telegram_id(pool, profile.id).await? {
        return Ok(refresh_energy(pool, existing, now).await);
    }

    let mut tx = pool.begin().await?;

    let created = sqlx::query_as::<_, User>(
        r#"
        INSERT INTO users (
            id, telegram_id, username, first_name, last_name,
            coins, total_taps, energy, max_energy, energy_regen_rate, coins_per_tap,
            last_energy_update
        )
        VALUES ($1, $2, $3, $4, $5, 0, 0, $6, $6, $7, $8, $9)
        ON CONFLICT (telegram_id) DO NOTHING
        RETURNING *
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(profile.id)
    .bind(&profile.username)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(STARTING_ENERGY)
    .bind(STARTING_REGEN_RATE)
    .bind(STARTING_COINS_PER_TAP)
    .bind(now)
    .fetch_optional(&mut *tx)
    .await?;

    let user = match created {
        Some(user) => user,
        None => {
            // Another request registered the same account first.
            tx.rollback().await?;
            return find_by_telegram_id(pool, profile.id)
                .await?
                .ok_or(ApiError::NotFound("User"));
        }
    };

    sqlx::query(
        r#"
        INSERT INTO daily_rewards (id, user_id, current_streak, total_days_claimed)
        VALUES ($1, $2, 0, 0)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .execute(&mut *tx)
    .await?;

    tx.commit().await?;

    info!("Registered telegram user {} as {}", profile.id, user.id);
    Ok(user)
}

/// Applies one aggregated tap batch. Not idempotent: a replayed batch is
/// credited twice.
pub async fn apply_taps(pool: &PgPool, request: &TapRequest, now: DateTime<Utc>) -> ApiResult<User> {
    if request.taps < 1 {
        return Err(ApiError::BadRequest("taps must be at least 1".to_string()));
    }
    if request.coins_earned < 0 {
        return Err(ApiError::BadRequest("coinsEarned must not be negative".to_string()));
    }

    let multiplier = boosters::live_tap_multiplier(pool, request.user_id, now).await?;

    let mut tx = pool.begin().await?;

    let user = sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1 FOR UPDATE")
        .bind(request.user_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    // Regeneration is settled here, in the same write that spends it.
    let energy = regenerated(
        user.energy,
        user.max_energy,
        user.energy_regen_rate,
        user.last_energy_update,
        now,
    );

    let settled = settle_taps(
        energy,
        request.taps,
        request.coins_earned,
        user.coins_per_tap,
        multiplier,
    );
    if settled.is_clamped(request.taps, request.coins_earned) {
        warn!(
            "Clamped tap batch for user {}: requested {} taps / {} coins, applied {} / {}",
            user.id, request.taps, request.coins_earned, settled.taps, settled.coins
        );
    }

    let updated = sqlx::query_as::<_, User>(
        r#"
        UPDATE users
        SET coins = coins + $1,
            total_taps = total_taps + $2,
            energy = $3,
            last_energy_update = $4,
            updated_at = NOW()
        WHERE id = $5
        RETURNING *
        "#,
    )
    .bind(settled.coins)
    .bind(settled.taps)
    .bind(energy - settled.taps)
    .bind(now)
    .bind(user.id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    let recorded = sqlx::query(
        r#"
        INSERT INTO tap_sessions (id, user_id, taps_count, coins_earned, energy_used)
        VALUES ($1, $2, $3, $4, $3)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user.id)
    .bind(settled.taps)
    .bind(settled.coins)
    .execute(pool)
    .await;

    if let Err(e) = recorded {
        error!("Error recording tap session for user {}: {}", user.id, e);
    }

    Ok(updated)
}

pub fn validate_profile(profile: &TelegramUser) -> ApiResult<()> {
    if profile.id <= 0 || profile.first_name.trim().is_empty() {
        return Err(ApiError::BadRequest("Invalid Telegram user data".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(id: i64, first_name: &str) -> TelegramUser {
        TelegramUser {
            id,
            first_name: first_name.to_string(),
            last_name: None,
            username: None,
            language_code: None,
        }
    }

    #[test]
    fn profile_needs_id_and_name() {
        assert!(validate_profile(&profile(42, "Asha")).is_ok());
        assert!(validate_profile(&profile(0, "Asha")).is_err());
        assert!(validate_profile(&profile(42, "   ")).is_err());
    }

    async fn player_with_energy(pool: &PgPool, telegram_id: i64, energy: i64, since: DateTime<Utc>) -> User {
        let user = get_or_create(pool, &profile(telegram_id, "Asha"), since).await.unwrap();
        sqlx::query("UPDATE users SET energy = $1, last_energy_update = $2 WHERE id = $3")
            .bind(energy)
            .bind(since)
            .bind(user.id)
            .execute(pool)
            .await
            .unwrap();
        user
    }

    fn batch(user_id: Uuid, taps: i64, coins_earned: i64) -> TapRequest {
        TapRequest { user_id, taps, coins_earned }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn batch_larger_than_energy_is_cut(pool: PgPool) {
        let now = Utc::now();
        let user = player_with_energy(&pool, 2001, 3, now).await;

        let after = apply_taps(&pool, &batch(user.id, 10, 10), now).await.unwrap();
        assert_eq!(after.energy, 0);
        assert_eq!(after.coins, 3);
        assert_eq!(after.total_taps, 3);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn regeneration_is_spent_not_lost(pool: PgPool) {
        let now = Utc::now();
        let user = player_with_energy(&pool, 2002, 0, now - chrono::Duration::seconds(5)).await;

        // Five seconds at one point per second: five taps go through.
        let after = apply_taps(&pool, &batch(user.id, 10, 10), now).await.unwrap();
        assert_eq!(after.total_taps, 5);
        assert_eq!(after.coins, 5);
        assert_eq!(after.energy, 0);
        assert_eq!(after.last_energy_update.timestamp(), now.timestamp());

        // Regeneration restarts from the batch.
        let later = now + chrono::Duration::seconds(4);
        let after = apply_taps(&pool, &batch(user.id, 2, 2), later).await.unwrap();
        assert_eq!(after.total_taps, 7);
        assert_eq!(after.energy, 2);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_player_cannot_tap(pool: PgPool) {
        let err = apply_taps(&pool, &batch(Uuid::new_v4(), 1, 1), Utc::now()).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound("User")));
    }
}
