use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use log::{error, info};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{ActiveBooster, ActiveBoosterRow, Booster, User};
use crate::users;

pub const TAP_MULTIPLIER: &str = "tap_multiplier";
pub const ENERGY_REFILL: &str = "energy_refill";

pub fn expires_at(booster: &Booster, now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::seconds(booster.duration_seconds.max(0))
}

pub fn check_affordable(booster: &Booster, coins: i64) -> ApiResult<()> {
    if coins < booster.cost {
        return Err(ApiError::InsufficientCoins);
    }
    Ok(())
}

pub async fn list(pool: &PgPool) -> ApiResult<Vec<Booster>> {
    let boosters = sqlx::query_as::<_, Booster>("SELECT * FROM boosters ORDER BY cost")
        .fetch_all(pool)
        .await?;
    Ok(boosters)
}

pub async fn find(pool: &PgPool, id: Uuid) -> ApiResult<Option<Booster>> {
    let booster = sqlx::query_as::<_, Booster>("SELECT * FROM boosters WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(booster)
}

pub async fn active_for_user(pool: &PgPool, user_id: Uuid, now: DateTime<Utc>) -> ApiResult<Vec<ActiveBooster>> {
    let rows = sqlx::query_as::<_, ActiveBoosterRow>(
        r#"
        SELECT id, user_id, booster_id, activated_at, expires_at, is_active
        FROM active_boosters
        WHERE user_id = $1 AND is_active = TRUE AND expires_at > $2
        ORDER BY expires_at
        "#,
    )
    .bind(user_id)
    .bind(now)
    .fetch_all(pool)
    .await?;

    let catalogue: HashMap<Uuid, Booster> = list(pool)
        .await?
        .into_iter()
        .map(|booster| (booster.id, booster))
        .collect();

    Ok(rows
        .into_iter()
        .filter_map(|row| {
            let booster = catalogue.get(&row.booster_id)?.clone();
            Some(ActiveBooster {
                id: row.id,
                user_id: row.user_id,
                booster_id: row.booster_id,
                activated_at: row.activated_at,
                expires_at: row.expires_at,
                is_active: row.is_active,
                booster,
            })
        })
        .collect())
}

/// Strongest live tap multiplier for a user, 1.0 when none is running.
pub async fn live_tap_multiplier(pool: &PgPool, user_id: Uuid, now: DateTime<Utc>) -> ApiResult<f64> {
    let multiplier = sqlx::query_scalar::<_, f64>(
        r#"
        SELECT COALESCE(MAX(b.effect_value), 1.0::DOUBLE PRECISION)
        FROM active_boosters ab
        JOIN boosters b ON b.id = ab.booster_id
        WHERE ab.user_id = $1
          AND ab.is_active = TRUE
          AND ab.expires_at > $2
          AND b.booster_type = $3
        "#,
    )
    .bind(user_id)
    .bind(now)
    .bind(TAP_MULTIPLIER)
    .fetch_one(pool)
    .await?;
    Ok(multiplier.max(1.0))
}

pub async fn purchase(pool: &PgPool, user_id: Uuid, booster_id: Uuid, now: DateTime<Utc>) -> ApiResult<User> {
    let user = users::load_fresh(pool, user_id, now).await?;
    let booster = find(pool, booster_id).await?.ok_or(ApiError::NotFound("Booster"))?;

    check_affordable(&booster, user.coins)?;

    let mut tx = pool.begin().await?;

    let deducted = sqlx::query(
        "UPDATE users SET coins = coins - $1, updated_at = NOW() WHERE id = $2 AND coins >= $1",
    )
    .bind(booster.cost)
    .bind(user_id)
    .execute(&mut *tx)
    .await?;

    if deducted.rows_affected() == 0 {
        tx.rollback().await?;
        return Err(ApiError::InsufficientCoins);
    }

    sqlx::query(
        r#"
        INSERT INTO active_boosters (id, user_id, booster_id, activated_at, expires_at, is_active)
        VALUES ($1, $2, $3, $4, $5, TRUE)
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(user_id)
    .bind(booster_id)
    .bind(now)
    .bind(expires_at(&booster, now))
    .execute(&mut *tx)
    .await
    .map_err(|e| {
        error!("Error adding active booster for {}: {}", user_id, e);
        ApiError::from(e)
    })?;

    if booster.booster_type == ENERGY_REFILL {
        sqlx::query(
            "UPDATE users SET energy = max_energy, last_energy_update = $1 WHERE id = $2",
        )
        .bind(now)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;

    info!("User {} activated booster {}", user_id, booster.name);
    users::require(pool, user_id).await
}

/// Marks expired boosters inactive and returns how many were flipped.
pub async fn deactivate_expired(pool: &PgPool, now: DateTime<Utc>) -> ApiResult<u64> {
    let result = sqlx::query(
        "UPDATE active_boosters SET is_active = FALSE WHERE is_active = TRUE AND expires_at <= $1",
    )
    .bind(now)
    .execute(pool)
    .await?;
    Ok(result.rows_affected())
}
