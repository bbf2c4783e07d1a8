use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{error, info};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{Upgrade, User, UserUpgrade, UserUpgradeRow};
use crate::users;

/// Price of going from `level` to `level + 1`.
pub fn cost_at(upgrade: &Upgrade, level: i32) -> i64 {
    (upgrade.base_cost as f64 * upgrade.cost_multiplier.powi(level)).floor() as i64
}

pub fn effect_at(upgrade: &Upgrade, level: i32) -> i64 {
    upgrade.base_effect * i64::from(level)
}

pub fn check_purchase(upgrade: &Upgrade, current_level: i32, coins: i64) -> ApiResult<i64> {
    if current_level >= upgrade.max_level {
        return Err(ApiError::MaxLevel);
    }

    let cost = cost_at(upgrade, current_level);
    if coins < cost {
        return Err(ApiError::InsufficientCoins);
    }
    Ok(cost)
}

pub async fn list(pool: &PgPool) -> ApiResult<Vec<Upgrade>> {
    let upgrades = sqlx::query_as::<_, Upgrade>("SELECT * FROM upgrades ORDER BY base_cost")
        .fetch_all(pool)
        .await?;
    Ok(upgrades)
}

pub async fn find(pool: &PgPool, id: Uuid) -> ApiResult<Option<Upgrade>> {
    let upgrade = sqlx::query_as::<_, Upgrade>("SELECT * FROM upgrades WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(upgrade)
}

pub async fn current_level(pool: &PgPool, user_id: Uuid, upgrade_id: Uuid) -> ApiResult<i32> {
    let level = sqlx::query_scalar::<_, i32>(
        "SELECT current_level FROM user_upgrades WHERE user_id = $1 AND upgrade_id = $2",
    )
    .bind(user_id)
    .bind(upgrade_id)
    .fetch_optional(pool)
    .await?;
    Ok(level.unwrap_or(0))
}

pub async fn for_user(pool: &PgPool, user_id: Uuid) -> ApiResult<Vec<UserUpgrade>> {
    let rows = sqlx::query_as::<_, UserUpgradeRow>(
        "SELECT id, user_id, upgrade_id, current_level, total_spent FROM user_upgrades WHERE user_id = $1",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await?;

    let catalogue: HashMap<Uuid, Upgrade> = list(pool)
        .await?
        .into_iter()
        .map(|upgrade| (upgrade.id, upgrade))
        .collect();

    Ok(attach(rows, &catalogue))
}

fn attach(rows: Vec<UserUpgradeRow>, catalogue: &HashMap<Uuid, Upgrade>) -> Vec<UserUpgrade> {
    rows.into_iter()
        .filter_map(|row| {
            let upgrade = catalogue.get(&row.upgrade_id)?.clone();
            Some(UserUpgrade {
                id: row.id,
                user_id: row.user_id,
                upgrade_id: row.upgrade_id,
                current_level: row.current_level,
                total_spent: row.total_spent,
                upgrade,
            })
        })
        .collect()
}

const INSUFFICIENT_COINS: &str = "TP001";
const LEVEL_CHANGED: &str = "TP002";
const UNKNOWN_UPGRADE: &str = "TP003";

/// Bonus added to the player's stat when going from `level` to `level + 1`.
pub fn effect_delta(upgrade: &Upgrade, level: i32) -> i64 {
    effect_at(upgrade, level + 1) - effect_at(upgrade, level)
}

// Guards inside purchase_upgrade raise these SQLSTATEs when a concurrent
// request got there first.
fn purchase_failure(e: sqlx::Error) -> ApiError {
    let code = match &e {
        sqlx::Error::Database(db) => db.code().map(|code| code.into_owned()),
        _ => None,
    };
    match code.as_deref() {
        Some(INSUFFICIENT_COINS) => ApiError::InsufficientCoins,
        Some(LEVEL_CHANGED) => ApiError::LevelChanged,
        Some(UNKNOWN_UPGRADE) => ApiError::NotFound("Upgrade"),
        _ => {
            error!("Transaction error purchasing upgrade: {}", e);
            ApiError::from(e)
        }
    }
}

async fn apply_purchase(
    pool: &PgPool,
    user_id: Uuid,
    upgrade: &Upgrade,
    cost: i64,
    level: i32,
) -> ApiResult<()> {
    sqlx::query("SELECT purchase_upgrade($1, $2, $3, $4, $5)")
        .bind(user_id)
        .bind(upgrade.id)
        .bind(cost)
        .bind(level)
        .bind(effect_delta(upgrade, level))
        .execute(pool)
        .await
        .map_err(purchase_failure)?;
    Ok(())
}

// `purchase_upgrade` re-checks balance and level under the row locks.
pub async fn purchase(pool: &PgPool, user_id: Uuid, upgrade_id: Uuid, now: DateTime<Utc>) -> ApiResult<User> {
    let user = users::load_fresh(pool, user_id, now).await?;
    let upgrade = find(pool, upgrade_id).await?.ok_or(ApiError::NotFound("Upgrade"))?;
    let level = current_level(pool, user_id, upgrade_id).await?;

    let cost = check_purchase(&upgrade, level, user.coins)?;
    apply_purchase(pool, user_id, &upgrade, cost, level).await?;

    info!("User {} bought {} level {} for {}", user_id, upgrade.name, level + 1, cost);
    users::require(pool, user_id).await
}
