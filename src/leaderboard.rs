use sqlx::PgPool;
use uuid::Uuid;

use crate::error::{ApiError, ApiResult};
use crate::models::{LeaderboardEntry, LeaderboardStats, UserRank};

pub const DEFAULT_LIMIT: i64 = 50;
pub const MAX_LIMIT: i64 = 100;

pub fn clamp_limit(limit: Option<i64>) -> i64 {
    limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
}

pub async fn top_by_coins(pool: &PgPool, limit: i64) -> ApiResult<Vec<LeaderboardEntry>> {
    let entries = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT id, telegram_id, username, first_name, last_name, coins, total_taps,
               ROW_NUMBER() OVER (ORDER BY coins DESC, created_at) AS rank
        FROM users
        ORDER BY coins DESC, created_at
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

pub async fn top_by_taps(pool: &PgPool, limit: i64) -> ApiResult<Vec<LeaderboardEntry>> {
    let entries = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT id, telegram_id, username, first_name, last_name, coins, total_taps,
               ROW_NUMBER() OVER (ORDER BY total_taps DESC, created_at) AS rank
        FROM users
        ORDER BY total_taps DESC, created_at
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(entries)
}

/// One plus the number of players holding strictly more coins.
pub async fn rank_of(pool: &PgPool, user_id: Uuid) -> ApiResult<UserRank> {
    let coins = sqlx::query_scalar::<_, i64>("SELECT coins FROM users WHERE id = $1")
        .bind(user_id)
        .fetch_optional(pool)
        .await?
        .ok_or(ApiError::NotFound("User"))?;

    let (higher, total): (i64, i64) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FILTER (WHERE coins > $1), COUNT(*)
        FROM users
        "#,
    )
    .bind(coins)
    .fetch_one(pool)
    .await?;

    Ok(UserRank {
        rank: higher + 1,
        total_players: total,
    })
}

pub async fn stats(pool: &PgPool) -> ApiResult<LeaderboardStats> {
    let stats = sqlx::query_as::<_, LeaderboardStats>(
        r#"
        SELECT COUNT(*) AS total_players,
               COALESCE(SUM(coins), 0)::BIGINT AS total_coins,
               COALESCE(SUM(total_taps), 0)::BIGINT AS total_taps
        FROM users
        "#,
    )
    .fetch_one(pool)
    .await?;
    Ok(stats)
}
