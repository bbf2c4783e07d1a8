use actix_web::{middleware::Logger, web, App, HttpServer};
use chrono::Utc;
use log::{error, info};
use sqlx::PgPool;
use std::time::Duration;

use rupee_tap::{boosters, config::Config, routes};

// Flips expired boosters to inactive.
async fn booster_sweep_task(pool: PgPool, every: Duration) {
    let mut interval = tokio::time::interval(every);

    loop {
        interval.tick().await;

        match boosters::deactivate_expired(&pool, Utc::now()).await {
            Ok(0) => {}
            Ok(count) => info!("Deactivated {} expired boosters", count),
            Err(e) => error!("Booster sweep failed: {}", e),
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    dotenv::dotenv().ok();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .init();

    let config = Config::from_env().map_err(|e| {
        error!("Configuration error: {}", e);
        std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
    })?;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!("Could not connect to database: {}", e);
            std::io::Error::new(std::io::ErrorKind::ConnectionRefused, e)
        })?;

    if config.run_migrations {
        sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
            error!("Migration failed: {}", e);
            std::io::Error::new(std::io::ErrorKind::Other, e)
        })?;
        info!("Migrations applied");
    }

    let pool_clone = pool.clone();
    let sweep_every = config.booster_sweep_interval;
    tokio::spawn(async move {
        booster_sweep_task(pool_clone, sweep_every).await
    });

    info!("Listening on {}", config.bind_addr);
    HttpServer::new(move || {
        App::new()
            .wrap(Logger::default())
            .app_data(web::Data::new(pool.clone()))
            .configure(routes::configure)
    })
    .bind(&config.bind_addr)?
    .run()
    .await
}
