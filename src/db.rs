use anyhow::{Context, Result};
use sqlx::MySqlPool;
use sqlx::mysql::MySqlPoolOptions;

use crate::services::settings;

pub async fn init_db(database_url: &str) -> Result<MySqlPool> {
    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .context("Failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("Failed to run database migrations")?;

    let seeded = settings::seed_defaults(&pool)
        .await
        .context("Failed to seed default settings")?;
    if seeded > 0 {
        tracing::info!(count = seeded, "Seeded default system settings");
    }

    Ok(pool)
}
