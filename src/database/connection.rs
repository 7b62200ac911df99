use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{info, warn};

use crate::config::CatalogConfig;
use crate::error::{CatalogError, Result};

/// Process-wide database pool, created once at startup
pub struct DatabaseConnection {
    pool: PgPool,
}

impl DatabaseConnection {
    pub async fn connect(config: &CatalogConfig) -> Result<Self> {
        Self::connect_url(&config.database_url, config.max_connections).await
    }

    pub async fn connect_url(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(database_url)
            .await?;

        info!(max_connections, "Database pool connected");
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<bool> {
        health_check(&self.pool).await
    }

    pub async fn close(self) {
        self.pool.close().await;
    }
}

pub async fn health_check(pool: &PgPool) -> Result<bool> {
    let row = sqlx::query("SELECT 1 AS health").fetch_one(pool).await?;
    let health: i32 = row.get("health");
    Ok(health == 1)
}

/// Wipe every catalog, staging and history table. Only allowed when `LOCAL=true`.
pub async fn reset_catalog(pool: &PgPool, config: &CatalogConfig) -> Result<()> {
    if !config.local {
        return Err(CatalogError::configuration(
            "destructive reload refused: LOCAL is not \"true\"",
        ));
    }

    warn!("Truncating all catalog tables");
    sqlx::query(
        r#"
        TRUNCATE
            historic_class_information_term_dependencies,
            historic_class_information,
            staging_meeting_times,
            staging_sections,
            staging_professors,
            staging_courses,
            meeting_times,
            sections,
            professors,
            courses,
            term_collection_history,
            term_collections,
            schools
        RESTART IDENTITY CASCADE
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("ALTER SEQUENCE historic_class_information_sequence RESTART WITH 1")
        .execute(pool)
        .await?;

    Ok(())
}
