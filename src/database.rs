use std::path::PathBuf;

use anyhow::{Context, Result};
use log::info;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};

const DEFAULT_DB_PATH: &str = "loreboard.db";
const MAX_CONNECTIONS_DEFAULT: u32 = 5;

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(
                std::env::var("LOREBOARD_DB_PATH").unwrap_or_else(|_| DEFAULT_DB_PATH.to_string()),
            ),
            max_connections: std::env::var("LOREBOARD_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|value| value.parse().ok())
                .unwrap_or(MAX_CONNECTIONS_DEFAULT),
        }
    }
}

impl DatabaseConfig {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
    config: DatabaseConfig,
}

impl Database {
    pub async fn new(config: DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| {
                format!("Failed to connect to SQLite database '{}'", config.path.display())
            })?;

        let db = Self {
            pool,
            config: config.clone(),
        };

        db.run_migrations().await?;
        info!("opened record database at {}", config.path.display());
        Ok(db)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS world_elements (
                id TEXT PRIMARY KEY NOT NULL,
                project_id TEXT NOT NULL,
                category TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT,
                tags TEXT NOT NULL DEFAULT '[]',
                attributes TEXT NOT NULL DEFAULT '{}',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
        "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create world_elements table")?;

        sqlx::query(
            r#"CREATE INDEX IF NOT EXISTS idx_world_elements_project ON world_elements(project_id, category, name)"#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create world_elements_project index")?;

        Ok(())
    }
}
