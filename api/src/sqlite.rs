use std::str::FromStr;

use anyhow::Result;
use serde::Deserialize;
use sqlx::{
    migrate::MigrateDatabase,
    pool::PoolConnection,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Sqlite, SqlitePool,
};

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

/// Shared handle to the SQLite pool, extracted by handlers with `State<Database>`.
#[derive(Debug, Clone)]
pub struct Database(SqlitePool);

impl Database {
    pub fn new(pool: SqlitePool) -> Self {
        Self(pool)
    }

    pub async fn acquire(&self) -> Result<PoolConnection<Sqlite>, sqlx::Error> {
        self.0.acquire().await
    }
}

impl AsRef<SqlitePool> for Database {
    fn as_ref(&self) -> &SqlitePool {
        &self.0
    }
}

pub async fn create_pool(settings: &Settings) -> Result<SqlitePool> {
    match Sqlite::database_exists(&settings.url).await? {
        true => tracing::info!("Database already exists"),
        false => Sqlite::create_database(&settings.url).await?,
    }

    let options = SqliteConnectOptions::from_str(&settings.url)?
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(settings.max_connections)
        .connect_with(options)
        .await?;

    sqlx::migrate!("db/migrations").run(&pool).await?;

    Ok(pool)
}

#[cfg(test)]
pub mod test {
    use super::*;

    /// A fresh, migrated in-memory database. One connection keeps every
    /// query on the same in-memory file.
    pub async fn memory_database() -> Database {
        let pool = create_pool(&Settings {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
        })
        .await
        .unwrap();

        Database::new(pool)
    }

    #[tokio::test]
    async fn test_migrations_enable_foreign_keys() {
        let db = memory_database().await;
        let enabled: i64 = sqlx::query_scalar("PRAGMA foreign_keys")
            .fetch_one(db.as_ref())
            .await
            .unwrap();
        assert_eq!(enabled, 1);
    }
}
