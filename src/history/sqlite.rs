use std::str::FromStr;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;

use super::{HistoryStore, Reading, Result};

/// Readings table in a SQLite database.
#[derive(Clone)]
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Connect to `url` (e.g. `sqlite://smarthome.db`), creating the file
    /// and schema when missing.
    pub async fn open(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // Each in-memory connection would be its own database; keep one alive.
        let in_memory = url.contains(":memory:");
        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(if in_memory { 1 } else { 4 })
            .idle_timeout(if in_memory { None } else { Some(std::time::Duration::from_secs(600)) })
            .max_lifetime(if in_memory { None } else { Some(std::time::Duration::from_secs(1800)) })
            .connect_with(options)
            .await?;

        Self::create_schema(&pool).await?;
        log::info!("History store ready at {}", url);

        Ok(Self { pool })
    }

    pub fn get_pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn create_schema(pool: &SqlitePool) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS readings (
                ts INTEGER NOT NULL,
                temp REAL,
                hum REAL,
                heater INTEGER,
                fan INTEGER
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_ts ON readings(ts)")
            .execute(pool)
            .await?;

        Ok(())
    }
}

#[async_trait]
impl HistoryStore for SqliteHistory {
    async fn append(&self, reading: &Reading) -> Result<()> {
        sqlx::query("INSERT INTO readings (ts, temp, hum, heater, fan) VALUES ($1, $2, $3, $4, $5)")
            .bind(reading.timestamp)
            .bind(reading.temperature)
            .bind(reading.humidity)
            .bind(reading.heater_on)
            .bind(reading.fan_on)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn query(&self, since: i64) -> Result<Vec<Reading>> {
        let rows: Vec<Reading> = sqlx::query_as(
            r#"
            SELECT ts, temp, hum, heater, fan FROM readings
            WHERE ts >= $1
            ORDER BY ts ASC, rowid ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }
}
