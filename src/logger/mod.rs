use crate::models::LogRecord;
use crate::Result;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;

/// Process-wide log sink: every message goes to the console stream and is
/// appended as a row in a sqlite table. Append-only, no rotation, no levels.
#[derive(Clone)]
pub struct Logger {
    pool: SqlitePool,
}

impl Logger {
    /// Open (or create) the log database at `db_path` and ensure the table
    /// exists. Pass `"sqlite::memory:"` for an in-memory store in tests.
    pub async fn open(db_path: &str) -> Result<Self> {
        let options = if db_path == "sqlite::memory:" {
            SqliteConnectOptions::from_str(db_path).map_err(sqlx::Error::from)?
        } else {
            SqliteConnectOptions::new()
                .filename(db_path)
                .create_if_missing(true)
        };

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp TEXT NOT NULL,
                message TEXT NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await?;

        tracing::info!("Opened log store at {}", db_path);

        Ok(Self { pool })
    }

    /// Write `message` to the console sink and append it to the log store.
    /// Both writes complete before return. A failed durable write is reported
    /// on the console sink rather than propagated, so logging itself never
    /// takes down the caller.
    pub async fn log(&self, message: &str) {
        tracing::info!("{}", message);

        let result = sqlx::query("INSERT INTO logs (timestamp, message) VALUES (?1, ?2)")
            .bind(Utc::now().to_rfc3339())
            .bind(message)
            .execute(&self.pool)
            .await;

        if let Err(e) = result {
            tracing::warn!("Failed to append log row: {}", e);
        }
    }

    /// Most recent log row, if any. The only read this system performs.
    pub async fn last(&self) -> Result<Option<LogRecord>> {
        let row = sqlx::query("SELECT id, timestamp, message FROM logs ORDER BY id DESC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(|r| LogRecord {
            id: r.get("id"),
            timestamp: r
                .get::<String, _>("timestamp")
                .parse::<DateTime<Utc>>()
                .unwrap_or_else(|_| Utc::now()),
            message: r.get("message"),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_round_trip() {
        let logger = Logger::open("sqlite::memory:").await.unwrap();

        logger.log("first message").await;
        logger.log("second message").await;

        let last = logger.last().await.unwrap().unwrap();
        assert_eq!(last.message, "second message");
        assert!(last.id >= 2);
    }

    #[tokio::test]
    async fn test_empty_store_has_no_last_row() {
        let logger = Logger::open("sqlite::memory:").await.unwrap();
        assert!(logger.last().await.unwrap().is_none());
    }
}
