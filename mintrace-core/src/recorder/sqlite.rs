use super::ObservationStore;
use crate::{
    error::Result,
    types::{Observation, Source},
};
use async_trait::async_trait;
use sqlx::Row;
use tracing::warn;

/// SQLite observation log, for runs where adapters live in separate processes
#[derive(Clone)]
pub struct SqliteStore {
    pool: sqlx::sqlite::SqlitePool,
    db_path: String,
}

impl SqliteStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let db_path = database_url.trim_start_matches("sqlite:").to_string();
        tracing::info!("Database path: {}", db_path);

        if let Some(parent) = std::path::Path::new(&db_path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = sqlx::sqlite::SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true);

        let pool = sqlx::sqlite::SqlitePool::connect_with(options).await?;

        let store = Self { pool, db_path };
        store.run_migrations().await?;

        Ok(store)
    }

    async fn run_migrations(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                token TEXT NOT NULL,
                timestamp INTEGER NOT NULL,
                source TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_observations_token ON observations(token);
        "#,
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("SQLite migrations completed");
        Ok(())
    }
}

#[async_trait]
impl ObservationStore for SqliteStore {
    async fn append(&self, observation: &Observation) -> Result<()> {
        sqlx::query("INSERT INTO observations (token, timestamp, source) VALUES (?1, ?2, ?3)")
            .bind(&observation.token)
            .bind(observation.timestamp)
            .bind(observation.source.as_str())
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    async fn load_entries(&self) -> Result<Vec<Option<Observation>>> {
        let rows = sqlx::query("SELECT token, timestamp, source FROM observations ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await?;

        let mut entries = Vec::with_capacity(rows.len());
        for row in rows {
            let source: String = row.get("source");
            match source.parse::<Source>() {
                Ok(source) => entries.push(Some(Observation {
                    token: row.get("token"),
                    timestamp: row.get("timestamp"),
                    source,
                })),
                Err(e) => {
                    warn!("Malformed observation row: {}", e);
                    entries.push(None);
                }
            }
        }

        Ok(entries)
    }

    fn location(&self) -> String {
        format!("sqlite:{}", self.db_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_append_then_load_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("obs.db").display());
        let store = SqliteStore::new(&url).await.unwrap();

        store.append(&Observation::new("tokenB", 200, Source::Wss)).await.unwrap();
        store.append(&Observation::new("tokenA", 100, Source::Grpc)).await.unwrap();

        let records = store.load().await.unwrap();
        assert_eq!(
            records,
            vec![
                Observation::new("tokenB", 200, Source::Wss),
                Observation::new("tokenA", 100, Source::Grpc),
            ]
        );
    }
}
