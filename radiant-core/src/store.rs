//! Turn store — the append-only conversation log.
//!
//! Backed by one SQLite table. Every operation opens its own connection and
//! closes it before returning; no handle outlives a call.

use std::path::{Path, PathBuf};

use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};

use crate::error::StorageError;
use crate::models::Turn;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS history (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_message TEXT NOT NULL,
    ai_response TEXT NOT NULL,
    created_at TEXT NOT NULL
)
"#;

#[derive(Debug, Clone)]
pub struct TurnStore {
    path: PathBuf,
    options: SqliteConnectOptions,
}

impl TurnStore {
    /// Open (creating if needed) the database at `path` and ensure the schema.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let store = Self { path, options };

        let mut conn = store.connect().await?;
        let result = sqlx::query(SCHEMA).execute(&mut conn).await;
        conn.close().await?;
        result?;

        tracing::info!(path = %store.path.display(), "Turn store ready");
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn connect(&self) -> Result<SqliteConnection, StorageError> {
        Ok(self.options.connect().await?)
    }

    /// Append one turn with the next sequence value.
    pub async fn append(&self, user_text: &str, ai_text: &str) -> Result<(), StorageError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query(
            "INSERT INTO history (user_message, ai_response, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_text)
        .bind(ai_text)
        .bind(Utc::now())
        .execute(&mut conn)
        .await;
        conn.close().await?;

        let done = result?;
        tracing::debug!(sequence = done.last_insert_rowid(), "Turn appended");
        Ok(())
    }

    /// All turns, ascending by sequence.
    pub async fn load_all(&self) -> Result<Vec<Turn>, StorageError> {
        let mut conn = self.connect().await?;
        let result = sqlx::query_as::<_, Turn>(
            "SELECT id AS sequence, user_message AS user_text, ai_response AS ai_text, created_at \
             FROM history ORDER BY id ASC",
        )
        .fetch_all(&mut conn)
        .await;
        conn.close().await?;
        Ok(result?)
    }

    /// Delete every turn and restart numbering. Clearing an empty store is fine.
    pub async fn clear(&self) -> Result<(), StorageError> {
        let mut conn = self.connect().await?;
        let result = clear_on(&mut conn).await;
        conn.close().await?;
        result?;

        tracing::info!("Turn store cleared");
        Ok(())
    }

    /// Cheap liveness check. Returns the SQLite library version.
    pub async fn ping(&self) -> Result<String, StorageError> {
        let mut conn = self.connect().await?;
        let result: Result<(String,), sqlx::Error> = sqlx::query_as("SELECT sqlite_version()")
            .fetch_one(&mut conn)
            .await;
        conn.close().await?;
        Ok(result?.0)
    }
}

async fn clear_on(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    let mut tx = conn.begin().await?;
    sqlx::query("DELETE FROM history").execute(&mut *tx).await?;
    // AUTOINCREMENT keeps its high-water mark here
    sqlx::query("DELETE FROM sqlite_sequence WHERE name = 'history'")
        .execute(&mut *tx)
        .await?;
    tx.commit().await
}
