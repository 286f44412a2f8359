use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Error as SqlxError;
use tracing::info;
use uuid::Uuid;

use super::pool::Db;

/// Clipboard row from the database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct ClipboardRow {
    pub id: Uuid,
    pub clipboard_id: String,
    pub content: String,
    pub device_name: String,
    pub created_by: String,
    pub created_date: DateTime<Utc>,
}

impl Db {
    /// Insert a new clipboard entry
    pub async fn insert_clipboard(&self, entry: &ClipboardRow) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            INSERT INTO clipboards (id, clipboard_id, content, device_name, created_by, created_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.id)
        .bind(&entry.clipboard_id)
        .bind(&entry.content)
        .bind(&entry.device_name)
        .bind(&entry.created_by)
        .bind(entry.created_date)
        .execute(&self.pool)
        .await?;

        info!("Clipboard created: {} ({})", entry.id, entry.clipboard_id);
        Ok(())
    }

    /// Check whether a 6-character retrieval code is already in use
    pub async fn clipboard_code_taken(&self, code: &str) -> Result<bool, SqlxError> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT id FROM clipboards WHERE clipboard_id = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.is_some())
    }

    /// Fetch a clipboard entry by its retrieval code
    pub async fn get_clipboard_by_code(
        &self,
        code: &str,
    ) -> Result<Option<ClipboardRow>, SqlxError> {
        sqlx::query_as::<_, ClipboardRow>("SELECT * FROM clipboards WHERE clipboard_id = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await
    }

    /// The 50 most recent clipboard entries of a user, newest first
    pub async fn list_clipboards_by_owner(
        &self,
        owner: &str,
    ) -> Result<Vec<ClipboardRow>, SqlxError> {
        sqlx::query_as::<_, ClipboardRow>(
            "SELECT * FROM clipboards WHERE created_by = $1 ORDER BY created_date DESC LIMIT 50",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
    }
}
