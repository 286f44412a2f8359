use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Error as SqlxError;
use tracing::info;
use uuid::Uuid;

use super::pool::Db;

/// Paste row from the database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PasteRow {
    pub id: Uuid,
    pub title: String,
    pub content: String,
    pub language: String,
    pub visibility: String,
    pub password_hash: Option<String>,
    pub custom_url: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub views: i64,
    pub created_date: DateTime<Utc>,
}

impl Db {
    /// Insert a new paste
    pub async fn insert_paste(&self, paste: &PasteRow) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            INSERT INTO pastes (id, title, content, language, visibility, password_hash,
                                custom_url, expires_at, created_by, views, created_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(paste.id)
        .bind(&paste.title)
        .bind(&paste.content)
        .bind(&paste.language)
        .bind(&paste.visibility)
        .bind(&paste.password_hash)
        .bind(&paste.custom_url)
        .bind(paste.expires_at)
        .bind(&paste.created_by)
        .bind(paste.views)
        .bind(paste.created_date)
        .execute(&self.pool)
        .await?;

        info!("Paste created: {}", paste.id);
        Ok(())
    }

    /// Check whether a custom URL is already taken
    pub async fn custom_url_taken(&self, custom_url: &str) -> Result<bool, SqlxError> {
        let row: Option<(Uuid,)> = sqlx::query_as("SELECT id FROM pastes WHERE custom_url = $1")
            .bind(custom_url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Fetch a paste by its UUID
    pub async fn get_paste_by_id(&self, id: Uuid) -> Result<Option<PasteRow>, SqlxError> {
        sqlx::query_as::<_, PasteRow>("SELECT * FROM pastes WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Fetch a paste by its custom URL
    pub async fn get_paste_by_custom_url(
        &self,
        custom_url: &str,
    ) -> Result<Option<PasteRow>, SqlxError> {
        sqlx::query_as::<_, PasteRow>("SELECT * FROM pastes WHERE custom_url = $1")
            .bind(custom_url)
            .fetch_optional(&self.pool)
            .await
    }

    /// Bump the view counter of a paste
    pub async fn increment_paste_views(&self, id: Uuid) -> Result<(), SqlxError> {
        sqlx::query("UPDATE pastes SET views = views + 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// All pastes owned by a user, newest first
    pub async fn list_pastes_by_owner(&self, owner: &str) -> Result<Vec<PasteRow>, SqlxError> {
        sqlx::query_as::<_, PasteRow>(
            "SELECT * FROM pastes WHERE created_by = $1 ORDER BY created_date DESC",
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await
    }

    /// Delete a paste owned by the given user. Returns whether a row was removed.
    pub async fn delete_paste(&self, id: Uuid, owner: &str) -> Result<bool, SqlxError> {
        let result = sqlx::query("DELETE FROM pastes WHERE id = $1 AND created_by = $2")
            .bind(id)
            .bind(owner)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
