use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Error as SqlxError;

use super::pool::Db;

/// User profile row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserRow {
    pub user_id: String,
    pub display_name: String,
    pub updated_at: DateTime<Utc>,
}

impl Db {
    /// Fetch a user profile
    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserRow>, SqlxError> {
        sqlx::query_as::<_, UserRow>("SELECT * FROM users WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Create or overwrite a user profile
    pub async fn upsert_user(&self, user_id: &str, display_name: &str) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            INSERT INTO users (user_id, display_name, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (user_id)
            DO UPDATE SET display_name = EXCLUDED.display_name, updated_at = NOW()
            "#,
        )
        .bind(user_id)
        .bind(display_name)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
