use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Error as SqlxError;
use tracing::info;
use uuid::Uuid;

use super::pool::Db;

/// Room row from the database
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoomRow {
    pub room_id: String,
    pub room_name: String,
    pub language: String,
    pub content: String,
    pub is_private: bool,
    pub password_hash: Option<String>,
    pub is_active: bool,
    pub created_by: String,
    pub muted_users: Vec<String>,
    pub created_date: DateTime<Utc>,
}

/// Membership row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MemberRow {
    pub room_id: String,
    pub user_id: String,
    pub role: String,
    pub joined_at: DateTime<Utc>,
}

/// Chat message row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoomMessageRow {
    pub id: Uuid,
    pub room_id: String,
    pub sender: String,
    pub display_name: String,
    pub content: String,
    pub created_date: DateTime<Utc>,
}

/// Saved content snapshot row
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct RoomVersionRow {
    pub id: Uuid,
    pub room_id: String,
    pub content: String,
    pub saved_by: String,
    pub created_date: DateTime<Utc>,
}

impl Db {
    /// Insert a room together with its owner membership, atomically
    pub async fn insert_room(&self, room: &RoomRow) -> Result<(), SqlxError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rooms (room_id, room_name, language, content, is_private,
                               password_hash, is_active, created_by, muted_users, created_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&room.room_id)
        .bind(&room.room_name)
        .bind(&room.language)
        .bind(&room.content)
        .bind(room.is_private)
        .bind(&room.password_hash)
        .bind(room.is_active)
        .bind(&room.created_by)
        .bind(&room.muted_users)
        .bind(room.created_date)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO room_members (room_id, user_id, role, joined_at) VALUES ($1, $2, 'owner', $3)",
        )
        .bind(&room.room_id)
        .bind(&room.created_by)
        .bind(room.created_date)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        info!("Room created: {} by {}", room.room_id, room.created_by);
        Ok(())
    }

    /// Fetch a room by its 6-character id
    pub async fn get_room(&self, room_id: &str) -> Result<Option<RoomRow>, SqlxError> {
        sqlx::query_as::<_, RoomRow>("SELECT * FROM rooms WHERE room_id = $1")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await
    }

    /// Check whether a room id is already in use, active or not
    pub async fn room_id_taken(&self, room_id: &str) -> Result<bool, SqlxError> {
        let row: Option<(String,)> = sqlx::query_as("SELECT room_id FROM rooms WHERE room_id = $1")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    /// Active rooms where the user is the owner or a member
    pub async fn list_rooms_for_user(&self, user_id: &str) -> Result<Vec<RoomRow>, SqlxError> {
        sqlx::query_as::<_, RoomRow>(
            r#"
            SELECT DISTINCT r.*
            FROM rooms r
            LEFT JOIN room_members m ON r.room_id = m.room_id
            WHERE r.is_active = TRUE
              AND (r.created_by = $1 OR m.user_id = $1)
            ORDER BY r.created_date DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Overwrite the room content. Last write wins, whole-document granularity.
    pub async fn update_room_content(&self, room_id: &str, content: &str) -> Result<(), SqlxError> {
        sqlx::query("UPDATE rooms SET content = $1 WHERE room_id = $2")
            .bind(content)
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Update privacy flag and password hash
    pub async fn update_room_settings(
        &self,
        room_id: &str,
        is_private: bool,
        password_hash: Option<&str>,
    ) -> Result<(), SqlxError> {
        sqlx::query("UPDATE rooms SET is_private = $1, password_hash = $2 WHERE room_id = $3")
            .bind(is_private)
            .bind(password_hash)
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Soft-delete a room by flipping its active flag
    pub async fn deactivate_room(&self, room_id: &str) -> Result<(), SqlxError> {
        sqlx::query("UPDATE rooms SET is_active = FALSE WHERE room_id = $1")
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        info!("Room deactivated: {}", room_id);
        Ok(())
    }

    /// Replace the room's mute list
    pub async fn set_muted_users(
        &self,
        room_id: &str,
        muted_users: &[String],
    ) -> Result<(), SqlxError> {
        sqlx::query("UPDATE rooms SET muted_users = $1 WHERE room_id = $2")
            .bind(muted_users)
            .bind(room_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Add a member, keeping an existing row untouched
    pub async fn upsert_member(
        &self,
        room_id: &str,
        user_id: &str,
        role: &str,
    ) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            INSERT INTO room_members (room_id, user_id, role, joined_at)
            VALUES ($1, $2, $3, NOW())
            ON CONFLICT (room_id, user_id) DO NOTHING
            "#,
        )
        .bind(room_id)
        .bind(user_id)
        .bind(role)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Remove a member. Returns whether a row was removed.
    pub async fn remove_member(&self, room_id: &str, user_id: &str) -> Result<bool, SqlxError> {
        let result = sqlx::query("DELETE FROM room_members WHERE room_id = $1 AND user_id = $2")
            .bind(room_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Fetch a single membership row
    pub async fn get_member(
        &self,
        room_id: &str,
        user_id: &str,
    ) -> Result<Option<MemberRow>, SqlxError> {
        sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM room_members WHERE room_id = $1 AND user_id = $2",
        )
        .bind(room_id)
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }

    /// All members of a room
    pub async fn list_members(&self, room_id: &str) -> Result<Vec<MemberRow>, SqlxError> {
        sqlx::query_as::<_, MemberRow>(
            "SELECT * FROM room_members WHERE room_id = $1 ORDER BY joined_at",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Persist a chat message
    pub async fn insert_room_message(&self, message: &RoomMessageRow) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            INSERT INTO room_messages (id, room_id, sender, display_name, content, created_date)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(message.id)
        .bind(&message.room_id)
        .bind(&message.sender)
        .bind(&message.display_name)
        .bind(&message.content)
        .bind(message.created_date)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The most recent chat messages of a room, oldest first
    pub async fn list_recent_messages(
        &self,
        room_id: &str,
        limit: i64,
    ) -> Result<Vec<RoomMessageRow>, SqlxError> {
        let mut rows = sqlx::query_as::<_, RoomMessageRow>(
            "SELECT * FROM room_messages WHERE room_id = $1 ORDER BY created_date DESC LIMIT $2",
        )
        .bind(room_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.reverse();
        Ok(rows)
    }

    /// Persist a content snapshot
    pub async fn insert_room_version(&self, version: &RoomVersionRow) -> Result<(), SqlxError> {
        sqlx::query(
            r#"
            INSERT INTO room_versions (id, room_id, content, saved_by, created_date)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(version.id)
        .bind(&version.room_id)
        .bind(&version.content)
        .bind(&version.saved_by)
        .bind(version.created_date)
        .execute(&self.pool)
        .await?;

        info!("Version saved for room {}: {}", version.room_id, version.id);
        Ok(())
    }

    /// Version history of a room, newest first
    pub async fn list_room_versions(
        &self,
        room_id: &str,
    ) -> Result<Vec<RoomVersionRow>, SqlxError> {
        sqlx::query_as::<_, RoomVersionRow>(
            "SELECT * FROM room_versions WHERE room_id = $1 ORDER BY created_date DESC",
        )
        .bind(room_id)
        .fetch_all(&self.pool)
        .await
    }

    /// Fetch a single version snapshot
    pub async fn get_room_version(
        &self,
        room_id: &str,
        version_id: Uuid,
    ) -> Result<Option<RoomVersionRow>, SqlxError> {
        sqlx::query_as::<_, RoomVersionRow>(
            "SELECT * FROM room_versions WHERE room_id = $1 AND id = $2",
        )
        .bind(room_id)
        .bind(version_id)
        .fetch_optional(&self.pool)
        .await
    }
}
