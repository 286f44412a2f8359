use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

// Global database instance
static DB: OnceCell<Arc<Db>> = OnceCell::const_new();

/// Initialize the global database connection
///
/// # Arguments
/// * `database_url` - PostgreSQL connection string
pub async fn init_db(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = Db::new(database_url).await?;
    db.ensure_schema().await?;
    DB.set(Arc::new(db))
        .map_err(|_| "Database already initialized")?;
    Ok(())
}

/// Get the global database instance
pub fn get_db() -> Option<Arc<Db>> {
    DB.get().cloned()
}

/// Database connection pool
pub struct Db {
    pub(crate) pool: PgPool,
}

impl Db {
    /// Create a new database connection pool
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Get a reference to the connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the tables this service relies on when they do not exist yet
    pub async fn ensure_schema(&self) -> Result<(), SqlxError> {
        let statements = [
            r#"
            CREATE TABLE IF NOT EXISTS pastes (
                id UUID PRIMARY KEY,
                title TEXT NOT NULL,
                content TEXT NOT NULL,
                language TEXT NOT NULL,
                visibility TEXT NOT NULL,
                password_hash TEXT,
                custom_url TEXT UNIQUE,
                expires_at TIMESTAMPTZ,
                created_by TEXT NOT NULL,
                views BIGINT NOT NULL DEFAULT 0,
                created_date TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS clipboards (
                id UUID PRIMARY KEY,
                clipboard_id TEXT NOT NULL UNIQUE,
                content TEXT NOT NULL,
                device_name TEXT NOT NULL,
                created_by TEXT NOT NULL,
                created_date TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS rooms (
                room_id TEXT PRIMARY KEY,
                room_name TEXT NOT NULL,
                language TEXT NOT NULL,
                content TEXT NOT NULL,
                is_private BOOLEAN NOT NULL DEFAULT FALSE,
                password_hash TEXT,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_by TEXT NOT NULL,
                muted_users TEXT[] NOT NULL DEFAULT '{}',
                created_date TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS room_members (
                room_id TEXT NOT NULL REFERENCES rooms(room_id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                role TEXT NOT NULL,
                joined_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                PRIMARY KEY (room_id, user_id)
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS room_messages (
                id UUID PRIMARY KEY,
                room_id TEXT NOT NULL REFERENCES rooms(room_id) ON DELETE CASCADE,
                sender TEXT NOT NULL,
                display_name TEXT NOT NULL,
                content TEXT NOT NULL,
                created_date TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS room_versions (
                id UUID PRIMARY KEY,
                room_id TEXT NOT NULL REFERENCES rooms(room_id) ON DELETE CASCADE,
                content TEXT NOT NULL,
                saved_by TEXT NOT NULL,
                created_date TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id TEXT PRIMARY KEY,
                display_name TEXT NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        ];

        for statement in statements {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        info!("Database schema ensured");
        Ok(())
    }
}
