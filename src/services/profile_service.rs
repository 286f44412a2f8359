use moka::sync::Cache;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

use crate::db;

static DISPLAY_NAME_CACHE: OnceLock<Cache<String, String>> = OnceLock::new();

/// Initialize the display-name cache.
/// Should be called once at startup.
pub fn init_display_name_cache() {
    DISPLAY_NAME_CACHE.get_or_init(|| {
        Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build()
    });
    info!("Display-name cache initialized");
}

fn get_display_name_cache() -> &'static Cache<String, String> {
    DISPLAY_NAME_CACHE
        .get()
        .expect("Display-name cache not initialized. Call init_display_name_cache() first.")
}

/// Number of cached display names, for diagnostics
pub fn cached_display_names() -> u64 {
    get_display_name_cache().entry_count()
}

/// Resolve a user's display name, falling back to the raw identity when
/// no profile exists. Results are cached for five minutes.
pub async fn get_or_fetch_display_name(user_id: &str) -> String {
    let cache = get_display_name_cache();

    if let Some(name) = cache.get(user_id) {
        return name;
    }

    let name = match db::get_db() {
        Some(db) => match db.get_user(user_id).await {
            Ok(Some(user)) => user.display_name,
            _ => user_id.to_string(),
        },
        None => user_id.to_string(),
    };

    cache.insert(user_id.to_string(), name.clone());
    name
}

/// Drop a cached entry after a profile update
pub fn invalidate_display_name(user_id: &str) {
    get_display_name_cache().invalidate(user_id);
}
