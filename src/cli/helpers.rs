//! Shared helper functions for CLI commands.

use std::path::Path;

use crate::repository::SqliteStore;

/// Open the store from settings.
pub fn open_store(db_path: &Path) -> anyhow::Result<SqliteStore> {
    Ok(SqliteStore::new(db_path)?)
}

/// Truncate a string for table display, appending an ellipsis.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
