//! Centralized path configuration for Sonken.
//!
//! The daemon and any tooling resolve data locations through this module so
//! they agree on where the state database lives.

use std::path::PathBuf;

/// Get the Sonken data directory.
///
/// Resolution order:
/// 1. `SONKEN_DATA_DIR` environment variable
/// 2. `~/.sonken`
/// 3. `./.sonken` when no home directory can be determined
pub fn data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("SONKEN_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::home_dir().map(|h| h.join(".sonken")).unwrap_or_else(|| PathBuf::from(".sonken"))
}

/// Get the configuration directory.
pub fn config_dir() -> PathBuf {
    data_dir()
}

/// Get the default state database path.
pub fn db_path() -> PathBuf {
    data_dir().join("sonken.db")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_path_is_under_data_dir() {
        let db = db_path();
        assert_eq!(db.file_name().and_then(|n| n.to_str()), Some("sonken.db"));
        assert_eq!(db.parent(), Some(data_dir().as_path()));
    }
}
