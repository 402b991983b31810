mod config;
pub mod habit_db;
pub mod migrations;

pub use config::{Config, TelegramConfig};
pub use habit_db::HabitDb;

use std::path::PathBuf;

use crate::error::ConfigError;

/// Returns the habitloop data directory.
///
/// Resolution order:
/// 1. `HABITLOOP_DATA_DIR` (explicit override, used by tests)
/// 2. `~/.config/habitloop-dev/` when `HABITLOOP_ENV=dev`
/// 3. `~/.config/habitloop/`
///
/// # Errors
/// Returns an error if creating the directory fails.
pub fn data_dir() -> Result<PathBuf, ConfigError> {
    let dir = if let Ok(dir) = std::env::var("HABITLOOP_DATA_DIR") {
        PathBuf::from(dir)
    } else {
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config");

        let env = std::env::var("HABITLOOP_ENV").unwrap_or_else(|_| "production".to_string());

        if env == "dev" {
            base_dir.join("habitloop-dev")
        } else {
            base_dir.join("habitloop")
        }
    };

    std::fs::create_dir_all(&dir).map_err(|e| ConfigError::DataDir(e.to_string()))?;
    Ok(dir)
}
