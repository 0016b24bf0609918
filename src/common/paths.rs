//! Configuration file locations
//!
//! Uses the directories crate for platform-appropriate locations:
//! - Linux: `~/.config/itsm-harness/`
//! - macOS: `~/Library/Application Support/itsm-harness/`
//! - Windows: `%APPDATA%\itsm-harness\`

use std::path::PathBuf;

/// Application directory name
const APP_NAME: &str = "itsm-harness";

/// Default dotenv file, relative to the working directory
pub const DEFAULT_ENV_FILE: &str = ".env";

/// Get the configuration directory path
pub fn config_dir() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
}

/// Get the path to the settings file
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|dir| dir.join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_path_is_under_config_dir() {
        let dir = config_dir();
        assert!(dir.is_some());
        assert_eq!(config_path().unwrap().parent(), dir.as_deref());
    }
}
