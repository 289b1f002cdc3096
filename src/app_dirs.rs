use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// `$HOME/.local/state/derby`, or the platform's local data dir.
    pub fn state_dir() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            Some(PathBuf::from(home).join(".local").join("state").join("derby"))
        } else {
            ProjectDirs::from("", "", "derby").map(|proj_dirs| proj_dirs.data_local_dir().to_path_buf())
        }
    }

    /// Where the session's token pair lives. `DERBY_TOKEN_FILE` wins.
    pub fn token_path() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("DERBY_TOKEN_FILE") {
            return Some(PathBuf::from(path));
        }
        Self::state_dir().map(|dir| dir.join("tokens.json"))
    }

    pub fn log_path() -> Option<PathBuf> {
        Self::state_dir().map(|dir| dir.join("derby.log"))
    }
}
