use directories::ProjectDirs;
use std::path::PathBuf;

/// Centralized application directory resolution
pub struct AppDirs;

impl AppDirs {
    /// Enrolled patterns are machine-local state rather than portable user data,
    /// so they live under XDG state when `HOME` is known.
    pub fn db_path() -> Option<PathBuf> {
        if let Ok(home) = std::env::var("HOME") {
            let state_dir = PathBuf::from(home)
                .join(".local")
                .join("state")
                .join("keyprint");
            Some(state_dir.join("patterns.db"))
        } else {
            ProjectDirs::from("", "", "keyprint")
                .map(|proj_dirs| proj_dirs.data_local_dir().join("patterns.db"))
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "keyprint").map(|pd| pd.config_dir().join("config.json"))
    }
}
