use crate::app_dirs::AppDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// The one acceptance threshold for "is this the enrolled typist".
pub const DEFAULT_ACCEPTANCE_THRESHOLD: f64 = 0.5;
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Capture-boundary minimum phrase length, in chars after trimming.
pub const DEFAULT_MIN_PHRASE_CHARS: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub min_phrase_chars: usize,
    pub acceptance_threshold: f64,
    pub max_retries: u32,
    pub database_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_phrase_chars: DEFAULT_MIN_PHRASE_CHARS,
            acceptance_threshold: DEFAULT_ACCEPTANCE_THRESHOLD,
            max_retries: DEFAULT_MAX_RETRIES,
            database_path: None,
        }
    }
}

impl Config {
    /// Replace out-of-range values with their defaults.
    pub fn validated(mut self) -> Self {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            tracing::warn!(
                acceptance_threshold = self.acceptance_threshold,
                fallback = DEFAULT_ACCEPTANCE_THRESHOLD,
                "acceptance_threshold must be within 0..=1"
            );
            self.acceptance_threshold = DEFAULT_ACCEPTANCE_THRESHOLD;
        }
        self
    }

    /// Configured database path, falling back to the state directory.
    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .or_else(AppDirs::db_path)
            .unwrap_or_else(|| PathBuf::from("keyprint_patterns.db"))
    }
}

pub trait ConfigStore {
    fn load(&self) -> Config;
    fn save(&self, cfg: &Config) -> std::io::Result<()>;
}

#[derive(Debug, Clone)]
pub struct FileConfigStore {
    path: PathBuf,
}

impl FileConfigStore {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        let path = AppDirs::config_path().unwrap_or_else(|| PathBuf::from("keyprint_config.json"));
        Self { path }
    }

    pub fn with_path<P: AsRef<Path>>(p: P) -> Self {
        Self {
            path: p.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Default for FileConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore for FileConfigStore {
    fn load(&self) -> Config {
        if let Ok(bytes) = fs::read(&self.path) {
            match serde_json::from_slice::<Config>(&bytes) {
                Ok(cfg) => return cfg.validated(),
                Err(e) => {
                    tracing::warn!(path = %self.path.display(), error = %e, "ignoring unreadable config")
                }
            }
        }
        Config::default()
    }

    fn save(&self, cfg: &Config) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(cfg).map_err(std::io::Error::other)?;
        fs::write(&self.path, data)
    }
}
