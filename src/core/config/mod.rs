//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Global config file
//! 3. Repo config file
//! 4. CLI flags (not handled here)
//!
//! # Global Config Locations
//!
//! Searched in order:
//! 1. `$GITKV_CONFIG` if set
//! 2. `$XDG_CONFIG_HOME/gitkv/config.toml`
//! 3. `~/.gitkv/config.toml`
//!
//! # Repo Config Location
//!
//! `<git_dir>/gitkv/config.toml`
//!
//! # Example
//!
//! ```no_run
//! use gitkv::core::config::Config;
//! use std::path::Path;
//!
//! let config = Config::load(Some(Path::new("/srv/data.git"))).unwrap();
//! println!("cache capacity: {}", config.cache_capacity());
//! ```

pub mod schema;

pub use schema::{CheckSection, ConfigFile, StoreSection};

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::paths::StorePaths;

/// Default per-ref cache size.
pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

/// Default synthetic committer name.
pub const DEFAULT_COMMITTER_NAME: &str = "gitkv";

/// Default synthetic committer email.
pub const DEFAULT_COMMITTER_EMAIL: &str = "gitkv@localhost";

/// Default branch name.
pub const DEFAULT_BRANCH: &str = "main";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("failed to write config file '{path}': {source}")]
    WriteError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Merged configuration from all sources.
///
/// Accessors apply precedence and defaults.
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub global: ConfigFile,
    pub repo: Option<ConfigFile>,
}

impl Config {
    /// Load configuration from default locations.
    ///
    /// If `git_dir` is provided, also loads the repository file.
    ///
    /// # Errors
    ///
    /// Returns an error if config files exist but cannot be parsed.
    /// Missing config files are not an error (defaults are used).
    pub fn load(git_dir: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_from(Self::find_global().as_deref(), git_dir)
    }

    /// Load from an explicit global file instead of searching for one.
    pub fn load_from(global_path: Option<&Path>, git_dir: Option<&Path>) -> Result<Self, ConfigError> {
        let global = match global_path {
            Some(path) if path.exists() => Self::read_file(path)?,
            _ => ConfigFile::default(),
        };

        let repo = match git_dir {
            Some(dir) => {
                let path = StorePaths::new(dir).repo_config_path();
                if path.exists() {
                    Some(Self::read_file(&path)?)
                } else {
                    None
                }
            }
            None => None,
        };

        global.validate()?;
        if let Some(ref r) = repo {
            r.validate()?;
        }

        Ok(Self { global, repo })
    }

    fn find_global() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("GITKV_CONFIG") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        if let Ok(xdg_home) = std::env::var("XDG_CONFIG_HOME") {
            let path = PathBuf::from(xdg_home).join("gitkv/config.toml");
            if path.exists() {
                return Some(path);
            }
        }

        dirs::home_dir()
            .map(|home| home.join(".gitkv/config.toml"))
            .filter(|path| path.exists())
    }

    fn read_file(path: &Path) -> Result<ConfigFile, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Write the repository config atomically.
    ///
    /// Creates parent directories if needed (write to temp file, then rename).
    pub fn write_repo(git_dir: &Path, config: &ConfigFile) -> Result<PathBuf, ConfigError> {
        config.validate()?;
        let path = StorePaths::new(git_dir).repo_config_path();

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| ConfigError::WriteError {
                path: path.clone(),
                source: e,
            })?;
        }

        let contents =
            toml::to_string_pretty(config).map_err(|e| ConfigError::InvalidValue(e.to_string()))?;

        let temp_path = path.with_extension("toml.tmp");
        let mut file = fs::File::create(&temp_path).map_err(|e| ConfigError::WriteError {
            path: temp_path.clone(),
            source: e,
        })?;
        file.write_all(contents.as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| ConfigError::WriteError {
                path: temp_path.clone(),
                source: e,
            })?;

        fs::rename(&temp_path, &path).map_err(|e| ConfigError::WriteError {
            path: path.clone(),
            source: e,
        })?;

        Ok(path)
    }

    // =========================================================================
    // Accessor methods with precedence
    // =========================================================================

    fn store_value<T>(&self, pick: impl Fn(&StoreSection) -> Option<T>) -> Option<T> {
        let from = |file: &ConfigFile| file.store.as_ref().and_then(&pick);
        self.repo.as_ref().and_then(from).or_else(|| from(&self.global))
    }

    /// Per-ref cache size.
    pub fn cache_capacity(&self) -> usize {
        self.store_value(|s| s.cache_capacity)
            .unwrap_or(DEFAULT_CACHE_CAPACITY)
    }

    /// Synthetic committer name prefix.
    pub fn committer_name(&self) -> String {
        self.store_value(|s| s.committer_name.clone())
            .unwrap_or_else(|| DEFAULT_COMMITTER_NAME.to_string())
    }

    /// Synthetic committer email.
    pub fn committer_email(&self) -> String {
        self.store_value(|s| s.committer_email.clone())
            .unwrap_or_else(|| DEFAULT_COMMITTER_EMAIL.to_string())
    }

    /// Branch used when no ref is given.
    pub fn default_branch(&self) -> String {
        self.store_value(|s| s.default_branch.clone())
            .unwrap_or_else(|| DEFAULT_BRANCH.to_string())
    }

    /// The designated test ref, if configured.
    pub fn test_ref(&self) -> Option<String> {
        let from = |file: &ConfigFile| file.check.as_ref().and_then(|c| c.test_ref.clone());
        self.repo.as_ref().and_then(from).or_else(|| from(&self.global))
    }
}
