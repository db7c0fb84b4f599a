// Configuration loading and parsing (config/client.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Shipped defaults, written out when neither `config/` nor `defaults/` exist.
const BUNDLED_DEFAULTS: &str = include_str!("../defaults/client.toml");

const CONFIG_FILE: &str = "client.toml";

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// client.toml structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub authority: AuthorityConfig,
    pub sync: SyncConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub transition: TransitionConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    pub ws_url: String,
    pub poll_interval_secs: u64,
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StorageConfig {
    /// Empty means the platform data directory.
    #[serde(default)]
    pub db_path: String,
}

impl StorageConfig {
    /// Resolve the credential database path, falling back to
    /// `<data dir>/credentials.db`. `None` if no home directory is known.
    pub fn resolved_db_path(&self) -> Option<PathBuf> {
        if !self.db_path.is_empty() {
            return Some(PathBuf::from(&self.db_path));
        }
        directories::ProjectDirs::from("", "", "veto")
            .map(|dirs| dirs.data_dir().join("credentials.db"))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TransitionConfig {
    pub dwell_ms: u64,
    pub fade_ms: u64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self {
            dwell_ms: 2500,
            fade_ms: 600,
        }
    }
}

impl TransitionConfig {
    pub fn dwell(&self) -> Duration {
        Duration::from_millis(self.dwell_ms)
    }

    pub fn fade(&self) -> Duration {
        Duration::from_millis(self.fade_ms)
    }
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Load and validate `config/client.toml` relative to `base_dir`.
///
/// Does not copy defaults; `load_config()` does that first.
pub fn load_config_from(base_dir: &Path) -> Result<Config, ConfigError> {
    let path = base_dir.join("config").join(CONFIG_FILE);
    let text = read_file(&path)?;
    let config: Config = toml::from_str(&text).map_err(|e| ConfigError::ParseError {
        path: path.clone(),
        source: e,
    })?;
    validate(&config)?;
    Ok(config)
}

/// Make sure `config/client.toml` exists, copying it from `defaults/` or
/// writing the bundled defaults. Returns the files that were created.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let config_dir = base_dir.join("config");
    let target = config_dir.join(CONFIG_FILE);
    if target.exists() {
        return Ok(vec![]);
    }

    std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
        message: format!("failed to create config directory: {e}"),
    })?;

    let source = base_dir.join("defaults").join(CONFIG_FILE);
    let content = if source.is_file() {
        std::fs::read_to_string(&source).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to read {}: {e}", source.display()),
        })?
    } else {
        BUNDLED_DEFAULTS.to_string()
    };

    match std::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&target)
    {
        Ok(mut dest) => {
            std::io::Write::write_all(&mut dest, content.as_bytes()).map_err(|e| {
                ConfigError::DefaultsCopyError {
                    message: format!("failed to write {}: {e}", target.display()),
                }
            })?;
            Ok(vec![target])
        }
        // Lost a race with another process; theirs wins.
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(vec![]),
        Err(e) => Err(ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", target.display()),
        }),
    }
}

/// Convenience wrapper: loads config relative to the current working directory.
/// Ensures the config file exists before loading.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd)
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

fn invalid(field: &str, message: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError {
        field: field.into(),
        message: message.into(),
    }
}

fn check_url(field: &str, url: &str, schemes: &[&str]) -> Result<(), ConfigError> {
    if url.trim().is_empty() {
        return Err(invalid(field, "must not be empty"));
    }
    if !schemes.iter().any(|s| url.starts_with(&format!("{s}://"))) {
        return Err(invalid(
            field,
            format!("must start with {}, got {url}", schemes.join(":// or ") + "://"),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    check_url("authority.base_url", &config.authority.base_url, &["http", "https"])?;
    check_url("sync.ws_url", &config.sync.ws_url, &["ws", "wss"])?;

    if config.sync.poll_interval_secs == 0 {
        return Err(invalid("sync.poll_interval_secs", "must be greater than 0"));
    }
    if config.transition.dwell_ms == 0 {
        return Err(invalid("transition.dwell_ms", "must be greater than 0"));
    }
    if config.transition.fade_ms == 0 {
        return Err(invalid("transition.fade_ms", "must be greater than 0"));
    }
    Ok(())
}
