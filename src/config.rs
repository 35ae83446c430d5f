//! Configuration loading with env-var overrides.
//!
//! Reads `config/default.toml` relative to the current working directory,
//! then applies `GUEST_IDENTITY_WORK_DIR` and `GUEST_IDENTITY_LOG_LEVEL`
//! env overrides. Every section is optional.

use std::{
    env, fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use tracing::level_filters::LevelFilter;

use crate::error::AppError;
use crate::logger;

pub const CONFIG_PATH: &str = "config/default.toml";

/// Identity persistence settings.
#[derive(Debug, Clone)]
pub struct IdentityConfig {
    /// Directory holding the store file (already expanded, no `~`).
    pub work_dir: PathBuf,
    /// Key-value store file name inside `work_dir`.
    pub store_file: String,
    /// Well-known key the identity record is stored under.
    pub key: String,
    /// Label prepended to the hex guest number, e.g. `"Guest "`.
    pub guest_prefix: String,
}

impl IdentityConfig {
    pub fn store_path(&self) -> PathBuf {
        self.work_dir.join(&self.store_file)
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LevelFilter,
    /// Optional log file; relative paths resolve against `work_dir`.
    pub file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Capacity of the write-back channel.
    pub update_buffer: usize,
    /// Whether the first-run profile form is available.
    pub profile_form: bool,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub identity: IdentityConfig,
    pub logging: LoggingConfig,
    pub app: AppConfig,
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    identity: RawIdentity,
    #[serde(default)]
    logging: RawLogging,
    #[serde(default)]
    app: RawApp,
}

#[derive(Deserialize)]
struct RawIdentity {
    #[serde(default = "default_work_dir")]
    work_dir: String,
    #[serde(default = "default_store_file")]
    store_file: String,
    #[serde(default = "default_key")]
    key: String,
    #[serde(default = "default_guest_prefix")]
    guest_prefix: String,
}

impl Default for RawIdentity {
    fn default() -> Self {
        Self {
            work_dir: default_work_dir(),
            store_file: default_store_file(),
            key: default_key(),
            guest_prefix: default_guest_prefix(),
        }
    }
}

#[derive(Deserialize)]
struct RawLogging {
    #[serde(default = "default_log_level")]
    level: String,
    #[serde(default)]
    file: Option<String>,
}

impl Default for RawLogging {
    fn default() -> Self {
        Self { level: default_log_level(), file: None }
    }
}

#[derive(Deserialize)]
struct RawApp {
    #[serde(default = "default_update_buffer")]
    update_buffer: usize,
    /// Set to `false` to run without the first-run form.
    #[serde(default = "default_true")]
    profile_form: bool,
}

impl Default for RawApp {
    fn default() -> Self {
        Self { update_buffer: default_update_buffer(), profile_form: true }
    }
}

fn default_work_dir() -> String { "~/.guest-identity".to_string() }
fn default_store_file() -> String { "identity.json".to_string() }
fn default_key() -> String { "user".to_string() }
fn default_guest_prefix() -> String { "Guest ".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_update_buffer() -> usize { 32 }
fn default_true() -> bool { true }

/// Load config from [`CONFIG_PATH`], then apply env-var overrides.
///
/// A missing file falls back to the built-in defaults (the `Default` impls
/// of the raw sections); a malformed one is an error.
pub fn load() -> Result<Config, AppError> {
    let work_dir_override = env::var("GUEST_IDENTITY_WORK_DIR").ok();
    let log_level_override = env::var("GUEST_IDENTITY_LOG_LEVEL").ok();
    let path = Path::new(CONFIG_PATH);
    if path.exists() {
        load_from(path, work_dir_override.as_deref(), log_level_override.as_deref())
    } else {
        resolve(
            RawConfig::default(),
            work_dir_override.as_deref(),
            log_level_override.as_deref(),
        )
    }
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: &Path,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let raw = fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;

    let parsed: RawConfig = toml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("parse error in {}: {e}", path.display())))?;

    resolve(parsed, work_dir_override, log_level_override)
}

fn resolve(
    parsed: RawConfig,
    work_dir_override: Option<&str>,
    log_level_override: Option<&str>,
) -> Result<Config, AppError> {
    let id = parsed.identity;

    if id.key.is_empty() {
        return Err(AppError::Config("identity.key must not be empty".into()));
    }
    if id.store_file.is_empty() {
        return Err(AppError::Config("identity.store_file must not be empty".into()));
    }
    if parsed.app.update_buffer == 0 {
        return Err(AppError::Config("app.update_buffer must be at least 1".into()));
    }

    let work_dir = expand_home(work_dir_override.unwrap_or(&id.work_dir));
    let level_str = log_level_override.unwrap_or(&parsed.logging.level);
    let level = logger::parse_level(level_str)
        .map_err(|e| AppError::Config(format!("logging.level: {e}")))?;
    let file = parsed.logging.file.map(|f| {
        let path = PathBuf::from(f);
        if path.is_absolute() { path } else { work_dir.join(path) }
    });

    Ok(Config {
        identity: IdentityConfig {
            work_dir,
            store_file: id.store_file,
            key: id.key,
            guest_prefix: id.guest_prefix,
        },
        logging: LoggingConfig { level, file },
        app: AppConfig {
            update_buffer: parsed.app.update_buffer,
            profile_form: parsed.app.profile_form,
        },
    })
}

/// Expand a leading `~` to the user's home directory.
/// Absolute or relative paths without `~` are returned unchanged.
pub fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
