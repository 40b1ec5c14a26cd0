//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`NOTICES_ROOT_FOLDER`)
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or unreadable TOML file never stops startup; it is logged and
//! the compiled defaults are used.

use crate::{Error, Result};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "NOTICES_ROOT_FOLDER";

/// Default database file name inside the root folder
pub const DEFAULT_DATABASE_FILE: &str = "notices.db";

/// Tunables for the verification and aggregation engines
///
/// Injected at engine construction; nothing reads these globally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Hours after the record time before "submitted but never verified" counts as failed
    pub grace_period_hours: i64,
    /// Delivery match window opens this many minutes before the record time
    pub delivery_window_before_minutes: i64,
    /// Delivery match window closes this many minutes after the record time
    pub delivery_window_after_minutes: i64,
    /// Half-width of the window used when resolving a patron name from phone notices
    pub patron_name_window_minutes: i64,
    /// Lookback used by troubleshooting queries when no range is given
    pub default_lookback_days: i64,
    /// Retention for daily summary rows (cleanup)
    pub summary_retention_days: i64,
    /// Upper bound on total retry time for a locked database write
    pub db_lock_max_wait_ms: u64,
    /// Verifier name -> delivery option codes it is registered for
    pub channels: BTreeMap<String, Vec<i64>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let mut channels = BTreeMap::new();
        channels.insert("phone".to_string(), vec![3, 8]);
        channels.insert("email".to_string(), vec![2]);
        channels.insert("mail".to_string(), vec![1]);

        Self {
            grace_period_hours: 24,
            delivery_window_before_minutes: 120,
            delivery_window_after_minutes: 24 * 60,
            patron_name_window_minutes: 60,
            default_lookback_days: 7,
            summary_retention_days: 365,
            db_lock_max_wait_ms: 5000,
            channels,
        }
    }
}

/// Ten years, the longest span any tunable may express
pub const MAX_SPAN_DAYS: i64 = 3650;
const MAX_SPAN_HOURS: i64 = MAX_SPAN_DAYS * 24;
const MAX_SPAN_MINUTES: i64 = MAX_SPAN_HOURS * 60;

impl EngineConfig {
    // Accessors clamp so an unvalidated config can never overflow chrono

    pub fn grace_period(&self) -> Duration {
        Duration::hours(self.grace_period_hours.clamp(0, MAX_SPAN_HOURS))
    }

    pub fn delivery_window_before(&self) -> Duration {
        Duration::minutes(self.delivery_window_before_minutes.clamp(0, MAX_SPAN_MINUTES))
    }

    pub fn delivery_window_after(&self) -> Duration {
        Duration::minutes(self.delivery_window_after_minutes.clamp(0, MAX_SPAN_MINUTES))
    }

    pub fn patron_name_window(&self) -> Duration {
        Duration::minutes(self.patron_name_window_minutes.clamp(0, MAX_SPAN_MINUTES))
    }

    pub fn default_lookback(&self) -> Duration {
        Duration::days(self.default_lookback_days.clamp(1, MAX_SPAN_DAYS))
    }

    /// Reject values that would make the engines meaningless
    pub fn validate(&self) -> Result<()> {
        check_bounds("grace_period_hours", self.grace_period_hours, 0, MAX_SPAN_HOURS)?;
        check_bounds(
            "delivery_window_before_minutes",
            self.delivery_window_before_minutes,
            0,
            MAX_SPAN_MINUTES,
        )?;
        check_bounds(
            "delivery_window_after_minutes",
            self.delivery_window_after_minutes,
            0,
            MAX_SPAN_MINUTES,
        )?;
        check_bounds(
            "patron_name_window_minutes",
            self.patron_name_window_minutes,
            0,
            MAX_SPAN_MINUTES,
        )?;
        check_bounds("default_lookback_days", self.default_lookback_days, 1, MAX_SPAN_DAYS)?;
        check_bounds("summary_retention_days", self.summary_retention_days, 0, MAX_SPAN_DAYS)?;

        let mut seen: BTreeMap<i64, &str> = BTreeMap::new();
        for (name, codes) in &self.channels {
            for code in codes {
                if let Some(previous) = seen.insert(*code, name) {
                    return Err(Error::Config(format!(
                        "delivery option {} registered to both '{}' and '{}'",
                        code, previous, name
                    )));
                }
            }
        }

        Ok(())
    }
}

fn check_bounds(field: &str, value: i64, min: i64, max: i64) -> Result<()> {
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(Error::Config(format!(
            "{} must be between {} and {}, got {}",
            field, min, max, value
        )))
    }
}

/// Logging section of the TOML file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default tracing directive (overridden by RUST_LOG)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Contents of `config.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    /// Database path; relative paths are resolved against the root folder
    pub database: Option<PathBuf>,
    pub logging: LoggingConfig,
    pub engine: EngineConfig,
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: TomlConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.engine.validate()?;
        Ok(config)
    }

    /// Load from a file path
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Load the platform config file, falling back to compiled defaults.
    ///
    /// Nothing is logged here; callers report the returned origin once
    /// logging is up.
    pub fn load_or_default() -> (Self, ConfigOrigin) {
        match config_file_path() {
            Some(path) => match Self::load(&path) {
                Ok(config) => (config, ConfigOrigin::File(path)),
                Err(e) => (Self::default(), ConfigOrigin::Unreadable(path, e.to_string())),
            },
            None => (Self::default(), ConfigOrigin::Defaults),
        }
    }
}

/// Where the active configuration came from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigOrigin {
    File(PathBuf),
    /// A config file exists but could not be used
    Unreadable(PathBuf, String),
    Defaults,
}

impl ConfigOrigin {
    pub fn log(&self) {
        match self {
            ConfigOrigin::File(path) => info!("Loaded configuration from {}", path.display()),
            ConfigOrigin::Unreadable(path, e) => {
                warn!("Failed to load {}: {} (using defaults)", path.display(), e)
            }
            ConfigOrigin::Defaults => warn!("No config file found, using compiled defaults"),
        }
    }
}

/// Platform-dependent defaults
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            log_level: "info".to_string(),
        }
    }
}

/// Resolves the root folder using the 4-tier priority order
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    toml: Option<TomlConfig>,
}

impl RootFolderResolver {
    pub fn new(cli_arg: Option<PathBuf>) -> Self {
        Self { cli_arg, toml: None }
    }

    /// Supply an already-loaded TOML config as tier 3
    pub fn with_toml(mut self, toml: TomlConfig) -> Self {
        self.toml = Some(toml);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        // Priority 1: Command-line argument
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        // Priority 2: Environment variable
        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        // Priority 3: TOML config file
        if let Some(root) = self.toml.as_ref().and_then(|t| t.root_folder.clone()) {
            return root;
        }

        // Priority 4: OS-dependent compiled default
        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        if !self.root_folder.exists() {
            std::fs::create_dir_all(&self.root_folder)?;
            info!("Created root folder: {}", self.root_folder.display());
        }
        Ok(())
    }

    /// Database path, honoring an override from TOML
    pub fn database_path(&self, configured: Option<&Path>) -> PathBuf {
        match configured {
            Some(path) if path.is_absolute() => path.to_path_buf(),
            Some(path) => self.root_folder.join(path),
            None => self.root_folder.join(DEFAULT_DATABASE_FILE),
        }
    }
}

/// First existing config file for the platform
fn config_file_path() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("notices").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/notices/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        dirs::data_local_dir()
            .map(|d| d.join("notices"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/notices"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("notices"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/notices"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("notices"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\notices"))
    } else {
        PathBuf::from("./notices_data")
    }
}
