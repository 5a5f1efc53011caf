//! Configuration for the watch manager.
//!
//! Layered with figment:
//! - Default values
//! - TOML configuration file (`.inwatch/settings.toml`)
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `INWATCH_` and use double
//! underscores to separate nested levels:
//! - `INWATCH_LISTENER__STOP_GRACE_MS=500` sets `listener.stop_grace_ms`
//! - `INWATCH_NOTIFY__SHOW_HIDDEN=true` sets `notify.show_hidden`
//! - `INWATCH_REGISTRY_PATH=/var/lib/inwatch.json` sets `registry_path`

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::notify::MessageTemplate;

/// Name of the per-project configuration directory.
pub const CONFIG_DIR: &str = ".inwatch";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Where the watch list snapshot is stored
    #[serde(default = "default_registry_path")]
    pub registry_path: PathBuf,

    /// Listener loop tuning
    #[serde(default)]
    pub listener: ListenerConfig,

    /// Notification rendering
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Log levels
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ListenerConfig {
    /// How long `stop` waits for the listener task before abandoning it
    #[serde(default = "default_stop_grace_ms")]
    pub stop_grace_ms: u64,

    /// Read buffer size; raised to fit at least one full record
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,

    /// Notifications queued for delivery before slow subscribers lag
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct NotifyConfig {
    /// Template with %TYPE%, %EVENT%, %PATH% and %FILE% placeholders
    #[serde(default)]
    pub event_format: MessageTemplate,

    /// Deliver events for dotfiles and dot-directories
    #[serde(default)]
    pub show_hidden: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Default level for all modules
    #[serde(default = "default_log_level")]
    pub default: String,

    /// Per-module overrides, e.g. `inwatch::listener = "debug"`
    #[serde(default)]
    pub modules: HashMap<String, String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_registry_path() -> PathBuf {
    PathBuf::from(CONFIG_DIR).join("watches.json")
}
fn default_stop_grace_ms() -> u64 {
    2000
}
fn default_buffer_size() -> usize {
    4096
}
fn default_channel_capacity() -> usize {
    256
}
fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            registry_path: default_registry_path(),
            listener: ListenerConfig::default(),
            notify: NotifyConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            stop_grace_ms: default_stop_grace_ms(),
            buffer_size: default_buffer_size(),
            channel_capacity: default_channel_capacity(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            event_format: MessageTemplate::default(),
            show_hidden: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default: default_log_level(),
            modules: HashMap::new(),
        }
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR).join("settings.toml"));
        Self::load_from(config_path)
    }

    /// Load configuration from a specific file plus environment overrides
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            // Double underscore separates nested levels; single underscores
            // stay inside field names
            .merge(Env::prefixed("INWATCH_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
            .extract()
            .map_err(Box::new)
    }

    /// Find `.inwatch/settings.toml` from the current directory upwards
    fn find_workspace_config() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .map(|ancestor| ancestor.join(CONFIG_DIR))
            .find(|dir| dir.is_dir())
            .map(|dir| dir.join("settings.toml"))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }

    /// Create a default settings file in the current directory
    pub fn init_config_file(force: bool) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config_path = PathBuf::from(CONFIG_DIR).join("settings.toml");

        if !force && config_path.exists() {
            return Err("Configuration file already exists. Use --force to overwrite".into());
        }

        Settings::default().save(&config_path)?;
        Ok(config_path)
    }
}
