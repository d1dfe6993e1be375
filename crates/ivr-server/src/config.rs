//! Server configuration loading from file and environment variables.

use ivr_dialogue::{EngineConfig, SchedulerConfig};
use ivr_voice::LiveKitConfig;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Where the menu definition comes from.
    #[serde(default)]
    pub menu: MenuConfig,

    /// Resolution thresholds and turn timing.
    #[serde(default)]
    pub dialogue: DialogueConfig,

    /// LiveKit connection for phone callers. Voice is disabled when unset.
    #[serde(default)]
    pub livekit: LiveKitConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "ivr_dialogue=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Menu definition source.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MenuConfig {
    /// Path to a TOML menu definition. The bundled bank menu is used when unset.
    #[serde(default)]
    pub path: Option<String>,
}

/// Dialogue tunables, shared by every session.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DialogueConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub scheduler: SchedulerConfig,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `IVR_HOST` overrides `server.host`
/// - `IVR_PORT` overrides `server.port`
/// - `IVR_MENU_PATH` overrides `menu.path`
/// - `IVR_LOG_LEVEL` overrides `logging.level`
/// - `IVR_LOG_JSON` overrides `logging.json` (set to "true" to enable)
/// - `IVR_LIVEKIT_URL`, `IVR_LIVEKIT_API_KEY`, `IVR_LIVEKIT_API_SECRET`
///   override the matching `livekit` fields
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok());
    Ok(config)
}

/// Applies `IVR_*` overrides, reading variables through `var`.
///
/// Unparseable host and port values are ignored.
pub fn apply_env_overrides(config: &mut Config, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("IVR_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = var("IVR_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(menu_path) = var("IVR_MENU_PATH") {
        config.menu.path = Some(menu_path);
    }
    if let Some(level) = var("IVR_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = var("IVR_LOG_JSON") {
        config.logging.json = json == "true" || json == "1";
    }
    if let Some(url) = var("IVR_LIVEKIT_URL") {
        config.livekit.url = url;
    }
    if let Some(key) = var("IVR_LIVEKIT_API_KEY") {
        config.livekit.api_key = key;
    }
    if let Some(secret) = var("IVR_LIVEKIT_API_SECRET") {
        config.livekit.api_secret = secret;
    }
}
