//! Configuration for hostdeck.
//!
//! Settings come from `hostdeck.toml`, then environment variables, then CLI
//! flags, each layer overriding the previous one.
//!
//! # Configuration File Format
//!
//! ```toml
//! [backend]
//! host = "localhost"
//! port = 8000
//! secure = false
//! ws_path = "/ws/core/"
//!
//! [api]
//! base_url = "http://localhost:8000/api/"
//! token = "..."
//!
//! [channel]
//! connect_timeout_ms = 5000
//! reconnect_delay_ms = 3000
//! reconnect_max_delay_ms = 60000
//! backoff_multiplier = 2.0
//! display_window_ms = 5000
//!
//! [logging]
//! level = "info"
//! json = false
//! directory = "/var/log/hostdeck"
//! ```
//!
//! | Variable                | Overrides            |
//! |-------------------------|----------------------|
//! | `HOSTDECK_BACKEND_HOST` | `backend.host`       |
//! | `HOSTDECK_BACKEND_PORT` | `backend.port`       |
//! | `HOSTDECK_SECURE`       | `backend.secure`     |
//! | `HOSTDECK_API_BASE`     | `api.base_url`       |
//! | `HOSTDECK_TOKEN`        | `api.token`          |

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::channel::{BackendEndpoint, ChannelSettings, ReconnectPolicy};

pub const CONFIG_FILE: &str = "hostdeck.toml";

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Upper bound for every `[channel]` duration: one day.
const MAX_CHANNEL_MS: u64 = 24 * 60 * 60 * 1000;

/// Where the backend's host channels live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendSection {
    #[serde(default = "default_backend_host")]
    pub host: String,
    #[serde(default = "default_backend_port")]
    pub port: u16,
    /// Use `wss://` instead of `ws://`
    #[serde(default)]
    pub secure: bool,
    #[serde(default = "default_ws_path")]
    pub ws_path: String,
}

fn default_backend_host() -> String {
    "localhost".to_string()
}

fn default_backend_port() -> u16 {
    8000
}

fn default_ws_path() -> String {
    "/ws/core/".to_string()
}

impl Default for BackendSection {
    fn default() -> Self {
        Self {
            host: default_backend_host(),
            port: default_backend_port(),
            secure: false,
            ws_path: default_ws_path(),
        }
    }
}

/// REST API used for the host directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiSection {
    /// API root; derived from `[backend]` when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

/// Timing of every host channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelSection {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    /// 1.0 keeps the reconnect delay constant
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
    /// How long a finished operation's result stays on screen
    #[serde(default = "default_display_window_ms")]
    pub display_window_ms: u64,
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_reconnect_delay_ms() -> u64 {
    3_000
}

fn default_reconnect_max_delay_ms() -> u64 {
    60_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_display_window_ms() -> u64 {
    5_000
}

impl Default for ChannelSection {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
            display_window_ms: default_display_window_ms(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingSection {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub json: bool,
    /// Daily-rolling log files are written here when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
            directory: None,
        }
    }
}

/// Parsed `hostdeck.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HostdeckToml {
    #[serde(default)]
    pub backend: BackendSection,
    #[serde(default)]
    pub api: ApiSection,
    #[serde(default)]
    pub channel: ChannelSection,
    #[serde(default)]
    pub logging: LoggingSection,
}

impl HostdeckToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::parse(&content).with_context(|| format!("In {}", path.display()))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse hostdeck.toml")
    }

    /// Save configuration to a TOML file, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize hostdeck.toml")?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Apply `HOSTDECK_*` variables. `lookup` is `std::env::var` in production.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("HOSTDECK_BACKEND_HOST") {
            self.backend.host = host;
        }
        if let Some(port) = lookup("HOSTDECK_BACKEND_PORT") {
            self.backend.port = port
                .parse()
                .with_context(|| format!("Invalid HOSTDECK_BACKEND_PORT '{}'", port))?;
        }
        if let Some(secure) = lookup("HOSTDECK_SECURE") {
            self.backend.secure = parse_bool(&secure)
                .with_context(|| format!("Invalid HOSTDECK_SECURE '{}'", secure))?;
        }
        if let Some(base) = lookup("HOSTDECK_API_BASE") {
            self.api.base_url = Some(base);
        }
        if let Some(token) = lookup("HOSTDECK_TOKEN") {
            self.api.token = Some(token);
        }
        Ok(())
    }

    pub fn apply_cli(&mut self, cli: &CliOverrides) {
        if let Some(host) = &cli.backend_host {
            self.backend.host = host.clone();
        }
        if let Some(port) = cli.backend_port {
            self.backend.port = port;
        }
        if cli.secure {
            self.backend.secure = true;
        }
        if let Some(base) = &cli.api_base {
            self.api.base_url = Some(base.clone());
        }
        if let Some(level) = &cli.log_level {
            self.logging.level = level.clone();
        }
        if cli.log_json {
            self.logging.json = true;
        }
    }

    pub fn endpoint(&self) -> BackendEndpoint {
        BackendEndpoint {
            host: self.backend.host.clone(),
            port: self.backend.port,
            secure: self.backend.secure,
            ws_path: self.backend.ws_path.clone(),
        }
    }

    pub fn channel_settings(&self) -> ChannelSettings {
        let c = &self.channel;
        ChannelSettings {
            policy: ReconnectPolicy {
                connect_timeout: Duration::from_millis(c.connect_timeout_ms),
                base_delay: Duration::from_millis(c.reconnect_delay_ms),
                max_delay: Duration::from_millis(c.reconnect_max_delay_ms),
                multiplier: c
                    .backoff_multiplier
                    .clamp(1.0, ReconnectPolicy::MAX_MULTIPLIER),
            },
            display_window: Duration::from_millis(c.display_window_ms),
        }
    }

    /// API root: `[api].base_url`, else `http(s)://{backend}:{port}/api/`.
    pub fn api_base(&self) -> String {
        self.api.base_url.clone().unwrap_or_else(|| {
            let scheme = if self.backend.secure { "https" } else { "http" };
            format!("{}://{}:{}/api/", scheme, self.backend.host, self.backend.port)
        })
    }

    /// Validate the configuration and return any warnings.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if self.backend.host.trim().is_empty() {
            warnings.push("backend.host is empty".to_string());
        }
        if self.backend.port == 0 {
            warnings.push("backend.port must not be 0".to_string());
        }
        if !self.backend.ws_path.starts_with('/') {
            warnings.push(format!(
                "backend.ws_path '{}' should start with '/'",
                self.backend.ws_path
            ));
        }
        if let Err(e) = self.endpoint().target_for(&hostdeck_common::HostId::from(1)) {
            warnings.push(format!("backend does not form a valid URL: {}", e));
        }
        if let Err(e) = reqwest::Url::parse(&self.api_base()) {
            warnings.push(format!("Invalid api.base_url '{}': {}", self.api_base(), e));
        }

        warnings.extend(self.channel_errors());
        let c = &self.channel;
        if c.reconnect_max_delay_ms < c.reconnect_delay_ms {
            warnings.push(format!(
                "channel.reconnect_max_delay_ms ({}) is below reconnect_delay_ms ({})",
                c.reconnect_max_delay_ms, c.reconnect_delay_ms
            ));
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            warnings.push(format!(
                "Invalid logging.level '{}'. Valid values: {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            ));
        }

        warnings
    }

    /// `[channel]` values no host channel can run with. Loading fails on these.
    pub fn channel_errors(&self) -> Vec<String> {
        let c = &self.channel;
        let mut errors = Vec::new();
        for (name, value) in [
            ("connect_timeout_ms", c.connect_timeout_ms),
            ("reconnect_delay_ms", c.reconnect_delay_ms),
        ] {
            if value == 0 {
                errors.push(format!("channel.{name} must be greater than 0"));
            }
        }
        for (name, value) in [
            ("connect_timeout_ms", c.connect_timeout_ms),
            ("reconnect_delay_ms", c.reconnect_delay_ms),
            ("reconnect_max_delay_ms", c.reconnect_max_delay_ms),
            ("display_window_ms", c.display_window_ms),
        ] {
            if value > MAX_CHANNEL_MS {
                errors.push(format!(
                    "channel.{name} ({value}) must not exceed {MAX_CHANNEL_MS}"
                ));
            }
        }
        let m = c.backoff_multiplier;
        if !m.is_finite() || !(1.0..=ReconnectPolicy::MAX_MULTIPLIER).contains(&m) {
            errors.push(format!(
                "channel.backoff_multiplier {} must be between 1.0 and {}",
                m,
                ReconnectPolicy::MAX_MULTIPLIER
            ));
        }
        errors
    }
}

fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => bail!("expected true/false"),
    }
}

/// Flags that override file and environment settings.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub backend_host: Option<String>,
    pub backend_port: Option<u16>,
    pub secure: bool,
    pub api_base: Option<String>,
    pub log_level: Option<String>,
    pub log_json: bool,
}

/// Find the config file: explicit path, then `./hostdeck.toml`, then the
/// user config directory.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    let local = PathBuf::from(CONFIG_FILE);
    if local.exists() {
        return Some(local);
    }
    dirs::config_dir()
        .map(|dir| dir.join("hostdeck").join(CONFIG_FILE))
        .filter(|path| path.exists())
}

/// Fully layered configuration.
#[derive(Debug, Clone)]
pub struct HostdeckConfig {
    pub toml: HostdeckToml,
    /// File the settings were read from, if any
    pub source: Option<PathBuf>,
}

impl HostdeckConfig {
    /// Load file → environment → CLI. An explicit path must exist.
    pub fn load(explicit: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        Self::load_with_env(explicit, cli, |key| std::env::var(key).ok())
    }

    pub fn load_with_env(
        explicit: Option<&Path>,
        cli: &CliOverrides,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let source = resolve_config_path(explicit);
        let mut toml = match &source {
            Some(path) => HostdeckToml::load(path)?,
            None => HostdeckToml::default(),
        };
        toml.apply_env(lookup)?;
        toml.apply_cli(cli);

        let errors = toml.channel_errors();
        if !errors.is_empty() {
            bail!("Invalid [channel] settings: {}", errors.join("; "));
        }
        Ok(Self { toml, source })
    }
}
