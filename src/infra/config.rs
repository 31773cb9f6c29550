//! Configuration loading from TOML files
//!
//! Config file is selected via:
//! 1. --config <path> command line argument
//! 2. CONFIG_FILE environment variable
//! 3. Default: config/dev.toml

use crate::domain::{SimulationParams, SourceConfig};
use anyhow::Context;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Path of the tag feed on the engine
pub const STREAM_PATH: &str = "/ws/tags";

#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    pub base_url: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

fn default_request_timeout_ms() -> u64 {
    5000
}

#[derive(Debug, Clone, Deserialize)]
pub struct StreamConfig {
    /// Full WebSocket URL; derived from the engine base URL when absent
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    /// Open the subscription at startup when the stream source is selected
    #[serde(default = "default_auto_enable")]
    pub auto_enable: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            connect_timeout_ms: default_connect_timeout_ms(),
            auto_enable: default_auto_enable(),
        }
    }
}

fn default_connect_timeout_ms() -> u64 {
    5000
}

fn default_auto_enable() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_tag_count")]
    pub tag_count: u32,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: f64,
    #[serde(default = "default_use_stream_source")]
    pub use_stream_source: bool,
    #[serde(default)]
    pub use_webhook: bool,
    #[serde(default)]
    pub webhook_url: Option<String>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            tag_count: default_tag_count(),
            interval_secs: default_interval_secs(),
            use_stream_source: default_use_stream_source(),
            use_webhook: false,
            webhook_url: None,
        }
    }
}

fn default_tag_count() -> u32 {
    5
}

fn default_interval_secs() -> f64 {
    1.0
}

fn default_use_stream_source() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_interval_secs")]
    pub interval_secs: u64,
    /// Status/metrics HTTP port (0 to disable)
    #[serde(default)]
    pub status_port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { interval_secs: default_metrics_interval_secs(), status_port: 0 }
    }
}

fn default_metrics_interval_secs() -> u64 {
    10
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log file used by the terminal dashboard
    #[serde(default = "default_log_file")]
    pub file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file: default_log_file() }
    }
}

fn default_log_file() -> String {
    "rfid-dashboard.log".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct TomlConfig {
    pub engine: EngineConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Main configuration struct used throughout the application
#[derive(Debug, Clone)]
pub struct Config {
    engine_base_url: String,
    request_timeout_ms: u64,
    stream_url: String,
    connect_timeout_ms: u64,
    stream_auto_enable: bool,
    source: SourceConfig,
    params: SimulationParams,
    metrics_interval_secs: u64,
    status_port: u16,
    log_file: String,
    config_file: String,
}

impl Default for Config {
    fn default() -> Self {
        let engine_base_url = "http://localhost:8000".to_string();
        Self {
            stream_url: derive_stream_url(&engine_base_url),
            engine_base_url,
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            stream_auto_enable: true,
            source: SourceConfig::default(),
            params: SimulationParams::default(),
            metrics_interval_secs: default_metrics_interval_secs(),
            status_port: 0,
            log_file: default_log_file(),
            config_file: "default".to_string(),
        }
    }
}

/// Turn `http(s)://host:port[/prefix]` into `ws(s)://host:port[/prefix]/ws/tags`
pub fn derive_stream_url(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let ws_base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else {
        base.to_string()
    };
    format!("{}{}", ws_base, STREAM_PATH)
}

impl Config {
    /// Determine config file path from args or environment
    pub fn resolve_config_path(args: &[String]) -> String {
        for (i, arg) in args.iter().enumerate() {
            if arg == "--config" {
                if let Some(path) = args.get(i + 1) {
                    return path.clone();
                }
            }
            if let Some(path) = arg.strip_prefix("--config=") {
                return path.to_string();
            }
        }

        if let Ok(path) = env::var("CONFIG_FILE") {
            return path;
        }

        "config/dev.toml".to_string()
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        let toml_config: TomlConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        let stream_url = toml_config
            .stream
            .url
            .clone()
            .unwrap_or_else(|| derive_stream_url(&toml_config.engine.base_url));

        let webhook_url = toml_config.simulation.webhook_url.filter(|url| !url.trim().is_empty());

        Ok(Self {
            engine_base_url: toml_config.engine.base_url.trim_end_matches('/').to_string(),
            request_timeout_ms: toml_config.engine.request_timeout_ms,
            stream_url,
            connect_timeout_ms: toml_config.stream.connect_timeout_ms,
            stream_auto_enable: toml_config.stream.auto_enable,
            source: SourceConfig {
                use_stream_source: toml_config.simulation.use_stream_source,
                use_webhook: toml_config.simulation.use_webhook,
                webhook_url,
            },
            params: SimulationParams {
                tag_count: toml_config.simulation.tag_count,
                interval_seconds: toml_config.simulation.interval_secs,
            },
            metrics_interval_secs: toml_config.metrics.interval_secs,
            status_port: toml_config.metrics.status_port,
            log_file: toml_config.logging.file,
            config_file: path.display().to_string(),
        })
    }

    /// Load configuration - tries TOML file first, falls back to defaults
    pub fn load(args: &[String]) -> Self {
        Self::load_from_path(&Self::resolve_config_path(args))
    }

    pub fn load_from_path(path: &str) -> Self {
        match Self::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Warning: {:#}. Using defaults.", e);
                Self::default()
            }
        }
    }

    pub fn engine_base_url(&self) -> &str {
        &self.engine_base_url
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn stream_url(&self) -> &str {
        &self.stream_url
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn stream_auto_enable(&self) -> bool {
        self.stream_auto_enable
    }

    /// Initial pending source selection
    pub fn source(&self) -> &SourceConfig {
        &self.source
    }

    /// Initial pending simulation parameters
    pub fn params(&self) -> SimulationParams {
        self.params
    }

    pub fn metrics_interval_secs(&self) -> u64 {
        self.metrics_interval_secs
    }

    pub fn status_port(&self) -> u16 {
        self.status_port
    }

    pub fn log_file(&self) -> &str {
        &self.log_file
    }

    pub fn config_file(&self) -> &str {
        &self.config_file
    }

    /// Builder method for tests and tools pointing at a local engine
    pub fn with_engine_base_url(mut self, base_url: &str) -> Self {
        self.engine_base_url = base_url.trim_end_matches('/').to_string();
        self.stream_url = derive_stream_url(base_url);
        self
    }

    pub fn with_request_timeout_ms(mut self, ms: u64) -> Self {
        self.request_timeout_ms = ms;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.engine_base_url(), "http://localhost:8000");
        assert_eq!(config.stream_url(), "ws://localhost:8000/ws/tags");
        assert_eq!(config.request_timeout(), Duration::from_millis(5000));
        assert_eq!(config.params(), SimulationParams { tag_count: 5, interval_seconds: 1.0 });
        assert!(config.source().use_stream_source);
        assert!(!config.source().use_webhook);
        assert_eq!(config.status_port(), 0);
    }

    #[test]
    fn test_derive_stream_url() {
        assert_eq!(derive_stream_url("http://localhost:8000"), "ws://localhost:8000/ws/tags");
        assert_eq!(derive_stream_url("http://localhost:8000/"), "ws://localhost:8000/ws/tags");
        assert_eq!(derive_stream_url("https://rfid.example.com/sim"), "wss://rfid.example.com/sim/ws/tags");
    }

    #[test]
    fn test_resolve_config_path_default() {
        let args: Vec<String> = vec!["rfid-dashboard".to_string()];
        if env::var("CONFIG_FILE").is_err() {
            assert_eq!(Config::resolve_config_path(&args), "config/dev.toml");
        }
    }

    #[test]
    fn test_resolve_config_path_from_arg() {
        let args: Vec<String> =
            vec!["rfid-dashboard".to_string(), "--config".to_string(), "config/lab.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/lab.toml");
    }

    #[test]
    fn test_resolve_config_path_from_arg_equals() {
        let args: Vec<String> = vec!["rfid-dashboard".to_string(), "--config=config/lab.toml".to_string()];
        assert_eq!(Config::resolve_config_path(&args), "config/lab.toml");
    }

    #[test]
    fn test_with_engine_base_url() {
        let config = Config::default().with_engine_base_url("http://127.0.0.1:9911/");
        assert_eq!(config.engine_base_url(), "http://127.0.0.1:9911");
        assert_eq!(config.stream_url(), "ws://127.0.0.1:9911/ws/tags");
    }
}
