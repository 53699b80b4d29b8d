//! Configuration management

use anyhow::Result;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "reqstats.toml";

/// Longest default window accepted (about ten years)
pub const MAX_WINDOW_DAYS: u32 = 3660;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one `YYYY-MM-DD/requests.jsonl` partition per day
    #[serde(default = "default_log_root")]
    pub log_root: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            log_root: default_log_root(),
        }
    }
}

fn default_log_root() -> PathBuf {
    PathBuf::from("/var/log/http-requests")
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// `text` or `gcp` (structured Cloud Logging output)
    #[serde(default = "default_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: default_format(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaptureConfig {
    /// Form fields dropped from `post_data` (exact, case-insensitive match)
    #[serde(default = "default_redacted_fields")]
    pub redacted_fields: Vec<String>,
    /// Larger form bodies are passed through without being inspected
    #[serde(default = "default_max_form_bytes")]
    pub max_form_bytes: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            redacted_fields: default_redacted_fields(),
            max_form_bytes: default_max_form_bytes(),
        }
    }
}

fn default_redacted_fields() -> Vec<String> {
    crate::capture::DEFAULT_REDACTED_FIELDS
        .iter()
        .map(|field| field.to_string())
        .collect()
}

fn default_max_form_bytes() -> usize {
    64 * 1024
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzerConfig {
    /// Days before today where a range starts when no start date is given
    #[serde(default = "default_window_days")]
    pub default_window_days: u32,
    /// Read day partitions concurrently
    #[serde(default = "default_parallel")]
    pub parallel: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        Self {
            default_window_days: default_window_days(),
            parallel: default_parallel(),
        }
    }
}

fn default_window_days() -> u32 {
    crate::analyzer::DEFAULT_WINDOW_DAYS
}

fn default_parallel() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Directory served by `reqstats serve`
    #[serde(default = "default_static_dir")]
    pub static_dir: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            static_dir: default_static_dir(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    8080
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("public")
}

impl Config {
    /// Load from `path` (required) or `reqstats.toml` (optional), then
    /// `REQSTATS_*` environment variables, e.g. `REQSTATS_STORAGE__LOG_ROOT`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let builder = config::Config::builder()
            .add_source(file)
            .add_source(
                config::Environment::with_prefix("REQSTATS")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let settings = builder.build()?;
        let config: Config = settings.try_deserialize()?;

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.storage.log_root.as_os_str().is_empty() {
            anyhow::bail!("Log root cannot be empty");
        }

        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid logging level '{}'. Must be one of: {:?}",
                self.logging.level,
                valid_levels
            );
        }

        let valid_formats = ["text", "gcp"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!(
                "Invalid logging format '{}'. Must be one of: {:?}",
                self.logging.format,
                valid_formats
            );
        }

        if self.analyzer.default_window_days > MAX_WINDOW_DAYS {
            anyhow::bail!(
                "Invalid default_window_days {}: must be at most {}",
                self.analyzer.default_window_days,
                MAX_WINDOW_DAYS
            );
        }

        if self.server.http_port == 0 {
            anyhow::bail!("Invalid http_port: 0 is not allowed");
        }
        if self.server.host.is_empty() {
            anyhow::bail!("Server host cannot be empty");
        }

        if self.capture.redacted_fields.iter().any(|f| f.trim().is_empty()) {
            anyhow::bail!("Redacted field names cannot be empty");
        }

        Ok(())
    }

    /// Structured GCP logging requested via config or `LOG_FORMAT=gcp`
    pub fn gcp_logging(&self) -> bool {
        self.logging.format.eq_ignore_ascii_case("gcp")
            || std::env::var("LOG_FORMAT").is_ok_and(|f| f == "gcp")
    }
}
