//! Configuration management for Auriga
//!
//! This module handles loading, validation, and management of the client
//! configuration from YAML files.

use crate::error::{AurigaError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

fn default_true() -> bool {
    true
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// OAuth2 / provider endpoint configuration
    pub auth: AuthConfig,

    /// Token cache location
    pub cache: CacheConfig,

    /// Transport retry policy
    pub retry: RetryConfig,

    /// Wake-up poll loop defaults
    pub wake: WakeConfig,

    /// Streaming push channel configuration
    pub streaming: StreamingConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

/// OAuth2 and provider endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// OAuth2 client identifier
    pub client_id: String,

    /// OAuth2 scopes requested during authorization
    pub scope: String,

    /// Redirect URI registered for the client
    pub redirect_uri: String,

    /// Authorization server base URL; empty means detect from the identity
    pub auth_base_url: String,

    /// Owner API base URL
    pub api_base_url: String,

    /// Per-request timeout in seconds
    pub http_timeout_seconds: u64,

    /// Treat tokens expiring within this margin as already expired
    pub expiry_margin_seconds: u64,
}

/// Token cache location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Path to the JSON token cache file
    pub file: String,
}

/// Transport-level retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Max retry attempts after the initial request
    pub max_retries: u32,

    /// Base delay between retries in seconds
    pub retry_delay_seconds: f64,

    /// Multiplier applied to the delay after each attempt
    pub backoff_factor: f64,

    /// HTTP status codes that are retried
    pub retryable_status_codes: Vec<u16>,
}

/// Wake-up poll loop defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WakeConfig {
    /// Overall timeout in seconds
    pub timeout_seconds: u64,

    /// Initial poll interval in seconds
    pub poll_interval_seconds: f64,

    /// Multiplier applied to the interval after each poll
    pub backoff_factor: f64,
}

/// Streaming push channel configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamingConfig {
    /// WebSocket endpoint of the streaming service
    pub url: String,

    /// Telemetry fields to subscribe to
    pub fields: Vec<String>,

    /// Close the channel after this many seconds of silence
    pub idle_timeout_seconds: u64,

    /// Resubscribe instead of closing when the channel goes idle
    pub restart_on_idle: bool,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to log file or directory
    pub file: String,

    /// Optional console-specific level override
    pub console_level: Option<String>,

    /// Optional file-specific level override
    pub file_level: Option<String>,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    #[serde(default = "default_true")]
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: "ownerapi".to_string(),
            scope: "openid email offline_access".to_string(),
            redirect_uri: "https://auth.tesla.com/void/callback".to_string(),
            auth_base_url: String::new(),
            api_base_url: "https://owner-api.teslamotors.com".to_string(),
            http_timeout_seconds: 30,
            expiry_margin_seconds: 60,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            file: "cache.json".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            retry_delay_seconds: 1.0,
            backoff_factor: 2.0,
            retryable_status_codes: vec![408, 500, 502, 503, 504],
        }
    }
}

impl Default for WakeConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 60,
            poll_interval_seconds: 2.0,
            backoff_factor: 1.15,
        }
    }
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            url: "wss://streaming.tesla.com/streaming/".to_string(),
            fields: [
                "speed",
                "odometer",
                "soc",
                "elevation",
                "est_heading",
                "est_lat",
                "est_lng",
                "power",
                "shift_state",
                "range",
                "est_range",
                "heading",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            idle_timeout_seconds: 10,
            restart_on_idle: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            file: "/tmp/auriga.log".to_string(),
            console_level: None,
            file_level: None,
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from default locations, falling back to defaults
    pub fn load() -> Result<Self> {
        let default_paths = [
            "auriga_config.yaml",
            "/etc/auriga/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.auth.client_id.is_empty() {
            return Err(AurigaError::validation(
                "auth.client_id",
                "Client ID cannot be empty",
            ));
        }

        if self.auth.api_base_url.is_empty() {
            return Err(AurigaError::validation(
                "auth.api_base_url",
                "API base URL cannot be empty",
            ));
        }

        if self.cache.file.is_empty() {
            return Err(AurigaError::validation(
                "cache.file",
                "Cache file path cannot be empty",
            ));
        }

        if self.wake.timeout_seconds == 0 {
            return Err(AurigaError::validation(
                "wake.timeout_seconds",
                "Must be greater than 0",
            ));
        }

        if self.wake.poll_interval_seconds <= 0.0 {
            return Err(AurigaError::validation(
                "wake.poll_interval_seconds",
                "Must be positive",
            ));
        }

        if self.retry.backoff_factor < 1.0 {
            return Err(AurigaError::validation(
                "retry.backoff_factor",
                "Must be at least 1.0",
            ));
        }

        if self.streaming.idle_timeout_seconds == 0 {
            return Err(AurigaError::validation(
                "streaming.idle_timeout_seconds",
                "Must be greater than 0",
            ));
        }

        Ok(())
    }
}
