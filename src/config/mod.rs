//! Configuration module for s3util
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and validation. A [`Config`] value is passed
//! explicitly to every client; there is no process-wide default.

use crate::upload::{
    DEFAULT_COMPLETE_ATTEMPTS, DEFAULT_CONCURRENCY, DEFAULT_PART_ATTEMPTS,
    DEFAULT_PART_SIZE_GROWTH, MAX_PARTS, MAX_PART_SIZE, MIN_PART_SIZE,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

/// Root domain of Amazon S3, used to derive bucket names from virtual hosts.
pub const DEFAULT_DOMAIN: &str = "s3.amazonaws.com";

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
///
/// # Examples
///
/// ```ignore
/// std::env::set_var("MY_VAR", "value");
/// let result = expand_env_vars("prefix-${MY_VAR}-suffix");
/// assert_eq!(result, "prefix-value-suffix");
///
/// let result = expand_env_vars("${MISSING:-default}");
/// assert_eq!(result, "default");
/// ```
pub(crate) fn expand_env_vars(s: &str) -> String {
    // The pattern is a literal; compilation cannot fail.
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}").unwrap();
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name.as_str()) {
            Ok(val) => val,
            Err(_) => match cap.get(2) {
                Some(default) => default.as_str().to_string(),
                // No env var and no default. Keep the original placeholder.
                None => full_match.as_str().to_string(),
            },
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub service: ServiceConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Parse configuration from an in-memory YAML document
    pub fn from_yaml_str(content: &str) -> Result<Self, ConfigError> {
        ConfigLoader::parse(content)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service.domain.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "Service domain cannot be empty".into(),
            ));
        }

        self.upload.validate()?;

        match self.logging.level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            other => {
                return Err(ConfigError::ValidationError(format!(
                    "Invalid log level '{}': must be 'trace', 'debug', 'info', 'warn' or 'error'",
                    other
                )))
            }
        }

        Ok(())
    }
}

/// S3-compatible service configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Root domain of the service. A host equal to it addresses no bucket,
    /// `<bucket>.<domain>` addresses `<bucket>`, any other host is a CNAME
    /// naming the bucket itself.
    #[serde(default = "default_domain")]
    pub domain: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
        }
    }
}

fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

/// Access credentials configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Session token for temporary credentials
    #[serde(default)]
    pub security_token: Option<String>,
}

/// Multipart upload tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Number of parts uploaded concurrently
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Attempts per part before the upload is aborted
    #[serde(default = "default_part_attempts")]
    pub part_attempts: u32,
    /// Attempts for the final completion request
    #[serde(default = "default_complete_attempts")]
    pub complete_attempts: u32,
    /// Size of the first part, and the smallest non-final part
    #[serde(default = "default_min_part_size")]
    pub min_part_size: u64,
    /// Upper bound for the part size schedule
    #[serde(default = "default_max_part_size")]
    pub max_part_size: u64,
    /// Factor applied to the part size after every part
    #[serde(default = "default_part_size_growth")]
    pub part_size_growth: f64,
    /// Maximum number of parts in one upload
    #[serde(default = "default_max_parts")]
    pub max_parts: u32,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
            part_attempts: default_part_attempts(),
            complete_attempts: default_complete_attempts(),
            min_part_size: default_min_part_size(),
            max_part_size: default_max_part_size(),
            part_size_growth: default_part_size_growth(),
            max_parts: default_max_parts(),
        }
    }
}

impl UploadConfig {
    /// Validate upload tuning values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::ValidationError(
                "Upload concurrency must be at least 1".into(),
            ));
        }
        if self.part_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "part_attempts must be at least 1".into(),
            ));
        }
        if self.complete_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "complete_attempts must be at least 1".into(),
            ));
        }
        if self.min_part_size == 0 || self.min_part_size > self.max_part_size {
            return Err(ConfigError::ValidationError(format!(
                "Invalid part size bounds: min {} max {}",
                self.min_part_size, self.max_part_size
            )));
        }
        if !self.part_size_growth.is_finite() || self.part_size_growth < 1.0 {
            return Err(ConfigError::ValidationError(format!(
                "Invalid part_size_growth {}: must be a finite value >= 1.0",
                self.part_size_growth
            )));
        }
        if self.max_parts == 0 {
            return Err(ConfigError::ValidationError(
                "max_parts must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}

fn default_part_attempts() -> u32 {
    DEFAULT_PART_ATTEMPTS
}

fn default_complete_attempts() -> u32 {
    DEFAULT_COMPLETE_ATTEMPTS
}

fn default_min_part_size() -> u64 {
    MIN_PART_SIZE
}

fn default_max_part_size() -> u64 {
    MAX_PART_SIZE
}

fn default_part_size_growth() -> f64 {
    DEFAULT_PART_SIZE_GROWTH
}

fn default_max_parts() -> u32 {
    MAX_PARTS
}

/// Settings for the default reqwest transport.
///
/// The upload pipeline itself imposes no timeouts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub connect_timeout_seconds: Option<u64>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter level, overridden by RUST_LOG. Default: "info"
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Emit JSON lines instead of human readable output
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}
