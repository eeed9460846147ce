//! Configuration module for Multipart Uploadr
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion, a plain-environment fallback, and
//! validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
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
    expand_with(s, |name| std::env::var(name).ok())
}

fn expand_with(s: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    lazy_static::lazy_static! {
        static ref ENV_VAR: regex_lite::Regex =
            regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]*))?\}").unwrap();
    }

    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in ENV_VAR.captures_iter(s) {
        let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
            continue;
        };

        result.push_str(&s[last_match..full_match.start()]);

        let value = match lookup(var_name.as_str()) {
            Some(val) => val,
            None => match cap.get(2) {
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

/// Longest presigned URL lifetime S3 accepts (7 days)
const MAX_URL_EXPIRY_SECONDS: u64 = 604_800;

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
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    pub s3: S3Config,
    #[serde(default)]
    pub upload: UploadConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Build configuration from process environment variables.
    ///
    /// Reads `AWS_BUCKET`, `AWS_REGION`, `AWS_KEY`, `AWS_SECRET` and the
    /// optional `AWS_ENDPOINT` and `LISTEN_ADDRESS`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ConfigError::ValidationError(format!("{} is not set", name)))
        };

        let mut server = ServerConfig::default();
        if let Some(address) = lookup("LISTEN_ADDRESS") {
            server.address = address;
        }

        let endpoint = lookup("AWS_ENDPOINT").filter(|v| !v.is_empty());
        let config = Self {
            server,
            s3: S3Config {
                bucket: required("AWS_BUCKET")?,
                region: required("AWS_REGION")?,
                force_path_style: endpoint.is_some(),
                endpoint,
                access_key: lookup("AWS_KEY"),
                secret_key: lookup("AWS_SECRET"),
            },
            upload: UploadConfig::default(),
            metrics: MetricsConfig::default(),
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.s3.bucket.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "s3.bucket must not be empty".into(),
            ));
        }

        if self.s3.region.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "s3.region must not be empty".into(),
            ));
        }

        if let Some(ref endpoint) = self.s3.endpoint {
            if !is_valid_http_url(endpoint) {
                return Err(ConfigError::ValidationError(
                    "Invalid s3.endpoint: must start with http:// or https://".into(),
                ));
            }
        }

        let prefix = &self.server.path_prefix;
        if !prefix.is_empty() && (!prefix.starts_with('/') || prefix.ends_with('/')) {
            return Err(ConfigError::ValidationError(format!(
                "Invalid server.path_prefix '{}': must start with '/' and not end with '/'",
                prefix
            )));
        }

        let expiry = self.upload.url_expiry_seconds;
        if expiry == 0 || expiry > MAX_URL_EXPIRY_SECONDS {
            return Err(ConfigError::ValidationError(format!(
                "Invalid upload.url_expiry_seconds {}: must be between 1 and {}",
                expiry, MAX_URL_EXPIRY_SECONDS
            )));
        }

        if self.upload.max_list_pages == 0 || self.upload.max_listed_parts == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_list_pages and upload.max_listed_parts must be positive".into(),
            ));
        }

        Ok(())
    }
}

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_address")]
    pub address: String,
    /// Prefix in front of every route, e.g. `/api` for `/api/s3/sign`
    #[serde(default = "default_path_prefix")]
    pub path_prefix: String,
    #[serde(default)]
    pub cors: CorsConfig,
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: default_address(),
            path_prefix: default_path_prefix(),
            cors: CorsConfig::default(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

fn default_address() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_path_prefix() -> String {
    "/api".to_string()
}

fn default_max_body_bytes() -> usize {
    1048576 // 1MB
}

/// Cross-origin configuration for browser uploaders
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    #[serde(default = "default_allowed_origins")]
    pub allowed_origins: Vec<String>,
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            allowed_origins: default_allowed_origins(),
        }
    }
}

impl CorsConfig {
    /// Whether any origin may call the service
    pub fn allows_any(&self) -> bool {
        self.allowed_origins.iter().any(|o| o == "*")
    }

    /// Whether `origin` may call the service
    pub fn allows(&self, origin: &str) -> bool {
        self.allows_any() || self.allowed_origins.iter().any(|o| o == origin)
    }
}

fn default_allowed_origins() -> Vec<String> {
    vec!["*".to_string()]
}

/// S3 backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub bucket: String,
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key: Option<String>,
    #[serde(default)]
    pub secret_key: Option<String>,
    /// Address the bucket in the path instead of the host (MinIO, RustFS)
    #[serde(default)]
    pub force_path_style: bool,
}

/// Upload brokering configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Lifetime of presigned URLs
    #[serde(default = "default_url_expiry_seconds")]
    pub url_expiry_seconds: u64,
    /// Ceiling on ListParts pages fetched for one listing
    #[serde(default = "default_max_list_pages")]
    pub max_list_pages: usize,
    /// Ceiling on parts accumulated for one listing
    #[serde(default = "default_max_listed_parts")]
    pub max_listed_parts: usize,
    /// Bound on each backend call, distinct from URL expiry
    #[serde(default = "default_operation_timeout_seconds")]
    pub operation_timeout_seconds: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            url_expiry_seconds: default_url_expiry_seconds(),
            max_list_pages: default_max_list_pages(),
            max_listed_parts: default_max_listed_parts(),
            operation_timeout_seconds: default_operation_timeout_seconds(),
        }
    }
}

fn default_url_expiry_seconds() -> u64 {
    900
}

fn default_max_list_pages() -> usize {
    100
}

fn default_max_listed_parts() -> usize {
    10000
}

fn default_operation_timeout_seconds() -> u64 {
    30
}

/// Metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
        }
    }
}

fn default_metrics_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn test_config() -> Config {
        Config {
            server: ServerConfig::default(),
            s3: S3Config {
                bucket: "uploads".into(),
                region: "us-east-1".into(),
                endpoint: None,
                access_key: None,
                secret_key: None,
                force_path_style: false,
            },
            upload: UploadConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }

    #[test]
    fn test_default_upload_config() {
        let config = UploadConfig::default();
        assert_eq!(config.url_expiry_seconds, 900);
        assert_eq!(config.max_list_pages, 100);
        assert_eq!(config.max_listed_parts, 10000);
    }

    #[test]
    fn test_config_validation_accepts_defaults() {
        assert!(test_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_empty_bucket() {
        let mut config = test_config();
        config.s3.bucket = " ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_expiry_bounds() {
        let mut config = test_config();
        config.upload.url_expiry_seconds = 0;
        assert!(config.validate().is_err());

        config.upload.url_expiry_seconds = 604_801;
        assert!(config.validate().is_err());

        config.upload.url_expiry_seconds = 604_800;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_path_prefix() {
        let mut config = test_config();
        config.server.path_prefix = "api".into();
        assert!(config.validate().is_err());

        config.server.path_prefix = "/api/".into();
        assert!(config.validate().is_err());

        config.server.path_prefix = String::new();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation_endpoint_scheme() {
        let mut config = test_config();
        config.s3.endpoint = Some("localhost:9000".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_lookup() {
        let vars = HashMap::from([
            ("AWS_BUCKET", "uploads"),
            ("AWS_REGION", "eu-west-1"),
            ("AWS_KEY", "access"),
            ("AWS_SECRET", "secret"),
            ("AWS_ENDPOINT", "http://localhost:9000"),
        ]);

        let config = Config::from_lookup(|name| vars.get(name).map(|v| v.to_string())).unwrap();
        assert_eq!(config.s3.bucket, "uploads");
        assert_eq!(config.s3.region, "eu-west-1");
        assert_eq!(config.s3.access_key.as_deref(), Some("access"));
        assert!(config.s3.force_path_style);
        assert_eq!(config.server.address, "0.0.0.0:3000");
        assert_eq!(config.server.path_prefix, "/api");
    }

    #[test]
    fn test_from_lookup_missing_bucket() {
        let result = Config::from_lookup(|name| match name {
            "AWS_REGION" => Some("us-east-1".into()),
            _ => None,
        });
        assert!(matches!(result, Err(ConfigError::ValidationError(m)) if m.contains("AWS_BUCKET")));
    }

    #[test]
    fn test_expand_with_default() {
        let expanded = expand_with("a-${MISSING:-fallback}-${PRESENT}-${ABSENT}", |name| {
            (name == "PRESENT").then(|| "here".to_string())
        });
        assert_eq!(expanded, "a-fallback-here-${ABSENT}");
    }

    #[test]
    fn test_cors_allows() {
        let cors = CorsConfig {
            allowed_origins: vec!["http://localhost:4200".into()],
        };
        assert!(cors.allows("http://localhost:4200"));
        assert!(!cors.allows("http://evil.example"));
        assert!(CorsConfig::default().allows("http://anything.example"));
    }
}
