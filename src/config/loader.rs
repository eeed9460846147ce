//! Configuration loader with environment variable expansion

use super::{expand_env_vars, Config, ConfigError};
use std::path::Path;

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text, expanding `${VAR}` references first
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let expanded = expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_from_yaml_expands_env_vars() {
        std::env::set_var("UPLOADR_TEST_BUCKET", "expanded-bucket");
        let yaml = r#"
s3:
  bucket: ${UPLOADR_TEST_BUCKET}
  region: ${UPLOADR_TEST_REGION:-ap-northeast-1}
"#;
        let config = ConfigLoader::from_yaml(yaml).unwrap();
        assert_eq!(config.s3.bucket, "expanded-bucket");
        assert_eq!(config.s3.region, "ap-northeast-1");
        assert_eq!(config.upload.url_expiry_seconds, 900);
        std::env::remove_var("UPLOADR_TEST_BUCKET");
    }

    #[test]
    fn test_from_yaml_rejects_invalid() {
        let yaml = r#"
s3:
  bucket: uploads
  region: us-east-1
upload:
  url_expiry_seconds: 0
"#;
        assert!(matches!(
            ConfigLoader::from_yaml(yaml),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_from_yaml_parse_error() {
        assert!(matches!(
            ConfigLoader::from_yaml("server: ["),
            Err(ConfigError::ParseError(_))
        ));
    }
}
