//! Configuration loading tests against real files and the process environment

use multipart_uploadr::config::{Config, ConfigError};
use serial_test::serial;
use std::io::Write;
use tempfile::NamedTempFile;

fn write_config(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_config() {
    let file = write_config(
        r#"
server:
  address: "127.0.0.1:8080"
  path_prefix: ""
  cors:
    allowed_origins:
      - "http://localhost:5173"
  max_body_bytes: 65536

s3:
  bucket: uploads
  region: eu-west-1
  endpoint: "http://localhost:9000"
  access_key: minio
  secret_key: minio-secret
  force_path_style: true

upload:
  url_expiry_seconds: 600
  max_list_pages: 10
  max_listed_parts: 500
  operation_timeout_seconds: 5

metrics:
  enabled: false
"#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.server.address, "127.0.0.1:8080");
    assert_eq!(config.server.path_prefix, "");
    assert!(config.server.cors.allows("http://localhost:5173"));
    assert!(!config.server.cors.allows("http://other.example"));
    assert_eq!(config.server.max_body_bytes, 65536);
    assert_eq!(config.s3.endpoint.as_deref(), Some("http://localhost:9000"));
    assert!(config.s3.force_path_style);
    assert_eq!(config.upload.url_expiry_seconds, 600);
    assert_eq!(config.upload.max_list_pages, 10);
    assert!(!config.metrics.enabled);
}

#[test]
fn test_load_minimal_config_uses_defaults() {
    let file = write_config(
        r#"
s3:
  bucket: uploads
  region: us-east-1
"#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.server.address, "0.0.0.0:3000");
    assert_eq!(config.server.path_prefix, "/api");
    assert!(config.server.cors.allows_any());
    assert_eq!(config.upload.url_expiry_seconds, 900);
    assert_eq!(config.upload.max_list_pages, 100);
    assert_eq!(config.upload.max_listed_parts, 10000);
    assert!(config.metrics.enabled);
}

#[test]
#[serial]
fn test_load_expands_environment() {
    std::env::set_var("UPLOADR_IT_SECRET", "from-env");
    let file = write_config(
        r#"
s3:
  bucket: uploads
  region: us-east-1
  access_key: ${UPLOADR_IT_KEY:-fallback-key}
  secret_key: ${UPLOADR_IT_SECRET}
"#,
    );

    let config = Config::load(file.path()).unwrap();
    assert_eq!(config.s3.access_key.as_deref(), Some("fallback-key"));
    assert_eq!(config.s3.secret_key.as_deref(), Some("from-env"));
    std::env::remove_var("UPLOADR_IT_SECRET");
}

#[test]
fn test_load_missing_file() {
    let result = Config::load("/nonexistent/uploadr/config.yaml");
    assert!(matches!(result, Err(ConfigError::IoError(_))));
}

#[test]
fn test_load_rejects_bad_prefix() {
    let file = write_config(
        r#"
server:
  path_prefix: "api/"
s3:
  bucket: uploads
  region: us-east-1
"#,
    );

    assert!(matches!(
        Config::load(file.path()),
        Err(ConfigError::ValidationError(_))
    ));
}

#[test]
#[serial]
fn test_from_env() {
    std::env::set_var("AWS_BUCKET", "env-bucket");
    std::env::set_var("AWS_REGION", "ap-southeast-2");
    std::env::set_var("AWS_KEY", "env-key");
    std::env::set_var("AWS_SECRET", "env-secret");
    std::env::remove_var("AWS_ENDPOINT");
    std::env::remove_var("LISTEN_ADDRESS");

    let config = Config::from_env().unwrap();
    assert_eq!(config.s3.bucket, "env-bucket");
    assert_eq!(config.s3.region, "ap-southeast-2");
    assert_eq!(config.s3.access_key.as_deref(), Some("env-key"));
    assert!(!config.s3.force_path_style);
    assert_eq!(config.server.address, "0.0.0.0:3000");

    std::env::remove_var("AWS_BUCKET");
    assert!(matches!(
        Config::from_env(),
        Err(ConfigError::ValidationError(_))
    ));

    for var in ["AWS_REGION", "AWS_KEY", "AWS_SECRET"] {
        std::env::remove_var(var);
    }
}
