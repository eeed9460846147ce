//! Multipart Uploadr Library
//!
//! Upload broker for browser clients: issues presigned S3 URLs so file bytes
//! go straight to the bucket, and drives the multipart upload lifecycle
//! (initiate, sign parts, list, complete, abort) on the client's behalf.
//!
//! # Features
//!
//! - **Direct Upload**: No file bytes pass through the service
//! - **Multipart**: Resumable uploads of up to 10,000 parts
//! - **Stateless**: S3 is the only authority on upload sessions
//! - **S3 Compatible**: Works with AWS S3 and path-style endpoints
//!
//! # Example
//!
//! ```no_run
//! use multipart_uploadr::{config::Config, server::Server};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let server = Server::new(config).await?;
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod metrics;
pub mod router;
pub mod s3;
pub mod server;
pub mod upload;

// Re-export commonly used types
pub use config::Config;
pub use server::Server;
pub use upload::UploadOrchestrator;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
