//! HTTP server module
//!
//! Binds the listener, builds the long-lived storage client and orchestrator,
//! and serves the upload façade over HTTP/1.1 with `hyper`.
//!
//! # Example
//!
//! ```no_run
//! use multipart_uploadr::config::Config;
//! use multipart_uploadr::server::Server;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_env()?;
//! let server = Server::new(config).await?;
//! println!("Listening on {}", server.local_addr());
//! server.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod handler;

pub use handler::{handle_request, AppState, HandlerError};

use crate::config::Config;
use crate::s3::{S3Client, S3ClientConfig};
use crate::upload::UploadOrchestrator;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Server errors
#[derive(Error, Debug)]
pub enum ServerError {
    #[error("Failed to bind to address: {0}")]
    BindError(String),

    #[error("Server error: {0}")]
    RuntimeError(String),
}

/// HTTP Server
pub struct Server {
    state: Arc<AppState>,
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Server {
    /// Create a server bound to the configured address.
    ///
    /// Port 0 binds an OS-assigned port; see [`Server::local_addr`].
    pub async fn new(config: Config) -> Result<Self, ServerError> {
        let addr: SocketAddr = config
            .server
            .address
            .parse()
            .map_err(|e| ServerError::BindError(format!("Invalid address: {}", e)))?;

        let client = S3Client::new(S3ClientConfig::from_config(&config.s3, &config.upload))
            .await
            .map_err(|e| ServerError::RuntimeError(format!("Failed to create S3 client: {}", e)))?;
        info!(
            bucket = client.bucket(),
            region = client.region(),
            endpoint = %client.endpoint(),
            "S3 client ready"
        );

        let orchestrator = UploadOrchestrator::new(Arc::new(client), &config.upload);
        Self::with_orchestrator(config, addr, orchestrator).await
    }

    /// Create a server around an already built orchestrator
    pub async fn with_orchestrator(
        config: Config,
        addr: SocketAddr,
        orchestrator: UploadOrchestrator,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::BindError(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| ServerError::BindError(format!("Failed to get local address: {}", e)))?;

        info!("Server bound to {}", local_addr);

        Ok(Self {
            state: Arc::new(AppState::new(orchestrator, Arc::new(config))),
            listener,
            local_addr,
        })
    }

    /// The address the server is bound to
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until Ctrl-C
    pub async fn run(self) -> Result<(), ServerError> {
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
        };
        self.run_until(shutdown).await
    }

    /// Serve until `shutdown` resolves
    pub async fn run_until<F>(self, shutdown: F) -> Result<(), ServerError>
    where
        F: std::future::Future<Output = ()>,
    {
        info!("Starting server on {}", self.local_addr);
        tokio::pin!(shutdown);

        loop {
            let (stream, peer_addr) = tokio::select! {
                accepted = self.listener.accept() => match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                        continue;
                    }
                },
                _ = &mut shutdown => {
                    info!("Shutting down server");
                    return Ok(());
                }
            };

            let state = Arc::clone(&self.state);

            tokio::spawn(async move {
                let io = TokioIo::new(stream);

                let service = service_fn(move |req| {
                    let state = Arc::clone(&state);
                    async move { handle_request(req, state).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    error!("Error serving connection from {}: {}", peer_addr, e);
                }
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::S3Config;

    fn test_config(address: &str) -> Config {
        Config {
            server: crate::config::ServerConfig {
                address: address.into(),
                ..Default::default()
            },
            s3: S3Config {
                bucket: "test-bucket".into(),
                region: "us-east-1".into(),
                endpoint: Some("http://127.0.0.1:9".into()),
                access_key: Some("test".into()),
                secret_key: Some("test".into()),
                force_path_style: true,
            },
            upload: Default::default(),
            metrics: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_server_binds_ephemeral_port() {
        let server = Server::new(test_config("127.0.0.1:0")).await.unwrap();
        assert_ne!(server.local_addr().port(), 0);
    }

    #[tokio::test]
    async fn test_server_invalid_address() {
        let result = Server::new(test_config("invalid")).await;
        assert!(matches!(result, Err(ServerError::BindError(_))));
    }

    #[tokio::test]
    async fn test_run_until_shutdown() {
        let server = Server::new(test_config("127.0.0.1:0")).await.unwrap();
        let result = server.run_until(async {}).await;
        assert!(result.is_ok());
    }
}
