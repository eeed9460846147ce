//! Multipart Uploadr - presigned S3 upload broker
//!
//! Hands browser clients presigned URLs and manages multipart uploads so
//! file bytes never pass through the service.

use clap::Parser;
use multipart_uploadr::{config::Config, server::Server, VERSION};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Multipart Uploadr - presigned S3 upload broker
#[derive(Parser, Debug)]
#[command(name = "multipart-uploadr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file. When missing, configuration is read from
    /// AWS_REGION, AWS_KEY, AWS_SECRET and AWS_BUCKET.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(short, long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(args.log_level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting Multipart Uploadr v{}", VERSION);

    let config = if args.config.exists() {
        let config = Config::load(&args.config)?;
        info!("Loaded configuration from {:?}", args.config);
        config
    } else {
        warn!(
            "Config file {:?} not found, reading configuration from environment",
            args.config
        );
        Config::from_env()?
    };

    let server = Server::new(config).await?;
    server.run().await?;

    Ok(())
}
