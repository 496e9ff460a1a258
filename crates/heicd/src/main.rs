mod config;
mod server;
mod uploads;
mod version;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::Parser;
use heic_converter::ConversionStats;
use heic_upload::HeicMiddleware;
use tracing::info;

use crate::{
    config::{open_config, write_default_config},
    version::{long_version, short_version},
};

#[derive(Parser)]
#[command(version = short_version())]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.init {
        write_default_config(&args.config)?;
        info!(path = ?args.config, "Created default configuration");
        return Ok(());
    }

    info!(version = long_version(), "heicd version");

    let config = open_config(&args.config).context("Failed to load configuration")?;
    let heic_config = config.heic_config();
    info!(
        environment = %config.server.environment,
        output_format = %heic_config.output_format,
        quality = heic_config.quality,
        max_size = heic_config.max_size,
        stats = heic_config.enable_stats,
        "Configuration loaded"
    );

    // 変換専用エンドポイントとアップロード受付で同じ統計を共有する
    let stats = Arc::new(ConversionStats::new());
    let heic = Arc::new(HeicMiddleware::builder(heic_config).stats(stats).build());

    server::serve(&config, heic).await
}
