use anyhow::Result;
use axum::Router;
use clap::Parser;
use sieve_core::IndexConfig;
use sieve_server::build_app;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
struct Args {
    /// JSON config file (index location, result cap, boosts)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Index directory path, overrides the config file
    #[arg(long)]
    index: Option<PathBuf>,
    /// Host to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    /// Port to bind
    #[arg(long, default_value_t = 8080)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();
    let mut config = match &args.config {
        Some(path) => IndexConfig::load(path)?,
        None => IndexConfig::default(),
    };
    if let Some(index) = args.index {
        config.output_dir = index;
    }
    let admin_token = std::env::var("ADMIN_TOKEN").ok();
    let app: Router = build_app(config, admin_token)?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
