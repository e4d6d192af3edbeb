use anyhow::{Context, Result};
use clap::Parser;
use simsearch_server::{router, AppState};
use std::path::PathBuf;
use tokio::net::TcpListener;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser)]
#[command(name = "server", about = "Serve a concept-search bundle over HTTP")]
struct Args {
    /// Bundle directory written by `indexer build`
    #[arg(long, default_value = "./bundle")]
    bundle: PathBuf,
    #[arg(long, default_value = "0.0.0.0")]
    host: String,
    #[arg(long, default_value_t = 8080)]
    port: u16,
    /// Token for POST /doc/:id/tags; tagging is refused when unset
    #[arg(long, env = "ADMIN_TOKEN", hide_env_values = true)]
    admin_token: Option<String>,
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "cannot listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

#[tokio::main]
async fn main() -> Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();
    let args = Args::parse();

    let state = AppState::load(&args.bundle, args.admin_token)
        .with_context(|| format!("loading bundle {}", args.bundle.display()))?;
    if state.admin_token.is_none() {
        tracing::warn!("no admin token configured; tag edits are disabled");
    }

    let listener = TcpListener::bind((args.host.as_str(), args.port))
        .await
        .with_context(|| format!("binding {}:{}", args.host, args.port))?;
    tracing::info!(addr = %listener.local_addr()?, "server listening");
    axum::serve(listener, router(state)).with_graceful_shutdown(shutdown_signal()).await?;
    Ok(())
}
