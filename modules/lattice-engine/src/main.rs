use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lattice_common::Config;
use lattice_engine::{migrate, Engine};
use lattice_graph::GraphClient;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lattice=info".parse()?))
        .init();

    info!("Lattice engine starting...");

    let config = Config::from_env();
    config.log_redacted();

    let seed_handles = seed_handles()?;
    info!(count = seed_handles.len(), "Seed handles loaded");

    let client =
        GraphClient::connect(&config.neo4j_uri, &config.neo4j_user, &config.neo4j_password)
            .await?;

    migrate(&client).await?;

    // Ctrl-C finishes the in-flight chunk, then drains gracefully.
    let cancel = CancellationToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received; cancelling run");
            signal_token.cancel();
        }
    });

    let engine = Engine::new(client, &config);
    let stats = engine.run(&seed_handles, &cancel).await?;
    info!("Run complete. {stats}");

    Ok(())
}

/// Handles come from the command line, or from the SEED_HANDLES env var
/// (comma-separated) when no arguments are given.
fn seed_handles() -> Result<Vec<String>> {
    let mut handles: Vec<String> = std::env::args().skip(1).collect();
    if handles.is_empty() {
        handles = std::env::var("SEED_HANDLES")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }
    if handles.is_empty() {
        anyhow::bail!("No seed handles: pass them as arguments or set SEED_HANDLES");
    }
    Ok(handles)
}
