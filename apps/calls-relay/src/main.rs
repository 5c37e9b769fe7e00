use anyhow::{Context, Result};
use calls_relay::config::{Cli, RelayConfig};
use calls_relay::routes;
use calls_relay::state::AppState;
use calls_telemetry::Telemetry;
use clap::Parser;
use tokio::signal;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let config = RelayConfig::try_from(Cli::parse())?;
    Telemetry::new(&config.log_filter).init()?;

    let broker = config.broker.build()?;
    let app = routes::router(AppState::new(broker));

    info!(
        addr = %config.listen_addr,
        broker = config.broker.label(),
        "starting calls-relay"
    );
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .context("failed to bind listener")?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server shutdown with error")?;
    info!("calls-relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
}
