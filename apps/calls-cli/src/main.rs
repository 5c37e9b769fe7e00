use std::sync::Arc;

use anyhow::{Context, Result};
use calls_peer::{
    CallError, CallsClient, CaptureRequest, HttpSignalingClient, NegotiationConfig,
    RtcConnectionFactory, SyntheticCapture, SyntheticFeed, SYNTHETIC_FRAME_INTERVAL,
};
use calls_telemetry::{LogOutput, Telemetry};
use clap::Parser;
use tokio::signal;
use tokio::task::JoinHandle;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(
    name = "calls",
    author,
    version,
    about = "Join the track broker as a headless peer"
)]
struct Cli {
    /// Base URL of the calls relay.
    #[arg(long, env = "CALLS_RELAY_URL", default_value = "http://127.0.0.1:8787")]
    relay_url: String,

    /// Publish local audio/video after the session is up.
    #[arg(long)]
    publish: bool,

    /// Pull every track published by this remote session.
    #[arg(long, value_name = "SESSION_ID")]
    subscribe: Option<String>,

    #[arg(long)]
    no_audio: bool,

    #[arg(long)]
    no_video: bool,

    /// Tracing filter directives.
    #[arg(long, env = "RUST_LOG", default_value = "info,calls_peer=debug")]
    log_filter: String,
}

/// Keeps the stage and class alongside the message so a failed run says
/// which step to retry.
fn describe(err: CallError) -> anyhow::Error {
    let stage = err
        .stage()
        .map(|stage| stage.to_string())
        .unwrap_or_else(|| "precondition".into());
    let class = err.class();
    anyhow::Error::new(err).context(format!("{stage} failed ({class:?})"))
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    Telemetry::new(&cli.log_filter)
        .with_target(false)
        .output(LogOutput::Stderr)
        .init()?;

    let config = NegotiationConfig::from_env();
    let signaling = HttpSignalingClient::new(&cli.relay_url)
        .with_context(|| format!("invalid relay url {}", cli.relay_url))?;
    let factory = RtcConnectionFactory::new().context("failed to set up peer connections")?;
    let client = CallsClient::new(
        Arc::new(factory),
        Arc::new(signaling),
        Arc::new(SyntheticCapture::new()),
        config,
    );

    let session = client.bootstrap().await.map_err(describe)?;
    println!("session {}", session.id());

    let mut feed = None;
    let outcome = run(&client, &cli, &mut feed).await;
    if outcome.is_ok() {
        info!("waiting for ctrl-c");
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "failed to listen for ctrl-c");
        }
    }
    if let Some(feed) = feed {
        feed.abort();
    }
    client.teardown().await;
    outcome
}

async fn run(
    client: &CallsClient,
    cli: &Cli,
    feed: &mut Option<JoinHandle<()>>,
) -> Result<()> {
    if cli.publish {
        let published = client
            .publish(CaptureRequest {
                audio: !cli.no_audio,
                video: !cli.no_video,
            })
            .await
            .map_err(describe)?;
        for track in &published.tracks {
            println!("published {} mid={} name={}", track.kind, track.mid, track.track_name);
        }
        // Subscribers only see a track once packets flow on it.
        *feed = Some(SyntheticFeed::new(&published.streams).spawn(SYNTHETIC_FRAME_INTERVAL));
    }

    if let Some(remote) = &cli.subscribe {
        let stream = client.subscribe(remote).await.map_err(describe)?;
        if stream.is_empty() {
            println!("session {remote} has no tracks");
        }
        for track in &stream.tracks {
            println!("receiving {} mid={} id={}", track.kind, track.mid, track.id);
        }
    }
    Ok(())
}
