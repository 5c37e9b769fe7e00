use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{bail, Context};
use clap::{Parser, ValueEnum};

use crate::broker::{BrokerBackend, HttpBroker, MemoryBroker};

pub const DEFAULT_BROKER_URL: &str = "https://rtc.live.cloudflare.com/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrokerKind {
    /// Forward to the hosted broker.
    Http,
    /// Serve from an in-process loopback broker.
    Memory,
}

#[derive(Debug, Parser)]
#[command(
    name = "calls-relay",
    author,
    version,
    about = "Relays session and track negotiation to the hosted track broker"
)]
pub struct Cli {
    /// Address to bind the HTTP listener to.
    #[arg(long, env = "CALLS_RELAY_ADDR", default_value = "127.0.0.1:8787")]
    pub listen_addr: String,

    /// Base URL of the broker API.
    #[arg(long, env = "CALLS_BROKER_URL", default_value = DEFAULT_BROKER_URL)]
    pub broker_url: String,

    /// Application id issued by the broker.
    #[arg(long, env = "CALLS_APP_ID")]
    pub app_id: Option<String>,

    /// Bearer token for the broker application.
    #[arg(long, env = "CALLS_APP_TOKEN", hide_env_values = true)]
    pub app_token: Option<String>,

    #[arg(long, env = "CALLS_BROKER", value_enum, default_value_t = BrokerKind::Http)]
    pub broker: BrokerKind,

    /// Tracing filter directives.
    #[arg(long, env = "RUST_LOG", default_value = "info,calls_relay=debug")]
    pub log_filter: String,
}

#[derive(Debug, Clone)]
pub enum BrokerConfig {
    Http {
        url: String,
        app_id: String,
        app_token: String,
    },
    Memory,
}

#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub listen_addr: SocketAddr,
    pub broker: BrokerConfig,
    pub log_filter: String,
}

impl TryFrom<Cli> for RelayConfig {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        let broker = match cli.broker {
            BrokerKind::Memory => BrokerConfig::Memory,
            BrokerKind::Http => {
                let Some(app_id) = cli.app_id.filter(|v| !v.trim().is_empty()) else {
                    bail!("CALLS_APP_ID is required for the http broker");
                };
                let Some(app_token) = cli.app_token.filter(|v| !v.trim().is_empty()) else {
                    bail!("CALLS_APP_TOKEN is required for the http broker");
                };
                BrokerConfig::Http {
                    url: cli.broker_url,
                    app_id,
                    app_token,
                }
            }
        };
        Ok(RelayConfig {
            listen_addr,
            broker,
            log_filter: cli.log_filter,
        })
    }
}

impl BrokerConfig {
    pub fn build(&self) -> anyhow::Result<Arc<dyn BrokerBackend>> {
        Ok(match self {
            BrokerConfig::Http {
                url,
                app_id,
                app_token,
            } => Arc::new(
                HttpBroker::new(url, app_id, app_token).context("failed to build broker client")?,
            ),
            BrokerConfig::Memory => Arc::new(MemoryBroker::new()),
        })
    }

    pub fn label(&self) -> &'static str {
        match self {
            BrokerConfig::Http { .. } => "http",
            BrokerConfig::Memory => "memory",
        }
    }
}
