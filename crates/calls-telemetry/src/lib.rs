//! Tracing subscriber setup shared by the relay and the headless peer.

use thiserror::Error;
use tracing::warn;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Directives used when the configured filter does not parse.
pub const FALLBACK_FILTER: &str = "info";

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("tracing subscriber already installed: {0}")]
    AlreadyInstalled(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogOutput {
    #[default]
    Stdout,
    /// Keeps stdout free for a binary's own output.
    Stderr,
}

#[derive(Debug, Clone)]
pub struct Telemetry {
    filter: String,
    with_target: bool,
    output: LogOutput,
}

impl Telemetry {
    pub fn new(filter: impl Into<String>) -> Self {
        Self {
            filter: filter.into(),
            with_target: true,
            output: LogOutput::Stdout,
        }
    }

    pub fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    pub fn output(mut self, output: LogOutput) -> Self {
        self.output = output;
        self
    }

    /// Installs the global subscriber. Fails if one is already set.
    pub fn init(self) -> Result<(), TelemetryError> {
        let (env_filter, parsed) = resolve_filter(&self.filter);
        let writer = match self.output {
            LogOutput::Stdout => BoxMakeWriter::new(std::io::stdout),
            LogOutput::Stderr => BoxMakeWriter::new(std::io::stderr),
        };
        let fmt_layer = tracing_subscriber::fmt::layer()
            .with_target(self.with_target)
            .with_writer(writer);
        Registry::default()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|err| TelemetryError::AlreadyInstalled(err.to_string()))?;
        if !parsed {
            warn!(filter = %self.filter, fallback = FALLBACK_FILTER, "invalid log filter");
        }
        Ok(())
    }
}

fn resolve_filter(directives: &str) -> (EnvFilter, bool) {
    match EnvFilter::try_new(directives) {
        Ok(filter) => (filter, true),
        Err(_) => (EnvFilter::new(FALLBACK_FILTER), false),
    }
}
