use std::env;
use std::time::Duration;

/// How long bootstrap waits for the ICE connection to report `connected`.
pub const DEFAULT_ICE_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// How long each pulled track may take to show up on the connection.
pub const DEFAULT_TRACK_ARRIVAL_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_STUN_URL: &str = "stun:stun.cloudflare.com:3478";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: Option<String>,
    pub credential: Option<String>,
}

impl IceServer {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            urls: vec![url.into()],
            username: None,
            credential: None,
        }
    }
}

/// Negotiation settings shared by bootstrap, publish and subscribe.
#[derive(Debug, Clone)]
pub struct NegotiationConfig {
    pub ice_servers: Vec<IceServer>,
    pub ice_connect_timeout: Duration,
    pub track_arrival_timeout: Duration,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            ice_servers: vec![IceServer::new(DEFAULT_STUN_URL)],
            ice_connect_timeout: DEFAULT_ICE_CONNECT_TIMEOUT,
            track_arrival_timeout: DEFAULT_TRACK_ARRIVAL_TIMEOUT,
        }
    }
}

impl NegotiationConfig {
    /// Load overrides from `CALLS_ICE_SERVERS`, `CALLS_ICE_CONNECT_TIMEOUT_MS`
    /// and `CALLS_TRACK_TIMEOUT_MS`; anything unset or unparsable keeps its
    /// default.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let ice_servers = env::var("CALLS_ICE_SERVERS")
            .ok()
            .map(|value| parse_ice_servers(&value))
            .filter(|servers| !servers.is_empty())
            .unwrap_or(defaults.ice_servers);
        let ice_connect_timeout = env::var("CALLS_ICE_CONNECT_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.ice_connect_timeout);
        let track_arrival_timeout = env::var("CALLS_TRACK_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.track_arrival_timeout);
        Self {
            ice_servers,
            ice_connect_timeout,
            track_arrival_timeout,
        }
    }

    pub fn with_ice_connect_timeout(mut self, timeout: Duration) -> Self {
        self.ice_connect_timeout = timeout;
        self
    }

    pub fn with_track_arrival_timeout(mut self, timeout: Duration) -> Self {
        self.track_arrival_timeout = timeout;
        self
    }
}

fn parse_ice_servers(value: &str) -> Vec<IceServer> {
    value
        .split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(IceServer::new)
        .collect()
}
