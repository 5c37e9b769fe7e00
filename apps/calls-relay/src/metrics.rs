use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, Registry, TextEncoder};

pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

pub static REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    let c = IntCounterVec::new(
        Opts::new(
            "calls_relay_requests_total",
            "relayed broker requests by route and outcome",
        ),
        &["route", "outcome"],
    )
    .expect("static metric definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
});

pub fn record(route: &str, outcome: &str) {
    REQUESTS.with_label_values(&[route, outcome]).inc();
}

pub fn gather() -> Vec<u8> {
    // Touch lazies so families show up before the first request.
    Lazy::force(&REQUESTS);
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        tracing::warn!(error = %err, "metrics encode error");
    }
    buffer
}
