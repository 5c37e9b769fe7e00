use std::sync::Arc;
use std::time::Instant;

use crate::broker::BrokerBackend;

#[derive(Clone)]
pub struct AppState {
    start: Instant,
    broker: Arc<dyn BrokerBackend>,
}

impl AppState {
    pub fn new(broker: Arc<dyn BrokerBackend>) -> Self {
        Self {
            start: Instant::now(),
            broker,
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.start.elapsed().as_secs()
    }

    pub fn broker(&self) -> &dyn BrokerBackend {
        self.broker.as_ref()
    }
}
