use std::sync::Arc;

use crate::config::Config;
use crate::service::LogService;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub service: Arc<LogService>,
}

impl AppState {
    pub fn new(config: Config, service: Arc<LogService>) -> Self {
        Self {
            config: Arc::new(config),
            service,
        }
    }

    pub fn max_payload_bytes(&self) -> usize {
        usize::try_from(self.config.server.max_payload_bytes.as_u64()).unwrap_or(usize::MAX)
    }
}
