//! Application state management

use std::sync::Arc;

use crate::config::Config;
use crate::service::OfficeService;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: Config,
    service: OfficeService,
}

impl AppState {
    pub fn new(config: Config, service: OfficeService) -> Self {
        Self {
            inner: Arc::new(AppStateInner { config, service }),
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Get the office service
    pub fn service(&self) -> &OfficeService {
        &self.inner.service
    }
}
