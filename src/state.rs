//! Shared application state.

use crate::config::Config;
use crate::forecast::ForecastClient;
use crate::monitor::Monitor;
use std::sync::Arc;

/// Built once at startup and cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub monitor: Monitor,
    pub forecast: Option<ForecastClient>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(monitor: Monitor, forecast: Option<ForecastClient>, config: Config) -> Self {
        Self {
            monitor,
            forecast,
            config: Arc::new(config),
        }
    }
}
