//! Application state for connection service.

use common::config::AppConfig;

use crate::executor::QueryExecutor;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub executor: QueryExecutor,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(config: AppConfig, executor: QueryExecutor) -> Self {
        Self { config, executor }
    }
}
