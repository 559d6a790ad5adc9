//! Driver option resolution.
//!
//! Every pool is built from two layers: the adapter's defaults (derived from
//! the configuration's typed fields) and the configuration's free-form
//! `options`, which win on conflict. Keys outside the adapter's allow-list are
//! rejected so that structural fields (host, port, credentials) can never be
//! redirected through options.

use std::time::Duration;

use common::errors::{AppError, AppResult};
use common::models::{ConnectionConfig, OptionMap};
use serde_json::{json, Value};

use super::DriverAdapter;

/// Option keys understood by every adapter.
pub const COMMON_OPTIONS: &[&str] = &[
    "max_connections",
    "min_connections",
    "idle_timeout_ms",
    "connect_timeout_ms",
    "ssl",
];

/// Idle connections are reaped after this many milliseconds by default.
pub const DEFAULT_IDLE_TIMEOUT_MS: u64 = 30_000;

/// Defaults shared by all protocols.
pub fn base_defaults(config: &ConnectionConfig) -> OptionMap {
    let mut defaults = OptionMap::new();
    defaults.insert("max_connections".into(), json!(config.max_connections));
    defaults.insert("min_connections".into(), json!(0));
    defaults.insert("idle_timeout_ms".into(), json!(DEFAULT_IDLE_TIMEOUT_MS));
    defaults.insert("connect_timeout_ms".into(), json!(config.connection_timeout));
    defaults.insert("ssl".into(), json!(config.enable_ssl));
    defaults
}

/// Validates the free-form options against the adapter and overlays them on
/// its defaults.
pub fn resolve(adapter: &dyn DriverAdapter, config: &ConnectionConfig) -> AppResult<ResolvedOptions> {
    let allowed = adapter.allowed_options();
    let rejected: Vec<&str> = config
        .options
        .keys()
        .map(String::as_str)
        .filter(|key| !COMMON_OPTIONS.contains(key) && !allowed.contains(key))
        .collect();

    if !rejected.is_empty() {
        return Err(AppError::InvalidOptions(format!(
            "unsupported option(s) for {}: {}",
            adapter.db_type(),
            rejected.join(", ")
        )));
    }

    let mut merged = adapter.default_options(config);
    merged.extend(
        config
            .options
            .iter()
            .map(|(key, value)| (key.clone(), value.clone())),
    );
    Ok(ResolvedOptions(merged))
}

/// Merged option layer with typed accessors.
///
/// Accessors return `Ok(None)` for absent (or `null`) keys and
/// `InvalidOptions` when a value has the wrong JSON type.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedOptions(OptionMap);

impl ResolvedOptions {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key).filter(|value| !value.is_null())
    }

    pub fn u64(&self, key: &str) -> AppResult<Option<u64>> {
        self.get(key)
            .map(|value| value.as_u64().ok_or_else(|| invalid(key, "a non-negative integer")))
            .transpose()
    }

    pub fn u32(&self, key: &str) -> AppResult<Option<u32>> {
        self.u64(key)?
            .map(|value| u32::try_from(value).map_err(|_| invalid(key, "a 32-bit integer")))
            .transpose()
    }

    pub fn bool(&self, key: &str) -> AppResult<Option<bool>> {
        self.get(key)
            .map(|value| value.as_bool().ok_or_else(|| invalid(key, "a boolean")))
            .transpose()
    }

    pub fn str(&self, key: &str) -> AppResult<Option<&str>> {
        self.get(key)
            .map(|value| value.as_str().ok_or_else(|| invalid(key, "a string")))
            .transpose()
    }

    /// Reads a millisecond count as a [`Duration`].
    pub fn millis(&self, key: &str) -> AppResult<Option<Duration>> {
        Ok(self.u64(key)?.map(Duration::from_millis))
    }

    pub fn as_map(&self) -> &OptionMap {
        &self.0
    }
}

impl From<OptionMap> for ResolvedOptions {
    fn from(map: OptionMap) -> Self {
        Self(map)
    }
}

fn invalid(key: &str, expected: &str) -> AppError {
    AppError::InvalidOptions(format!("option `{}` must be {}", key, expected))
}
