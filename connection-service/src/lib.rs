//! External database connection manager.
//!
//! Keeps one live pool per registered connection, health-checks pools before
//! reuse, rebuilds them after connection-level failures and normalizes query
//! results from MySQL, PostgreSQL and SQL Server into one shape.

pub mod classifier;
pub mod drivers;
pub mod executor;
pub mod handlers;
pub mod health;
pub mod registry;
pub mod routes;
pub mod state;
pub mod store;

/// Service name used in logs and response metadata.
pub const SERVICE_NAME: &str = "connection-service";
