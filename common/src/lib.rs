//! Shared building blocks for the connection manager.
//!
//! Models, the error taxonomy, configuration loading and the HTTP response
//! envelope used by every service crate in the workspace.

pub mod config;
pub mod errors;
pub mod middleware;
pub mod models;
pub mod response;
