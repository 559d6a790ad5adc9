//! Connection-error classification.
//!
//! Decides whether a failed query means the pool itself is bad (and should be
//! rebuilt) or the statement was simply wrong.

use std::sync::LazyLock;

use common::errors::AppError;
use regex::RegexSet;

static CONNECTION_PATTERNS: LazyLock<RegexSet> = LazyLock::new(|| {
    RegexSet::new([
        r"(?i)connection",
        r"(?i)timeout",
        r"(?i)timed out",
        r"ECONNREFUSED",
        r"EHOSTUNREACH",
        r"ETIMEDOUT",
        r"ENOTFOUND",
    ])
    .expect("connection error patterns are valid")
});

/// True when a driver message describes a transport-level failure.
pub fn is_connection_message(message: &str) -> bool {
    CONNECTION_PATTERNS.is_match(message)
}

/// True when `err` is a driver error whose message looks like a lost or
/// unreachable connection. Other error kinds never trigger a rebuild.
pub fn is_connection_error(err: &AppError) -> bool {
    match err {
        AppError::Driver { message, .. } => is_connection_message(message),
        _ => false,
    }
}
