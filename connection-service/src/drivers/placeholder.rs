//! Placeholder rewriting for SQL Server.
//!
//! Callers write PostgreSQL-style positional placeholders (`$1`, `$2`, ...).
//! SQL Server expects named parameters `@P1`, `@P2`, ... instead.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::Regex;

static POSITIONAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$(\d+)").expect("placeholder pattern is valid"));

/// Rewrites every `$N` into `@PN`.
///
/// The rewrite is purely textual: a `$N` inside a string literal or comment
/// is rewritten too.
pub fn positional_to_named(sql: &str) -> Cow<'_, str> {
    POSITIONAL.replace_all(sql, "@P${1}")
}
