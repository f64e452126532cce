//! # Status Helpers
//!
//! Shared pieces of the status documents written back by the registry controllers.

use chrono::{SecondsFormat, Utc};

/// Current time as an RFC 3339 timestamp with nanosecond precision, in UTC
pub fn transition_time() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Message recorded in `errorMessage`: the innermost cause, or empty on success
pub fn error_message(err: Option<&anyhow::Error>) -> String {
    err.map(|e| e.root_cause().to_string()).unwrap_or_default()
}
