// src/core/error.rs

use thiserror::Error;

use crate::core::aggregate::AggregateField;

/// The reason a single probe failed.
///
/// The `Display` output of this type is exactly what ends up in
/// `JobResult::error`, so every variant must render a non-empty message.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("DNS Error: {0}")]
    Dns(String),

    #[error("TLS Error: {0}")]
    Tls(String),

    #[error("Probe timed out after {after_ms}ms")]
    Timeout { after_ms: u64 },

    #[error("Could not parse response: {0}")]
    Parse(String),

    #[error("Nothing found: {0}")]
    NotFound(String),

    #[error("Missing API key: {0}")]
    MissingApiKey(&'static str),

    #[error("Task join error: {0}")]
    Join(String),

    #[error("Probe panicked: {0}")]
    Panicked(String),
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            // reqwest does not expose the configured value, the catalog wrapper reports it precisely.
            ProbeError::Http(format!("request timed out: {e}"))
        } else {
            ProbeError::Http(e.to_string())
        }
    }
}

impl From<hickory_resolver::error::ResolveError> for ProbeError {
    fn from(e: hickory_resolver::error::ResolveError) -> Self {
        ProbeError::Dns(e.to_string())
    }
}

/// Raised while compiling a rule table into a [`Classifier`](crate::core::fingerprint::Classifier).
#[derive(Debug, Error)]
pub enum FingerprintError {
    #[error("invalid pattern `{pattern}` in rule `{rule}`: {source}")]
    InvalidPattern {
        rule: String,
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Raised by the merge step when two jobs claim the same report field.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregateError {
    #[error("field `{0}` was already written by another job")]
    FieldAlreadyWritten(AggregateField),
}

/// Raised by [`run_reconnaissance`](crate::core::run_reconnaissance) before any job starts.
#[derive(Debug, Error)]
pub enum ReconError {
    #[error("target `{0}` has no host")]
    InvalidTarget(String),

    #[error("could not build the HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error(transparent)]
    Classifier(#[from] FingerprintError),
}
