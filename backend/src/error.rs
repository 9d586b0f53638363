use thiserror::Error;

use crate::market::types::SourceId;

/// Failure of a single source adapter call.
///
/// The variant decides what the orchestrator does next: only `RateLimited`
/// touches source health, every variant moves on to the next candidate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("symbol not found: {0}")]
    NotFound(String),

    #[error("source signalled rate limiting: {0}")]
    RateLimited(String),

    #[error("transient failure: {0}")]
    Transient(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::NotFound(_) => "not_found",
            FetchError::RateLimited(_) => "rate_limited",
            FetchError::Transient(_) => "transient",
            FetchError::Malformed(_) => "malformed",
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("all sources failed for {symbol} ({} attempted)", failures.len())]
    AllSourcesFailed {
        symbol: String,
        failures: Vec<(SourceId, FetchError)>,
    },

    #[error("unknown source: {0}")]
    UnknownSource(SourceId),

    #[error("source {source_id} failed: {error}")]
    SourceFailed { source_id: SourceId, error: FetchError },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("rejected quote for {symbol}: {reason}")]
    Invalid { symbol: String, reason: String },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("trigger event for {0} is not escalated")]
    NotEscalated(String),

    #[error("trading session unavailable: {0}")]
    Session(String),

    #[error("deep analysis failed for {symbol}: {reason}")]
    Analysis { symbol: String, reason: String },

    #[error("signal annotation failed for {symbol}: {reason}")]
    Annotation { symbol: String, reason: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown trigger profile: {0}")]
    UnknownProfile(String),

    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid instrument entry: {0}")]
    InvalidInstrument(String),

    #[error(
        "a {interval_secs}s cycle leaves fewer than {min_quotes} quotes in the {window_minutes}m window"
    )]
    CadenceTooSlow {
        interval_secs: u64,
        window_minutes: u32,
        min_quotes: usize,
    },
}
