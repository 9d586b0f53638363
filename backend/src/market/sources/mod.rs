pub mod chart;
pub mod ticker;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::error::FetchError;
use crate::market::types::NormalizedQuote;

pub use chart::ChartApiSource;
pub use ticker::TickerCsvSource;

/// Timeout for the cheap reachability probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Capability contract shared by every quote source.
///
/// Implementations must return either a fully normalized quote or an error;
/// a response that cannot produce a usable close price is `Malformed`.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    fn source_id(&self) -> &str;

    /// Static preference; higher is tried first.
    fn priority(&self) -> i32;

    /// Liveness probe independent of any symbol.
    async fn is_reachable(&self) -> bool;

    async fn fetch(&self, symbol: &str) -> Result<NormalizedQuote, FetchError>;
}

/// Maps an HTTP status to the fetch taxonomy. `None` means the status is a success.
pub(crate) fn classify_status(status: StatusCode, symbol: &str) -> Option<FetchError> {
    if status.is_success() {
        return None;
    }

    Some(match status {
        StatusCode::TOO_MANY_REQUESTS => {
            FetchError::RateLimited(format!("http {}", status.as_u16()))
        }
        StatusCode::NOT_FOUND => FetchError::NotFound(symbol.to_string()),
        s => FetchError::Transient(format!("http {}", s.as_u16())),
    })
}

/// Transport-level errors: timeouts, connection resets, body decoding.
pub(crate) fn classify_transport(err: reqwest::Error) -> FetchError {
    if err.is_decode() {
        return FetchError::Malformed(err.to_string());
    }
    if let Some(status) = err.status() {
        if status == StatusCode::TOO_MANY_REQUESTS {
            return FetchError::RateLimited(err.to_string());
        }
    }
    FetchError::Transient(err.to_string())
}

/// `HEAD {base_url}` with a short timeout; any non-5xx answer counts as reachable.
pub(crate) async fn probe(http: &reqwest::Client, base_url: &str) -> bool {
    http.head(base_url)
        .timeout(PROBE_TIMEOUT)
        .send()
        .await
        .map(|resp| !resp.status().is_server_error())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_map_to_fetch_errors() {
        assert_eq!(classify_status(StatusCode::OK, "X"), None);
        assert!(matches!(
            classify_status(StatusCode::TOO_MANY_REQUESTS, "X"),
            Some(FetchError::RateLimited(_))
        ));
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND, "X"),
            Some(FetchError::NotFound("X".into()))
        );
        assert!(matches!(
            classify_status(StatusCode::BAD_GATEWAY, "X"),
            Some(FetchError::Transient(_))
        ));
    }
}
