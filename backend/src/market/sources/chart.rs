//! JSON chart API source (`/v8/finance/chart/{symbol}`).
//!
//! Returns intraday 1-minute bars; the most recent bar with a usable close
//! becomes the quote. Bar timestamps are epoch seconds.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{QuoteSource, classify_status, classify_transport, probe};
use crate::error::FetchError;
use crate::market::normalize::{decimal_from_json, epoch_seconds_to_utc, positive, volume_from_decimal};
use crate::market::types::NormalizedQuote;

pub const SOURCE_ID: &str = "chart";
pub const DEFAULT_PRIORITY: i32 = 10;

#[derive(Clone)]
pub struct ChartApiSource {
    http: Client,
    base_url: String,
}

impl ChartApiSource {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(30))
            .user_agent("tripwire/0.1")
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl QuoteSource for ChartApiSource {
    fn source_id(&self) -> &str {
        SOURCE_ID
    }

    fn priority(&self) -> i32 {
        DEFAULT_PRIORITY
    }

    async fn is_reachable(&self) -> bool {
        probe(&self.http, &self.base_url).await
    }

    #[instrument(skip(self), fields(source = SOURCE_ID), level = "debug")]
    async fn fetch(&self, symbol: &str) -> Result<NormalizedQuote, FetchError> {
        let url = format!("{}/v8/finance/chart/{}", self.base_url, symbol);

        let resp = self
            .http
            .get(&url)
            .query(&[("interval", "1m"), ("range", "1d")])
            .send()
            .await
            .map_err(classify_transport)?;

        if let Some(err) = classify_status(resp.status(), symbol) {
            return Err(err);
        }

        let envelope: ChartEnvelope = resp.json().await.map_err(classify_transport)?;
        let quote = parse_chart(symbol, envelope)?;

        debug!(close = %quote.close, ts = %quote.timestamp, "chart quote fetched");
        Ok(quote)
    }
}

#[derive(Debug, Deserialize)]
struct ChartEnvelope {
    chart: ChartBody,
}

#[derive(Debug, Deserialize)]
struct ChartBody {
    result: Option<Vec<ChartResult>>,
    error: Option<ChartApiError>,
}

#[derive(Debug, Deserialize)]
struct ChartApiError {
    code: String,
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChartResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: Indicators,
}

#[derive(Debug, Deserialize)]
struct Indicators {
    #[serde(default)]
    quote: Vec<QuoteSeries>,
}

#[derive(Debug, Default, Deserialize)]
struct QuoteSeries {
    #[serde(default)]
    open: Vec<serde_json::Value>,
    #[serde(default)]
    high: Vec<serde_json::Value>,
    #[serde(default)]
    low: Vec<serde_json::Value>,
    #[serde(default)]
    close: Vec<serde_json::Value>,
    #[serde(default)]
    volume: Vec<serde_json::Value>,
}

fn parse_chart(symbol: &str, envelope: ChartEnvelope) -> Result<NormalizedQuote, FetchError> {
    if let Some(err) = envelope.chart.error {
        let detail = err.description.unwrap_or_else(|| err.code.clone());
        return Err(if err.code.eq_ignore_ascii_case("not found") {
            FetchError::NotFound(format!("{symbol}: {detail}"))
        } else {
            FetchError::Transient(format!("chart api error {}: {detail}", err.code))
        });
    }

    let result = envelope
        .chart
        .result
        .and_then(|mut r| if r.is_empty() { None } else { Some(r.swap_remove(0)) })
        .ok_or_else(|| FetchError::NotFound(symbol.to_string()))?;

    let series = result
        .indicators
        .quote
        .into_iter()
        .next()
        .ok_or_else(|| FetchError::Malformed("missing quote series".into()))?;

    let at = |values: &[serde_json::Value], i: usize| values.get(i).and_then(decimal_from_json);

    // Last bar whose close is usable.
    let idx = (0..series.close.len())
        .rev()
        .find(|&i| positive(at(&series.close, i)).is_some())
        .ok_or_else(|| FetchError::Malformed("no bar with a close price".into()))?;

    let close = positive(at(&series.close, idx))
        .ok_or_else(|| FetchError::Malformed("no bar with a close price".into()))?;

    let ts = result
        .timestamp
        .get(idx)
        .copied()
        .ok_or_else(|| FetchError::Malformed(format!("bar {idx} has no timestamp")))?;
    let timestamp = epoch_seconds_to_utc(ts)
        .ok_or_else(|| FetchError::Malformed(format!("timestamp out of range: {ts}")))?;

    Ok(NormalizedQuote {
        symbol: symbol.to_string(),
        timestamp,
        open: positive(at(&series.open, idx)),
        high: positive(at(&series.high, idx)),
        low: positive(at(&series.low, idx)),
        close,
        volume: volume_from_decimal(at(&series.volume, idx)),
        source: SOURCE_ID.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn parse(body: &str) -> Result<NormalizedQuote, FetchError> {
        let envelope: ChartEnvelope = serde_json::from_str(body).expect("valid json");
        parse_chart("PETR4.SA", envelope)
    }

    #[test]
    fn takes_last_bar_with_close() {
        let body = r#"{"chart":{"result":[{
            "meta":{"symbol":"PETR4.SA","gmtoffset":-10800},
            "timestamp":[1800000000,1800000060,1800000120],
            "indicators":{"quote":[{
                "open":[38.1,38.2,null],
                "high":[38.3,38.4,null],
                "low":[38.0,38.1,null],
                "close":[38.2,38.35,null],
                "volume":[1200,3400,null]
            }]}
        }],"error":null}}"#;

        let q = parse(body).unwrap();
        assert_eq!(q.close, dec!(38.35));
        assert_eq!(q.open, Some(dec!(38.2)));
        assert_eq!(q.volume, Some(3400));
        assert_eq!(q.timestamp.timestamp(), 1_800_000_060);
        assert_eq!(q.source, "chart");
    }

    #[test]
    fn api_not_found_maps_to_not_found() {
        let body = r#"{"chart":{"result":null,"error":{"code":"Not Found","description":"No data found, symbol may be delisted"}}}"#;
        assert!(matches!(parse(body), Err(FetchError::NotFound(_))));
    }

    #[test]
    fn missing_close_is_malformed() {
        let body = r#"{"chart":{"result":[{
            "timestamp":[1800000000],
            "indicators":{"quote":[{"open":[1.0],"close":[null],"volume":[10]}]}
        }],"error":null}}"#;
        assert!(matches!(parse(body), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn bar_without_timestamp_is_malformed() {
        let body = r#"{"chart":{"result":[{
            "timestamp":[],
            "indicators":{"quote":[{"close":[12.5]}]}
        }],"error":null}}"#;
        assert!(matches!(parse(body), Err(FetchError::Malformed(_))));
    }
}
