//! CSV last-quote source (`/q/l/?s={symbol}&f=sd2t2ohlcv&h&e=csv`).
//!
//! The response is a header line plus one data line. Dates and times are
//! exchange-local without an offset, so the source is configured with one.
//! Regional deployments answer with `;`-separated cells and decimal commas.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::FixedOffset;
use reqwest::Client;
use tracing::{debug, instrument};

use super::{QuoteSource, classify_status, classify_transport, probe};
use crate::error::FetchError;
use crate::market::normalize::{
    local_to_utc, parse_decimal, parse_local_date, parse_local_time, positive, volume_from_decimal,
};
use crate::market::types::NormalizedQuote;

pub const SOURCE_ID: &str = "ticker";
pub const DEFAULT_PRIORITY: i32 = 1;

/// Body marker the service returns instead of HTTP 429 when the quota is spent.
const HITS_LIMIT_MARKER: &str = "exceeded the daily hits limit";
const NO_DATA: &str = "N/D";

#[derive(Clone)]
pub struct TickerCsvSource {
    http: Client,
    base_url: String,
    utc_offset: FixedOffset,
}

impl TickerCsvSource {
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        utc_offset: FixedOffset,
    ) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .timeout(timeout)
            .pool_idle_timeout(Duration::from_secs(30))
            .user_agent("tripwire/0.1")
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            utc_offset,
        })
    }
}

#[async_trait]
impl QuoteSource for TickerCsvSource {
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
        let url = format!("{}/q/l/", self.base_url);

        let resp = self
            .http
            .get(&url)
            .query(&[("s", symbol), ("f", "sd2t2ohlcv"), ("h", ""), ("e", "csv")])
            .send()
            .await
            .map_err(classify_transport)?;

        if let Some(err) = classify_status(resp.status(), symbol) {
            return Err(err);
        }

        let body = resp.text().await.map_err(classify_transport)?;
        let quote = parse_csv(symbol, &body, self.utc_offset)?;

        debug!(close = %quote.close, ts = %quote.timestamp, "ticker quote fetched");
        Ok(quote)
    }
}

fn parse_csv(symbol: &str, body: &str, offset: FixedOffset) -> Result<NormalizedQuote, FetchError> {
    if body.to_ascii_lowercase().contains(HITS_LIMIT_MARKER) {
        return Err(FetchError::RateLimited(HITS_LIMIT_MARKER.to_string()));
    }

    let mut lines = body.lines().map(str::trim).filter(|l| !l.is_empty());
    let header = lines
        .next()
        .ok_or_else(|| FetchError::Malformed("empty body".into()))?;
    let row = lines
        .next()
        .ok_or_else(|| FetchError::Malformed("header without data row".into()))?;

    let delimiter = if header.contains(';') { ';' } else { ',' };

    let columns: HashMap<String, &str> = header
        .split(delimiter)
        .map(|h| h.trim().to_ascii_lowercase())
        .zip(row.split(delimiter).map(str::trim))
        .collect();

    let cell = |name: &str| columns.get(name).copied().filter(|v| !v.is_empty());

    let close_raw = cell("close").ok_or_else(|| FetchError::Malformed("no close column".into()))?;
    if close_raw.eq_ignore_ascii_case(NO_DATA) && cell("date").is_none_or(|d| d == NO_DATA) {
        return Err(FetchError::NotFound(symbol.to_string()));
    }

    let close = positive(parse_decimal(close_raw))
        .ok_or_else(|| FetchError::Malformed(format!("unusable close: {close_raw}")))?;

    let date = cell("date")
        .and_then(parse_local_date)
        .ok_or_else(|| FetchError::Malformed("unparseable date".into()))?;
    let time = cell("time")
        .and_then(parse_local_time)
        .ok_or_else(|| FetchError::Malformed("unparseable time".into()))?;
    let timestamp = local_to_utc(date, time, offset)
        .ok_or_else(|| FetchError::Malformed("ambiguous local timestamp".into()))?;

    let price = |name: &str| positive(cell(name).and_then(parse_decimal));

    Ok(NormalizedQuote {
        symbol: symbol.to_string(),
        timestamp,
        open: price("open"),
        high: price("high"),
        low: price("low"),
        close,
        volume: volume_from_decimal(cell("volume").and_then(parse_decimal)),
        source: SOURCE_ID.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn cet() -> FixedOffset {
        FixedOffset::east_opt(3600).unwrap()
    }

    #[test]
    fn dot_decimal_row_is_normalized() {
        let body = "Symbol,Date,Time,Open,High,Low,Close,Volume\n\
                    AAPL.US,2026-10-16,22:00:09,247.02,249.69,245.56,247.45,39698300\n";

        let q = parse_csv("aapl.us", body, cet()).unwrap();
        assert_eq!(q.close, dec!(247.45));
        assert_eq!(q.high, Some(dec!(249.69)));
        assert_eq!(q.volume, Some(39_698_300));
        assert_eq!(q.timestamp.to_rfc3339(), "2026-10-16T21:00:09+00:00");
    }

    #[test]
    fn regional_row_with_decimal_commas_is_normalized() {
        let body = "Symbol;Date;Time;Open;High;Low;Close;Volume\n\
                    PETR4;16/10/2026;14:35;38,10;38,62;37,95;38,57;1.234.500\n";
        let brt = FixedOffset::west_opt(3 * 3600).unwrap();

        let q = parse_csv("petr4", body, brt).unwrap();
        assert_eq!(q.open, Some(dec!(38.10)));
        assert_eq!(q.close, dec!(38.57));
        assert_eq!(q.volume, Some(1_234_500));
        assert_eq!(q.timestamp.to_rfc3339(), "2026-10-16T17:35:00+00:00");
    }

    #[test]
    fn no_data_row_is_not_found() {
        let body = "Symbol,Date,Time,Open,High,Low,Close,Volume\n\
                    XXXX.US,N/D,N/D,N/D,N/D,N/D,N/D,N/D\n";
        assert_eq!(
            parse_csv("xxxx.us", body, cet()),
            Err(FetchError::NotFound("xxxx.us".into()))
        );
    }

    #[test]
    fn hits_limit_body_is_rate_limited() {
        let body = "Exceeded the daily hits limit";
        assert!(matches!(
            parse_csv("aapl.us", body, cet()),
            Err(FetchError::RateLimited(_))
        ));
    }

    #[test]
    fn dated_row_without_close_is_malformed() {
        let body = "Symbol,Date,Time,Open,High,Low,Close,Volume\n\
                    AAPL.US,2026-10-16,22:00:09,247.02,249.69,245.56,N/D,0\n";
        assert!(matches!(
            parse_csv("aapl.us", body, cet()),
            Err(FetchError::Malformed(_))
        ));
    }
}
