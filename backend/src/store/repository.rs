use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::market::types::NormalizedQuote;

/// Persistence boundary for the quote time series.
#[async_trait]
pub trait QuoteRepository: Send + Sync {
    /// Inserts or replaces the record keyed by (symbol, timestamp, source).
    async fn upsert(&self, quote: &NormalizedQuote) -> Result<()>;

    /// Quotes for `symbol` at or after `since`, most recent first, at most `limit`.
    async fn recent(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NormalizedQuote>>;
}
