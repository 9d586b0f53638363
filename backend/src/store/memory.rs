use std::collections::{BTreeMap, HashMap};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::market::types::{NormalizedQuote, SourceId};
use crate::store::repository::QuoteRepository;

type Series = BTreeMap<(DateTime<Utc>, SourceId), NormalizedQuote>;

/// Process-local quote repository; used by tests and `--memory` runs.
#[derive(Default)]
pub struct InMemoryQuoteRepository {
    series: Mutex<HashMap<String, Series>>,
}

impl InMemoryQuoteRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, symbol: &str) -> usize {
        self.series.lock().get(symbol).map_or(0, BTreeMap::len)
    }
}

#[async_trait]
impl QuoteRepository for InMemoryQuoteRepository {
    async fn upsert(&self, quote: &NormalizedQuote) -> Result<()> {
        self.series
            .lock()
            .entry(quote.symbol.clone())
            .or_default()
            .insert((quote.timestamp, quote.source.clone()), quote.clone());
        Ok(())
    }

    async fn recent(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<NormalizedQuote>> {
        let guard = self.series.lock();
        let Some(series) = guard.get(symbol) else {
            return Ok(vec![]);
        };

        Ok(series
            .values()
            .rev()
            .take_while(|q| q.timestamp >= since)
            .take(limit)
            .cloned()
            .collect())
    }
}
