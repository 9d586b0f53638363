//! Quote window store: the validated boundary in front of the time series.
//!
//! Invalid quotes (non-positive prices, inverted high/low) are rejected here,
//! before they can reach any trigger window.

pub mod memory;
pub mod repository;
pub mod repository_sqlx;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument, warn};

use crate::error::StoreError;
use crate::market::types::NormalizedQuote;
use crate::metrics::counters::Counters;
use crate::trigger::TriggerWindow;
use common::logger::warn_if_slow;
use repository::QuoteRepository;

pub use memory::InMemoryQuoteRepository;
pub use repository_sqlx::SqlxQuoteRepository;

pub const DEFAULT_MAX_WINDOW_QUOTES: usize = 20;

pub struct QuoteStore {
    repo: Arc<dyn QuoteRepository>,
    max_window_quotes: usize,
    counters: Counters,
}

impl QuoteStore {
    pub fn new(repo: Arc<dyn QuoteRepository>) -> Self {
        Self {
            repo,
            max_window_quotes: DEFAULT_MAX_WINDOW_QUOTES,
            counters: Counters::default(),
        }
    }

    pub fn with_max_window_quotes(mut self, max: usize) -> Self {
        self.max_window_quotes = max.max(2);
        self
    }

    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    /// Validates and stores `quote`; a repeat of (symbol, timestamp, source) updates in place.
    #[instrument(
        skip(self, quote),
        target = "store",
        fields(symbol = %quote.symbol, source = %quote.source)
    )]
    pub async fn append_quote(&self, quote: &NormalizedQuote) -> Result<(), StoreError> {
        if let Err(reason) = quote.validate() {
            self.counters.inc_quotes_rejected();
            warn!(%reason, "rejecting invalid quote");
            return Err(StoreError::Invalid {
                symbol: quote.symbol.clone(),
                reason,
            });
        }

        warn_if_slow("store_append", Duration::from_millis(50), async {
            self.repo.upsert(quote).await
        })
        .await
        .context("failed to persist quote")?;

        debug!(ts = %quote.timestamp, close = %quote.close, "quote stored");
        Ok(())
    }

    /// Most-recent-first quotes for `symbol` since `since`, capped at the window size.
    #[instrument(skip(self), target = "store")]
    pub async fn recent_quotes(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<NormalizedQuote>, StoreError> {
        let quotes = warn_if_slow("store_recent", Duration::from_millis(100), async {
            self.repo
                .recent(symbol, since, self.max_window_quotes)
                .await
        })
        .await
        .with_context(|| format!("failed to load recent quotes for {symbol}"))?;

        debug!(count = quotes.len(), "recent quotes loaded");
        Ok(quotes)
    }

    /// Trigger window for `symbol`: quotes in `[now - lookback, now]`, newest first.
    pub async fn window(
        &self,
        symbol: &str,
        now: DateTime<Utc>,
        lookback: chrono::Duration,
    ) -> Result<TriggerWindow, StoreError> {
        let quotes = self.recent_quotes(symbol, now - lookback).await?;
        Ok(TriggerWindow::within(quotes, now, lookback, self.max_window_quotes))
    }
}
