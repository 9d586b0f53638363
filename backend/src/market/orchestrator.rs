//! Source selection with fallback.
//!
//! Candidates are the sources that the health tracker reports available and
//! whose reachability probe succeeds, ordered by descending static priority.
//! The first successful fetch wins. Only an explicit rate-limit signal changes
//! source health; every other failure just moves on to the next candidate.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tracing::{Instrument as _, debug, info, info_span, instrument, warn};

use crate::error::{FetchError, OrchestratorError};
use crate::market::health::SourceHealthTracker;
use crate::market::sources::QuoteSource;
use crate::market::types::{Instrument, NormalizedQuote, SourceId};
use crate::metrics::counters::Counters;
use common::logger::warn_if_slow;

pub const DEFAULT_RATE_LIMIT_COOLDOWN: Duration = Duration::from_secs(60 * 60);
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

pub struct SourceOrchestrator {
    sources: Vec<Arc<dyn QuoteSource>>,
    health: Arc<SourceHealthTracker>,
    cooldown: Duration,
    fetch_timeout: Duration,
    counters: Counters,
}

impl SourceOrchestrator {
    pub fn new(sources: Vec<Arc<dyn QuoteSource>>, health: Arc<SourceHealthTracker>) -> Self {
        Self {
            sources,
            health,
            cooldown: DEFAULT_RATE_LIMIT_COOLDOWN,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            counters: Counters::default(),
        }
    }

    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    pub fn health(&self) -> &Arc<SourceHealthTracker> {
        &self.health
    }

    /// Registered sources in registration order.
    pub fn sources(&self) -> &[Arc<dyn QuoteSource>] {
        &self.sources
    }

    /// Available and reachable sources, highest priority first.
    async fn candidates(&self) -> Vec<Arc<dyn QuoteSource>> {
        let available: Vec<_> = self
            .sources
            .iter()
            .filter(|s| self.health.is_available(s.source_id()))
            .cloned()
            .collect();

        let probes = join_all(available.iter().map(|s| s.is_reachable())).await;

        let mut out: Vec<_> = available
            .into_iter()
            .zip(probes)
            .filter_map(|(s, reachable)| {
                if !reachable {
                    debug!(source = s.source_id(), "source unreachable; skipping");
                }
                reachable.then_some(s)
            })
            .collect();

        // Stable sort keeps registration order between equal priorities.
        out.sort_by_key(|s| std::cmp::Reverse(s.priority()));
        out
    }

    /// Fetches a quote for `instrument` from the best usable source.
    ///
    /// The returned quote carries the canonical symbol and the id of the
    /// source that served it. Exhaustion is reported, never retried here.
    #[instrument(skip(self, instrument), fields(symbol = %instrument.symbol))]
    pub async fn fetch_with_fallback(
        &self,
        instrument: &Instrument,
    ) -> Result<NormalizedQuote, OrchestratorError> {
        let candidates = self.candidates().await;
        let mut failures: Vec<(SourceId, FetchError)> = Vec::new();

        for (attempt, source) in candidates.iter().enumerate() {
            let source_id = source.source_id().to_string();

            match self.fetch_one(source.as_ref(), instrument).await {
                Ok(quote) => {
                    self.counters.inc_fetch_ok();
                    if attempt > 0 {
                        self.counters.inc_fallback();
                        info!(source = %source_id, attempt, "served by fallback source");
                    }
                    return Ok(quote);
                }
                Err(err) => {
                    if matches!(err, FetchError::RateLimited(_)) {
                        self.health.mark_unavailable(&source_id, self.cooldown);
                        self.counters.inc_rate_limited();
                    }
                    warn!(
                        source = %source_id,
                        kind = err.kind(),
                        error = %err,
                        "source failed; trying next candidate"
                    );
                    failures.push((source_id, err));
                }
            }
        }

        self.counters.inc_fetch_failed();
        warn!(attempted = failures.len(), "all sources failed");

        Err(OrchestratorError::AllSourcesFailed {
            symbol: instrument.symbol.clone(),
            failures,
        })
    }

    /// Forces a single source, bypassing health and reachability (diagnostics).
    ///
    /// A rate-limit answer is still recorded in the health tracker.
    #[instrument(skip(self, instrument), fields(symbol = %instrument.symbol))]
    pub async fn fetch_from(
        &self,
        source_id: &str,
        instrument: &Instrument,
    ) -> Result<NormalizedQuote, OrchestratorError> {
        let source = self
            .sources
            .iter()
            .find(|s| s.source_id() == source_id)
            .ok_or_else(|| OrchestratorError::UnknownSource(source_id.to_string()))?;

        self.fetch_one(source.as_ref(), instrument)
            .await
            .map_err(|error| {
                if matches!(error, FetchError::RateLimited(_)) {
                    self.health.mark_unavailable(source_id, self.cooldown);
                }
                OrchestratorError::SourceFailed {
                    source_id: source_id.to_string(),
                    error,
                }
            })
    }

    /// One adapter call under the fetch timeout; the quote gets the canonical symbol.
    async fn fetch_one(
        &self,
        source: &dyn QuoteSource,
        instrument: &Instrument,
    ) -> Result<NormalizedQuote, FetchError> {
        let source_id = source.source_id();
        let remote_symbol = instrument.symbol_for(source_id);
        let span = info_span!("source_fetch", source = %source_id, remote_symbol = %remote_symbol);

        let call = warn_if_slow(
            "source_fetch",
            Duration::from_secs(5),
            tokio::time::timeout(self.fetch_timeout, source.fetch(remote_symbol)),
        )
        .instrument(span);

        let mut quote = match call.await {
            Ok(result) => result?,
            Err(_) => {
                return Err(FetchError::Transient(format!(
                    "timed out after {}s",
                    self.fetch_timeout.as_secs_f64()
                )));
            }
        };

        quote.symbol = instrument.symbol.clone();
        quote.source = source_id.to_string();
        Ok(quote)
    }
}
