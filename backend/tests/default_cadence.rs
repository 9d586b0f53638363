use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::watch;

use tripwire::config::AppConfig;
use tripwire::error::FetchError;
use tripwire::market::health::SourceHealthTracker;
use tripwire::market::orchestrator::SourceOrchestrator;
use tripwire::market::sources::QuoteSource;
use tripwire::market::types::{Instrument, NormalizedQuote};
use tripwire::scheduler::TriggerCycle;
use tripwire::store::{InMemoryQuoteRepository, QuoteStore};
use tripwire::time::Clock;
use tripwire::trigger::{BreakoutKind, TriggerEngine, TriggerSignal};

/// Wall clock that follows tokio's (paused) clock from a fixed start.
struct TokioClock {
    base: DateTime<Utc>,
    start: tokio::time::Instant,
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.start.elapsed()).unwrap();
        self.base + elapsed
    }
}

/// One bar per fetch, stamped with the current clock; repeats the last close when drained.
struct BarSource {
    clock: Arc<TokioClock>,
    closes: Mutex<VecDeque<Decimal>>,
    last: Mutex<Decimal>,
}

#[async_trait]
impl QuoteSource for BarSource {
    fn source_id(&self) -> &str {
        "chart"
    }

    fn priority(&self) -> i32 {
        1
    }

    async fn is_reachable(&self) -> bool {
        true
    }

    async fn fetch(&self, symbol: &str) -> Result<NormalizedQuote, FetchError> {
        let close = {
            let mut last = self.last.lock();
            if let Some(next) = self.closes.lock().pop_front() {
                *last = next;
            }
            *last
        };

        Ok(NormalizedQuote {
            symbol: symbol.to_string(),
            timestamp: self.clock.now(),
            open: None,
            high: None,
            low: None,
            close,
            volume: Some(10_000),
            source: "chart".into(),
        })
    }
}

#[tokio::test(start_paused = true)]
async fn default_config_collects_enough_quotes_for_a_breakout() {
    let cfg = AppConfig::from_lookup(|_| None).unwrap();

    let clock = Arc::new(TokioClock {
        base: Utc.with_ymd_and_hms(2026, 10, 16, 14, 0, 0).unwrap(),
        start: tokio::time::Instant::now(),
    });
    let mut closes: VecDeque<Decimal> = std::iter::repeat_n(dec!(38.00), 10).collect();
    closes.push_back(dec!(38.80));
    let source: Arc<dyn QuoteSource> = Arc::new(BarSource {
        clock: clock.clone(),
        closes: Mutex::new(closes),
        last: Mutex::new(dec!(38.00)),
    });

    let store = Arc::new(
        QuoteStore::new(Arc::new(InMemoryQuoteRepository::new()))
            .with_max_window_quotes(cfg.max_window_quotes),
    );
    let orchestrator = SourceOrchestrator::new(vec![source], Arc::new(SourceHealthTracker::new()));
    let cycle = TriggerCycle::new(
        Arc::new(orchestrator),
        store.clone(),
        TriggerEngine::new(cfg.profile.clone()),
        vec![Instrument::new("PETR4.SA")],
    )
    .with_clock(clock.clone());

    let mut reports = Vec::new();
    for _ in 0..11 {
        reports.push(cycle.run(watch::channel(false).1).await);
        tokio::time::sleep(cfg.cycle_interval).await;
    }

    let (last, earlier) = reports.split_last().unwrap();
    assert!(earlier.iter().all(|r| r.event_count == 0));
    assert_eq!(last.escalated_count, 1);

    let event = &last.events[0];
    let Some(TriggerSignal::Breakout { kind, level, price, .. }) = event.breakout() else {
        panic!("breakout missing: {:?}", event.signal_kinds());
    };
    assert_eq!(*kind, BreakoutKind::Resistance);
    assert_eq!(*level, dec!(38.00));
    assert_eq!(*price, dec!(38.80));

    // Ten minutes of one-minute cycles still sit inside the fifteen-minute window.
    let window = store
        .window("PETR4.SA", clock.now(), cfg.profile.lookback())
        .await
        .unwrap();
    assert_eq!(window.len(), 11);
}
