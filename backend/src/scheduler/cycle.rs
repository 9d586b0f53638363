//! One trigger cycle over every monitored instrument.
//!
//! Per instrument the steps are strictly sequential:
//! fetch (with fallback) -> append -> read window -> evaluate -> dispatch.
//! Instruments run concurrently, bounded by `worker_pool_size`. A failing
//! instrument only shows up in the report counts; the sweep always finishes.
//!
//! Cancellation is observed between fetch and append, so an abandoned
//! instrument never writes a partial result to the store.
//!
//! An escalated event whose latest quote was already dispatched successfully
//! is not dispatched again; a failed fetch re-evaluates the same window.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Semaphore, watch};
use tokio::task::JoinSet;
use tracing::{Instrument as _, debug, error, info, warn};

use crate::dispatch::{DispatchOutcome, EscalationDispatcher};
use crate::error::DispatchError;
use crate::market::orchestrator::SourceOrchestrator;
use crate::market::types::Instrument;
use crate::metrics::counters::Counters;
use crate::store::QuoteStore;
use crate::time::{Clock, SystemClock};
use crate::trigger::{TriggerEngine, TriggerEvent};
use common::logger::{TraceId, child_span, root_span};

pub const DEFAULT_WORKER_POOL_SIZE: usize = 4;

/// Counts for one sweep plus the events that had at least one signal.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub monitored_count: usize,
    pub fetch_ok: usize,
    pub fetch_failed: usize,
    pub event_count: usize,
    pub escalated_count: usize,
    pub dispatched: usize,
    pub dispatch_failed: usize,
    pub cancelled: usize,
    pub events: Vec<TriggerEvent>,
}

/// What happened to one instrument in one cycle.
#[derive(Debug)]
enum InstrumentOutcome {
    Cancelled,
    Done {
        fetched: bool,
        event: Option<TriggerEvent>,
        dispatch: Option<Result<DispatchOutcome, DispatchError>>,
    },
}

#[derive(Clone)]
pub struct TriggerCycle {
    orchestrator: Arc<SourceOrchestrator>,
    store: Arc<QuoteStore>,
    engine: Arc<TriggerEngine>,
    dispatcher: Option<Arc<EscalationDispatcher>>,
    instruments: Arc<Vec<Instrument>>,
    worker_pool_size: usize,
    counters: Counters,
    clock: Arc<dyn Clock>,
    /// Latest quote timestamp successfully dispatched, per symbol.
    last_dispatched: Arc<Mutex<HashMap<String, DateTime<Utc>>>>,
}

impl TriggerCycle {
    pub fn new(
        orchestrator: Arc<SourceOrchestrator>,
        store: Arc<QuoteStore>,
        engine: TriggerEngine,
        instruments: Vec<Instrument>,
    ) -> Self {
        Self {
            orchestrator,
            store,
            engine: Arc::new(engine),
            dispatcher: None,
            instruments: Arc::new(instruments),
            worker_pool_size: DEFAULT_WORKER_POOL_SIZE,
            counters: Counters::default(),
            clock: Arc::new(SystemClock),
            last_dispatched: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Without a dispatcher, escalations are reported but not acted upon.
    pub fn with_dispatcher(mut self, dispatcher: Arc<EscalationDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    pub fn with_worker_pool_size(mut self, size: usize) -> Self {
        self.worker_pool_size = size.max(1);
        self
    }

    pub fn with_counters(mut self, counters: Counters) -> Self {
        self.counters = counters;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Runs one sweep. `cancel` flipping to `true` stops instruments that
    /// have not yet written to the store.
    pub async fn run(&self, cancel: watch::Receiver<bool>) -> CycleReport {
        let trace_id = TraceId::new();
        let span = root_span("trigger_cycle", &trace_id);
        self.run_inner(cancel).instrument(span).await
    }

    async fn run_inner(&self, cancel: watch::Receiver<bool>) -> CycleReport {
        let permits = Arc::new(Semaphore::new(self.worker_pool_size));
        let mut tasks = JoinSet::new();

        info!(
            instruments = self.instruments.len(),
            workers = self.worker_pool_size,
            profile = %self.engine.profile().name,
            "trigger cycle started"
        );

        for instrument in self.instruments.iter().cloned() {
            let cycle = self.clone();
            let permits = permits.clone();
            let cancel = cancel.clone();
            let span = child_span("instrument", &instrument.symbol);

            tasks.spawn(
                async move {
                    // The semaphore is never closed, so acquire cannot fail.
                    let Ok(_permit) = permits.acquire_owned().await else {
                        return InstrumentOutcome::Cancelled;
                    };
                    cycle.process(&instrument, &cancel).await
                }
                .instrument(span),
            );
        }

        let mut report = CycleReport {
            monitored_count: self.instruments.len(),
            ..Default::default()
        };

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(outcome) => report.absorb(outcome),
                Err(e) => {
                    // A panicking instrument counts as a failed fetch.
                    error!(error = %e, "instrument task aborted");
                    report.fetch_failed += 1;
                }
            }
        }

        info!(
            fetch_ok = report.fetch_ok,
            fetch_failed = report.fetch_failed,
            events = report.event_count,
            escalated = report.escalated_count,
            dispatched = report.dispatched,
            dispatch_failed = report.dispatch_failed,
            cancelled = report.cancelled,
            "trigger cycle finished"
        );

        report
    }

    async fn process(
        &self,
        instrument: &Instrument,
        cancel: &watch::Receiver<bool>,
    ) -> InstrumentOutcome {
        if *cancel.borrow() {
            return InstrumentOutcome::Cancelled;
        }

        let fetched = self.orchestrator.fetch_with_fallback(instrument).await;

        if *cancel.borrow() {
            debug!("cancelled after fetch; nothing written");
            return InstrumentOutcome::Cancelled;
        }

        let fetched = match fetched {
            Ok(quote) => match self.store.append_quote(&quote).await {
                Ok(()) => true,
                Err(e) => {
                    warn!(error = %e, "fetched quote not stored");
                    false
                }
            },
            Err(e) => {
                warn!(error = %e, "fetch failed; evaluating stored window");
                false
            }
        };

        let lookback = self.engine.profile().lookback();
        let window = match self.store.window(&instrument.symbol, self.clock.now(), lookback).await {
            Ok(w) => w,
            Err(e) => {
                error!(error = %e, "window read failed; instrument skipped");
                return InstrumentOutcome::Done {
                    fetched,
                    event: None,
                    dispatch: None,
                };
            }
        };

        let event = self.engine.evaluate(&instrument.symbol, &window);
        if event.is_triggered() {
            self.counters.inc_triggers();
        }

        let dispatch = match (&self.dispatcher, event.escalate) {
            (Some(_), true) if self.already_dispatched(&instrument.symbol, event.timestamp) => {
                self.counters.inc_escalations();
                debug!(at = %event.timestamp, "latest quote already dispatched; skipping");
                None
            }
            (Some(dispatcher), true) => {
                self.counters.inc_escalations();
                let result = dispatcher.dispatch(&instrument.symbol, &event).await;
                match &result {
                    Ok(_) => {
                        self.last_dispatched
                            .lock()
                            .insert(instrument.symbol.clone(), event.timestamp);
                    }
                    Err(e) => {
                        self.counters.inc_dispatch_failed();
                        error!(error = %e, "escalation dispatch failed");
                    }
                }
                Some(result)
            }
            (None, true) => {
                self.counters.inc_escalations();
                info!("escalated; no dispatcher configured");
                None
            }
            _ => None,
        };

        InstrumentOutcome::Done {
            fetched,
            event: Some(event),
            dispatch,
        }
    }

    fn already_dispatched(&self, symbol: &str, at: DateTime<Utc>) -> bool {
        self.last_dispatched
            .lock()
            .get(symbol)
            .is_some_and(|last| *last >= at)
    }

    /// Repeats [`run`](Self::run) every `interval` until `cancel` becomes true.
    pub async fn run_forever(&self, mut cancel: watch::Receiver<bool>, interval: Duration) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        break;
                    }
                    continue;
                }
            }

            if *cancel.borrow() {
                break;
            }

            let report = self.run(cancel.clone()).await;
            debug!(
                events = report.event_count,
                health = ?self.orchestrator.health().snapshot(),
                "cycle report ready"
            );
        }

        info!("trigger loop stopped");
    }
}

impl CycleReport {
    fn absorb(&mut self, outcome: InstrumentOutcome) {
        let InstrumentOutcome::Done {
            fetched,
            event,
            dispatch,
        } = outcome
        else {
            self.cancelled += 1;
            return;
        };

        if fetched {
            self.fetch_ok += 1;
        } else {
            self.fetch_failed += 1;
        }

        match dispatch {
            Some(Ok(_)) => self.dispatched += 1,
            Some(Err(_)) => self.dispatch_failed += 1,
            None => {}
        }

        if let Some(event) = event.filter(TriggerEvent::is_triggered) {
            self.event_count += 1;
            if event.escalate {
                self.escalated_count += 1;
            }
            self.events.push(event);
        }
    }
}
