use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use uuid::Uuid;

/// One trading day; signal records hang off it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TradingSession {
    pub session_id: Uuid,
    pub session_date: NaiveDate,
}

impl TradingSession {
    pub fn new(session_date: NaiveDate) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            session_date,
        }
    }
}

/// A signal written by the analysis pass, plus the escalation provenance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SignalRecord {
    pub signal_id: Uuid,
    pub session_id: Uuid,
    pub symbol: String,
    pub action: String,
    pub created_at: DateTime<Utc>,
    pub priority: bool,
    pub trigger_kinds: Vec<String>,
    pub triggered_at: Option<DateTime<Utc>>,
}

/// Trading sessions and the signal records the analysis pass produces.
#[async_trait]
pub trait SignalLedger: Send + Sync {
    /// Session for `date`, created on first use.
    async fn session_for(&self, date: NaiveDate) -> anyhow::Result<TradingSession>;

    /// Marks the newest signal of `symbol` in `session` as priority and
    /// records which trigger kinds caused it. `false` when there is none.
    async fn annotate_latest_signal(
        &self,
        session: &TradingSession,
        symbol: &str,
        kinds: &[&str],
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool>;
}

#[derive(Default)]
pub struct InMemorySignalLedger {
    sessions: Mutex<HashMap<NaiveDate, TradingSession>>,
    signals: Mutex<Vec<SignalRecord>>,
}

impl InMemorySignalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a fresh, unannotated signal record and returns its id.
    pub fn record_signal(
        &self,
        session: &TradingSession,
        symbol: &str,
        action: &str,
        created_at: DateTime<Utc>,
    ) -> Uuid {
        let signal_id = Uuid::new_v4();
        self.signals.lock().push(SignalRecord {
            signal_id,
            session_id: session.session_id,
            symbol: symbol.to_string(),
            action: action.to_string(),
            created_at,
            priority: false,
            trigger_kinds: Vec::new(),
            triggered_at: None,
        });
        signal_id
    }

    pub fn signal(&self, signal_id: Uuid) -> Option<SignalRecord> {
        self.signals
            .lock()
            .iter()
            .find(|s| s.signal_id == signal_id)
            .cloned()
    }

    pub fn session_count(&self) -> usize {
        self.sessions.lock().len()
    }
}

#[async_trait]
impl SignalLedger for InMemorySignalLedger {
    async fn session_for(&self, date: NaiveDate) -> anyhow::Result<TradingSession> {
        Ok(self
            .sessions
            .lock()
            .entry(date)
            .or_insert_with(|| TradingSession::new(date))
            .clone())
    }

    async fn annotate_latest_signal(
        &self,
        session: &TradingSession,
        symbol: &str,
        kinds: &[&str],
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let mut signals = self.signals.lock();
        let latest = signals
            .iter_mut()
            .filter(|s| s.session_id == session.session_id && s.symbol == symbol)
            .max_by_key(|s| s.created_at);

        Ok(match latest {
            Some(signal) => {
                signal.priority = true;
                signal.trigger_kinds = kinds.iter().map(|k| k.to_string()).collect();
                signal.triggered_at = Some(at);
                true
            }
            None => false,
        })
    }
}
