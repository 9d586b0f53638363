//! Escalation dispatch: out-of-schedule deep analysis for escalated triggers.
//!
//! Every failure is returned to the caller as a [`DispatchError`] for that
//! one instrument; nothing here aborts a cycle.

pub mod analysis;
pub mod ledger;
pub mod ledger_sqlx;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::error::DispatchError;
use crate::time;
use crate::trigger::TriggerEvent;
use common::logger::warn_if_slow;

pub use analysis::{AnalysisOutcome, DeepAnalysis, HttpDeepAnalysis};
pub use ledger::{InMemorySignalLedger, SignalLedger, SignalRecord, TradingSession};
pub use ledger_sqlx::SqlxSignalLedger;

pub const DEFAULT_ANALYSIS_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Buy or sell. `annotated` is false when no signal record was found.
    Actionable {
        action: AnalysisOutcome,
        annotated: bool,
    },
    /// Hold or no signal; not an error.
    NoSignal { action: AnalysisOutcome },
}

pub struct EscalationDispatcher {
    analysis: Arc<dyn DeepAnalysis>,
    ledger: Arc<dyn SignalLedger>,
    timeout: Duration,
}

impl EscalationDispatcher {
    pub fn new(analysis: Arc<dyn DeepAnalysis>, ledger: Arc<dyn SignalLedger>) -> Self {
        Self {
            analysis,
            ledger,
            timeout: DEFAULT_ANALYSIS_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs deep analysis for `symbol` in today's session and, on an
    /// actionable result, annotates the newest signal with the fired kinds.
    #[instrument(skip(self, event), target = "dispatch", fields(signals = ?event.signal_kinds()))]
    pub async fn dispatch(
        &self,
        symbol: &str,
        event: &TriggerEvent,
    ) -> Result<DispatchOutcome, DispatchError> {
        if !event.escalate {
            return Err(DispatchError::NotEscalated(symbol.to_string()));
        }

        let session = self
            .ledger
            .session_for(time::session_date(time::now()))
            .await
            .map_err(|e| DispatchError::Session(format!("{e:#}")))?;

        let analysis = warn_if_slow(
            "deep_analysis",
            Duration::from_secs(30),
            tokio::time::timeout(self.timeout, self.analysis.analyze(symbol, &session)),
        )
        .await;

        let action = match analysis {
            Ok(Ok(action)) => action,
            Ok(Err(e)) => {
                return Err(DispatchError::Analysis {
                    symbol: symbol.to_string(),
                    reason: format!("{e:#}"),
                });
            }
            Err(_) => {
                return Err(DispatchError::Analysis {
                    symbol: symbol.to_string(),
                    reason: format!("timed out after {}s", self.timeout.as_secs()),
                });
            }
        };

        if !action.is_actionable() {
            info!(action = action.as_str(), "escalation produced no signal");
            return Ok(DispatchOutcome::NoSignal { action });
        }

        let annotated = self
            .ledger
            .annotate_latest_signal(&session, symbol, &event.signal_kinds(), time::now())
            .await
            .map_err(|e| DispatchError::Annotation {
                symbol: symbol.to_string(),
                reason: format!("{e:#}"),
            })?;

        if annotated {
            info!(action = action.as_str(), "escalated signal annotated");
        } else {
            warn!(action = action.as_str(), "actionable outcome without a signal record");
        }

        Ok(DispatchOutcome::Actionable { action, annotated })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::{Direction, TriggerSignal};
    use async_trait::async_trait;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    /// Writes a signal for actionable outcomes, like the real analysis service.
    struct ScriptedAnalysis {
        outcome: anyhow::Result<AnalysisOutcome>,
        ledger: Arc<InMemorySignalLedger>,
    }

    #[async_trait]
    impl DeepAnalysis for ScriptedAnalysis {
        async fn analyze(
            &self,
            symbol: &str,
            session: &TradingSession,
        ) -> anyhow::Result<AnalysisOutcome> {
            match &self.outcome {
                Ok(action) => {
                    if action.is_actionable() {
                        self.ledger
                            .record_signal(session, symbol, action.as_str(), Utc::now());
                    }
                    Ok(*action)
                }
                Err(e) => Err(anyhow::anyhow!("{e}")),
            }
        }
    }

    fn escalated() -> TriggerEvent {
        let at = Utc::now();
        TriggerEvent {
            symbol: "VALE3".into(),
            timestamp: at,
            signals: vec![TriggerSignal::PriceChange {
                percent: dec!(2.4),
                direction: Direction::Up,
                at,
            }],
            escalate: true,
        }
    }

    fn dispatcher(
        outcome: anyhow::Result<AnalysisOutcome>,
    ) -> (Arc<InMemorySignalLedger>, EscalationDispatcher) {
        let ledger = Arc::new(InMemorySignalLedger::new());
        let analysis = Arc::new(ScriptedAnalysis {
            outcome,
            ledger: ledger.clone(),
        });
        (ledger.clone(), EscalationDispatcher::new(analysis, ledger))
    }

    #[tokio::test]
    async fn actionable_outcome_annotates_signal() {
        let (ledger, d) = dispatcher(Ok(AnalysisOutcome::Buy));

        let out = d.dispatch("VALE3", &escalated()).await.unwrap();

        assert_eq!(
            out,
            DispatchOutcome::Actionable {
                action: AnalysisOutcome::Buy,
                annotated: true
            }
        );
        assert_eq!(ledger.session_count(), 1);
    }

    #[tokio::test]
    async fn hold_is_no_signal_not_error() {
        let (_ledger, d) = dispatcher(Ok(AnalysisOutcome::Hold));

        let out = d.dispatch("VALE3", &escalated()).await.unwrap();
        assert_eq!(
            out,
            DispatchOutcome::NoSignal {
                action: AnalysisOutcome::Hold
            }
        );
    }

    #[tokio::test]
    async fn analysis_failure_is_reported() {
        let (_ledger, d) = dispatcher(Err(anyhow::anyhow!("model offline")));

        let err = d.dispatch("VALE3", &escalated()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Analysis { ref reason, .. } if reason.contains("model offline")
        ));
    }

    #[tokio::test]
    async fn non_escalated_event_is_refused() {
        let (ledger, d) = dispatcher(Ok(AnalysisOutcome::Buy));
        let mut ev = escalated();
        ev.escalate = false;

        let err = d.dispatch("VALE3", &ev).await.unwrap_err();
        assert!(matches!(err, DispatchError::NotEscalated(_)));
        assert_eq!(ledger.session_count(), 0);
    }
}
