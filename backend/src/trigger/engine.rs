use tracing::{debug, info, instrument};

use super::{
    TriggerEvent, TriggerProfile, TriggerSignal, TriggerWindow, breakout, momentum, price_change,
    volume_spike,
};
use crate::time;

/// Stateless evaluator bound to one immutable profile.
#[derive(Clone, Debug, Default)]
pub struct TriggerEngine {
    profile: TriggerProfile,
}

impl TriggerEngine {
    pub fn new(profile: TriggerProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &TriggerProfile {
        &self.profile
    }

    /// Runs every detector against `window` and decides escalation.
    ///
    /// Never fails: a window with fewer than two quotes yields a quiet event
    /// stamped with the latest quote time (or now, for an empty window).
    #[instrument(
        skip(self, window),
        target = "trigger",
        fields(profile = %self.profile.name, quotes = window.len())
    )]
    pub fn evaluate(&self, symbol: &str, window: &TriggerWindow) -> TriggerEvent {
        let timestamp = window.latest().map(|q| q.timestamp).unwrap_or_else(time::now);
        if window.len() < 2 {
            debug!("not enough quotes to evaluate");
            return TriggerEvent::quiet(symbol, timestamp);
        }

        let p = &self.profile;
        let signals: Vec<TriggerSignal> = [
            price_change::detect(window, p.price_change_pct),
            volume_spike::detect(window, p.volume_spike_ratio),
            breakout::detect(window, p.breakout_pct),
            momentum::detect(window, p.momentum_pct),
        ]
        .into_iter()
        .flatten()
        .collect();

        let escalate = self.should_escalate(&signals);

        if signals.is_empty() {
            debug!("no detector fired");
        } else {
            let fired: Vec<String> = signals.iter().map(ToString::to_string).collect();
            info!(signals = ?fired, escalate, "trigger fired");
        }

        TriggerEvent {
            symbol: symbol.to_string(),
            timestamp,
            signals,
            escalate,
        }
    }

    /// A signal escalates only if it fired and clears its escalation bar:
    /// a price move, a volume spike backed by a price move, any breakout, or
    /// a momentum shift.
    fn should_escalate(&self, signals: &[TriggerSignal]) -> bool {
        let esc = &self.profile.escalation;

        let price_pct = signals.iter().find_map(|s| match s {
            TriggerSignal::PriceChange { percent, .. } => Some(percent.abs()),
            _ => None,
        });

        signals.iter().any(|s| match s {
            TriggerSignal::PriceChange { percent, .. } => percent.abs() >= esc.price_change_pct,
            TriggerSignal::VolumeSpike { ratio, .. } => {
                *ratio >= esc.volume_ratio
                    && price_pct.is_some_and(|pct| pct >= esc.volume_price_change_pct)
            }
            TriggerSignal::Breakout { .. } => true,
            TriggerSignal::MomentumShift { percent, .. } => percent.abs() >= esc.momentum_pct,
        })
    }
}
