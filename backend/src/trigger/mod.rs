//! Price-anomaly triggers.
//!
//! Four independent detectors look at a most-recent-first window of quotes
//! and each either abstains or fires a [`TriggerSignal`]. The engine folds
//! them into one [`TriggerEvent`] and decides whether the move warrants an
//! out-of-schedule deep analysis.

pub mod breakout;
pub mod engine;
pub mod momentum;
pub mod price_change;
pub mod profile;
pub mod volume_spike;
pub mod window;

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

pub use engine::TriggerEngine;
pub use profile::{EscalationThresholds, TriggerProfile};
pub use window::TriggerWindow;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumDirection {
    AcceleratingUp,
    AcceleratingDown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreakoutKind {
    Resistance,
    Support,
}

/// One fired detector. `at` is the timestamp of the quote that fired it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "signal", rename_all = "snake_case")]
pub enum TriggerSignal {
    PriceChange {
        percent: Decimal,
        direction: Direction,
        at: DateTime<Utc>,
    },
    VolumeSpike {
        ratio: Decimal,
        current_volume: u64,
        average_volume: Decimal,
        at: DateTime<Utc>,
    },
    Breakout {
        kind: BreakoutKind,
        level: Decimal,
        price: Decimal,
        at: DateTime<Utc>,
    },
    MomentumShift {
        percent: Decimal,
        direction: MomentumDirection,
        at: DateTime<Utc>,
    },
}

impl TriggerSignal {
    /// Stable label used in logs and in the signal provenance trail.
    pub fn kind(&self) -> &'static str {
        match self {
            TriggerSignal::PriceChange { .. } => "price_change",
            TriggerSignal::VolumeSpike { .. } => "volume_spike",
            TriggerSignal::Breakout {
                kind: BreakoutKind::Resistance,
                ..
            } => "resistance_breakout",
            TriggerSignal::Breakout {
                kind: BreakoutKind::Support,
                ..
            } => "support_breakdown",
            TriggerSignal::MomentumShift { .. } => "momentum_shift",
        }
    }

    pub fn at(&self) -> DateTime<Utc> {
        match self {
            TriggerSignal::PriceChange { at, .. }
            | TriggerSignal::VolumeSpike { at, .. }
            | TriggerSignal::Breakout { at, .. }
            | TriggerSignal::MomentumShift { at, .. } => *at,
        }
    }
}

impl fmt::Display for TriggerSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerSignal::PriceChange { percent, .. } => {
                write!(f, "price_change {:+}%", percent.round_dp(2))
            }
            TriggerSignal::VolumeSpike { ratio, .. } => {
                write!(f, "volume_spike x{}", ratio.round_dp(2))
            }
            TriggerSignal::Breakout { level, price, .. } => {
                write!(f, "{} {} vs {}", self.kind(), price, level.round_dp(4))
            }
            TriggerSignal::MomentumShift { percent, .. } => {
                write!(f, "momentum_shift {:+}%", percent.round_dp(2))
            }
        }
    }
}

/// Result of one evaluation. Signals keep detector order:
/// price change, volume spike, breakout, momentum.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub signals: Vec<TriggerSignal>,
    pub escalate: bool,
}

impl TriggerEvent {
    pub fn quiet(symbol: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp,
            signals: Vec::new(),
            escalate: false,
        }
    }

    pub fn is_triggered(&self) -> bool {
        !self.signals.is_empty()
    }

    pub fn signal_kinds(&self) -> Vec<&'static str> {
        self.signals.iter().map(TriggerSignal::kind).collect()
    }

    pub fn price_change(&self) -> Option<&TriggerSignal> {
        self.signals
            .iter()
            .find(|s| matches!(s, TriggerSignal::PriceChange { .. }))
    }

    pub fn volume_spike(&self) -> Option<&TriggerSignal> {
        self.signals
            .iter()
            .find(|s| matches!(s, TriggerSignal::VolumeSpike { .. }))
    }

    pub fn breakout(&self) -> Option<&TriggerSignal> {
        self.signals
            .iter()
            .find(|s| matches!(s, TriggerSignal::Breakout { .. }))
    }

    pub fn momentum_shift(&self) -> Option<&TriggerSignal> {
        self.signals
            .iter()
            .find(|s| matches!(s, TriggerSignal::MomentumShift { .. }))
    }
}

/// `(latest - reference) / reference * 100`; `None` for a non-positive reference.
pub(crate) fn percent_change(latest: Decimal, reference: Decimal) -> Option<Decimal> {
    if reference <= Decimal::ZERO {
        return None;
    }
    (latest - reference)
        .checked_div(reference)
        .and_then(|r| r.checked_mul(Decimal::ONE_HUNDRED))
}
