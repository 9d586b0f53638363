//! Named threshold bundles.
//!
//! A profile is plain data selected once by name; the engine never mutates
//! it. Every threshold in `aggressive` is <= the matching one in `default`,
//! which is <= the one in `conservative`.

use chrono::Duration;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Serialize;

use crate::error::ConfigError;

pub const PROFILE_NAMES: [&str; 3] = ["aggressive", "default", "conservative"];

/// Extra bar a fired signal must clear before it escalates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EscalationThresholds {
    /// Fired price change with `|percent| >=` this escalates.
    pub price_change_pct: Decimal,
    /// Fired volume spike with `ratio >=` this escalates, provided the
    /// price change also fired with `|percent| >= volume_price_change_pct`.
    pub volume_ratio: Decimal,
    pub volume_price_change_pct: Decimal,
    /// Fired momentum shift with `|percent| >=` this escalates.
    pub momentum_pct: Decimal,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TriggerProfile {
    pub name: String,
    pub price_change_pct: Decimal,
    pub volume_spike_ratio: Decimal,
    pub breakout_pct: Decimal,
    pub momentum_pct: Decimal,
    pub escalation: EscalationThresholds,
    pub window_minutes: u32,
}

impl TriggerProfile {
    pub fn aggressive() -> Self {
        Self {
            name: "aggressive".into(),
            price_change_pct: dec!(1.5),
            volume_spike_ratio: dec!(1.3),
            breakout_pct: dec!(0.75),
            momentum_pct: dec!(1.0),
            escalation: EscalationThresholds {
                price_change_pct: dec!(1.5),
                volume_ratio: dec!(1.5),
                volume_price_change_pct: dec!(0.75),
                momentum_pct: dec!(1.5),
            },
            window_minutes: 10,
        }
    }

    pub fn conservative() -> Self {
        Self {
            name: "conservative".into(),
            price_change_pct: dec!(3.0),
            volume_spike_ratio: dec!(2.0),
            breakout_pct: dec!(1.5),
            momentum_pct: dec!(2.0),
            escalation: EscalationThresholds {
                price_change_pct: dec!(2.5),
                volume_ratio: dec!(2.5),
                volume_price_change_pct: dec!(1.5),
                momentum_pct: dec!(2.5),
            },
            window_minutes: 20,
        }
    }

    pub fn by_name(name: &str) -> Result<Self, ConfigError> {
        match name.trim().to_ascii_lowercase().as_str() {
            "aggressive" => Ok(Self::aggressive()),
            "default" | "" => Ok(Self::default()),
            "conservative" => Ok(Self::conservative()),
            other => Err(ConfigError::UnknownProfile(other.to_string())),
        }
    }

    pub fn all() -> Vec<Self> {
        vec![Self::aggressive(), Self::default(), Self::conservative()]
    }

    pub fn lookback(&self) -> Duration {
        Duration::minutes(i64::from(self.window_minutes))
    }

    /// True when every threshold here is <= the matching one in `other`.
    pub fn is_looser_or_equal(&self, other: &Self) -> bool {
        let (a, b) = (&self.escalation, &other.escalation);
        self.price_change_pct <= other.price_change_pct
            && self.volume_spike_ratio <= other.volume_spike_ratio
            && self.breakout_pct <= other.breakout_pct
            && self.momentum_pct <= other.momentum_pct
            && a.price_change_pct <= b.price_change_pct
            && a.volume_ratio <= b.volume_ratio
            && a.volume_price_change_pct <= b.volume_price_change_pct
            && a.momentum_pct <= b.momentum_pct
    }
}

impl Default for TriggerProfile {
    fn default() -> Self {
        Self {
            name: "default".into(),
            price_change_pct: dec!(2.0),
            volume_spike_ratio: dec!(1.5),
            breakout_pct: dec!(1.0),
            momentum_pct: dec!(1.5),
            escalation: EscalationThresholds {
                price_change_pct: dec!(1.8),
                volume_ratio: dec!(2.0),
                volume_price_change_pct: dec!(1.0),
                momentum_pct: dec!(2.0),
            },
            window_minutes: 15,
        }
    }
}
