//! Support/resistance breakout against the range of prior closes.

use rust_decimal::Decimal;

use super::{BreakoutKind, TriggerSignal, TriggerWindow};

pub const MIN_QUOTES: usize = 10;
pub const MIN_PRIOR_CLOSES: usize = 5;

/// Resistance is the highest prior close, support the lowest. The latest
/// close must clear the level by `threshold_pct` percent. Resistance is
/// checked first, so at most one kind fires.
pub fn detect(window: &TriggerWindow, threshold_pct: Decimal) -> Option<TriggerSignal> {
    if window.len() < MIN_QUOTES {
        return None;
    }
    let latest = window.latest()?;

    let prior: Vec<Decimal> = window
        .prior()
        .iter()
        .map(|q| q.close)
        .filter(|c| *c > Decimal::ZERO)
        .collect();
    if prior.len() < MIN_PRIOR_CLOSES {
        return None;
    }

    let resistance = prior.iter().copied().max()?;
    let support = prior.iter().copied().min()?;
    let margin = threshold_pct / Decimal::ONE_HUNDRED;
    let price = latest.close;

    let (kind, level) = if price >= resistance * (Decimal::ONE + margin) {
        (BreakoutKind::Resistance, resistance)
    } else if price <= support * (Decimal::ONE - margin) {
        (BreakoutKind::Support, support)
    } else {
        return None;
    };

    Some(TriggerSignal::Breakout {
        kind,
        level,
        price,
        at: latest.timestamp,
    })
}
