//! Latest close against the immediately previous close.

use rust_decimal::Decimal;

use super::{Direction, TriggerSignal, TriggerWindow, percent_change};

/// Fires when `|percent| >= threshold_pct`.
pub fn detect(window: &TriggerWindow, threshold_pct: Decimal) -> Option<TriggerSignal> {
    let latest = window.latest()?;
    let previous = window.prior().first()?;

    let percent = percent_change(latest.close, previous.close)?;
    if percent.abs() < threshold_pct {
        return None;
    }

    let direction = if percent > Decimal::ZERO {
        Direction::Up
    } else {
        Direction::Down
    };

    Some(TriggerSignal::PriceChange {
        percent,
        direction,
        at: latest.timestamp,
    })
}
