//! Short moving average against the one just before it.

use rust_decimal::Decimal;

use super::{MomentumDirection, TriggerSignal, TriggerWindow, percent_change};

/// Closes per moving average; two averages need twice this many.
pub const MA_LEN: usize = 3;

/// MA1 is the mean of the 3 newest closes, MA2 of the next 3.
/// Fires when `|(MA1 - MA2) / MA2 * 100| >= threshold_pct`.
pub fn detect(window: &TriggerWindow, threshold_pct: Decimal) -> Option<TriggerSignal> {
    let latest = window.latest()?;
    let closes: Vec<Decimal> = window.closes().take(MA_LEN * 2).collect();
    if closes.len() < MA_LEN * 2 {
        return None;
    }

    let (recent, older) = closes.split_at(MA_LEN);
    let ma1 = mean(recent)?;
    let ma2 = mean(older)?;

    let percent = percent_change(ma1, ma2)?;
    if percent.abs() < threshold_pct {
        return None;
    }

    let direction = if percent > Decimal::ZERO {
        MomentumDirection::AcceleratingUp
    } else {
        MomentumDirection::AcceleratingDown
    };

    Some(TriggerSignal::MomentumShift {
        percent,
        direction,
        at: latest.timestamp,
    })
}

fn mean(values: &[Decimal]) -> Option<Decimal> {
    let sum: Decimal = values.iter().copied().sum();
    sum.checked_div(Decimal::from(values.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::window::fixtures::closes;
    use rust_decimal_macros::dec;

    #[test]
    fn rising_averages_accelerate_up() {
        // MA1 = 103, MA2 = 100
        let w = closes(&[dec!(104), dec!(103), dec!(102), dec!(100), dec!(100), dec!(100)]);
        let sig = detect(&w, dec!(1.5)).unwrap();

        assert!(matches!(
            sig,
            TriggerSignal::MomentumShift {
                direction: MomentumDirection::AcceleratingUp,
                percent,
                ..
            } if percent == dec!(3)
        ));
    }

    #[test]
    fn falling_averages_accelerate_down() {
        let w = closes(&[dec!(96), dec!(97), dec!(98), dec!(100), dec!(100), dec!(100)]);
        let sig = detect(&w, dec!(1.5)).unwrap();
        assert!(matches!(
            sig,
            TriggerSignal::MomentumShift {
                direction: MomentumDirection::AcceleratingDown,
                ..
            }
        ));
    }

    #[test]
    fn five_closes_abstain_regardless_of_magnitude() {
        let w = closes(&[dec!(1000), dec!(900), dec!(10), dec!(1), dec!(1)]);
        assert!(detect(&w, dec!(0)).is_none());
    }

    #[test]
    fn only_the_six_newest_closes_count() {
        let w = closes(&[
            dec!(100), dec!(100), dec!(100), dec!(100), dec!(100), dec!(100), dec!(1),
        ]);
        assert!(detect(&w, dec!(0.01)).is_none());
    }
}
