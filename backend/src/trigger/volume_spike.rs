//! Latest volume against the average of the preceding quotes.

use rust_decimal::Decimal;

use super::{TriggerSignal, TriggerWindow};

/// Quotes ranked 2nd..=10th most recent feed the baseline.
pub const BASELINE_DEPTH: usize = 9;
/// Fewer valid baseline volumes than this and the detector abstains.
pub const MIN_BASELINE_VOLUMES: usize = 3;

/// Fires when `latest / baseline_average >= threshold_ratio`.
pub fn detect(window: &TriggerWindow, threshold_ratio: Decimal) -> Option<TriggerSignal> {
    let latest = window.latest()?;
    let current = latest.valid_volume()?;

    let baseline: Vec<u64> = window
        .prior()
        .iter()
        .take(BASELINE_DEPTH)
        .filter_map(|q| q.valid_volume())
        .collect();

    if baseline.len() < MIN_BASELINE_VOLUMES {
        return None;
    }

    let total: Decimal = baseline.iter().map(|v| Decimal::from(*v)).sum();
    let average = total.checked_div(Decimal::from(baseline.len()))?;
    let ratio = Decimal::from(current).checked_div(average)?;

    if ratio < threshold_ratio {
        return None;
    }

    Some(TriggerSignal::VolumeSpike {
        ratio,
        current_volume: current,
        average_volume: average,
        at: latest.timestamp,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trigger::window::fixtures::volumes;
    use rust_decimal_macros::dec;

    #[test]
    fn three_valid_volumes_activate_the_detector() {
        let w = volumes(&[Some(3_000), Some(1_000), Some(1_000), Some(1_000)]);
        let sig = detect(&w, dec!(1.5)).unwrap();

        assert_eq!(
            sig,
            TriggerSignal::VolumeSpike {
                ratio: dec!(3),
                current_volume: 3_000,
                average_volume: dec!(1000),
                at: w.latest().unwrap().timestamp,
            }
        );
    }

    #[test]
    fn two_valid_volumes_always_abstain() {
        let w = volumes(&[Some(1_000_000), Some(10), None, Some(0), Some(10)]);
        assert!(detect(&w, dec!(0)).is_none());
    }

    #[test]
    fn baseline_stops_at_the_tenth_quote() {
        // An eleventh quote with a huge volume must not dilute the baseline.
        let mut v = vec![Some(2_000)];
        v.extend(std::iter::repeat_n(Some(1_000), 9));
        v.push(Some(1_000_000));

        let sig = detect(&volumes(&v), dec!(1.5)).unwrap();
        assert!(matches!(sig, TriggerSignal::VolumeSpike { ratio, .. } if ratio == dec!(2)));
    }

    #[test]
    fn missing_latest_volume_abstains() {
        let w = volumes(&[None, Some(1_000), Some(1_000), Some(1_000)]);
        assert!(detect(&w, dec!(0.1)).is_none());
    }

    #[test]
    fn below_threshold_stays_quiet() {
        let w = volumes(&[Some(1_400), Some(1_000), Some(1_000), Some(1_000)]);
        assert!(detect(&w, dec!(1.5)).is_none());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::trigger::window::fixtures::volumes;
    use proptest::prelude::*;

    fn baseline_and_shuffle() -> impl Strategy<Value = (Vec<u64>, Vec<u64>)> {
        prop::collection::vec(1u64..=5_000_000, 3..=9)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle()))
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(300))]
        #[test]
        fn ratio_ignores_baseline_order(
            latest in 1u64..=10_000_000,
            (baseline, shuffled) in baseline_and_shuffle(),
        ) {
            let window = |prior: &[u64]| {
                let mut v = vec![Some(latest)];
                v.extend(prior.iter().map(|x| Some(*x)));
                volumes(&v)
            };

            let a = detect(&window(&baseline), Decimal::ZERO);
            let b = detect(&window(&shuffled), Decimal::ZERO);

            match (a, b) {
                (
                    Some(TriggerSignal::VolumeSpike { ratio: ra, .. }),
                    Some(TriggerSignal::VolumeSpike { ratio: rb, .. }),
                ) => prop_assert_eq!(ra, rb),
                other => prop_assert!(false, "expected two spikes, got {:?}", other),
            }
        }
    }
}
