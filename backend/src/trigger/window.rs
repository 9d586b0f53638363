use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

use crate::market::types::NormalizedQuote;

/// Most-recent-first quotes for one instrument.
///
/// Built transiently for a single evaluation. Construction re-sorts by
/// timestamp so detectors can rely on index 0 being the latest quote.
#[derive(Clone, Debug, Default)]
pub struct TriggerWindow {
    quotes: Vec<NormalizedQuote>,
}

impl TriggerWindow {
    pub fn new(mut quotes: Vec<NormalizedQuote>) -> Self {
        quotes.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Self { quotes }
    }

    /// Keeps only quotes inside `[now - lookback, now]`, capped at `max` entries.
    pub fn within(
        quotes: Vec<NormalizedQuote>,
        now: DateTime<Utc>,
        lookback: Duration,
        max: usize,
    ) -> Self {
        let since = now - lookback;
        let mut window = Self::new(
            quotes
                .into_iter()
                .filter(|q| q.timestamp >= since && q.timestamp <= now)
                .collect(),
        );
        window.quotes.truncate(max);
        window
    }

    pub fn len(&self) -> usize {
        self.quotes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.quotes.is_empty()
    }

    pub fn latest(&self) -> Option<&NormalizedQuote> {
        self.quotes.first()
    }

    /// Everything except the latest quote, newest first.
    pub fn prior(&self) -> &[NormalizedQuote] {
        self.quotes.get(1..).unwrap_or(&[])
    }

    /// Usable (positive) closes, newest first.
    pub fn closes(&self) -> impl Iterator<Item = Decimal> + '_ {
        self.quotes
            .iter()
            .map(|q| q.close)
            .filter(|c| *c > Decimal::ZERO)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 16, 15, 0, 0).unwrap()
    }

    /// Quote `minutes_ago` minutes before [`t0`].
    pub fn quote(minutes_ago: i64, close: Decimal, volume: Option<u64>) -> NormalizedQuote {
        NormalizedQuote {
            symbol: "PETR4".into(),
            timestamp: t0() - Duration::minutes(minutes_ago),
            open: None,
            high: None,
            low: None,
            close,
            volume,
            source: "chart".into(),
        }
    }

    /// Window from closes listed newest first, one minute apart, flat volume.
    pub fn closes(closes: &[Decimal]) -> TriggerWindow {
        TriggerWindow::new(
            closes
                .iter()
                .enumerate()
                .map(|(i, c)| quote(i as i64, *c, Some(1_000)))
                .collect(),
        )
    }

    /// Window from volumes listed newest first, flat close.
    pub fn volumes(volumes: &[Option<u64>]) -> TriggerWindow {
        TriggerWindow::new(
            volumes
                .iter()
                .enumerate()
                .map(|(i, v)| quote(i as i64, Decimal::ONE_HUNDRED, *v))
                .collect(),
        )
    }
}
