use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::market::types::SourceId;

/// Health of one source as seen by the tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceStatus {
    Available,
    RateLimited { until: DateTime<Utc> },
}

/// Process-wide memory of which sources asked us to back off.
///
/// Entries expire lazily: a read that finds an expired marker reports the
/// source as available and drops the marker. There is no background sweep.
/// The marker is advisory; an available source may still fail.
#[derive(Default)]
pub struct SourceHealthTracker {
    rate_limited_until: Mutex<HashMap<SourceId, DateTime<Utc>>>,
}

impl SourceHealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_available(&self, source: &str) -> bool {
        self.is_available_at(source, Utc::now())
    }

    pub fn is_available_at(&self, source: &str, now: DateTime<Utc>) -> bool {
        let mut map = self.rate_limited_until.lock();
        match map.get(source) {
            None => true,
            Some(until) if *until <= now => {
                map.remove(source);
                debug!(source, "rate-limit marker expired");
                true
            }
            Some(_) => false,
        }
    }

    /// Marks `source` unavailable for `duration`, overwriting any previous marker.
    pub fn mark_unavailable(&self, source: &str, duration: Duration) {
        self.mark_unavailable_at(source, duration, Utc::now());
    }

    pub fn mark_unavailable_at(&self, source: &str, duration: Duration, now: DateTime<Utc>) {
        let until = chrono::Duration::from_std(duration)
            .ok()
            .and_then(|d| now.checked_add_signed(d))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        self.rate_limited_until
            .lock()
            .insert(source.to_string(), until);

        info!(source, until = %until, "source marked rate limited");
    }

    pub fn clear(&self, source: &str) {
        if self.rate_limited_until.lock().remove(source).is_some() {
            info!(source, "rate-limit marker cleared");
        }
    }

    /// Status of every source the tracker currently remembers.
    pub fn snapshot(&self) -> HashMap<SourceId, SourceStatus> {
        self.snapshot_at(Utc::now())
    }

    pub fn snapshot_at(&self, now: DateTime<Utc>) -> HashMap<SourceId, SourceStatus> {
        let mut map = self.rate_limited_until.lock();
        map.retain(|_, until| *until > now);
        map.iter()
            .map(|(source, until)| (source.clone(), SourceStatus::RateLimited { until: *until }))
            .collect()
    }

    /// Status for a specific set of sources, including ones never marked.
    pub fn status_of<'a>(
        &self,
        sources: impl IntoIterator<Item = &'a str>,
    ) -> HashMap<SourceId, SourceStatus> {
        let limited = self.snapshot();
        sources
            .into_iter()
            .map(|s| {
                let status = limited.get(s).copied().unwrap_or(SourceStatus::Available);
                (s.to_string(), status)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_800_000_000, 0).unwrap()
    }

    #[test]
    fn unknown_source_is_available() {
        let h = SourceHealthTracker::new();
        assert!(h.is_available_at("chart", t0()));
        assert!(h.snapshot_at(t0()).is_empty());
    }

    #[test]
    fn marker_blocks_until_expiry_then_clears_itself() {
        let h = SourceHealthTracker::new();
        h.mark_unavailable_at("chart", Duration::from_secs(3600), t0());

        assert!(!h.is_available_at("chart", t0() + chrono::Duration::minutes(59)));
        assert!(h.is_available_at("chart", t0() + chrono::Duration::minutes(60)));

        // The expired read removed the entry.
        assert!(h.snapshot_at(t0()).is_empty());
    }

    #[test]
    fn re_marking_overwrites_expiry() {
        let h = SourceHealthTracker::new();
        h.mark_unavailable_at("chart", Duration::from_secs(60), t0());
        h.mark_unavailable_at("chart", Duration::from_secs(600), t0());

        let snap = h.snapshot_at(t0());
        assert_eq!(
            snap.get("chart"),
            Some(&SourceStatus::RateLimited {
                until: t0() + chrono::Duration::seconds(600)
            })
        );
        assert!(!h.is_available_at("chart", t0() + chrono::Duration::seconds(61)));
    }

    #[test]
    fn clear_restores_availability() {
        let h = SourceHealthTracker::new();
        h.mark_unavailable("ticker", Duration::from_secs(3600));
        assert!(!h.is_available("ticker"));

        h.clear("ticker");
        assert!(h.is_available("ticker"));
    }

    #[test]
    fn status_of_reports_unmarked_sources() {
        let h = SourceHealthTracker::new();
        h.mark_unavailable("chart", Duration::from_secs(3600));

        let status = h.status_of(["chart", "ticker"]);
        assert!(matches!(status["chart"], SourceStatus::RateLimited { .. }));
        assert_eq!(status["ticker"], SourceStatus::Available);
    }

    #[test]
    fn concurrent_marks_and_reads_are_consistent() {
        let h = Arc::new(SourceHealthTracker::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let h = Arc::clone(&h);
                std::thread::spawn(move || {
                    for _ in 0..500 {
                        if i % 2 == 0 {
                            h.mark_unavailable("chart", Duration::from_secs(3600));
                        } else {
                            let _ = h.is_available("chart");
                        }
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().expect("thread panicked");
        }

        assert!(!h.is_available("chart"));
    }
}
