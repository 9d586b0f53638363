use chrono::{DateTime, NaiveDate, Utc};

/// Current wall-clock time in the canonical timezone (UTC).
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Calendar day used to key trading sessions.
pub fn session_date(at: DateTime<Utc>) -> NaiveDate {
    at.date_naive()
}

/// "Now" as seen by the trigger cycle when it cuts the lookback window.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        now()
    }
}
