use std::str::FromStr;
use std::time::Duration;

use chrono::FixedOffset;

use crate::error::ConfigError;
use crate::market::types::Instrument;
use crate::trigger::{TriggerProfile, breakout};

#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Database connection string.
    pub database_url: String,

    /// `APP_ENV=production` switches the logger to JSON lines.
    pub json_logs: bool,

    // =========================
    // Trigger configuration
    // =========================
    /// Threshold bundle, selected by `TRIGGER_PROFILE`.
    pub profile: TriggerProfile,

    /// Monitored instruments, in `WATCH_SYMBOLS` order.
    ///
    /// Entries are comma-separated; an entry may carry per-source aliases:
    /// `PETR4.SA|ticker=petr4.br,VALE3.SA`.
    pub instruments: Vec<Instrument>,

    /// Upper bound on quotes read into one trigger window.
    pub max_window_quotes: usize,

    // =========================
    // Source configuration
    // =========================
    pub chart_api_url: String,
    pub ticker_api_url: String,

    /// Offset of the ticker source's local timestamps.
    pub ticker_utc_offset: FixedOffset,

    /// Hard timeout for one adapter call; a timeout is a transient failure.
    pub fetch_timeout: Duration,

    /// How long a source stays unavailable after it signals rate limiting.
    pub rate_limit_cooldown: Duration,

    // =========================
    // Cycle / dispatch configuration
    // =========================
    /// Instruments processed concurrently within one cycle.
    pub worker_pool_size: usize,

    /// One quote is stored per instrument per cycle, so the interval must
    /// leave enough quotes in the profile window for every detector.
    pub cycle_interval: Duration,

    /// Deep-analysis service; without it escalations are only reported.
    pub analysis_url: Option<String>,
    pub analysis_timeout: Duration,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key lookup; unset keys take the defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let profile = match get("TRIGGER_PROFILE") {
            Some(name) => TriggerProfile::by_name(&name)?,
            None => TriggerProfile::default(),
        };

        let instruments = match get("WATCH_SYMBOLS") {
            Some(raw) => parse_instruments(&raw)?,
            None => Vec::new(),
        };

        let offset_minutes: i32 =
            parse_or("TICKER_UTC_OFFSET_MINUTES", get("TICKER_UTC_OFFSET_MINUTES"), 0)?;
        let ticker_utc_offset = offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "TICKER_UTC_OFFSET_MINUTES",
                value: offset_minutes.to_string(),
            })?;

        let cycle_interval = secs("CYCLE_INTERVAL_SECS", get("CYCLE_INTERVAL_SECS"), 60)?;
        check_cadence(&profile, cycle_interval)?;

        Ok(Self {
            database_url: get("DATABASE_URL")
                .unwrap_or_else(|| "sqlite://tripwire_dev.db?mode=rwc".to_string()),
            json_logs: get("APP_ENV").is_some_and(|v| v == "production"),

            profile,
            instruments,
            max_window_quotes: parse_or("MAX_WINDOW_QUOTES", get("MAX_WINDOW_QUOTES"), 20)?,

            chart_api_url: get("CHART_API_URL")
                .unwrap_or_else(|| "https://query1.finance.yahoo.com".to_string()),
            ticker_api_url: get("TICKER_API_URL")
                .unwrap_or_else(|| "https://stooq.com".to_string()),
            ticker_utc_offset,
            fetch_timeout: secs("FETCH_TIMEOUT_SECS", get("FETCH_TIMEOUT_SECS"), 30)?,
            rate_limit_cooldown: secs(
                "RATE_LIMIT_COOLDOWN_SECS",
                get("RATE_LIMIT_COOLDOWN_SECS"),
                60 * 60,
            )?,

            worker_pool_size: parse_or("WORKER_POOL_SIZE", get("WORKER_POOL_SIZE"), 4)?.max(1),
            cycle_interval,
            analysis_url: get("ANALYSIS_URL"),
            analysis_timeout: secs("ANALYSIS_TIMEOUT_SECS", get("ANALYSIS_TIMEOUT_SECS"), 120)?,
        })
    }
}

/// Parses `WATCH_SYMBOLS`: `SYMBOL[|source=alias...][,SYMBOL...]`.
pub fn parse_instruments(raw: &str) -> Result<Vec<Instrument>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            let mut parts = entry.split('|').map(str::trim);
            let symbol = parts
                .next()
                .filter(|s| !s.is_empty() && !s.contains('='))
                .ok_or_else(|| ConfigError::InvalidInstrument(entry.to_string()))?;

            parts.try_fold(Instrument::new(symbol), |instrument, alias| {
                let (source, remote) = alias
                    .split_once('=')
                    .map(|(s, r)| (s.trim(), r.trim()))
                    .filter(|(s, r)| !s.is_empty() && !r.is_empty())
                    .ok_or_else(|| ConfigError::InvalidInstrument(entry.to_string()))?;
                Ok(instrument.with_alias(source, remote))
            })
        })
        .collect()
}

/// Rejects an interval that keeps the window below the breakout minimum.
fn check_cadence(profile: &TriggerProfile, interval: Duration) -> Result<(), ConfigError> {
    let interval_secs = interval.as_secs();
    if interval_secs == 0 {
        return Err(ConfigError::InvalidValue {
            key: "CYCLE_INTERVAL_SECS",
            value: "0".into(),
        });
    }

    let window_secs = u64::from(profile.window_minutes) * 60;
    if window_secs / interval_secs < breakout::MIN_QUOTES as u64 {
        return Err(ConfigError::CadenceTooSlow {
            interval_secs,
            window_minutes: profile.window_minutes,
            min_quotes: breakout::MIN_QUOTES,
        });
    }
    Ok(())
}

fn parse_or<T: FromStr>(
    key: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value: v }),
    }
}

fn secs(key: &'static str, raw: Option<String>, default: u64) -> Result<Duration, ConfigError> {
    parse_or(key, raw, default).map(Duration::from_secs)
}
