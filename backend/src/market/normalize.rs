//! Conversion of source-specific number and time formats into canonical form.

use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Markers sources use for "no value".
const EMPTY_MARKERS: [&str; 4] = ["", "-", "N/D", "n/a"];

/// Parses a decimal written with either separator convention.
///
/// Accepted: `1234.56`, `1234,56`, `1,234.56`, `1.234,56`, `1.234.567`,
/// `1,234,567`, scientific notation. When both separators appear the last one
/// is the decimal point. A single lone comma is a decimal comma.
pub fn parse_decimal(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}' && *c != '\'')
        .collect();

    if EMPTY_MARKERS.iter().any(|m| m.eq_ignore_ascii_case(&cleaned)) {
        return None;
    }

    let commas = cleaned.matches(',').count();
    let dots = cleaned.matches('.').count();

    let canonical = match (commas, dots) {
        (0, 0) | (0, 1) => cleaned,
        (0, _) => cleaned.replace('.', ""),
        (1, 0) => cleaned.replace(',', "."),
        (_, 0) => cleaned.replace(',', ""),
        _ => {
            let last_comma = cleaned.rfind(',')?;
            let last_dot = cleaned.rfind('.')?;
            if last_comma > last_dot {
                cleaned.replace('.', "").replace(',', ".")
            } else {
                cleaned.replace(',', "")
            }
        }
    };

    Decimal::from_str(&canonical)
        .or_else(|_| Decimal::from_scientific(&canonical))
        .ok()
}

/// Decimal from a JSON value (number or localized string).
///
/// Numbers go through their shortest textual form so a JSON `104.5` becomes
/// exactly `104.5`.
pub fn decimal_from_json(value: &serde_json::Value) -> Option<Decimal> {
    match value {
        serde_json::Value::Number(n) => {
            let text = n.to_string();
            Decimal::from_str(&text)
                .or_else(|_| Decimal::from_scientific(&text))
                .ok()
        }
        serde_json::Value::String(s) => parse_decimal(s),
        _ => None,
    }
}

/// Positive price or nothing; zero and negative prices are treated as absent.
pub fn positive(value: Option<Decimal>) -> Option<Decimal> {
    value.filter(|v| *v > Decimal::ZERO)
}

/// Volume as a whole, non-negative count.
pub fn volume_from_decimal(value: Option<Decimal>) -> Option<u64> {
    value
        .filter(|v| !v.is_sign_negative())
        .and_then(|v| v.trunc().to_u64())
}

pub fn epoch_seconds_to_utc(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

/// Converts a source-local wall-clock time to UTC.
pub fn local_to_utc(date: NaiveDate, time: NaiveTime, offset: FixedOffset) -> Option<DateTime<Utc>> {
    offset
        .from_local_datetime(&NaiveDateTime::new(date, time))
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Parses dates in ISO (`2026-10-16`) or day-first (`16/10/2026`, `16.10.2026`) form.
pub fn parse_local_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%Y%m%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

pub fn parse_local_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    ["%H:%M:%S", "%H:%M", "%H%M%S"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(raw, fmt).ok())
}
