use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{AnyPool, Row};
use uuid::Uuid;

use super::ledger::{SignalLedger, SignalRecord, TradingSession};

/// SQLx-backed implementation of SignalLedger.
/// Responsible only for persistence and row mapping.
pub struct SqlxSignalLedger {
    pool: AnyPool,
}

impl SqlxSignalLedger {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }

    /// Inserts an unannotated signal row (what the analysis service writes).
    pub async fn record_signal(
        &self,
        session: &TradingSession,
        symbol: &str,
        action: &str,
        created_at: DateTime<Utc>,
    ) -> anyhow::Result<Uuid> {
        let signal_id = Uuid::new_v4();

        sqlx::query(
            r#"
INSERT INTO signals (signal_id, session_id, symbol, action, created_ms)
VALUES (?, ?, ?, ?, ?);
"#,
        )
        .bind(signal_id.to_string())
        .bind(session.session_id.to_string())
        .bind(symbol.to_string())
        .bind(action.to_string())
        .bind(created_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(signal_id)
    }

    pub async fn fetch_signal(&self, signal_id: Uuid) -> anyhow::Result<Option<SignalRecord>> {
        let row = sqlx::query(
            r#"
SELECT signal_id, session_id, symbol, action, created_ms, priority, trigger_kinds, triggered_ms
FROM signals
WHERE signal_id = ?;
"#,
        )
        .bind(signal_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_signal).transpose()
    }

    async fn find_session(&self, date: NaiveDate) -> anyhow::Result<Option<TradingSession>> {
        let row = sqlx::query(
            r#"
SELECT session_id, session_date
FROM trading_sessions
WHERE session_date = ?;
"#,
        )
        .bind(date.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }
}

#[async_trait]
impl SignalLedger for SqlxSignalLedger {
    async fn session_for(&self, date: NaiveDate) -> anyhow::Result<TradingSession> {
        if let Some(session) = self.find_session(date).await? {
            return Ok(session);
        }

        // Concurrent creators race on the UNIQUE date; the loser re-reads.
        let fresh = TradingSession::new(date);
        sqlx::query(
            r#"
INSERT INTO trading_sessions (session_id, session_date, created_ms)
VALUES (?, ?, ?)
ON CONFLICT (session_date) DO NOTHING;
"#,
        )
        .bind(fresh.session_id.to_string())
        .bind(date.to_string())
        .bind(crate::time::now().timestamp_millis())
        .execute(&self.pool)
        .await?;

        self.find_session(date)
            .await?
            .ok_or_else(|| anyhow!("session for {date} vanished after insert"))
    }

    async fn annotate_latest_signal(
        &self,
        session: &TradingSession,
        symbol: &str,
        kinds: &[&str],
        at: DateTime<Utc>,
    ) -> anyhow::Result<bool> {
        let latest = sqlx::query(
            r#"
SELECT signal_id
FROM signals
WHERE session_id = ? AND symbol = ?
ORDER BY created_ms DESC
LIMIT 1;
"#,
        )
        .bind(session.session_id.to_string())
        .bind(symbol.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = latest else {
            return Ok(false);
        };
        let signal_id: String = row.try_get("signal_id")?;
        let kinds_json = serde_json::to_string(kinds)?;

        sqlx::query(
            r#"
UPDATE signals
SET priority = 1, trigger_kinds = ?, triggered_ms = ?
WHERE signal_id = ?;
"#,
        )
        .bind(kinds_json)
        .bind(at.timestamp_millis())
        .bind(signal_id)
        .execute(&self.pool)
        .await?;

        Ok(true)
    }
}

/* =========================
Row mapping
========================= */

fn row_to_session(r: &sqlx::any::AnyRow) -> anyhow::Result<TradingSession> {
    let id: String = r.try_get("session_id")?;
    let date: String = r.try_get("session_date")?;

    Ok(TradingSession {
        session_id: Uuid::parse_str(&id).context("invalid session_id")?,
        session_date: date.parse().context("invalid session_date")?,
    })
}

fn row_to_signal(r: &sqlx::any::AnyRow) -> anyhow::Result<SignalRecord> {
    let signal_id: String = r.try_get("signal_id")?;
    let session_id: String = r.try_get("session_id")?;
    let created_ms: i64 = r.try_get("created_ms")?;
    let priority: i64 = r.try_get("priority")?;
    let kinds: Option<String> = r.try_get("trigger_kinds")?;
    let triggered_ms: Option<i64> = r.try_get("triggered_ms")?;

    Ok(SignalRecord {
        signal_id: Uuid::parse_str(&signal_id).context("invalid signal_id")?,
        session_id: Uuid::parse_str(&session_id).context("invalid session_id")?,
        symbol: r.try_get("symbol")?,
        action: r.try_get("action")?,
        created_at: millis_to_utc(created_ms)?,
        priority: priority != 0,
        trigger_kinds: kinds
            .map(|k| serde_json::from_str(&k))
            .transpose()
            .context("invalid trigger_kinds")?
            .unwrap_or_default(),
        triggered_at: triggered_ms.map(millis_to_utc).transpose()?,
    })
}

fn millis_to_utc(ms: i64) -> anyhow::Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms).ok_or_else(|| anyhow!("timestamp out of range: {ms}"))
}
