use std::str::FromStr;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{AnyPool, Row};

use crate::market::types::NormalizedQuote;
use crate::store::repository::QuoteRepository;

/// SQLx-backed implementation of QuoteRepository.
/// Responsible only for persistence and row mapping.
///
/// Prices are stored as decimal text so no precision is lost in the round trip.
pub struct SqlxQuoteRepository {
    pool: AnyPool,
}

impl SqlxQuoteRepository {
    pub fn new(pool: AnyPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl QuoteRepository for SqlxQuoteRepository {
    async fn upsert(&self, quote: &NormalizedQuote) -> anyhow::Result<()> {
        let volume = quote.volume.map(u64_to_i64).transpose()?;

        sqlx::query(
            r#"
INSERT INTO quotes (symbol, ts_ms, source, open, high, low, close, volume)
VALUES (?, ?, ?, ?, ?, ?, ?, ?)
ON CONFLICT (symbol, ts_ms, source) DO UPDATE SET
  open = excluded.open,
  high = excluded.high,
  low = excluded.low,
  close = excluded.close,
  volume = excluded.volume;
"#,
        )
        .bind(quote.symbol.clone())
        .bind(quote.timestamp.timestamp_millis())
        .bind(quote.source.clone())
        .bind(quote.open.map(|d| d.to_string()))
        .bind(quote.high.map(|d| d.to_string()))
        .bind(quote.low.map(|d| d.to_string()))
        .bind(quote.close.to_string())
        .bind(volume)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn recent(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> anyhow::Result<Vec<NormalizedQuote>> {
        let rows = sqlx::query(
            r#"
SELECT symbol, ts_ms, source, open, high, low, close, volume
FROM quotes
WHERE symbol = ? AND ts_ms >= ?
ORDER BY ts_ms DESC, source ASC
LIMIT ?;
"#,
        )
        .bind(symbol.to_string())
        .bind(since.timestamp_millis())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for r in rows {
            match row_to_quote(&r) {
                Ok(q) => out.push(q),
                Err(e) => {
                    // poison-row resilience: skip but don't fail the window
                    tracing::warn!(error = %e, symbol, "skipping malformed quote row");
                }
            }
        }

        Ok(out)
    }
}

/* =========================
Row mapping + conversions
========================= */

fn row_to_quote(r: &sqlx::any::AnyRow) -> anyhow::Result<NormalizedQuote> {
    let ts_ms: i64 = r.try_get("ts_ms")?;
    let timestamp =
        DateTime::from_timestamp_millis(ts_ms).ok_or_else(|| anyhow!("ts_ms out of range: {ts_ms}"))?;

    let close: String = r.try_get("close")?;
    let volume: Option<i64> = r.try_get("volume")?;

    Ok(NormalizedQuote {
        symbol: r.try_get("symbol")?,
        timestamp,
        open: opt_decimal(r.try_get("open")?).context("open")?,
        high: opt_decimal(r.try_get("high")?).context("high")?,
        low: opt_decimal(r.try_get("low")?).context("low")?,
        close: Decimal::from_str(&close).context("close")?,
        volume: volume.map(|v| u64::try_from(v)).transpose().context("volume")?,
        source: r.try_get("source")?,
    })
}

fn opt_decimal(v: Option<String>) -> anyhow::Result<Option<Decimal>> {
    v.map(|s| Decimal::from_str(&s).map_err(|e| anyhow!("invalid decimal {s:?}: {e}")))
        .transpose()
}

fn u64_to_i64(v: u64) -> anyhow::Result<i64> {
    i64::try_from(v).map_err(|_| anyhow!("u64 too large for i64: {v}"))
}
