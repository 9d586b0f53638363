use sqlx::AnyPool;

pub async fn migrate(pool: &AnyPool) -> anyhow::Result<()> {
    // Quote time series; one row per (symbol, instant, source).
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS quotes (
  symbol TEXT NOT NULL,
  ts_ms BIGINT NOT NULL,
  source TEXT NOT NULL,
  open TEXT,
  high TEXT,
  low TEXT,
  close TEXT NOT NULL,
  volume BIGINT,
  PRIMARY KEY (symbol, ts_ms, source)
);
"#,
    )
    .execute(pool)
    .await?;

    // One trading session per calendar day.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS trading_sessions (
  session_id TEXT PRIMARY KEY,
  session_date TEXT NOT NULL UNIQUE,
  created_ms BIGINT NOT NULL
);
"#,
    )
    .execute(pool)
    .await?;

    // Signal records written by the analysis service; escalation annotates them.
    sqlx::query(
        r#"
CREATE TABLE IF NOT EXISTS signals (
  signal_id TEXT PRIMARY KEY,
  session_id TEXT NOT NULL,
  symbol TEXT NOT NULL,
  action TEXT NOT NULL,
  created_ms BIGINT NOT NULL,
  priority BIGINT NOT NULL DEFAULT 0,
  trigger_kinds TEXT,
  triggered_ms BIGINT
);
"#,
    )
    .execute(pool)
    .await?;

    sqlx::query(r#"CREATE INDEX IF NOT EXISTS idx_quotes_symbol_ts ON quotes(symbol, ts_ms);"#)
        .execute(pool)
        .await?;

    sqlx::query(
        r#"CREATE INDEX IF NOT EXISTS idx_signals_session_symbol ON signals(session_id, symbol, created_ms);"#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
