use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use rust_decimal_macros::dec;
use sqlx::AnyPool;
use sqlx::any::AnyPoolOptions;
use uuid::Uuid;

use tripwire::db::schema;
use tripwire::dispatch::{SignalLedger, SqlxSignalLedger};
use tripwire::error::StoreError;
use tripwire::market::types::NormalizedQuote;
use tripwire::store::{QuoteStore, SqlxQuoteRepository};

/// Isolated in-memory SQLite database with the schema applied.
/// The unique name keeps parallel tests apart while sharing one cache.
async fn setup_db() -> AnyPool {
    sqlx::any::install_default_drivers();

    let db_name = Uuid::new_v4().to_string();
    let conn_str = format!("sqlite:file:{}?mode=memory&cache=shared", db_name);

    let pool = AnyPoolOptions::new()
        .max_connections(5)
        .connect(&conn_str)
        .await
        .unwrap();

    schema::migrate(&pool).await.unwrap();
    pool
}

fn quote(minute: u32, close: rust_decimal::Decimal, source: &str) -> NormalizedQuote {
    NormalizedQuote {
        symbol: "PETR4.SA".into(),
        timestamp: Utc.with_ymd_and_hms(2026, 10, 16, 14, minute, 0).unwrap(),
        open: Some(dec!(38.10)),
        high: Some(dec!(38.62)),
        low: Some(dec!(37.95)),
        close,
        volume: Some(1_234_500),
        source: source.into(),
    }
}

#[tokio::test]
async fn repeated_key_replaces_the_row() {
    let pool = setup_db().await;
    let store = QuoteStore::new(Arc::new(SqlxQuoteRepository::new(pool)));

    store.append_quote(&quote(30, dec!(38.57), "chart")).await.unwrap();
    store.append_quote(&quote(30, dec!(38.61), "chart")).await.unwrap();
    // Same instant from another source is a separate record.
    store.append_quote(&quote(30, dec!(38.55), "ticker")).await.unwrap();

    let since = Utc.with_ymd_and_hms(2026, 10, 16, 14, 0, 0).unwrap();
    let rows = store.recent_quotes("PETR4.SA", since).await.unwrap();

    assert_eq!(rows.len(), 2);
    let chart = rows.iter().find(|q| q.source == "chart").unwrap();
    assert_eq!(chart.close, dec!(38.61));
    assert_eq!(chart.open, Some(dec!(38.10)));
    assert_eq!(chart.volume, Some(1_234_500));
}

#[tokio::test]
async fn window_reads_newest_first_within_lookback() {
    let pool = setup_db().await;
    let store = QuoteStore::new(Arc::new(SqlxQuoteRepository::new(pool)));

    for minute in [0, 20, 25, 29] {
        store
            .append_quote(&quote(minute, dec!(38) + rust_decimal::Decimal::from(minute), "chart"))
            .await
            .unwrap();
    }

    let now = Utc.with_ymd_and_hms(2026, 10, 16, 14, 30, 0).unwrap();
    let window = store
        .window("PETR4.SA", now, Duration::minutes(15))
        .await
        .unwrap();

    let closes: Vec<_> = window.closes().collect();
    assert_eq!(closes, vec![dec!(67), dec!(63), dec!(58)]);
}

#[tokio::test]
async fn invalid_quote_never_reaches_the_table() {
    let pool = setup_db().await;
    let store = QuoteStore::new(Arc::new(SqlxQuoteRepository::new(pool.clone())));

    let mut bad = quote(10, dec!(38.57), "chart");
    bad.low = Some(dec!(40));

    assert!(matches!(
        store.append_quote(&bad).await,
        Err(StoreError::Invalid { .. })
    ));

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM quotes")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 0);
}

#[tokio::test]
async fn session_is_created_once_per_day() {
    let pool = setup_db().await;
    let ledger = SqlxSignalLedger::new(pool.clone());
    let date = NaiveDate::from_ymd_opt(2026, 10, 16).unwrap();

    let first = ledger.session_for(date).await.unwrap();
    let again = ledger.session_for(date).await.unwrap();
    let next_day = ledger.session_for(date.succ_opt().unwrap()).await.unwrap();

    assert_eq!(first, again);
    assert_ne!(first.session_id, next_day.session_id);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM trading_sessions")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(count, 2);
}

#[tokio::test]
async fn annotation_marks_only_the_newest_signal() {
    let pool = setup_db().await;
    let ledger = SqlxSignalLedger::new(pool);
    let session = ledger
        .session_for(NaiveDate::from_ymd_opt(2026, 10, 16).unwrap())
        .await
        .unwrap();

    let t = Utc.with_ymd_and_hms(2026, 10, 16, 14, 0, 0).unwrap();
    let older = ledger.record_signal(&session, "VALE3.SA", "sell", t).await.unwrap();
    let newer = ledger
        .record_signal(&session, "VALE3.SA", "buy", t + Duration::minutes(5))
        .await
        .unwrap();

    let at = t + Duration::minutes(6);
    let annotated = ledger
        .annotate_latest_signal(&session, "VALE3.SA", &["price_change", "momentum_shift"], at)
        .await
        .unwrap();
    assert!(annotated);

    let newer = ledger.fetch_signal(newer).await.unwrap().unwrap();
    assert!(newer.priority);
    assert_eq!(newer.trigger_kinds, vec!["price_change", "momentum_shift"]);
    assert_eq!(newer.triggered_at, Some(at));

    let older = ledger.fetch_signal(older).await.unwrap().unwrap();
    assert!(!older.priority);
    assert!(older.trigger_kinds.is_empty());

    let none = ledger
        .annotate_latest_signal(&session, "ITUB4.SA", &["volume_spike"], at)
        .await
        .unwrap();
    assert!(!none);
}
