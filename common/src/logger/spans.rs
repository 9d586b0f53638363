use std::time::{Duration, Instant};

use tracing::Span;

use super::TraceId;

/// Root span for one unit of work (a trigger cycle, a CLI command).
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::info_span!(
        "root",
        name = %name,
        trace_id = %trace_id,
    )
}

/// Child span; inherits the trace id from the enclosing root span.
pub fn child_span(name: &'static str, symbol: &str) -> Span {
    tracing::info_span!("child", name = %name, symbol = %symbol)
}

/// Awaits `fut` and emits a `performance` warning if it took longer than `max`.
pub async fn warn_if_slow<F, T>(label: &'static str, max: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    let start = Instant::now();
    let out = fut.await;
    let elapsed = start.elapsed();
    if elapsed > max {
        tracing::warn!(
            target: "performance",
            label = label,
            elapsed_ms = elapsed.as_millis() as u64,
            "slow operation detected"
        );
    }
    out
}
