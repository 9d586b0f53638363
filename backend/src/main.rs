use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::sync::watch;

use common::logger::init_logger;
use tripwire::{
    cli::{Cli, Command},
    config::AppConfig,
    db::Db,
    dispatch::{
        EscalationDispatcher, HttpDeepAnalysis, InMemorySignalLedger, SignalLedger,
        SqlxSignalLedger,
    },
    market::{
        health::{SourceHealthTracker, SourceStatus},
        orchestrator::SourceOrchestrator,
        sources::{ChartApiSource, QuoteSource, TickerCsvSource},
        types::Instrument,
    },
    metrics::counters::Counters,
    scheduler::{CycleReport, TriggerCycle},
    store::{InMemoryQuoteRepository, QuoteStore, SqlxQuoteRepository, repository::QuoteRepository},
    time,
    trigger::{TriggerEngine, TriggerEvent, TriggerProfile},
};

/// Everything one command needs, wired from config.
struct App {
    cfg: AppConfig,
    orchestrator: Arc<SourceOrchestrator>,
    store: Arc<QuoteStore>,
    engine: TriggerEngine,
    dispatcher: Option<Arc<EscalationDispatcher>>,
    counters: Counters,
}

/// Sources in registration order; the orchestrator sorts by priority.
fn build_sources(cfg: &AppConfig) -> anyhow::Result<Vec<Arc<dyn QuoteSource>>> {
    let chart = ChartApiSource::new(cfg.chart_api_url.clone(), cfg.fetch_timeout)
        .context("building chart client")?;
    let ticker = TickerCsvSource::new(
        cfg.ticker_api_url.clone(),
        cfg.fetch_timeout,
        cfg.ticker_utc_offset,
    )
    .context("building ticker client")?;

    let sources: Vec<Arc<dyn QuoteSource>> = vec![Arc::new(chart), Arc::new(ticker)];
    Ok(sources)
}

/// Opens the DB and runs migrations, or falls back to process memory.
async fn build_persistence(
    cfg: &AppConfig,
    memory: bool,
) -> anyhow::Result<(Arc<dyn QuoteRepository>, Arc<dyn SignalLedger>)> {
    if memory {
        let repo: Arc<dyn QuoteRepository> = Arc::new(InMemoryQuoteRepository::new());
        let ledger: Arc<dyn SignalLedger> = Arc::new(InMemorySignalLedger::new());
        return Ok((repo, ledger));
    }

    let db = Db::open(&cfg.database_url).await?;

    let repo: Arc<dyn QuoteRepository> = Arc::new(SqlxQuoteRepository::new(db.pool.clone()));
    let ledger: Arc<dyn SignalLedger> = Arc::new(SqlxSignalLedger::new(db.pool));
    Ok((repo, ledger))
}

async fn build_app(cfg: AppConfig, memory: bool) -> anyhow::Result<App> {
    let counters = Counters::default();

    let orchestrator = SourceOrchestrator::new(
        build_sources(&cfg)?,
        Arc::new(SourceHealthTracker::new()),
    )
    .with_cooldown(cfg.rate_limit_cooldown)
    .with_fetch_timeout(cfg.fetch_timeout)
    .with_counters(counters.clone());

    let (repo, ledger) = build_persistence(&cfg, memory).await?;

    let store = QuoteStore::new(repo)
        .with_max_window_quotes(cfg.max_window_quotes)
        .with_counters(counters.clone());

    let dispatcher = match &cfg.analysis_url {
        Some(url) => {
            let analysis = HttpDeepAnalysis::new(url.clone(), cfg.analysis_timeout)
                .context("building analysis client")?;
            let dispatcher = EscalationDispatcher::new(Arc::new(analysis), ledger)
                .with_timeout(cfg.analysis_timeout);
            Some(Arc::new(dispatcher))
        }
        None => {
            tracing::warn!("ANALYSIS_URL not set; escalations will not be dispatched");
            None
        }
    };

    Ok(App {
        engine: TriggerEngine::new(cfg.profile.clone()),
        orchestrator: Arc::new(orchestrator),
        store: Arc::new(store),
        dispatcher,
        counters,
        cfg,
    })
}

fn build_cycle(app: &App) -> TriggerCycle {
    let cycle = TriggerCycle::new(
        app.orchestrator.clone(),
        app.store.clone(),
        app.engine.clone(),
        app.cfg.instruments.clone(),
    )
    .with_worker_pool_size(app.cfg.worker_pool_size)
    .with_counters(app.counters.clone());

    match &app.dispatcher {
        Some(d) => cycle.with_dispatcher(d.clone()),
        None => cycle,
    }
}

#[derive(serde::Serialize)]
struct SourceLine {
    source: String,
    priority: i32,
    reachable: bool,
    #[serde(flatten)]
    status: SourceStatus,
}

/// Probes every source concurrently and joins the result with tracker health.
async fn source_lines(orchestrator: &SourceOrchestrator) -> Vec<SourceLine> {
    let sources = orchestrator.sources();
    let health = orchestrator
        .health()
        .status_of(sources.iter().map(|s| s.source_id()));
    let probes = futures::future::join_all(sources.iter().map(|s| s.is_reachable())).await;

    sources
        .iter()
        .zip(probes)
        .map(|(s, reachable)| SourceLine {
            source: s.source_id().to_string(),
            priority: s.priority(),
            reachable,
            status: health
                .get(s.source_id())
                .copied()
                .unwrap_or(SourceStatus::Available),
        })
        .collect()
}

/// Flips to `true` on Ctrl-C.
fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("shutdown requested");
            let _ = tx.send(true);
        }
    });
    rx
}

/// Configured instrument for `symbol`, or a bare one without aliases.
fn instrument_for(cfg: &AppConfig, symbol: &str) -> Instrument {
    cfg.instruments
        .iter()
        .find(|i| i.symbol == symbol)
        .cloned()
        .unwrap_or_else(|| Instrument::new(symbol))
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_event(event: &TriggerEvent) {
    let verdict = if event.escalate { "ESCALATE" } else { "watch" };
    println!("{} @ {} [{}]", event.symbol, event.timestamp.to_rfc3339(), verdict);
    for signal in &event.signals {
        println!("  - {signal}");
    }
}

fn print_report(report: &CycleReport) {
    println!(
        "monitored={} fetched={} fetch_failed={} events={} escalated={} dispatched={} dispatch_failed={} cancelled={}",
        report.monitored_count,
        report.fetch_ok,
        report.fetch_failed,
        report.event_count,
        report.escalated_count,
        report.dispatched,
        report.dispatch_failed,
        report.cancelled,
    );
    report.events.iter().for_each(print_event);
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut cfg = AppConfig::from_env()?;
    if let Some(name) = &cli.profile {
        cfg.profile = TriggerProfile::by_name(name)?;
    }

    init_logger("tripwire", cfg.json_logs);
    tracing::info!(
        profile = %cfg.profile.name,
        instruments = cfg.instruments.len(),
        "starting tripwire"
    );

    if let Command::Profiles = cli.command {
        let profiles = TriggerProfile::all();
        if cli.json {
            return print_json(&profiles);
        }
        for p in profiles {
            println!(
                "{:<13} price>={}% volume>=x{} breakout>={}% momentum>={}% window={}m | escalate: price>={}% volume>=x{} (with price>={}%) momentum>={}%",
                p.name,
                p.price_change_pct,
                p.volume_spike_ratio,
                p.breakout_pct,
                p.momentum_pct,
                p.window_minutes,
                p.escalation.price_change_pct,
                p.escalation.volume_ratio,
                p.escalation.volume_price_change_pct,
                p.escalation.momentum_pct,
            );
        }
        return Ok(());
    }

    let app = build_app(cfg, cli.memory).await?;

    match cli.command {
        Command::Run => {
            if app.cfg.instruments.is_empty() {
                anyhow::bail!("WATCH_SYMBOLS is empty; nothing to monitor");
            }
            let cycle = build_cycle(&app);
            cycle.run_forever(shutdown_signal(), app.cfg.cycle_interval).await;
            tracing::info!(counters = ?app.counters.snapshot(), "final counters");
        }

        Command::Cycle => {
            let report = build_cycle(&app).run(shutdown_signal()).await;
            if cli.json {
                print_json(&report)?;
            } else {
                print_report(&report);
            }
        }

        Command::Fetch {
            symbol,
            source,
            store,
        } => {
            let instrument = instrument_for(&app.cfg, &symbol);
            let quote = match source {
                Some(id) => app.orchestrator.fetch_from(&id, &instrument).await?,
                None => app.orchestrator.fetch_with_fallback(&instrument).await?,
            };
            if store {
                app.store.append_quote(&quote).await?;
            }
            if cli.json {
                print_json(&quote)?;
            } else {
                println!(
                    "{} {} close={} volume={} via {}",
                    quote.symbol,
                    quote.timestamp.to_rfc3339(),
                    quote.close,
                    quote.volume.map_or_else(|| "-".to_string(), |v| v.to_string()),
                    quote.source
                );
            }
        }

        Command::Evaluate { symbol } => {
            let window = app
                .store
                .window(&symbol, time::now(), app.engine.profile().lookback())
                .await?;
            let event = app.engine.evaluate(&symbol, &window);
            if cli.json {
                print_json(&event)?;
            } else {
                print_event(&event);
            }
        }

        Command::Sources => {
            let lines = source_lines(&app.orchestrator).await;
            if cli.json {
                print_json(&lines)?;
            } else {
                for l in lines {
                    let status = match l.status {
                        SourceStatus::Available => "available".to_string(),
                        SourceStatus::RateLimited { until } => {
                            format!("rate limited until {}", until.to_rfc3339())
                        }
                    };
                    println!(
                        "{:<8} priority={:<3} reachable={:<5} {}",
                        l.source, l.priority, l.reachable, status
                    );
                }
            }
        }

        // Answered before any I/O.
        Command::Profiles => {}
    }

    Ok(())
}
