use chrono::{DateTime, Utc};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use superban::ban::{Limits, RequestContext};
use superban::clock::{Clock, SystemClock};
use superban::config::SuperbanConfig;
use superban::store::StoreRegistry;
use superban::{Decision, Superban};

/// Evaluate request descriptions read from stdin against the ban gate.
///
/// Each input line is a JSON object such as
/// `{"ip": "203.0.113.7", "user": {"id": "1", "email": "a@b.c"}, "path": "/login"}`
/// and produces one JSON decision line on stdout.
#[derive(Debug, Parser)]
#[command(name = "superban", version, about)]
struct Args {
    /// Configuration file (YAML, TOML or JSON); SUPERBAN_* variables override it
    #[arg(short, long, env = "SUPERBAN_CONFIG")]
    config: Option<PathBuf>,

    /// Limits for every request as `max_attempts,decay_minutes,banned_minutes`,
    /// overriding the route rules
    #[arg(short, long)]
    limits: Option<Limits>,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Deserialize)]
struct RequestLine {
    #[serde(flatten)]
    context: RequestContext,
    #[serde(default)]
    path: Option<String>,
}

#[derive(Debug, Default, Serialize)]
struct DecisionLine {
    allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    banned_until: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<Decision> for DecisionLine {
    fn from(decision: Decision) -> Self {
        match decision.rejection() {
            None => DecisionLine {
                allowed: true,
                ..Default::default()
            },
            Some(rejection) => DecisionLine {
                allowed: false,
                status: Some(rejection.status),
                message: Some(rejection.message),
                banned_until: Some(rejection.banned_until),
                error: None,
            },
        }
    }
}

impl DecisionLine {
    fn error(message: impl ToString) -> Self {
        DecisionLine {
            allowed: false,
            error: Some(message.to_string()),
            ..Default::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    info!("Starting Superban admission gate");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = SuperbanConfig::load(args.config.as_deref())?;
    info!(
        criterion = %config.ban_criteria,
        driver = %config.cache_driver,
        routes = config.rules.routes.len(),
        "Configuration loaded"
    );

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let registry = Arc::new(StoreRegistry::with_memory(clock.clone()));
    let gate = Superban::new(&config, &registry, clock)?;

    let purge = tokio::spawn(purge_expired(
        registry.clone(),
        Duration::from_secs(config.purge_interval_secs),
    ));

    let interrupted = tokio::select! {
        result = serve_stdin(&gate, args.limits) => {
            result?;
            None
        }
        signal = shutdown_signal() => Some(signal?),
    };
    match interrupted {
        Some(signal) => info!(signal, stage = "serving", "Interrupted, shutting down"),
        None => info!(stage = "serving", "Input closed, shutting down"),
    }

    purge.abort();
    match purge.await {
        Err(e) if e.is_cancelled() => debug!(stage = "purge", "Purge task stopped"),
        Err(e) => warn!(stage = "purge", error = %e, "Purge task failed"),
        Ok(()) => {}
    }
    info!("Superban admission gate stopped");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Text => builder.init(),
        LogFormat::Json => builder.json().init(),
    }
}

/// Answer one decision line per request line until stdin closes.
async fn serve_stdin(gate: &Superban, limits: Option<Limits>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let answer = evaluate_line(gate, limits.as_ref(), &line).await;
        let mut out = serde_json::to_vec(&answer)?;
        out.push(b'\n');
        stdout.write_all(&out).await?;
        stdout.flush().await?;
    }

    Ok(())
}

async fn evaluate_line(gate: &Superban, limits: Option<&Limits>, line: &str) -> DecisionLine {
    let request: RequestLine = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "Malformed request line");
            return DecisionLine::error(format!("malformed request: {}", e));
        }
    };

    let result = match (limits, request.path.as_deref()) {
        (Some(limits), _) => gate.evaluate(&request.context, limits).await.map(Some),
        (None, Some(path)) => gate.evaluate_route(&request.context, path).await,
        (None, None) => Ok(None),
    };

    match result {
        Ok(Some(decision)) => decision.into(),
        Ok(None) => {
            debug!(path = ?request.path, "Request not covered by any limit");
            Decision::Allow.into()
        }
        Err(e) => {
            warn!(error = %e, "Evaluation failed");
            DecisionLine::error(e)
        }
    }
}

/// Periodically drop expired entries from the in-memory stores.
async fn purge_expired(registry: Arc<StoreRegistry>, every: Duration) {
    let mut ticker = tokio::time::interval(every);
    loop {
        ticker.tick().await;
        let (bans, counters) = registry.purge_memory();
        if bans > 0 || counters > 0 {
            debug!(bans, counters, "Purged expired entries");
        }
    }
}

/// Wait for Ctrl+C or SIGTERM and name the one that arrived.
async fn shutdown_signal() -> std::io::Result<&'static str> {
    #[cfg(unix)]
    {
        let mut terminate = signal::unix::signal(signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = signal::ctrl_c() => result.map(|_| "ctrl_c"),
            _ = terminate.recv() => Ok("sigterm"),
        }
    }

    #[cfg(not(unix))]
    {
        signal::ctrl_c().await.map(|_| "ctrl_c")
    }
}
