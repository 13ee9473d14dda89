//! Command-line live tail for client debug logs.
//!
//! Loads a subject's debug log history from the admin API, prints the
//! records that pass the query and filters, and with `--follow` keeps
//! polling for new ones until interrupted.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use claw_logview::{
    HttpLogSource, LogRecord, LogViewConfig, Severity, SourceLevel, SubjectId, TailDriver,
    TailHandle, Taxonomy, ViewEvent, DEFAULT_TIMESTAMP_FORMAT,
};

/// Live-tail a user's client debug logs.
#[derive(Parser, Debug, Clone)]
#[command(name = "claw-logview")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Admin API base URL.
    #[arg(
        short,
        long,
        env = "CLAW_LOGVIEW_ENDPOINT",
        default_value = "http://localhost:8080/api/admin"
    )]
    endpoint: String,

    /// Bearer token for the admin API.
    #[arg(long, env = "CLAW_LOGVIEW_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// User whose logs to show.
    subject: String,

    /// Query, e.g. `'exact phrase' [API] [Points] 12:30 timeout`.
    #[arg(short, long, default_value = "")]
    query: String,

    /// Only show records captured at this debug level (repeatable).
    #[arg(short, long = "level")]
    levels: Vec<SourceLevel>,

    /// Only show records with this severity (repeatable).
    #[arg(short, long = "severity")]
    severities: Vec<Severity>,

    /// Keep polling for new records.
    #[arg(short, long)]
    follow: bool,

    /// Seconds between polls while following.
    #[arg(long, default_value_t = 3)]
    poll_interval: u64,

    /// Chrono format for displayed timestamps.
    #[arg(long, default_value = DEFAULT_TIMESTAMP_FORMAT)]
    timestamp_format: String,

    /// JSON file with the category schema, `{"Main": ["Sub", ...]}`.
    #[arg(long)]
    schema: Option<PathBuf>,

    /// Print client details found in the logs on exit.
    #[arg(long)]
    client_info: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("claw_logview=info")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn build_config(cli: &Cli) -> anyhow::Result<LogViewConfig> {
    let mut config = LogViewConfig::new(&cli.endpoint)
        .with_poll_interval(Duration::from_secs(cli.poll_interval))
        .with_timestamp_format(&cli.timestamp_format);
    if let Some(token) = &cli.token {
        config = config.with_auth_token(token);
    }
    if let Some(path) = &cli.schema {
        let schema = Taxonomy::from_json_file(path)
            .with_context(|| format!("failed to load schema {}", path.display()))?;
        config = config.with_static_schema(schema);
    }
    config.validate()?;
    Ok(config)
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = build_config(&cli)?;
    let source = HttpLogSource::new(&config)?;
    let (driver, handle, mut events) = TailDriver::new(source, &config);

    handle.set_query(cli.query.clone())?;
    handle.set_levels(cli.levels.clone())?;
    handle.set_severities(cli.severities.clone())?;
    handle.select(SubjectId::new(&cli.subject), cli.follow)?;

    let printer = async {
        let outcome = print_events(&mut events, &handle, &config.timestamp_format).await;
        // The driver may already be gone if the printer failed on a closed channel.
        handle.shutdown().ok();
        outcome
    };

    let (view, outcome) = tokio::join!(driver.run(), printer);

    if cli.client_info {
        match view.client_metadata() {
            Some(meta) => eprintln!("{}", serde_json::to_string_pretty(&meta)?),
            None => eprintln!("No client details in logs"),
        }
    }
    outcome
}

async fn print_events(
    events: &mut tokio::sync::mpsc::UnboundedReceiver<ViewEvent>,
    handle: &TailHandle,
    timestamp_format: &str,
) -> anyhow::Result<()> {
    let mut stdout = io::stdout().lock();

    loop {
        let event = tokio::select! {
            event = events.recv() => event,
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                return Ok(());
            }
        };
        let Some(event) = event else {
            return Ok(());
        };

        match event {
            ViewEvent::Loaded {
                visible, following, ..
            } => {
                for record in &visible {
                    writeln!(stdout, "{}", format_record(record, timestamp_format))?;
                }
                stdout.flush()?;
                if !following {
                    return Ok(());
                }
            }
            ViewEvent::Appended { visible, .. } => {
                for record in &visible {
                    writeln!(stdout, "{}", format_record(record, timestamp_format))?;
                }
                stdout.flush()?;
            }
            ViewEvent::LoadFailed { subject, error } => {
                anyhow::bail!("failed to load logs for {subject}: {error}");
            }
            ViewEvent::PollFailed {
                error,
                failed_polls,
            } => {
                warn!(error = %error, failed_polls, "Poll failed");
            }
            ViewEvent::FollowingChanged(false) | ViewEvent::Cleared => {
                handle.shutdown().ok();
            }
            ViewEvent::Loading { .. }
            | ViewEvent::FollowingChanged(true)
            | ViewEvent::Refiltered { .. } => {}
        }
    }
}

fn format_record(record: &LogRecord, timestamp_format: &str) -> String {
    let timestamp = record.display_timestamp(timestamp_format);
    let mut line = format!("{timestamp} {:<7}", record.severity.as_str());
    if !record.category.is_empty() {
        line.push(' ');
        line.push_str(&record.category);
    }
    line.push(' ');
    line.push_str(&record.message);
    line
}
