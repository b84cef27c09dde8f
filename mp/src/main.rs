//! ModelProbe - rate-limited probing scheduler
//!
//! CLI entry point: one subcommand per invocation.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use eyre::{Context, Result};
use tracing::{debug, info};

use modelprobe::cli::{Cli, Command, OutputFormat, get_log_path};
use modelprobe::config::Config;
use modelprobe::controller::RunController;
use modelprobe::credential::CommandCredential;
use modelprobe::probe::{HttpTransport, Prober};
use modelprobe::report::{self, StatusReport};
use modelprobe::scheduler::PriorityTable;
use modelprobe::store::StateStore;
use modelprobe::HttpCatalog;

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>) -> Result<()> {
    let log_path = get_log_path();
    let log_dir = log_path.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&log_dir).context("Failed to create log directory")?;

    // Priority: CLI --log-level > config file > default (INFO)
    let level = match cli_log_level.or(config_log_level) {
        Some(s) => match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            _ => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", s);
                tracing::Level::INFO
            }
        },
        None => tracing::Level::INFO,
    };

    let log_file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .context("Failed to open log file")?;

    tracing_subscriber::fmt()
        .with_writer(log_file)
        .with_ansi(false)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Log level first so the full config load below is logged
    let config_log_level = Config::load_log_level(cli.config.as_ref());
    setup_logging(cli.log_level.as_deref(), config_log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;
    info!(state_file = %config.state_file.display(), "ModelProbe loaded config");

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Poll { batch_size } => {
            let batch_size = batch_size
                .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
                .unwrap_or(config.scheduler.batch_size);
            cmd_poll(&config, batch_size).await
        }
        Command::Status { format } => cmd_status(&config, format),
        Command::Next { limit } => {
            let limit = limit
                .map(|n| usize::try_from(n).unwrap_or(usize::MAX))
                .unwrap_or(config.scheduler.next_preview);
            cmd_next(&config, limit)
        }
        Command::Refresh => cmd_refresh(&config).await,
        Command::Reset => cmd_reset(&config),
    }
}

fn build_controller(config: &Config, transport: Arc<HttpTransport>) -> RunController {
    let store = StateStore::new(&config.state_file);
    let prober = Prober::new(transport, config.probe.clone());
    let credential = Arc::new(CommandCredential::from_config(&config.credential));
    RunController::new(store, prober, credential).with_delay(config.probe.delay())
}

/// Run one polling cycle
async fn cmd_poll(config: &Config, batch_size: usize) -> Result<()> {
    debug!(batch_size, "cmd_poll: called");
    let transport = Arc::new(HttpTransport::new(config.probe.timeout())?);
    let controller = build_controller(config, transport);

    let outcome = controller.run_cycle(batch_size).await.context("Polling cycle failed")?;
    print!("{}", report::render_cycle(&outcome, Utc::now()));
    Ok(())
}

/// Show current status
fn cmd_status(config: &Config, format: OutputFormat) -> Result<()> {
    debug!(?format, "cmd_status: called");
    let state = StateStore::new(&config.state_file).load()?;
    let status = StatusReport::build(&state, Utc::now());

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&status)?),
        OutputFormat::Text => print!("{}", status.render()),
    }
    Ok(())
}

/// Preview the next batch
fn cmd_next(config: &Config, limit: usize) -> Result<()> {
    debug!(limit, "cmd_next: called");
    let state = StateStore::new(&config.state_file).load()?;
    print!("{}", report::render_next(&state, Utc::now(), limit));
    Ok(())
}

/// Refresh the target list from the catalog
async fn cmd_refresh(config: &Config) -> Result<()> {
    debug!("cmd_refresh: called");
    let transport = Arc::new(HttpTransport::new(config.probe.timeout())?);
    let catalog = HttpCatalog::new(&config.catalog.url, transport.client().clone());
    let controller = build_controller(config, transport);
    let table = PriorityTable::from_config(config.priorities.as_deref());

    let summary = controller.refresh(&catalog, &table).await?;
    let state = controller.store().load()?;
    print!("{}", report::render_refresh(&summary, &state));
    Ok(())
}

/// Discard all persisted state
fn cmd_reset(config: &Config) -> Result<()> {
    debug!("cmd_reset: called");
    let store = StateStore::new(&config.state_file);
    if store.reset()? {
        println!("Removed {}", store.path().display());
    } else {
        println!("No state file at {}", store.path().display());
    }
    Ok(())
}
