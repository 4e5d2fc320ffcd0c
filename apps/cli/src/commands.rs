//! CLI command definitions, routing, and tracing setup.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use patternlang_api::AppState;
use patternlang_core::expand::expand_stored;
use patternlang_core::ingest::{ProgressReporter, ingest};
use patternlang_core::schedule::run_scheduler;
use patternlang_shared::{AppConfig, IngestReport, init_config, load_config, load_config_from};
use patternlang_storage::Storage;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// patternlang: a queryable graph of design patterns.
#[derive(Parser)]
#[command(
    name = "patternlang",
    version,
    about = "Ingest Markdown pattern documents into a linked catalog and serve graph queries over it.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Config file (defaults to ~/.patternlang/patternlang.toml).
    #[arg(long, global = true, env = "PATTERNLANG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Serve the query API and re-ingest on schedule.
    Serve {
        /// Address to listen on (overrides `server.bind`).
        #[arg(long)]
        bind: Option<String>,

        /// Skip the ingestion run at startup; serve whatever is stored.
        #[arg(long)]
        no_initial_ingest: bool,
    },

    /// Run one ingestion of the pattern directory.
    Ingest {
        /// Pattern directory (overrides `source.patterns_dir`).
        #[arg(long)]
        dir: Option<PathBuf>,
    },

    /// Print a pattern and its expanded links as JSON.
    Show {
        /// Pattern id.
        id: u32,

        /// Expansion depth (defaults to `server.default_depth`).
        #[arg(short, long)]
        depth: Option<u32>,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "patternlang=info",
        1 => "patternlang=debug",
        _ => "patternlang=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .init();
        }
        LogFormat::Json => {
            fmt().json().with_env_filter(env_filter).init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config.as_deref();
    match cli.command {
        Command::Serve {
            bind,
            no_initial_ingest,
        } => cmd_serve(config_path, bind, no_initial_ingest).await,
        Command::Ingest { dir } => cmd_ingest(config_path, dir).await,
        Command::Show { id, depth } => cmd_show(config_path, id, depth).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show(config_path).await,
        },
    }
}

fn resolve_config(path: Option<&Path>) -> Result<AppConfig> {
    let config = match path {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_serve(
    config_path: Option<&Path>,
    bind: Option<String>,
    no_initial_ingest: bool,
) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(bind) = bind {
        config.server.bind = bind;
    }
    if no_initial_ingest {
        config.schedule.ingest_on_startup = false;
    }

    let storage = Arc::new(Storage::open(&config.storage.database).await?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = tokio::spawn(run_scheduler(
        storage.clone(),
        config.clone(),
        shutdown_rx,
    ));

    let listener = TcpListener::bind(&config.server.bind)
        .await
        .map_err(|e| eyre!("cannot bind {}: {e}", config.server.bind))?;

    let state = AppState::new(storage, config);
    patternlang_api::serve(listener, state, async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!(error = %e, "ctrl-c handler failed");
        }
        info!("shutdown requested");
    })
    .await?;

    // Let a scheduled run in progress finish before exiting.
    let _ = shutdown_tx.send(true);
    scheduler.await?;
    Ok(())
}

async fn cmd_ingest(config_path: Option<&Path>, dir: Option<PathBuf>) -> Result<()> {
    let mut config = resolve_config(config_path)?;
    if let Some(dir) = dir {
        config.source.patterns_dir = dir;
    }

    let storage = Storage::open(&config.storage.database).await?;
    let reporter = CliProgress::new();

    let result = ingest(&storage, &config.source, &reporter).await;
    reporter.spinner.finish_and_clear();
    let report = result?;

    print_report(&report);
    Ok(())
}

fn print_report(report: &IngestReport) {
    println!();
    println!("  Catalog updated.");
    println!("  Run:       {}", report.run_id);
    println!("  Documents: {}", report.documents_seen);
    println!("  Patterns:  {}", report.patterns_loaded);
    println!("  Links:     {}", report.links_loaded);
    println!("  Time:      {:.1}s", report.elapsed.as_secs_f64());

    if !report.failures.is_empty() {
        println!();
        println!("  Skipped documents ({}):", report.failures.len());
        for failure in &report.failures {
            println!("    {}: {}", failure.filename, failure.reason);
        }
    }

    if !report.dangling_links.is_empty() {
        println!();
        println!("  Dangling links ({}):", report.dangling_links.len());
        for link in &report.dangling_links {
            println!(
                "    {} -> {} ({})",
                link.source_id, link.target_id, link.target_name
            );
        }
    }
    println!();
}

async fn cmd_show(config_path: Option<&Path>, id: u32, depth: Option<u32>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let storage = Storage::open_readonly(&config.storage.database).await?;

    let depth = depth.unwrap_or(config.server.default_depth);
    let expanded = expand_stored(&storage, id, depth, config.server.max_depth).await?;
    println!("{}", serde_json::to_string_pretty(&expanded)?);
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show(config_path: Option<&Path>) -> Result<()> {
    let config = resolve_config(config_path)?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]),
        );
        spinner.enable_steady_tick(std::time::Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, name: &str) {
        self.spinner.set_message(name.to_string());
    }

    fn document_parsed(&self, filename: &str, current: usize, total: usize) {
        self.spinner
            .set_message(format!("Parsing [{current}/{total}] {filename}"));
    }

    fn done(&self, _report: &IngestReport) {
        self.spinner.finish_and_clear();
    }
}
