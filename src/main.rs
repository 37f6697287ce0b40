//! # Logiflow — Workflow Automation Daemon
//!
//! Runs the scheduled-rule loop against the automation database and offers
//! a few maintenance commands.
//!
//! Usage:
//!   logiflow run                                  # Start the scheduler (Ctrl-C to stop)
//!   logiflow tick                                 # One scheduler pass, then exit
//!   logiflow init                                 # Write default config, initialize rules
//!   logiflow next-run "*/15 9-17 * * 1-5" -n 5    # Preview a cron expression
//!   logiflow logs --rule <id> --limit 20          # Recent execution logs as JSON

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use logiflow_automation::{
    ActionRegistry, EventBus, ExecutionPipeline, PayloadConditions, RuleMatcher, Scheduler,
    SqliteStore, cron,
};
use logiflow_core::LogiflowConfig;

#[derive(Parser)]
#[command(
    name = "logiflow",
    version,
    about = "⏰ Logiflow — workflow automation engine"
)]
struct Cli {
    /// Config file (default: ~/.logiflow/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Database path (overrides automation.database_path)
    #[arg(long, global = true)]
    db_path: Option<String>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler loop until Ctrl-C
    Run {
        /// Seconds between ticks (overrides automation.tick_interval_secs)
        #[arg(long)]
        interval: Option<u64>,
    },
    /// Process due rules once and exit
    Tick,
    /// Write a default config if missing and initialize schedule rules
    Init,
    /// Show upcoming run times for a cron expression
    NextRun {
        expression: String,
        /// Start instant (RFC 3339), default now
        #[arg(long)]
        after: Option<String>,
        #[arg(short = 'n', long, default_value = "1")]
        count: usize,
    },
    /// Print recent execution logs for a rule
    Logs {
        #[arg(long)]
        rule: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

fn load_config(cli: &Cli) -> Result<LogiflowConfig> {
    let mut config = match &cli.config {
        Some(path) => LogiflowConfig::load_from(path)?,
        None => LogiflowConfig::load()?,
    };
    if let Some(db_path) = &cli.db_path {
        config.automation.database_path = db_path.clone();
    }
    Ok(config)
}

fn init_tracing(config: &LogiflowConfig, verbose: bool) {
    let filter = if verbose {
        "logiflow=debug,logiflow_automation=debug,logiflow_core=debug"
    } else {
        config.logging.filter.as_str()
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if config.logging.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .init();
    }
}

fn open_store(config: &LogiflowConfig) -> Result<Arc<SqliteStore>> {
    let path = config.automation.resolved_database_path();
    let store = SqliteStore::open(&path)
        .with_context(|| format!("failed to open database {}", path.display()))?;
    tracing::debug!("🗄️ Database: {}", path.display());
    Ok(Arc::new(store))
}

fn build_pipeline(config: &LogiflowConfig, store: Arc<SqliteStore>) -> Arc<ExecutionPipeline> {
    let registry = ActionRegistry::with_defaults().with_timeout(config.automation.action_timeout());
    tracing::debug!("🔧 Action types: {:?}", registry.action_types());
    Arc::new(ExecutionPipeline::new(Arc::new(registry), store))
}

fn build_scheduler(config: &LogiflowConfig, store: Arc<SqliteStore>) -> Arc<Scheduler> {
    let pipeline = build_pipeline(config, store.clone());
    Arc::new(Scheduler::new(store, pipeline, config.automation.tick_interval()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;
    init_tracing(&config, cli.verbose);

    match &cli.command {
        Command::Run { interval } => {
            let interval = interval
                .map(|secs| std::time::Duration::from_secs(secs.max(1)))
                .unwrap_or_else(|| config.automation.tick_interval());
            let store = open_store(&config)?;

            let pipeline = build_pipeline(&config, store.clone());
            let scheduler = Arc::new(Scheduler::new(store.clone(), pipeline.clone(), interval));

            // Event-driven rules: in-process publishers share this bus.
            let bus = EventBus::new();
            let matcher = Arc::new(RuleMatcher::new(
                store.clone(),
                Arc::new(PayloadConditions),
                pipeline,
            ));
            bus.subscribe_all(matcher);

            println!("⏰ Logiflow v{}", env!("CARGO_PKG_VERSION"));
            println!("   🗄️  Database: {}", config.automation.resolved_database_path().display());
            println!("   ⏱️  Tick:     every {}s", interval.as_secs());
            println!("   🔌 Bus:      {} subscriber(s)", bus.subscriber_count());
            println!();

            scheduler.start();
            tokio::signal::ctrl_c()
                .await
                .context("failed to listen for Ctrl-C")?;
            tracing::info!("🛑 Shutdown requested");
            scheduler.stop().await;
        }
        Command::Tick => {
            let store = open_store(&config)?;
            let scheduler = build_scheduler(&config, store);
            scheduler.initialize_scheduled_rules().await;
            let report = scheduler.process_scheduled_rules().await;
            println!(
                "✅ {} due, {} executed ({} ok, {} failed), {} skipped, {} not advanced",
                report.due,
                report.executed,
                report.succeeded,
                report.failed,
                report.skipped_inactive,
                report.advance_failures
            );
        }
        Command::Init => {
            let path = cli.config.clone().unwrap_or_else(LogiflowConfig::default_path);
            if path.exists() {
                println!("⚠️  Config already exists: {}", path.display());
            } else {
                config.save_to(&path)?;
                println!("✅ Config written: {}", path.display());
            }
            let store = open_store(&config)?;
            let scheduler = build_scheduler(&config, store);
            let count = scheduler.initialize_scheduled_rules().await;
            println!("📅 Initialized {count} schedule rule(s)");
        }
        Command::NextRun {
            expression,
            after,
            count,
        } => {
            cron::validate(expression)?;
            let after = match after {
                Some(s) => DateTime::parse_from_rfc3339(s)
                    .with_context(|| format!("invalid --after '{s}'"))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };
            for at in cron::upcoming(expression, after, (*count).max(1)) {
                println!("{}", at.to_rfc3339());
            }
        }
        Command::Logs { rule, limit } => {
            let store = open_store(&config)?;
            let logs = store.execution_logs(rule, *limit)?;
            if logs.is_empty() {
                println!("No execution logs for rule {rule}");
            }
            for log in &logs {
                println!("{}", serde_json::to_string(log)?);
            }
        }
    }

    Ok(())
}
