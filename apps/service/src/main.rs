mod config;
mod database;
mod error;
mod logging;
mod monitoring;
mod notify;
mod pool;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tokio::sync::mpsc;

use config::Config;
use database::{LibsqlStore, StoreOptions, TargetRegistry, UptimeLog};
use monitoring::types::{IntervalClass, Order};
use monitoring::{HttpProbe, IntervalScheduler};
use notify::LogNotifier;

#[derive(Parser)]
#[command(name = "vigil", version, about = "URL uptime monitor")]
struct Cli {
    /// Path to the config file (defaults to the XDG config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the monitoring scheduler until interrupted
    Run,
    /// Add a url to monitor, or change its interval if already monitored
    Add {
        #[arg(long)]
        owner: String,
        url: String,
        /// Check interval: 5m, 1h or 24h
        #[arg(long, default_value = "5m")]
        interval: String,
    },
    /// Stop monitoring a url
    Remove {
        #[arg(long)]
        owner: String,
        url: String,
    },
    /// List monitored targets, for one owner or all
    List {
        #[arg(long)]
        owner: Option<String>,
    },
    /// Show probe history for an owner, optionally for one url
    Logs {
        #[arg(long)]
        owner: String,
        url: Option<String>,
        /// Newest entries first
        #[arg(long)]
        desc: bool,
        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Delete probe history for a url without removing the target
    Purge {
        #[arg(long)]
        owner: String,
        url: String,
    },
    /// Delete all of an owner's targets and probe history
    Reset {
        #[arg(long)]
        owner: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let cli = Cli::parse();
    let config = Config::from_config(cli.config.as_ref())?;
    tracing::debug!("{config}");

    let store = open_store(&config).await?;

    match cli.command {
        Command::Run => run_scheduler(&config, store).await,
        Command::Add { owner, url, interval } => {
            let interval: IntervalClass = interval.parse()?;
            store.add_or_update(&owner, &url, interval).await?;
            println!("monitoring {url} for {owner} every {interval}");
            Ok(())
        }
        Command::Remove { owner, url } => {
            store.remove(&owner, &url).await?;
            println!("removed {url} for {owner}");
            Ok(())
        }
        Command::List { owner } => {
            let targets = match owner {
                Some(owner) => store.list(&owner).await?,
                None => store.list_all().await?,
            };
            for target in targets {
                println!("{:<16} {:<4} {}", target.owner, target.interval, target.url);
            }
            Ok(())
        }
        Command::Logs { owner, url, desc, json } => {
            let order = if desc { Order::Desc } else { Order::Asc };
            let results = match url {
                Some(url) => store.query_target(&owner, &url, order).await?,
                None => store.query(&owner, order).await?,
            };
            if json {
                println!("{}", serde_json::to_string_pretty(&results)?);
            } else {
                for result in results {
                    let status = if result.up { "UP  " } else { "DOWN" };
                    println!("{} {} {}", result.observed_at.to_rfc3339(), status, result.url);
                }
            }
            Ok(())
        }
        Command::Purge { owner, url } => {
            store.purge(&owner, &url).await?;
            println!("purged history of {url} for {owner}");
            Ok(())
        }
        Command::Reset { owner } => {
            store.reset_owner(&owner).await?;
            println!("reset all targets and history for {owner}");
            Ok(())
        }
    }
}

async fn open_store(config: &Config) -> Result<Arc<LibsqlStore>> {
    let db = libsql::Builder::new_local(&config.database.path).build().await?;

    let conn = db.connect()?;
    database::initialize_database(&conn).await?;

    let pool = pool::build_pool(db, config.database.pool_size)?;
    let options = StoreOptions {
        max_targets_per_owner: config.registry.max_targets_per_owner,
        cascade_logs_on_remove: config.registry.cascade_logs_on_remove,
    };

    Ok(Arc::new(LibsqlStore::new(pool, options)))
}

async fn run_scheduler(config: &Config, store: Arc<LibsqlStore>) -> Result<()> {
    let probe = Arc::new(HttpProbe::new(config.probe.timeout_seconds)?);
    let (events_tx, events_rx) = mpsc::channel(64);

    let scheduler = IntervalScheduler::new(
        store.clone(),
        store.clone(),
        probe,
        config.probe.concurrency,
    )
    .with_events(events_tx);

    notify::spawn_dispatcher(events_rx, Arc::new(LogNotifier));

    let registered = scheduler.start().await?;
    tracing::info!(jobs = registered, "scheduler started");

    // Picks up jobKeys that appear after startup, e.g. an owner's first
    // target at a new interval. Registration is idempotent, so this loop
    // never duplicates live timers.
    let mut resync = tokio::time::interval(Duration::from_secs(config.scheduler.resync_seconds));
    resync.tick().await;

    loop {
        tokio::select! {
            _ = resync.tick() => {
                match scheduler.sync_jobs().await {
                    Ok(0) => {}
                    Ok(n) => tracing::info!(jobs = n, "registered new monitoring jobs"),
                    Err(e) => tracing::warn!(error = %e, "registry resync failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("shutting down");
                return Ok(());
            }
        }
    }
}
