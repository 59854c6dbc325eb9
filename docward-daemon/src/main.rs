//! docward: keeps canonical copies of declaration documents and puts them
//! back when the working copy is overwritten.
//!
//! Usage:
//!   docward --config docward.toml run
//!   docward register ./canonical/
//!   docward sync --entity 0101234567

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use docward_daemon::{AppContext, Config};
use docward_types::{EntityCode, EntryKey, SyncScope};
use docward_warehouse::PutMode;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "docward")]
#[command(about = "Declaration document protection daemon", version)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "docward.toml", global = true)]
    config: PathBuf,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the configured roots and sync the warehouse until interrupted
    Run,

    /// Store files (or every document under a directory) as canonical
    Register {
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        /// Keep existing entries instead of replacing them
        #[arg(long)]
        insert_only: bool,
    },

    /// Upload pending entries now
    Sync {
        /// Only this entity
        #[arg(long)]
        entity: Option<EntityCode>,
    },

    /// Show warehouse counts and the entities it holds
    Stats,

    /// Show recent protection events and sync attempts
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },

    /// Delete an entity's entries, or a single file of it
    Remove {
        entity_id: EntityCode,
        filename: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let config = Config::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    let context = AppContext::open(config)?;

    match args.command {
        Command::Run => {
            info!("docward starting");
            context.run(shutdown_signal()).await?;
        }
        Command::Register { paths, insert_only } => {
            let mode = if insert_only { PutMode::InsertOnly } else { PutMode::Upsert };
            register(&context, &paths, mode).await?;
        }
        Command::Sync { entity } => {
            let scope = entity.map_or(SyncScope::All, SyncScope::ByEntity);
            let attempts = context.engine.sync(&scope).await?;
            if attempts.is_empty() {
                println!("nothing to sync for {scope}");
            }
            for attempt in attempts {
                println!(
                    "{:<12} {:<8} {}/{} files{}",
                    attempt.backend,
                    attempt.status.as_str(),
                    attempt.files_succeeded,
                    attempt.files_attempted,
                    attempt.detail.as_deref().map(|d| format!(" ({d})")).unwrap_or_default(),
                );
            }
        }
        Command::Stats => {
            let stats = context.warehouse.stats()?;
            println!(
                "{} entities, {} files ({} pending, {} synced, {} failed)",
                stats.entities, stats.files, stats.pending, stats.synced, stats.failed
            );
            for summary in context.warehouse.summaries()? {
                println!(
                    "{}  {:<40} {:>3} files  updated {}",
                    summary.entity_id,
                    summary.display_label,
                    summary.files,
                    summary.last_updated.format("%Y-%m-%d %H:%M:%S"),
                );
            }
        }
        Command::History { limit } => {
            let audit = context.warehouse.audit();
            println!("protection events:");
            for event in audit.recent_protection_events(limit, 0)? {
                println!(
                    "  {}  {:<9} {:<12} {}{}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.outcome.as_str(),
                    event.entity_id.as_ref().map(ToString::to_string).unwrap_or_default(),
                    event.target_path.display(),
                    if event.registered { "  [registered]" } else { "" },
                );
            }
            println!("sync attempts:");
            for attempt in audit.recent_sync_attempts(limit, 0)? {
                println!(
                    "  {}  {:<8} {:<12} {:<12} {}/{}",
                    attempt.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    attempt.status.as_str(),
                    attempt.backend,
                    attempt.entry_ref,
                    attempt.files_succeeded,
                    attempt.files_attempted,
                );
            }
        }
        Command::Remove { entity_id, filename } => match filename {
            Some(filename) => {
                let key = EntryKey::new(entity_id, filename);
                if context.warehouse.delete(&key)? {
                    println!("removed {key}");
                } else {
                    println!("{key} not found");
                }
            }
            None => {
                let removed = context.warehouse.delete_entity(&entity_id)?;
                println!("removed {removed} entries for {entity_id}");
            }
        },
    }
    Ok(())
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

async fn register(context: &AppContext, paths: &[PathBuf], mode: PutMode) -> Result<()> {
    let guard = context.protection_loop(None);
    for path in paths {
        if path.is_dir() {
            let report = guard.register_dir(path, mode).await?;
            for registered in &report.registered {
                println!("{:<10} {}", format!("{:?}", registered.change), registered.entry.key());
            }
            for (skipped, reason) in &report.skipped {
                println!("{:<10} {} ({reason})", "skipped", skipped.display());
            }
        } else {
            let registered = guard
                .register_file(path, mode)
                .await
                .with_context(|| format!("failed to register {}", path.display()))?;
            println!("{:<10} {}", format!("{:?}", registered.change), registered.entry.key());
            if let Some(template) = registered.same_template_as {
                println!("           same template as {template}");
            }
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!("failed to listen for ctrl-c: {e}");
        std::future::pending::<()>().await;
    }
}
