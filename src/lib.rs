//! Spacekeep: local-first persistence and graph scoping for Space workspaces.
//!
//! A Space is a user-editable graph of nodes and edges. Spacekeep keeps the catalog of
//! Spaces, persists each Space's graph in a local SQLite slot store with an optional
//! remote mirror, computes cluster membership and visibility tiers over the graph, and
//! cuts self-contained subgraphs for share links.
//!
//! # Architecture
//!
//! ## Local first
//!
//! The local slot store is always the source of truth. A remote mirror, when
//! configured, receives debounced copies and is only read from when a slot is missing
//! locally (or at startup, when the local store is completely empty).
//!
//! ## The Thin Waist
//!
//! All local mutations route through `DbBroker`, which appends one audit line per
//! operation to `broker.events.jsonl`.
//!
//! ## Subsystems (Plugins)
//!
//! - `spaces`: registry, lifecycle and trash retention
//! - `space_store`: graph persistence, core-node migration, contamination guard
//! - `share`: scoped share links
//! - `entitlements`: quota gate
//! - `playground`: the onboarding Space
//!
//! # Examples
//!
//! ```bash
//! spacekeep init
//! spacekeep space create --name "Research"
//! spacekeep space list
//! spacekeep share create --space <id> --scope cluster --node <cluster-id>
//! ```
//!
//! # Crate Structure
//!
//! - [`core`]: storage, configuration, model and hierarchy algorithms
//! - [`plugins`]: registry, store, sharing and entitlements

pub mod core;
pub mod plugins;

use crate::core::{
    broker,
    config::{self, SpaceConfig},
    error::SpaceError,
    migration, schemas,
    store::{self, Store},
};
use crate::plugins::{
    entitlements,
    share, space_store::SpaceStore,
    spaces::{self, SpaceRegistry},
};

use clap::{Parser, Subcommand};
use colored::Colorize;
use std::fs;
use std::path::PathBuf;

/// Environment variable holding the tracing filter for the binary.
pub const LOG_ENV: &str = "SPACEKEEP_LOG";

#[derive(Parser, Debug)]
#[clap(
    name = "spacekeep",
    version = env!("CARGO_PKG_VERSION"),
    about = "Local-first persistence and graph scoping for Spaces"
)]
struct Cli {
    /// Project directory (defaults to the nearest one containing `.spacekeep`).
    #[clap(long, global = true)]
    dir: Option<PathBuf>,
    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create `.spacekeep/` with a default config and the playground Space.
    Init,
    /// Manage Spaces.
    Space(spaces::SpacesCli),
    /// Manage share links.
    Share(share::ShareCli),
    /// Run pending local-store migrations.
    Migrate,
    /// Print the broker audit log.
    Audit {
        /// Show only the last N events
        #[clap(long, default_value_t = 50)]
        limit: usize,
    },
    /// Print the version.
    Version,
}

pub fn run() -> Result<(), SpaceError> {
    let cli = Cli::parse();
    let current_dir = std::env::current_dir()?;

    match cli.command {
        Command::Version => {
            println!("v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Command::Init => {
            let project = cli.dir.unwrap_or(current_dir);
            init_project(&project)
        }
        command => {
            let start = cli.dir.unwrap_or(current_dir);
            let project = store::find_project_root(&start)?;
            let store = Store::persistent(project.join(schemas::STORE_DIR_NAME));
            let config = config::load_config(&store.root)?;
            run_in_store(&store, &config, command)
        }
    }
}

fn run_in_store(store: &Store, config: &SpaceConfig, command: Command) -> Result<(), SpaceError> {
    match command {
        Command::Space(space_cli) => {
            let mut registry = SpaceRegistry::open_store(store, config)?;
            let gate = entitlements::load_entitlements(registry.store(), &config.entitlements)?;
            spaces::run_spaces_cli(&mut registry, &gate, space_cli)
        }
        Command::Share(share_cli) => {
            let mut registry = SpaceRegistry::open_store(store, config)?;
            let gate = entitlements::load_entitlements(registry.store(), &config.entitlements)?;
            share::run_share_cli(&mut registry, &gate, share_cli)
        }
        Command::Migrate => {
            let space_store = SpaceStore::open(store)?;
            let before = migration::stored_version(space_store.local())?;
            let applied = migration::check_and_migrate(space_store.local(), space_store.now_ms())?;
            println!(
                "{} schema {} -> {} ({} migration(s) applied)",
                "●".bright_cyan(),
                before.as_deref().unwrap_or("unversioned").bright_yellow(),
                migration::SCHEMA_VERSION.bright_green(),
                applied
            );
            Ok(())
        }
        Command::Audit { limit } => {
            let events = broker::read_audit_log(store)?;
            let skip = events.len().saturating_sub(limit);
            for ev in events.iter().skip(skip) {
                let status = if ev.status == "success" {
                    ev.status.green()
                } else {
                    ev.status.red()
                };
                println!("{} {:<14} {:<32} {}", ev.ts.dimmed(), ev.op, ev.slot, status);
            }
            Ok(())
        }
        Command::Init | Command::Version => Ok(()),
    }
}

fn init_project(project: &std::path::Path) -> Result<(), SpaceError> {
    let root = project.join(schemas::STORE_DIR_NAME);
    fs::create_dir_all(&root)?;
    let config_path = config::write_default_config(&root)?;
    let store = Store::persistent(&root);
    let config = config::load_config(&root)?;

    let mut registry = SpaceRegistry::open_store(&store, &config)?;
    let seeded = registry.ensure_onboarding_spaces()?;
    registry.flush_all()?;

    println!("{} {}", "✓".bright_green(), "spacekeep initialized".bold());
    println!("  {} {}", "store ".dimmed(), root.display());
    println!("  {} {}", "config".dimmed(), config_path.display());
    if seeded {
        println!("  {} playground space ready", "●".bright_cyan());
    }
    Ok(())
}
