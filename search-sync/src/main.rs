//! Search-state synchronizer CLI.
//!
//! Compares saved and current dashboard search state, and previews what a
//! reset to the saved state produces, using the same synchronizer the
//! dashboard runs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use search_sync::core::compare::diff_state;
use search_sync::core::types::{ComparableState, SearchState};
use search_sync::exit_codes;
use search_sync::io::config::{DEFAULT_CONFIG_FILE, SearchSyncConfig, load_config, write_config};
use search_sync::io::state_file::load_state;
use search_sync::logging;
use search_sync::manager::{ManagerInputs, SearchManager};
use search_sync::reactive::Pulse;
use search_sync::services::SearchServices;
use search_sync::services::memory::{MemoryQueryService, MemoryTimeFilter};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

#[derive(Parser)]
#[command(
    name = "search-sync",
    version,
    about = "Dashboard search-state synchronizer"
)]
struct Cli {
    /// Config file.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write the default config file.
    Init {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Print which fields of the current state differ from the saved state.
    Diff {
        #[arg(long)]
        saved: PathBuf,
        #[arg(long)]
        current: PathBuf,
        /// Compare time range and refresh interval even if the saved state
        /// does not restore time.
        #[arg(long)]
        time_restore: bool,
    },
    /// Print the state after resetting the current state to the saved one.
    Reset {
        #[arg(long)]
        saved: PathBuf,
        #[arg(long)]
        current: PathBuf,
    },
}

fn main() {
    logging::init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(exit_codes::INVALID);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Init { force } => cmd_init(&cli.config, force),
        Command::Diff {
            saved,
            current,
            time_restore,
        } => cmd_diff(&cli.config, &saved, &current, time_restore),
        Command::Reset { saved, current } => cmd_reset(&cli.config, &saved, &current),
    }
}

fn cmd_init(config: &Path, force: bool) -> Result<i32> {
    if !force && config.exists() {
        bail!(
            "{} already exists (use --force to overwrite)",
            config.display()
        );
    }
    write_config(config, &SearchSyncConfig::default())?;
    println!("{}", config.display());
    Ok(exit_codes::OK)
}

fn cmd_diff(config: &Path, saved: &Path, current: &Path, time_restore: bool) -> Result<i32> {
    load_config(config)?;
    let saved = load_state(saved)?;
    let current = load_state(current)?;
    let time_restore = time_restore || saved.time_restore == Some(true);

    let diff = diff_state(&saved, &ComparableState::from(&current), time_restore);
    debug!(changed = ?diff.changed_fields(), time_restore, "compared states");
    print_json(&diff)?;
    Ok(if diff.is_dirty() {
        exit_codes::DIRTY
    } else {
        exit_codes::OK
    })
}

fn cmd_reset(config: &Path, saved: &Path, current: &Path) -> Result<i32> {
    let cfg = load_config(config)?;
    let saved = load_state(saved)?;
    let current = load_state(current)?;

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .context("build tokio runtime")?;
    let state = runtime.block_on(async { reset_preview(&cfg, saved, current) });
    print_json(&state)?;
    Ok(exit_codes::OK)
}

/// Run a synchronizer over in-memory services seeded with `current`, reset it
/// to `saved`, and serialize the result.
fn reset_preview(cfg: &SearchSyncConfig, saved: SearchState, current: SearchState) -> SearchState {
    let (_control_group_tx, control_group) = watch::channel(None);
    let (_time_restore_tx, time_restore) = watch::channel(current.time_restore);
    let inputs = ManagerInputs {
        initial_state: current,
        control_group,
        time_restore,
        panels_loaded: Pulse::new(),
        last_saved_state: Arc::new(|| None::<SearchState>),
        services: SearchServices {
            time_filter: Arc::new(MemoryTimeFilter::from_config(cfg)),
            query: Arc::new(MemoryQueryService::from_config(cfg)),
        },
        options: None,
    };
    let manager = SearchManager::initialize(inputs, cfg);
    let internal = manager.internal_api();
    internal.reset(&saved);
    let state = internal.get_state();
    manager.cleanup();
    state
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}
