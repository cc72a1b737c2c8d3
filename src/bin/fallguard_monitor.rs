//! fallguard_monitor - caregiver view of the incident store

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use fall_guard::{
    now_ms, FallGuardConfig, IncidentStore, LogAlarm, Monitor, MonitorChange, SqliteIncidentStore,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Config file (TOML or JSON). Overrides FALLGUARD_CONFIG.
    #[arg(long, env = "FALLGUARD_CONFIG")]
    config: Option<PathBuf>,
    /// Incident database. Overrides the configured db_path.
    #[arg(long)]
    db_path: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: ui::UiMode,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Poll the store and raise the alarm on new falls.
    Watch {
        /// Poll once and exit.
        #[arg(long)]
        once: bool,
    },
    /// List recent falls, newest first.
    History {
        /// Write each evidence JPEG into this directory.
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// Mark the current fall as handled.
    Resolve,
    /// Delete one history entry.
    Delete { id: String },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(args.ui, std::io::stderr().is_terminal());

    let mut cfg = FallGuardConfig::load_from(args.config.as_deref())?;
    if let Some(db_path) = args.db_path {
        cfg.db_path = db_path;
    }
    let mut store = {
        let stage = ui.stage("Open incident store");
        let store = SqliteIncidentStore::open(&cfg.db_path)?;
        stage.done();
        store
    };
    let mut monitor = Monitor::new(cfg.monitor.clone(), LogAlarm::default());

    match args.command {
        Command::Watch { once } => watch(&mut monitor, &store, &cfg, once),
        Command::History { export_dir } => history(&store, &cfg, export_dir),
        Command::Resolve => {
            monitor.resolve(&mut store)?;
            println!("incident resolved");
            Ok(())
        }
        Command::Delete { id } => {
            if monitor.delete_history(&mut store, &id)? {
                println!("deleted {}", id);
                Ok(())
            } else {
                Err(anyhow!("no history entry with id {}", id))
            }
        }
    }
}

fn watch(
    monitor: &mut Monitor<LogAlarm>,
    store: &SqliteIncidentStore,
    cfg: &FallGuardConfig,
    once: bool,
) -> Result<()> {
    let running = Arc::new(AtomicBool::new(true));
    let running_handler = running.clone();
    ctrlc::set_handler(move || {
        running_handler.store(false, Ordering::SeqCst);
    })
    .map_err(|e| anyhow!("error setting Ctrl-C handler: {}", e))?;

    log::info!("watching {}", cfg.db_path.display());
    while running.load(Ordering::SeqCst) {
        match monitor.poll(store, now_ms()?) {
            Ok(changes) => {
                for change in changes {
                    print_change(&change);
                }
            }
            Err(err) => log::error!("store poll failed: {:#}", err),
        }
        if once {
            break;
        }
        std::thread::sleep(cfg.monitor.poll);
    }
    Ok(())
}

fn print_change(change: &MonitorChange) {
    match change {
        MonitorChange::AlarmRaised { timestamp_ms } => {
            println!("FALL DETECTED at {}", format_timestamp(*timestamp_ms));
        }
        MonitorChange::AlarmStopped => println!("incident cleared"),
        MonitorChange::CameraOnline => println!("camera online"),
        MonitorChange::CameraOffline { last_active_ms } => {
            println!("camera offline (last seen {})", format_timestamp(*last_active_ms));
        }
        MonitorChange::HistoryUpdated { entries } => {
            println!("history: {} entries", entries);
        }
    }
}

fn history(
    store: &SqliteIncidentStore,
    cfg: &FallGuardConfig,
    export_dir: Option<PathBuf>,
) -> Result<()> {
    let items = store.recent_history(cfg.monitor.history_limit)?;
    if items.is_empty() {
        println!("no falls recorded");
        return Ok(());
    }
    if let Some(dir) = &export_dir {
        std::fs::create_dir_all(dir)?;
    }
    for item in items {
        let size = item.evidence.as_ref().map(|jpeg| jpeg.len()).unwrap_or(0);
        println!(
            "{}  {}  evidence {} bytes",
            item.id,
            format_timestamp(Some(item.timestamp_ms)),
            size
        );
        if let (Some(dir), Some(jpeg)) = (&export_dir, &item.evidence) {
            let path = dir.join(format!("{}.jpg", item.id));
            std::fs::write(&path, jpeg)?;
        }
    }
    Ok(())
}

fn format_timestamp(timestamp_ms: Option<u64>) -> String {
    match timestamp_ms {
        Some(ms) => format!("{}.{:03}s", ms / 1000, ms % 1000),
        None => "never".to_string(),
    }
}
