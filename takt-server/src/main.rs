//! takt server process.
//!
//! Restores the state, verifies the license, and applies transmissions read
//! as JSON lines from stdin. Each processed transmission is echoed to stdout
//! as one JSON line. The state is saved on EOF and on the autosave timer.

use std::fs::File;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use chrono::Utc;
use crossbeam_channel::{never, tick, Receiver};
use serde::Deserialize;

use takt_core::config::Config;
use takt_core::context::ProcessContext;
use takt_core::dispatch::{DispatchEvent, DispatchWorker, EventBus, TransmissionDispatcher};
use takt_core::license::{FingerprintMonitor, LicenseManager};
use takt_core::persistence::{load_state, save_state};
use takt_core::recording::{replay_recording, TransmissionRecorder};
use takt_core::state::SystemState;
use takt_types::{Transmission, TransmissionKind, UserId};

/// One stdin line. `created` is stamped on arrival.
#[derive(Deserialize)]
struct ConsoleLine {
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    instigator: Option<UserId>,
    kind: TransmissionKind,
}

impl ConsoleLine {
    fn into_transmission(self) -> Transmission {
        Transmission {
            number: self.number,
            instigator: self.instigator,
            created: Utc::now(),
            kind: self.kind,
        }
    }
}

fn init_logging(verbose: bool) {
    use simplelog::{LevelFilter, WriteLogger};

    let log_level = if verbose { LevelFilter::Debug } else { LevelFilter::Info };

    let log_path = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("takt")
        .join("takt.log");

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let log_file = match File::create(&log_path).or_else(|_| File::create("/tmp/takt.log")) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("cannot create log file: {}", e);
            return;
        }
    };

    if let Err(e) = WriteLogger::init(log_level, simplelog::Config::default(), log_file) {
        eprintln!("failed to initialize logger: {}", e);
        return;
    }

    log::info!("takt starting (log level: {:?})", log_level);
}

fn arg_value(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}

fn restore(path: &Path) -> SystemState {
    if !path.exists() {
        log::info!("no state at {}; starting blank", path.display());
        return SystemState::blank(Utc::now());
    }
    match load_state(path) {
        Ok(state) => state,
        Err(e) => {
            eprintln!("cannot load {}: {}", path.display(), e);
            std::process::exit(1);
        }
    }
}

fn save(path: &Path, state: &SystemState, ctx: &ProcessContext) {
    if let Err(e) = save_state(path, state, ctx) {
        log::error!("save to {} failed: {}", path.display(), e);
        eprintln!("save failed: {}", e);
    }
}

fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = crossbeam_channel::unbounded();
    let spawned = thread::Builder::new()
        .name("takt-stdin".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                if tx.send(line).is_err() {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        log::error!("failed to spawn stdin reader: {}", e);
    }
    rx
}

fn echo(event: &DispatchEvent) {
    if let DispatchEvent::TransmissionProcessed {
        number,
        unique_id,
        outcome,
    } = event
    {
        let line = serde_json::json!({
            "number": number,
            "unique_id": unique_id,
            "outcome": outcome,
        });
        let mut out = io::stdout().lock();
        let _ = writeln!(out, "{}", line);
        let _ = out.flush();
    }
}

fn main() -> io::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");
    init_logging(verbose);

    let config = Config::load();
    let state_path = arg_value(&args, "--state")
        .map(PathBuf::from)
        .unwrap_or_else(|| config.state_path());
    let replay_path = arg_value(&args, "--replay").map(PathBuf::from);

    let ctx = Arc::new(ProcessContext::new(config.is_server(), config.retry_policy()));
    let state = Arc::new(restore(&state_path));
    let events = Arc::new(EventBus::new());

    let mut dispatcher = TransmissionDispatcher::new(Arc::clone(&state), Arc::clone(&ctx), events);
    if ctx.is_server() && config.recording_enabled() && replay_path.is_none() {
        match TransmissionRecorder::open(&config.recording_path()) {
            Ok(recorder) => dispatcher = dispatcher.with_recorder(recorder),
            Err(e) => log::error!("recording disabled: {}", e),
        }
    }
    let dispatcher = Arc::new(dispatcher);

    if let Some(path) = &replay_path {
        match replay_recording(path, dispatcher.as_ref()) {
            Ok(summary) => eprintln!(
                "replayed {}: {} applied of {} dispatched",
                path.display(),
                summary.applied,
                summary.dispatched
            ),
            Err(e) => {
                eprintln!("replay of {} failed: {}", path.display(), e);
                std::process::exit(1);
            }
        }
    }

    let manager = Arc::new(LicenseManager::new(Arc::clone(&state), Arc::clone(&ctx)));
    match config.license_paths() {
        Some(paths) => {
            let status = manager.reload(&paths, dispatcher.as_ref());
            eprintln!("license status: {} (code {})", status, status.code());
        }
        None => log::warn!("no license configured"),
    }
    let monitor = FingerprintMonitor::new(Arc::clone(&manager), Arc::clone(&dispatcher))
        .spawn(config.license_recheck_interval());

    let processed = dispatcher.events().subscribe_channel();
    let handle = DispatchWorker::spawn(Arc::clone(&dispatcher));
    let lines = spawn_stdin_reader();
    let autosave = if config.autosave_enabled() {
        tick(config.autosave_interval())
    } else {
        never()
    };

    loop {
        crossbeam_channel::select! {
            recv(lines) -> msg => {
                let Ok(line) = msg else { break };
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<ConsoleLine>(&line) {
                    Ok(input) => {
                        if let Err(e) = handle.submit(input.into_transmission()) {
                            log::error!("submit failed: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        log::warn!("ignoring malformed input line: {}", e);
                        eprintln!("malformed transmission: {}", e);
                    }
                }
            }
            recv(processed) -> event => {
                if let Ok(event) = event {
                    echo(&event);
                }
            }
            recv(autosave) -> _ => save(&state_path, &state, &ctx),
        }
    }

    handle.shutdown();
    for event in processed.try_iter() {
        echo(&event);
    }
    if let Some(monitor) = monitor {
        monitor.stop();
    }
    save(&state_path, &state, &ctx);
    ctx.request_shutdown();
    log::info!("takt stopped after transmission {}", state.last_transmission_number());
    Ok(())
}
