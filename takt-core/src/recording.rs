//! Append-only JSONL recording of accepted transmissions, and replay.
//!
//! Each process start appends a session header line; every transmission the
//! dispatcher accepts is appended as one line with its stamped number. The
//! file is tailable with `tail -f`.

use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use takt_types::{DispatchOutcome, Dispatcher, Transmission};

pub struct TransmissionRecorder {
    writer: BufWriter<File>,
    path: PathBuf,
    session_start: Instant,
}

#[derive(Serialize)]
struct SessionHeader {
    event: &'static str,
    epoch_ms: u128,
    pid: u32,
}

#[derive(Serialize)]
struct RecordEntry<'a> {
    t_ms: u128,
    number: u64,
    unique_id: u16,
    transmission: &'a Transmission,
}

#[derive(Deserialize)]
struct ReplayEntry {
    transmission: Option<Transmission>,
    // session headers have `event` instead of `transmission`
    #[allow(dead_code)]
    event: Option<String>,
}

impl TransmissionRecorder {
    /// Open `path` for appending and write a session header.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let mut writer = BufWriter::new(file);

        let header = SessionHeader {
            event: "session_start",
            epoch_ms: std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
            pid: std::process::id(),
        };
        let json = serde_json::to_string(&header).map_err(io::Error::other)?;
        writeln!(writer, "{}", json)?;
        writer.flush()?;

        log::info!(target: "recording", "recording transmissions to {}", path.display());
        Ok(Self {
            writer,
            path: path.to_path_buf(),
            session_start: Instant::now(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one stamped transmission. Failures are logged, never raised:
    /// a full disk must not stop dispatch.
    pub fn record(&mut self, number: u64, transmission: &Transmission) {
        let entry = RecordEntry {
            t_ms: self.session_start.elapsed().as_millis(),
            number,
            unique_id: transmission.unique_id(),
            transmission,
        };
        let result = serde_json::to_string(&entry)
            .map_err(io::Error::other)
            .and_then(|json| {
                writeln!(self.writer, "{}", json)?;
                self.writer.flush()
            });
        if let Err(e) = result {
            log::error!(target: "recording", "failed to record transmission {}: {}", number, e);
        }
    }
}

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("could not read recording: {0}")]
    Io(#[from] io::Error),
}

/// Counts from one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub dispatched: usize,
    pub applied: usize,
    pub skipped_lines: usize,
    pub failed: usize,
}

/// Re-dispatch every transmission in a recording, in file order.
///
/// Session headers, blank lines and lines that do not parse are skipped.
/// Dispatch failures are logged and counted; replay continues.
pub fn replay_recording<D>(path: &Path, dispatcher: &D) -> Result<ReplaySummary, ReplayError>
where
    D: Dispatcher,
    D::Error: std::fmt::Display,
{
    let mut summary = ReplaySummary::default();
    let file = File::open(path)?;
    for line in BufReader::new(file).lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: ReplayEntry = match serde_json::from_str(&line) {
            Ok(e) => e,
            Err(_) => {
                summary.skipped_lines += 1;
                continue;
            }
        };
        let Some(transmission) = entry.transmission else {
            continue;
        };
        summary.dispatched += 1;
        match dispatcher.dispatch(transmission) {
            Ok(DispatchOutcome::Applied { .. }) => summary.applied += 1,
            Ok(_) => {}
            Err(e) => {
                summary.failed += 1;
                log::error!(target: "recording", "replayed transmission failed: {}", e);
            }
        }
    }
    log::info!(
        target: "recording",
        "replayed {}: {} dispatched, {} applied, {} failed, {} lines skipped",
        path.display(),
        summary.dispatched,
        summary.applied,
        summary.failed,
        summary.skipped_lines
    );
    Ok(summary)
}
