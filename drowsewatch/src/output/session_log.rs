//! Append-only CSV session log.
//!
//! A row is written for every tick that produced an event and for every
//! tick during calibration.  The header is only written to a new or
//! empty file, so restarts keep appending to the same log.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use tracing::info;

use crate::engine::{EngineSnapshot, EventKind};

pub const HEADER: &str =
    "Timestamp,Ratio,Fatigue_Score,Event_Type,Alarm_Level,Blink_Duration,Microsleep_Detected";

pub struct SessionLogger<W: Write> {
    writer: W,
    rows: u64,
}

impl SessionLogger<BufWriter<File>> {
    /// Open `path` for appending, creating parent directories as needed.
    pub fn open(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let is_empty = file.metadata()?.len() == 0;
        info!("Session log: {}", path.display());
        Self::new(BufWriter::new(file), is_empty)
    }
}

impl<W: Write> SessionLogger<W> {
    pub fn new(mut writer: W, write_header: bool) -> io::Result<Self> {
        if write_header {
            writeln!(writer, "{}", HEADER)?;
            writer.flush()?;
        }
        Ok(Self { writer, rows: 0 })
    }

    /// Whether a snapshot is worth a row.
    pub fn should_log(snapshot: &EngineSnapshot) -> bool {
        snapshot.last_event.is_some() || snapshot.is_calibrating
    }

    /// Write a row for `snapshot` if it qualifies.  Returns whether a row
    /// was written.
    pub fn log_snapshot(&mut self, snapshot: &EngineSnapshot) -> io::Result<bool> {
        if !Self::should_log(snapshot) {
            return Ok(false);
        }
        let row = format_row(Local::now(), snapshot);
        writeln!(self.writer, "{}", row)?;
        self.writer.flush()?;
        self.rows += 1;
        Ok(true)
    }

    /// Rows written since opening.
    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// One CSV row.  The event column reads `calibrating` on eventless
/// calibration ticks.
pub fn format_row(timestamp: DateTime<Local>, snapshot: &EngineSnapshot) -> String {
    let event = match snapshot.last_event {
        Some(kind) => kind.as_str(),
        None if snapshot.is_calibrating => "calibrating",
        None => "",
    };
    format!(
        "{},{:.4},{:.1},{},{},{:.3},{}",
        timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
        snapshot.current_ratio,
        snapshot.fatigue_score,
        event,
        snapshot.status().as_str(),
        snapshot.blink_duration,
        snapshot.last_event == Some(EventKind::Microsleep),
    )
}

// ── Tests ───────────────────────────────────────────────────
