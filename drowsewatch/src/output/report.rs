//! Session report: metric samples every couple of seconds plus one record
//! per alarm, exported as a single JSON document at shutdown.

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use crate::engine::{AlarmLevel, EngineSnapshot, EventKind, MonitorStatus};

/// Seconds between metric samples.
pub const METRIC_INTERVAL_S: f64 = 2.0;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricRecord {
    pub timestamp: DateTime<Local>,
    pub session_s: f64,
    pub ratio: f64,
    pub baseline_ratio: f64,
    pub threshold: f64,
    pub fatigue_score: f64,
    pub blink_count_60s: usize,
    pub microsleep_count: u32,
    pub status: MonitorStatus,
    pub event: Option<EventKind>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmRecord {
    pub timestamp: DateTime<Local>,
    pub session_s: f64,
    pub level: AlarmLevel,
    pub fatigue_score: f64,
    pub ratio_at_trigger: f64,
    pub blink_count_60s: usize,
    pub microsleep_count: u32,
    /// Event that pushed the score over, or `score_threshold` when the
    /// crossing happened without one on that tick.
    pub trigger: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub started_at: DateTime<Local>,
    pub duration_s: f64,
    pub ticks: u64,
    pub peak_score: f64,
    pub final_score: f64,
    pub microsleeps: u32,
    pub warning_alarms: usize,
    pub critical_alarms: usize,
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    summary: ReportSummary,
    metrics: &'a [MetricRecord],
    alarms: &'a [AlarmRecord],
}

/// Accumulates per-session metrics from the snapshot stream.
#[derive(Debug)]
pub struct SessionReport {
    started_at: DateTime<Local>,
    interval_s: f64,
    next_sample_s: f64,
    last_level: Option<AlarmLevel>,
    last_session_s: f64,
    ticks: u64,
    peak_score: f64,
    final_score: f64,
    microsleeps: u32,
    metrics: Vec<MetricRecord>,
    alarms: Vec<AlarmRecord>,
}

impl Default for SessionReport {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionReport {
    pub fn new() -> Self {
        Self {
            started_at: Local::now(),
            interval_s: METRIC_INTERVAL_S,
            next_sample_s: 0.0,
            last_level: None,
            last_session_s: 0.0,
            ticks: 0,
            peak_score: 0.0,
            final_score: 0.0,
            microsleeps: 0,
            metrics: Vec::new(),
            alarms: Vec::new(),
        }
    }

    /// Feed one tick.  `session_s` is the engine-clock time since the
    /// session started.
    pub fn record(&mut self, snapshot: &EngineSnapshot, session_s: f64) {
        self.ticks += 1;
        self.last_session_s = session_s;
        self.peak_score = self.peak_score.max(snapshot.fatigue_score);
        self.final_score = snapshot.fatigue_score;
        self.microsleeps = snapshot.microsleep_count;

        if session_s >= self.next_sample_s {
            self.metrics.push(MetricRecord {
                timestamp: Local::now(),
                session_s,
                ratio: snapshot.current_ratio,
                baseline_ratio: snapshot.baseline_ratio,
                threshold: snapshot.threshold,
                fatigue_score: snapshot.fatigue_score,
                blink_count_60s: snapshot.blink_count_last_60s,
                microsleep_count: snapshot.microsleep_count,
                status: snapshot.status(),
                event: snapshot.last_event,
            });
            while self.next_sample_s <= session_s {
                self.next_sample_s += self.interval_s;
            }
        }

        if snapshot.is_calibrating {
            return;
        }
        let level = snapshot.alarm_level;
        let changed = self.last_level.map_or(true, |last| last != level);
        if changed && level != AlarmLevel::Normal {
            self.alarms.push(AlarmRecord {
                timestamp: Local::now(),
                session_s,
                level,
                fatigue_score: snapshot.fatigue_score,
                ratio_at_trigger: snapshot.current_ratio,
                blink_count_60s: snapshot.blink_count_last_60s,
                microsleep_count: snapshot.microsleep_count,
                trigger: snapshot
                    .last_event
                    .map(|e| e.as_str().to_string())
                    .unwrap_or_else(|| "score_threshold".to_string()),
            });
        }
        self.last_level = Some(level);
    }

    pub fn metrics(&self) -> &[MetricRecord] {
        &self.metrics
    }

    pub fn alarms(&self) -> &[AlarmRecord] {
        &self.alarms
    }

    pub fn summary(&self) -> ReportSummary {
        let count = |level: AlarmLevel| self.alarms.iter().filter(|a| a.level == level).count();
        ReportSummary {
            started_at: self.started_at,
            duration_s: self.last_session_s,
            ticks: self.ticks,
            peak_score: self.peak_score,
            final_score: self.final_score,
            microsleeps: self.microsleeps,
            warning_alarms: count(AlarmLevel::Warning),
            critical_alarms: count(AlarmLevel::Critical),
        }
    }

    /// Serialize the whole report as pretty JSON.
    pub fn write_json<W: Write>(&self, writer: W) -> io::Result<()> {
        let doc = ReportDocument {
            summary: self.summary(),
            metrics: &self.metrics,
            alarms: &self.alarms,
        };
        serde_json::to_writer_pretty(writer, &doc).map_err(io::Error::from)
    }

    /// Write the report to `path`, creating parent directories.
    pub fn export_json(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut writer = BufWriter::new(File::create(path)?);
        self.write_json(&mut writer)?;
        writer.flush()?;
        info!(
            "Session report written to {} ({} samples, {} alarms)",
            path.display(),
            self.metrics.len(),
            self.alarms.len()
        );
        Ok(())
    }
}

// ── Tests ───────────────────────────────────────────────────
