//! Monitor state: the engine plus everything that consumes its
//! snapshots.  Owned by the runner loop and handed to the control
//! channel.

use std::fs::File;
use std::io::BufWriter;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::engine::{Engine, EngineSnapshot, MonitorStatus};
use crate::output::{AlarmPlayer, SessionLogger, SessionReport};

pub struct MonitorState<C: Clock> {
    pub engine: Engine<C>,
    pub alarm: AlarmPlayer,
    pub session_log: Option<SessionLogger<BufWriter<File>>>,
    pub report: Option<SessionReport>,
    /// Engine-clock instant the session started.
    pub session_start: Instant,
    pub last_status: Option<MonitorStatus>,
    pub ticks: u64,
    pub control_messages: u64,
    pub running: bool,
    log_failures: u64,
}

impl<C: Clock> MonitorState<C> {
    pub fn new(engine: Engine<C>, alarm: AlarmPlayer) -> Self {
        let session_start = engine.clock().now();
        Self {
            engine,
            alarm,
            session_log: None,
            report: None,
            session_start,
            last_status: None,
            ticks: 0,
            control_messages: 0,
            running: true,
            log_failures: 0,
        }
    }

    pub fn with_session_log(mut self, logger: SessionLogger<BufWriter<File>>) -> Self {
        self.session_log = Some(logger);
        self
    }

    pub fn with_report(mut self, report: SessionReport) -> Self {
        self.report = Some(report);
        self
    }

    /// Seconds of engine-clock time since the session started.
    pub fn session_s(&self) -> f64 {
        self.engine
            .clock()
            .now()
            .saturating_duration_since(self.session_start)
            .as_secs_f64()
    }

    /// Run one engine tick and fan the snapshot out to the consumers.
    pub fn tick(&mut self, ratio: f64, presence: bool) -> EngineSnapshot {
        let snapshot = self.engine.update(ratio, presence);
        let now = self.engine.clock().now();
        let session_s = now.saturating_duration_since(self.session_start).as_secs_f64();
        self.ticks += 1;

        let status = snapshot.status();
        if self.last_status != Some(status) {
            match self.last_status {
                Some(previous) => info!("Status: {} -> {}", previous.as_str(), status.as_str()),
                None => info!("Status: {}", status.as_str()),
            }
            self.last_status = Some(status);
        }
        if let Some(event) = snapshot.last_event {
            debug!(
                "Event {} at {:.2}s (duration {:.3}s, score {:.1})",
                event.as_str(),
                session_s,
                snapshot.blink_duration,
                snapshot.fatigue_score
            );
        }

        self.alarm.update(status, now);

        if let Some(logger) = self.session_log.as_mut() {
            if let Err(e) = logger.log_snapshot(&snapshot) {
                self.log_failures += 1;
                if self.log_failures == 1 {
                    warn!("Session log write failed: {}", e);
                }
            }
        }
        if let Some(report) = self.report.as_mut() {
            report.record(&snapshot, session_s);
        }
        snapshot
    }

    /// Drop all engine state and recalibrate; any playing alarm stops.
    pub fn reset(&mut self) {
        self.engine.reset();
        self.alarm.silence();
        self.last_status = None;
    }

    /// Session log writes that failed and were dropped.
    pub fn log_failures(&self) -> u64 {
        self.log_failures
    }
}

// ── Tests ───────────────────────────────────────────────────
