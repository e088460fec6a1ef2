//! Audible alarm playback policy.
//!
//! Maps the per-tick monitor status onto an [`AlertSink`]:
//! - NORMAL / CALIBRATING / NO_FACE: silence
//! - WARNING: short alert, repeated every 5s while sustained
//! - CRITICAL: continuous loop, kept through the hysteresis-held WARNING
//!   and only stopped once the status leaves the alarming range
//!
//! Sink failures are logged and dropped; they never reach the engine.

use std::io::Write;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::engine::MonitorStatus;
use crate::error::SinkError;

/// Default interval between repeated warning alerts.
pub const WARNING_REPEAT_S: f64 = 5.0;

// ── AlertSink ───────────────────────────────────────────────

/// Output device for alerts.  Implementations must not block.
pub trait AlertSink {
    /// Play the short warning alert once.
    fn play_warning(&mut self) -> Result<(), SinkError>;
    /// Start the continuous critical alert.
    fn start_critical_loop(&mut self) -> Result<(), SinkError>;
    /// Stop whatever is playing.
    fn stop(&mut self) -> Result<(), SinkError>;
    /// Called every tick while the critical loop is running.
    fn poll(&mut self, _now: Instant) -> Result<(), SinkError> {
        Ok(())
    }
    fn name(&self) -> &'static str;
}

/// Sink that only records what it was asked to do.
#[derive(Debug, Default)]
pub struct SilentSink {
    pub warnings: u32,
    pub loops_started: u32,
    pub stops: u32,
}

impl AlertSink for SilentSink {
    fn play_warning(&mut self) -> Result<(), SinkError> {
        self.warnings += 1;
        Ok(())
    }

    fn start_critical_loop(&mut self) -> Result<(), SinkError> {
        self.loops_started += 1;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.stops += 1;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "silent"
    }
}

/// Terminal bell on a writer (normally stderr).  The critical loop
/// rings once per `loop_interval`.
pub struct TerminalBell<W: Write> {
    out: W,
    looping: bool,
    last_ring: Option<Instant>,
    loop_interval: Duration,
}

impl<W: Write> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            looping: false,
            last_ring: None,
            loop_interval: Duration::from_secs(1),
        }
    }

    fn ring(&mut self) -> Result<(), SinkError> {
        self.out.write_all(b"\x07")?;
        self.out.flush()?;
        Ok(())
    }
}

impl<W: Write> AlertSink for TerminalBell<W> {
    fn play_warning(&mut self) -> Result<(), SinkError> {
        self.ring()
    }

    fn start_critical_loop(&mut self) -> Result<(), SinkError> {
        self.looping = true;
        self.last_ring = None;
        Ok(())
    }

    fn stop(&mut self) -> Result<(), SinkError> {
        self.looping = false;
        self.last_ring = None;
        Ok(())
    }

    fn poll(&mut self, now: Instant) -> Result<(), SinkError> {
        if !self.looping {
            return Ok(());
        }
        let due = self
            .last_ring
            .map_or(true, |last| now.saturating_duration_since(last) >= self.loop_interval);
        if due {
            self.last_ring = Some(now);
            self.ring()?;
        }
        Ok(())
    }

    fn name(&self) -> &'static str {
        "terminal-bell"
    }
}

// ── AlarmPlayer ─────────────────────────────────────────────

/// What the sink is currently doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    Silent,
    Warning,
    CriticalLoop,
}

impl PlaybackMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Silent => "silent",
            Self::Warning => "warning",
            Self::CriticalLoop => "critical-loop",
        }
    }
}

/// Action taken on a tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackAction {
    None,
    Warning,
    StartLoop,
    Stop,
}

/// Non-overlapping alarm playback driven by the monitor status.
pub struct AlarmPlayer {
    sink: Box<dyn AlertSink>,
    mode: PlaybackMode,
    last_warning: Option<Instant>,
    repeat_interval: Duration,
    failures: u64,
}

impl AlarmPlayer {
    pub fn new(sink: Box<dyn AlertSink>) -> Self {
        info!("Alarm player using {} sink", sink.name());
        Self {
            sink,
            mode: PlaybackMode::Silent,
            last_warning: None,
            repeat_interval: Duration::from_secs_f64(WARNING_REPEAT_S),
            failures: 0,
        }
    }

    /// Drive playback for this tick's status.
    pub fn update(&mut self, status: MonitorStatus, now: Instant) -> PlaybackAction {
        let action = match (status, self.mode) {
            (MonitorStatus::Critical, PlaybackMode::CriticalLoop) => PlaybackAction::None,
            (MonitorStatus::Critical, _) => {
                self.stop_internal();
                let result = self.sink.start_critical_loop();
                self.check(result);
                self.mode = PlaybackMode::CriticalLoop;
                PlaybackAction::StartLoop
            }
            // Never downgrade a running critical loop to the warning beep.
            (MonitorStatus::Warning, PlaybackMode::CriticalLoop) => PlaybackAction::None,
            (MonitorStatus::Warning, PlaybackMode::Warning) => {
                let due = self
                    .last_warning
                    .map_or(true, |last| now.saturating_duration_since(last) >= self.repeat_interval);
                if due {
                    self.play_warning(now);
                    PlaybackAction::Warning
                } else {
                    PlaybackAction::None
                }
            }
            (MonitorStatus::Warning, PlaybackMode::Silent) => {
                self.play_warning(now);
                self.mode = PlaybackMode::Warning;
                PlaybackAction::Warning
            }
            (_, PlaybackMode::Silent) => PlaybackAction::None,
            (_, _) => {
                self.stop_internal();
                PlaybackAction::Stop
            }
        };

        if self.mode == PlaybackMode::CriticalLoop {
            let result = self.sink.poll(now);
            self.check(result);
        }
        if action != PlaybackAction::None {
            debug!("Alarm playback: {:?} ({})", action, self.mode.as_str());
        }
        action
    }

    /// Silence everything immediately.
    pub fn silence(&mut self) {
        if self.mode != PlaybackMode::Silent {
            self.stop_internal();
        }
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    /// Sink failures swallowed so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    fn play_warning(&mut self, now: Instant) {
        let result = self.sink.play_warning();
        self.check(result);
        self.last_warning = Some(now);
    }

    fn stop_internal(&mut self) {
        let result = self.sink.stop();
        self.check(result);
        self.mode = PlaybackMode::Silent;
        self.last_warning = None;
    }

    fn check(&mut self, result: Result<(), SinkError>) {
        if let Err(e) = result {
            self.failures += 1;
            if self.failures == 1 || self.failures % 100 == 0 {
                warn!(
                    "Alert sink {} failed ({} failure(s) so far): {}",
                    self.sink.name(),
                    self.failures,
                    e
                );
            }
        }
    }
}

// ── Tests ───────────────────────────────────────────────────
