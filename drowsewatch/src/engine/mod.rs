//! Fatigue engine — turns a per-tick eye-openness ratio into a calibrated,
//! hysteretic alarm decision.
//!
//! Provides:
//! - `calibration`: warm-up baseline and threshold
//! - `classifier`: blink / long blink / microsleep / rapid cluster events
//! - `score`: bounded, dampened, decaying fatigue score
//! - `alarm`: score-to-level state machine with hysteresis
//!
//! [`Engine`] sequences them once per tick and returns an immutable
//! [`EngineSnapshot`] for consumers.

pub mod alarm;
pub mod calibration;
pub mod classifier;
pub mod score;
pub mod window;

use std::time::Instant;

use serde::Serialize;
use tracing::{info, warn};

pub use alarm::{AlarmFsm, AlarmLevel};
pub use calibration::{Baseline, CalibrationStage, CalibrationStep};
pub use classifier::{ClosureTimer, EventClassifier, EventKind};
pub use score::ScoreAccumulator;

use crate::clock::{Clock, MonotonicClock};
use crate::config::EngineConfig;

// ── MonitorStatus ───────────────────────────────────────────

/// Display status: the alarm level, preceded by the engine-level
/// CALIBRATING and NO_FACE conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MonitorStatus {
    #[serde(rename = "CALIBRATING")]
    Calibrating,
    #[serde(rename = "NO_FACE")]
    NoFace,
    #[serde(rename = "NORMAL")]
    Normal,
    #[serde(rename = "WARNING")]
    Warning,
    #[serde(rename = "CRITICAL")]
    Critical,
}

impl MonitorStatus {
    /// String representation for IPC and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Calibrating => "CALIBRATING",
            Self::NoFace => "NO_FACE",
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parse a status from its string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "CALIBRATING" => Some(Self::Calibrating),
            "NO_FACE" => Some(Self::NoFace),
            other => AlarmLevel::from_str(other).map(Self::from),
        }
    }

    /// Whether an audible alarm should be sounding.
    pub fn is_alarming(&self) -> bool {
        matches!(self, Self::Warning | Self::Critical)
    }
}

impl From<AlarmLevel> for MonitorStatus {
    fn from(level: AlarmLevel) -> Self {
        match level {
            AlarmLevel::Normal => Self::Normal,
            AlarmLevel::Warning => Self::Warning,
            AlarmLevel::Critical => Self::Critical,
        }
    }
}

// ── EngineSnapshot ──────────────────────────────────────────

/// Immutable per-tick view of the engine handed to consumers.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub is_calibrating: bool,
    /// Warm-up progress in `[0, 1]`; 1.0 once monitoring.
    pub calibration_progress: f64,
    pub current_ratio: f64,
    /// Zero until calibration completes.
    pub baseline_ratio: f64,
    pub threshold: f64,
    /// Live closure length while closed, last completed closure otherwise
    /// (seconds).
    pub blink_duration: f64,
    pub blink_count_last_60s: usize,
    pub consecutive_low_frames: u32,
    pub microsleep_count: u32,
    /// Event reported on this tick, if any.
    pub last_event: Option<EventKind>,
    /// In `[0, 100]`.
    pub fatigue_score: f64,
    pub alarm_level: AlarmLevel,
    pub face_detected: bool,
}

impl EngineSnapshot {
    /// Status shown to the operator: CALIBRATING, then NO_FACE, then the
    /// alarm level.
    pub fn status(&self) -> MonitorStatus {
        if self.is_calibrating {
            MonitorStatus::Calibrating
        } else if !self.face_detected {
            MonitorStatus::NoFace
        } else {
            self.alarm_level.into()
        }
    }

    /// Label of the tick's event, or the empty string.
    pub fn event_label(&self) -> &'static str {
        self.last_event.map(|e| e.as_str()).unwrap_or("")
    }

    /// Generate IPC status s-expression.
    pub fn to_sexp(&self) -> String {
        format!(
            "(:status :{} :calibrating {} :calibration-progress {:.2} :ratio {:.4} :baseline {:.4} :threshold {:.4} :blink-duration {:.3} :blinks-60s {} :low-frames {} :microsleeps {} :event \"{}\" :score {:.1} :level :{} :face {})",
            self.status().as_str().to_lowercase().replace('_', "-"),
            if self.is_calibrating { "t" } else { "nil" },
            self.calibration_progress,
            self.current_ratio,
            self.baseline_ratio,
            self.threshold,
            self.blink_duration,
            self.blink_count_last_60s,
            self.consecutive_low_frames,
            self.microsleep_count,
            self.event_label(),
            self.fatigue_score,
            self.alarm_level.as_str().to_lowercase(),
            if self.face_detected { "t" } else { "nil" },
        )
    }
}

// ── Engine ──────────────────────────────────────────────────

/// Calibrating or monitoring.
#[derive(Debug, Clone)]
enum Phase {
    Calibrating(CalibrationStage),
    Monitoring {
        baseline: Baseline,
        started_at: Instant,
    },
}

/// Everything `reset()` throws away.
#[derive(Debug, Clone)]
struct EngineState {
    phase: Phase,
    classifier: EventClassifier,
    score: ScoreAccumulator,
    alarm: AlarmFsm,
    last_event: Option<EventKind>,
    last_ratio: f64,
    face_detected: bool,
    last_tick: Option<Instant>,
}

impl EngineState {
    fn new(config: &EngineConfig) -> Self {
        Self {
            phase: Phase::Calibrating(CalibrationStage::new()),
            classifier: EventClassifier::new(config),
            score: ScoreAccumulator::new(),
            alarm: AlarmFsm::new(),
            last_event: None,
            last_ratio: 0.0,
            face_detected: false,
            last_tick: None,
        }
    }
}

/// Per-session fatigue engine.  Not shareable across threads; every
/// mutation goes through `&mut self`.
#[derive(Debug)]
pub struct Engine<C: Clock = MonotonicClock> {
    config: EngineConfig,
    clock: C,
    state: EngineState,
}

impl Engine<MonotonicClock> {
    /// Engine reading the system monotonic clock.
    pub fn new(config: EngineConfig) -> Self {
        Self::with_clock(config, MonotonicClock)
    }
}

impl<C: Clock> Engine<C> {
    pub fn with_clock(config: EngineConfig, clock: C) -> Self {
        info!("Fatigue engine initialized");
        let state = EngineState::new(&config);
        Self {
            config,
            clock,
            state,
        }
    }

    /// Process one tick of signal and return the resulting snapshot.
    pub fn update(&mut self, ratio: f64, presence: bool) -> EngineSnapshot {
        let now = self.clock.now();
        let state = &mut self.state;
        state.last_event = None;
        state.last_ratio = ratio;
        state.last_tick = Some(now);

        if state.face_detected != presence {
            if presence {
                info!("Face reacquired");
            } else {
                warn!("Face lost, engine state frozen");
            }
            state.face_detected = presence;
        }

        if presence {
            match &mut state.phase {
                Phase::Calibrating(stage) => {
                    if let CalibrationStep::Complete(baseline) = stage.observe(ratio, now, &self.config) {
                        state.phase = Phase::Monitoring {
                            baseline,
                            started_at: now,
                        };
                        state.score.start_decay_clock(now);
                        info!(
                            "Monitoring started, scoring suppressed for {:.1}s",
                            self.config.grace_period_s
                        );
                    }
                }
                Phase::Monitoring {
                    baseline,
                    started_at,
                } => {
                    let in_grace = now.saturating_duration_since(*started_at).as_secs_f64()
                        < self.config.grace_period_s;
                    let events = state.classifier.observe(
                        ratio,
                        baseline.threshold,
                        now,
                        &self.config,
                        &mut state.score,
                        in_grace,
                    );
                    state.last_event = events.last().copied();
                    state
                        .score
                        .decay_until(now, ratio, baseline.median_ratio, &self.config);
                }
            }
        }
        state.classifier.prune(now);

        if matches!(state.phase, Phase::Monitoring { .. }) {
            let previous = state.alarm.level();
            let level = state.alarm.evaluate(state.score.value(), &self.config);
            if level != previous {
                log_level_change(previous, level, state.score.value());
            }
        }

        self.snapshot_at(now)
    }

    /// Pure projection of the current state at `now`.
    fn snapshot_at(&self, now: Instant) -> EngineSnapshot {
        let state = &self.state;
        let (is_calibrating, calibration_progress, baseline_ratio, threshold) = match &state.phase {
            Phase::Calibrating(stage) => (true, stage.progress(now, &self.config), 0.0, 0.0),
            Phase::Monitoring { baseline, .. } => {
                (false, 1.0, baseline.median_ratio, baseline.threshold)
            }
        };
        EngineSnapshot {
            is_calibrating,
            calibration_progress,
            current_ratio: state.last_ratio,
            baseline_ratio,
            threshold,
            blink_duration: state.classifier.blink_duration_s(),
            blink_count_last_60s: state.classifier.blink_count_at(now),
            consecutive_low_frames: state.classifier.timer().consecutive_low_frames,
            microsleep_count: state.classifier.microsleep_count(),
            last_event: state.last_event,
            fatigue_score: state.score.value(),
            alarm_level: state.alarm.level(),
            face_detected: state.face_detected,
        }
    }

    /// Snapshot as of the last tick, without advancing anything.
    pub fn snapshot(&self) -> EngineSnapshot {
        let now = self.state.last_tick.unwrap_or_else(|| self.clock.now());
        self.snapshot_at(now)
    }

    /// Discard all session state (baseline, windows, score, alarm) and
    /// start over with calibration.  Configuration and clock are kept.
    pub fn reset(&mut self) {
        self.state = EngineState::new(&self.config);
        info!("Fatigue engine reset, recalibrating");
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn is_calibrating(&self) -> bool {
        matches!(self.state.phase, Phase::Calibrating(_))
    }

    /// Baseline once calibration has completed.
    pub fn baseline(&self) -> Option<Baseline> {
        match &self.state.phase {
            Phase::Monitoring { baseline, .. } => Some(*baseline),
            Phase::Calibrating(_) => None,
        }
    }

    /// Completed closures since the last reset.
    pub fn total_blinks(&self) -> u64 {
        self.state.classifier.total_blinks()
    }

    /// Generate IPC metrics s-expression.
    pub fn metrics_sexp(&self) -> String {
        let baseline = self.baseline();
        format!(
            "(:calibrated {} :fallback {} :total-blinks {} :microsleeps {} :score {:.1} :alarm-active {} :peak-reached {})",
            if baseline.is_some() { "t" } else { "nil" },
            if baseline.map_or(false, |b| b.fallback) { "t" } else { "nil" },
            self.total_blinks(),
            self.state.classifier.microsleep_count(),
            self.state.score.value(),
            if self.state.alarm.is_active() { "t" } else { "nil" },
            if self.state.alarm.peak_reached() { "t" } else { "nil" },
        )
    }
}

fn log_level_change(from: AlarmLevel, to: AlarmLevel, score: f64) {
    match to {
        AlarmLevel::Normal => info!("Alarm level: normal (score {:.1})", score),
        AlarmLevel::Warning => {
            if from == AlarmLevel::Critical {
                info!("Alarm level: warning, held by hysteresis (score {:.1})", score);
            } else {
                warn!("Alarm level: warning (score {:.1})", score);
            }
        }
        AlarmLevel::Critical => warn!("Alarm level: CRITICAL (score {:.1})", score),
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::time::Duration;

    fn engine(calibration_s: f64) -> (Engine<ManualClock>, ManualClock) {
        let clock = ManualClock::new();
        let config = EngineConfig {
            calibration_s,
            ..EngineConfig::default()
        };
        (Engine::with_clock(config, clock.clone()), clock)
    }

    /// Calibrate at a constant 0.30 with 100ms ticks.
    fn calibrate(engine: &mut Engine<ManualClock>, clock: &ManualClock) -> EngineSnapshot {
        let mut snap = engine.update(0.30, true);
        while snap.is_calibrating {
            clock.advance(Duration::from_millis(100));
            snap = engine.update(0.30, true);
        }
        snap
    }

    #[test]
    fn test_calibration_flips_exactly_at_duration() {
        let (mut engine, clock) = engine(2.0);
        let snap = engine.update(0.30, true);
        assert!(snap.is_calibrating);
        assert_eq!(snap.status(), MonitorStatus::Calibrating);

        for _ in 0..19 {
            clock.advance(Duration::from_millis(100));
            assert!(engine.update(0.30, true).is_calibrating);
        }
        clock.advance(Duration::from_millis(100));
        let snap = engine.update(0.30, true);
        assert!(!snap.is_calibrating);
        assert!((snap.baseline_ratio - 0.30).abs() < 1e-9);
        assert!((snap.threshold - 0.21).abs() < 1e-9);
        assert_eq!(snap.calibration_progress, 1.0);
        assert_eq!(snap.status(), MonitorStatus::Normal);
    }

    #[test]
    fn test_no_face_freezes_state() {
        let (mut engine, clock) = engine(1.0);
        calibrate(&mut engine, &clock);
        clock.advance(Duration::from_secs(6));
        engine.update(0.30, true);

        // A microsleep puts some score on the board.
        engine.update(0.05, true);
        clock.advance(Duration::from_secs(3));
        let before = engine.update(0.30, true);
        assert!(before.fatigue_score > 0.0);

        for _ in 0..50 {
            clock.advance(Duration::from_secs(1));
            let snap = engine.update(0.0, false);
            assert_eq!(snap.fatigue_score, before.fatigue_score);
            assert_eq!(snap.baseline_ratio, before.baseline_ratio);
            assert_eq!(snap.status(), MonitorStatus::NoFace);
            assert_eq!(snap.last_event, None);
        }
    }

    #[test]
    fn test_grace_period_suppresses_scoring() {
        let (mut engine, clock) = engine(1.0);
        calibrate(&mut engine, &clock);

        engine.update(0.05, true);
        clock.advance(Duration::from_secs(3));
        let snap = engine.update(0.30, true);
        assert_eq!(snap.last_event, Some(EventKind::Microsleep));
        assert_eq!(snap.microsleep_count, 1);
        assert_eq!(snap.fatigue_score, 0.0);

        // Past the grace period the same closure scores; decay for the 3s
        // closure is applied on the same tick.
        clock.advance(Duration::from_secs(3));
        engine.update(0.05, true);
        clock.advance(Duration::from_secs(3));
        let snap = engine.update(0.30, true);
        assert_eq!(snap.microsleep_count, 2);
        assert!((snap.fatigue_score - 38.5).abs() < 1e-9, "got {}", snap.fatigue_score);
        assert_eq!(snap.alarm_level, AlarmLevel::Warning);
    }

    #[test]
    fn test_reset_restarts_calibration() {
        let (mut engine, clock) = engine(1.0);
        calibrate(&mut engine, &clock);
        assert!(engine.baseline().is_some());

        engine.reset();
        assert!(engine.is_calibrating());
        assert!(engine.baseline().is_none());
        assert_eq!(engine.total_blinks(), 0);

        let snap = engine.update(0.30, true);
        assert!(snap.is_calibrating);
        assert_eq!(snap.baseline_ratio, 0.0);
        assert_eq!(snap.calibration_progress, 0.0);
    }

    #[test]
    fn test_status_priority() {
        let snap = EngineSnapshot {
            is_calibrating: true,
            calibration_progress: 0.5,
            current_ratio: 0.0,
            baseline_ratio: 0.0,
            threshold: 0.0,
            blink_duration: 0.0,
            blink_count_last_60s: 0,
            consecutive_low_frames: 0,
            microsleep_count: 0,
            last_event: None,
            fatigue_score: 0.0,
            alarm_level: AlarmLevel::Critical,
            face_detected: false,
        };
        assert_eq!(snap.status(), MonitorStatus::Calibrating);

        let snap = EngineSnapshot {
            is_calibrating: false,
            ..snap
        };
        assert_eq!(snap.status(), MonitorStatus::NoFace);

        let snap = EngineSnapshot {
            face_detected: true,
            ..snap
        };
        assert_eq!(snap.status(), MonitorStatus::Critical);
        assert!(snap.status().is_alarming());
    }

    #[test]
    fn test_snapshot_sexp() {
        let (mut engine, _clock) = engine(1.0);
        let sexp = engine.update(0.3, true).to_sexp();
        assert!(sexp.contains(":status :calibrating"));
        assert!(sexp.contains(":calibrating t"));
        assert!(sexp.contains(":ratio 0.3000"));
        assert!(sexp.contains(":event \"\""));
        assert!(sexp.contains(":level :normal"));

        let sexp = engine.update(0.3, false).to_sexp();
        assert!(sexp.contains(":face nil"));
    }

    #[test]
    fn test_monitor_status_roundtrip() {
        for status in [
            MonitorStatus::Calibrating,
            MonitorStatus::NoFace,
            MonitorStatus::Normal,
            MonitorStatus::Warning,
            MonitorStatus::Critical,
        ] {
            assert_eq!(MonitorStatus::from_str(status.as_str()), Some(status));
        }
        assert_eq!(MonitorStatus::from_str("DROWSY"), None);
    }
}
