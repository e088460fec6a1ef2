//! Synthetic operator for demos and smoke runs.
//!
//! Follows a fixed script relative to the end of calibration: alert
//! blinking, a rapid-blink burst, a drowsy stretch with long blinks and
//! microsleeps, a short face-loss gap, then wide-eyed recovery.  Fully
//! deterministic; the same config always yields the same samples.

use std::time::Duration;

use super::{Sample, SignalSource, SourceItem};
use crate::error::SourceError;

const OPEN_RATIO: f64 = 0.30;
const WIDE_RATIO: f64 = 0.37;
const CLOSED_RATIO: f64 = 0.08;

/// Phase of the synthetic script.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptPhase {
    Alert,
    RapidBlinking,
    Drowsy,
    FaceLost,
    Recovery,
}

pub struct SimulatedSource {
    tick: u64,
    total_ticks: u64,
    period_ns: u64,
    /// Script phases start this many seconds in.
    settle_s: f64,
}

impl SimulatedSource {
    /// `settle_s` is normally the calibration duration, so that the
    /// script's events land after warm-up.
    pub fn new(tick_hz: f64, settle_s: f64, duration_s: f64) -> Self {
        let tick_hz = tick_hz.max(1.0);
        let period_ns = (1e9 / tick_hz).round() as u64;
        Self {
            tick: 0,
            total_ticks: (duration_s.max(0.0) * tick_hz).ceil() as u64,
            period_ns,
            settle_s,
        }
    }

    /// Default script length for a given settle time.
    pub fn default_duration_s(settle_s: f64) -> f64 {
        settle_s + 180.0
    }

    /// Script phase at `t` seconds.
    pub fn phase_at(&self, t: f64) -> ScriptPhase {
        let rel = t - self.settle_s;
        if rel < 20.0 {
            ScriptPhase::Alert
        } else if rel < 50.0 {
            ScriptPhase::RapidBlinking
        } else if rel < 110.0 {
            ScriptPhase::Drowsy
        } else if rel < 112.0 {
            ScriptPhase::FaceLost
        } else {
            ScriptPhase::Recovery
        }
    }

    /// Ratio and presence at `t` seconds.
    pub fn signal_at(&self, t: f64) -> (f64, bool) {
        let jitter = 0.005 * (t * 7.3).sin();
        let rel = t - self.settle_s;
        match self.phase_at(t) {
            ScriptPhase::Alert => {
                let ratio = if closed_in_cycle(t, 4.0, 0.15) { CLOSED_RATIO } else { OPEN_RATIO };
                (ratio + jitter, true)
            }
            ScriptPhase::RapidBlinking => {
                let ratio = if closed_in_cycle(rel - 20.0, 1.5, 0.12) { CLOSED_RATIO } else { OPEN_RATIO };
                (ratio + jitter, true)
            }
            ScriptPhase::Drowsy => {
                let local = rel - 50.0;
                // A 3s microsleep at the start of every 25s block, long
                // blinks every 8s otherwise.
                let closed = (local % 25.0) < 3.0 || ((local % 25.0) >= 5.0 && closed_in_cycle(local, 8.0, 1.2));
                let ratio = if closed { CLOSED_RATIO } else { OPEN_RATIO - 0.02 };
                (ratio + jitter, true)
            }
            ScriptPhase::FaceLost => (0.0, false),
            ScriptPhase::Recovery => {
                let ratio = if closed_in_cycle(rel - 112.0, 5.0, 0.15) { CLOSED_RATIO } else { WIDE_RATIO };
                (ratio + jitter, true)
            }
        }
    }
}

/// Whether `t` falls in the closed part of a `period`-long blink cycle.
fn closed_in_cycle(t: f64, period: f64, closed_s: f64) -> bool {
    t.rem_euclid(period) >= period - closed_s
}

impl SignalSource for SimulatedSource {
    fn next_item(&mut self) -> Result<Option<SourceItem>, SourceError> {
        if self.tick >= self.total_ticks {
            return Ok(None);
        }
        let offset = Duration::from_nanos(self.period_ns * self.tick);
        let (ratio, presence) = self.signal_at(offset.as_secs_f64());
        self.tick += 1;
        Ok(Some(SourceItem::Sample(Sample {
            ratio,
            presence,
            offset: Some(offset),
        })))
    }

    fn name(&self) -> &'static str {
        "simulate"
    }
}

// ── Tests ───────────────────────────────────────────────────
