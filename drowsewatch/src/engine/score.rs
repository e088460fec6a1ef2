//! Bounded fatigue score with dampened increments and continuous decay.

use std::time::Instant;

use tracing::debug;

use crate::config::EngineConfig;

/// Fatigue score accumulator.  The value stays within
/// `[score_min, score_max]` after every mutation.
#[derive(Debug, Clone)]
pub struct ScoreAccumulator {
    value: f64,
    last_decay: Option<Instant>,
}

impl Default for ScoreAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

impl ScoreAccumulator {
    pub fn new() -> Self {
        Self {
            value: 0.0,
            last_decay: None,
        }
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    /// Add event points.  At or above the warning threshold the points are
    /// dampened first.  Returns the amount actually applied before
    /// clamping.
    pub fn add(&mut self, points: f64, config: &EngineConfig) -> f64 {
        let applied = if self.value >= config.warning_threshold {
            points * config.dampening_factor
        } else {
            points
        };
        self.value += applied;
        self.clamp(config);
        applied
    }

    /// Remove `floor(elapsed_s) × rate` points, where the rate is boosted
    /// while the ratio is well above baseline.  Returns the amount removed
    /// before clamping; zero if less than one whole second elapsed.
    pub fn decay(&mut self, elapsed_s: f64, ratio: f64, baseline: f64, config: &EngineConfig) -> f64 {
        if !(elapsed_s >= 1.0) {
            return 0.0;
        }
        let whole_s = elapsed_s.floor();
        let mut rate = config.decay_per_s;
        if baseline > 0.0 && ratio > baseline * config.wide_eye_multiplier {
            rate *= config.wide_eye_decay_boost;
        }
        let removed = whole_s * rate;
        self.value -= removed;
        self.clamp(config);
        removed
    }

    /// Apply decay for the time since the last decay tick.  The decay
    /// clock only restarts once a whole second has been consumed; the
    /// fractional remainder of that interval is discarded.
    pub fn decay_until(&mut self, now: Instant, ratio: f64, baseline: f64, config: &EngineConfig) -> f64 {
        let Some(last) = self.last_decay else {
            self.last_decay = Some(now);
            return 0.0;
        };
        let elapsed_s = now.saturating_duration_since(last).as_secs_f64();
        if elapsed_s < 1.0 {
            return 0.0;
        }
        let removed = self.decay(elapsed_s, ratio, baseline, config);
        self.last_decay = Some(now);
        if removed > 0.0 {
            debug!("Score decay -{:.1} over {:.2}s -> {:.1}", removed, elapsed_s, self.value);
        }
        removed
    }

    /// Start counting decay time from `now`.
    pub fn start_decay_clock(&mut self, now: Instant) {
        self.last_decay = Some(now);
    }

    fn clamp(&mut self, config: &EngineConfig) {
        self.value = self.value.clamp(config.score_min, config.score_max);
    }
}

// ── Tests ───────────────────────────────────────────────────
