//! Engine configuration — calibration, event classification, scoring,
//! and alarm thresholds.  Fixed for the lifetime of an engine.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ConfigError;

// ── EngineConfig ────────────────────────────────────────────

/// Tuning parameters for the fatigue engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Warm-up window used to establish the baseline (seconds).
    pub calibration_s: f64,
    /// threshold = baseline × this value.
    pub calibration_multiplier: f64,
    /// Calibration samples at or below this ratio are discarded.
    pub calibration_floor: f64,
    /// More than this many samples are needed for a median baseline.
    pub min_calibration_samples: usize,
    /// Baseline used when calibration collected too few samples.
    pub fallback_baseline: f64,

    /// Closures shorter than this are normal blinks (seconds).
    pub normal_blink_max_s: f64,
    /// Closures at least this long are microsleeps (seconds).
    pub microsleep_min_s: f64,
    /// Trailing window for the blinks-per-minute count (seconds).
    pub blink_window_s: f64,
    /// Sliding window for rapid blink clusters (seconds).
    pub rapid_blink_window_s: f64,
    /// Blinks within the cluster window needed to trigger a cluster.
    pub rapid_blink_count: usize,

    /// Score added for a long blink.
    pub score_long_blink: f64,
    /// Score added for a microsleep.
    pub score_microsleep: f64,
    /// Score added for a rapid blink cluster.
    pub score_rapid_cluster: f64,
    /// Score removed per whole second.
    pub decay_per_s: f64,
    /// Eyes count as wide open above baseline × this value.
    pub wide_eye_multiplier: f64,
    /// Decay multiplier while eyes are wide open.
    pub wide_eye_decay_boost: f64,
    /// Increments are multiplied by this once the score is at or above
    /// the warning threshold.
    pub dampening_factor: f64,
    pub score_min: f64,
    pub score_max: f64,

    /// Score at which the alarm first activates.
    pub warning_threshold: f64,
    /// Score at which the alarm goes critical.
    pub critical_threshold: f64,
    /// Once at or above this, the alarm holds until the score drops
    /// below it again.
    pub silence_threshold: f64,

    /// Interval after calibration with scoring suppressed (seconds).
    pub grace_period_s: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            calibration_s: 60.0,
            calibration_multiplier: 0.70,
            calibration_floor: 0.15,
            min_calibration_samples: 10,
            fallback_baseline: 0.28,
            normal_blink_max_s: 0.7,
            microsleep_min_s: 2.5,
            blink_window_s: 60.0,
            rapid_blink_window_s: 15.0,
            rapid_blink_count: 7,
            score_long_blink: 10.0,
            score_microsleep: 40.0,
            score_rapid_cluster: 20.0,
            decay_per_s: 0.5,
            wide_eye_multiplier: 1.15,
            wide_eye_decay_boost: 4.0,
            dampening_factor: 0.5,
            score_min: 0.0,
            score_max: 100.0,
            warning_threshold: 25.0,
            critical_threshold: 60.0,
            silence_threshold: 40.0,
            grace_period_s: 5.0,
        }
    }
}

impl EngineConfig {
    /// Load a config from a TOML file.  Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&text)?;
        info!("Loaded engine config from {}", path.display());
        Ok(config)
    }

    /// Check that the parameters describe a coherent state machine.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [
            ("calibration_floor", self.calibration_floor),
            ("score_long_blink", self.score_long_blink),
            ("score_microsleep", self.score_microsleep),
            ("score_rapid_cluster", self.score_rapid_cluster),
            ("dampening_factor", self.dampening_factor),
            ("score_min", self.score_min),
            ("score_max", self.score_max),
            ("warning_threshold", self.warning_threshold),
            ("silence_threshold", self.silence_threshold),
            ("critical_threshold", self.critical_threshold),
            ("grace_period_s", self.grace_period_s),
        ];
        for (field, value) in finite {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field, value });
            }
        }

        let positive = [
            ("calibration_multiplier", self.calibration_multiplier),
            ("fallback_baseline", self.fallback_baseline),
            ("decay_per_s", self.decay_per_s),
            ("wide_eye_multiplier", self.wide_eye_multiplier),
            ("wide_eye_decay_boost", self.wide_eye_decay_boost),
        ];
        for (field, value) in positive {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field, value });
            }
            if value <= 0.0 {
                return Err(ConfigError::NotPositive { field, value });
            }
        }

        // Durations must also fit in a `Duration`.
        let durations = [
            ("calibration_s", self.calibration_s),
            ("normal_blink_max_s", self.normal_blink_max_s),
            ("microsleep_min_s", self.microsleep_min_s),
            ("blink_window_s", self.blink_window_s),
            ("rapid_blink_window_s", self.rapid_blink_window_s),
        ];
        for (field, value) in durations {
            if !value.is_finite() {
                return Err(ConfigError::NotFinite { field, value });
            }
            if value <= 0.0 {
                return Err(ConfigError::NotPositive { field, value });
            }
            if Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: Duration::MAX.as_secs_f64(),
                });
            }
        }

        let increments = [
            ("score_long_blink", self.score_long_blink),
            ("score_microsleep", self.score_microsleep),
            ("score_rapid_cluster", self.score_rapid_cluster),
        ];
        for (field, value) in increments {
            if value < 0.0 {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: f64::INFINITY,
                });
            }
        }

        for (field, value) in [("score_min", self.score_min), ("score_max", self.score_max)] {
            if !(0.0..=100.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field,
                    value,
                    min: 0.0,
                    max: 100.0,
                });
            }
        }

        if self.grace_period_s < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "grace_period_s",
                value: self.grace_period_s,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        if !(0.0..=1.0).contains(&self.dampening_factor) {
            return Err(ConfigError::OutOfRange {
                field: "dampening_factor",
                value: self.dampening_factor,
                min: 0.0,
                max: 1.0,
            });
        }
        if self.normal_blink_max_s > self.microsleep_min_s {
            return Err(ConfigError::BlinkBounds {
                normal_s: self.normal_blink_max_s,
                microsleep_s: self.microsleep_min_s,
            });
        }
        if !(self.score_min < self.warning_threshold
            && self.warning_threshold < self.silence_threshold
            && self.silence_threshold < self.critical_threshold
            && self.critical_threshold <= self.score_max)
        {
            return Err(ConfigError::AlarmThresholds {
                warning: self.warning_threshold,
                silence: self.silence_threshold,
                critical: self.critical_threshold,
            });
        }
        if self.rapid_blink_count == 0 {
            return Err(ConfigError::ZeroClusterCount);
        }
        Ok(())
    }

    /// Generate IPC config s-expression.
    pub fn config_sexp(&self) -> String {
        format!(
            "(:calibration-s {:.1} :calibration-multiplier {:.2} :normal-blink-max-s {:.2} :microsleep-min-s {:.2} :rapid-blink-window-s {:.1} :rapid-blink-count {} :score-long-blink {:.1} :score-microsleep {:.1} :score-rapid-cluster {:.1} :decay-per-s {:.2} :wide-eye-multiplier {:.2} :wide-eye-decay-boost {:.1} :dampening-factor {:.2} :warning-threshold {:.0} :silence-threshold {:.0} :critical-threshold {:.0} :grace-period-s {:.1})",
            self.calibration_s,
            self.calibration_multiplier,
            self.normal_blink_max_s,
            self.microsleep_min_s,
            self.rapid_blink_window_s,
            self.rapid_blink_count,
            self.score_long_blink,
            self.score_microsleep,
            self.score_rapid_cluster,
            self.decay_per_s,
            self.wide_eye_multiplier,
            self.wide_eye_decay_boost,
            self.dampening_factor,
            self.warning_threshold,
            self.silence_threshold,
            self.critical_threshold,
            self.grace_period_s,
        )
    }
}

// ── Tests ───────────────────────────────────────────────────
