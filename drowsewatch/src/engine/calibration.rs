//! Warm-up calibration — collects open-eye ratio samples and derives a
//! personalized baseline and closure threshold.

use std::time::Instant;

use tracing::{debug, info, warn};

use crate::config::EngineConfig;

/// Personalized baseline computed once per calibration cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Baseline {
    /// Median open-eye ratio (or the fallback constant).
    pub median_ratio: f64,
    /// Ratio below which the eyes count as closed.
    pub threshold: f64,
    /// Whether the fallback baseline was used.
    pub fallback: bool,
}

/// Result of feeding one sample to the calibration stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum CalibrationStep {
    /// Still collecting; progress in `[0, 1]`.
    InProgress { progress: f64 },
    /// The warm-up window just elapsed on this tick.
    Complete(Baseline),
}

/// Sample collector for the warm-up window.
#[derive(Debug, Clone)]
pub struct CalibrationStage {
    started_at: Option<Instant>,
    samples: Vec<f64>,
}

impl Default for CalibrationStage {
    fn default() -> Self {
        Self::new()
    }
}

impl CalibrationStage {
    pub fn new() -> Self {
        Self {
            started_at: None,
            samples: Vec::with_capacity(2048),
        }
    }

    /// Feed one present-face sample.
    pub fn observe(&mut self, ratio: f64, now: Instant, config: &EngineConfig) -> CalibrationStep {
        let started_at = *self.started_at.get_or_insert_with(|| {
            info!("Calibration started ({:.0}s warm-up)", config.calibration_s);
            now
        });
        let elapsed_s = now.saturating_duration_since(started_at).as_secs_f64();

        if ratio > config.calibration_floor {
            self.samples.push(ratio);
        }

        if elapsed_s >= config.calibration_s {
            return CalibrationStep::Complete(self.finish(config));
        }

        CalibrationStep::InProgress {
            progress: (elapsed_s / config.calibration_s).min(1.0),
        }
    }

    /// Progress at `now` without recording a sample.
    pub fn progress(&self, now: Instant, config: &EngineConfig) -> f64 {
        match self.started_at {
            Some(start) => {
                (now.saturating_duration_since(start).as_secs_f64() / config.calibration_s).min(1.0)
            }
            None => 0.0,
        }
    }

    #[cfg(test)]
    fn sample_count(&self) -> usize {
        self.samples.len()
    }

    fn finish(&mut self, config: &EngineConfig) -> Baseline {
        let samples = std::mem::take(&mut self.samples);
        debug!("Calibration used {} samples", samples.len());
        let (median_ratio, fallback) = if samples.len() > config.min_calibration_samples {
            (median(samples), false)
        } else {
            warn!(
                "Calibration collected only {} usable samples, using fallback baseline {:.2}",
                samples.len(),
                config.fallback_baseline,
            );
            (config.fallback_baseline, true)
        };
        let threshold = median_ratio * config.calibration_multiplier;
        info!(
            "Calibration complete: baseline {:.4}, threshold {:.4}",
            median_ratio, threshold
        );
        Baseline {
            median_ratio,
            threshold,
            fallback,
        }
    }
}

/// Median of a non-empty sample set; the mean of the two middle values
/// for even counts.
fn median(mut values: Vec<f64>) -> f64 {
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

// ── Tests ───────────────────────────────────────────────────
