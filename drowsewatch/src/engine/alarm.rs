//! Alarm level state machine with hysteresis.
//!
//! ```text
//!   score >= critical              -> CRITICAL (active, peak reached)
//!   peak reached, score >= silence -> WARNING  (held)
//!   peak reached, score <  silence -> NORMAL   (full silence)
//!   score >= warning               -> WARNING  (peak reached once >= silence)
//!   otherwise                      -> NORMAL
//! ```
//!
//! An excursion that stays inside `[warning, silence)` is not sticky and
//! clears as soon as the score drops under the warning threshold.  Once
//! the score has reached the silence threshold while alarmed, WARNING is
//! held until the score falls back under it.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// Alarm level derived from the fatigue score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlarmLevel {
    Normal,
    Warning,
    Critical,
}

impl AlarmLevel {
    /// String representation for IPC and logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Normal => "NORMAL",
            Self::Warning => "WARNING",
            Self::Critical => "CRITICAL",
        }
    }

    /// Parse a level from its string representation.
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "NORMAL" => Some(Self::Normal),
            "WARNING" => Some(Self::Warning),
            "CRITICAL" => Some(Self::Critical),
            _ => None,
        }
    }
}

/// Hysteretic score-to-level mapper.
#[derive(Debug, Clone, Default)]
pub struct AlarmFsm {
    active: bool,
    peak_reached: bool,
    level: Option<AlarmLevel>,
}

impl AlarmFsm {
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate the level for the current score.
    pub fn evaluate(&mut self, score: f64, config: &EngineConfig) -> AlarmLevel {
        let level = if score >= config.critical_threshold {
            self.active = true;
            self.peak_reached = true;
            AlarmLevel::Critical
        } else if self.active && self.peak_reached {
            if score >= config.silence_threshold {
                AlarmLevel::Warning
            } else {
                self.active = false;
                self.peak_reached = false;
                AlarmLevel::Normal
            }
        } else if score >= config.warning_threshold {
            self.active = true;
            if score >= config.silence_threshold {
                self.peak_reached = true;
            }
            AlarmLevel::Warning
        } else {
            self.active = false;
            self.peak_reached = false;
            AlarmLevel::Normal
        };
        self.level = Some(level);
        level
    }

    /// Level from the most recent evaluation.
    pub fn level(&self) -> AlarmLevel {
        self.level.unwrap_or(AlarmLevel::Normal)
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn peak_reached(&self) -> bool {
        self.peak_reached
    }
}

// ── Tests ───────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn run(scores: &[f64]) -> Vec<AlarmLevel> {
        let config = EngineConfig::default();
        let mut fsm = AlarmFsm::new();
        scores.iter().map(|&s| fsm.evaluate(s, &config)).collect()
    }

    #[test]
    fn test_basic_levels() {
        use AlarmLevel::*;
        assert_eq!(run(&[0.0, 24.9, 25.0, 59.9, 60.0]), vec![Normal, Normal, Warning, Warning, Critical]);
    }

    #[test]
    fn test_hysteresis_holds_after_peak() {
        use AlarmLevel::*;
        // Reached 45 (>= silence), fluctuating above 40 stays WARNING,
        // first value under 40 silences everything.
        assert_eq!(
            run(&[30.0, 45.0, 41.0, 44.0, 40.0, 39.9, 30.0]),
            vec![Warning, Warning, Warning, Warning, Warning, Normal, Warning]
        );
    }

    #[test]
    fn test_critical_drops_to_held_warning_then_silence() {
        use AlarmLevel::*;
        assert_eq!(
            run(&[65.0, 59.0, 40.0, 39.0, 26.0]),
            vec![Critical, Warning, Warning, Normal, Warning]
        );
    }

    #[test]
    fn test_low_excursion_is_not_sticky() {
        use AlarmLevel::*;
        let levels = run(&[26.0, 39.0, 30.0, 24.9, 10.0]);
        assert_eq!(levels, vec![Warning, Warning, Warning, Normal, Normal]);
    }

    #[test]
    fn test_flags_track_transitions() {
        let config = EngineConfig::default();
        let mut fsm = AlarmFsm::new();
        assert_eq!(fsm.level(), AlarmLevel::Normal);

        fsm.evaluate(30.0, &config);
        assert!(fsm.is_active());
        assert!(!fsm.peak_reached());

        fsm.evaluate(42.0, &config);
        assert!(fsm.peak_reached());

        fsm.evaluate(10.0, &config);
        assert!(!fsm.is_active());
        assert!(!fsm.peak_reached());
    }

    #[test]
    fn test_alarm_level_roundtrip() {
        for level in [AlarmLevel::Normal, AlarmLevel::Warning, AlarmLevel::Critical] {
            assert_eq!(AlarmLevel::from_str(level.as_str()), Some(level));
        }
        assert_eq!(AlarmLevel::from_str("ALERT"), None);
    }
}
