//! Error types for the fallible edges of the crate.
//!
//! The engine itself has no error paths; these cover configuration,
//! signal input and alert output.

use std::io;

use thiserror::Error;

/// Rejected engine configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{field} must be positive (got {value})")]
    NotPositive { field: &'static str, value: f64 },

    #[error("{field} must be a finite number (got {value})")]
    NotFinite { field: &'static str, value: f64 },

    #[error("{field} must be within [{min}, {max}] (got {value})")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("normal blink bound {normal_s}s must not exceed microsleep bound {microsleep_s}s")]
    BlinkBounds { normal_s: f64, microsleep_s: f64 },

    #[error("alarm thresholds must satisfy warning < silence < critical (got {warning} / {silence} / {critical})")]
    AlarmThresholds {
        warning: f64,
        silence: f64,
        critical: f64,
    },

    #[error("rapid blink count threshold must be at least 1")]
    ZeroClusterCount,

    #[error("failed to read config file: {0}")]
    Io(#[from] io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Failure while pulling samples from a signal source.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read signal input: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: {reason}")]
    Parse { line: usize, reason: String },

    #[error("line {line}: timestamp {timestamp_s:.3}s is earlier than the previous sample")]
    NonMonotonic { line: usize, timestamp_s: f64 },
}

/// Failure inside an alert output device.  Never propagated past the
/// alarm player.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("alert device unavailable: {0}")]
    Unavailable(String),

    #[error("alert write failed: {0}")]
    Io(#[from] io::Error),
}
