//! Signal sources — where per-tick `(ratio, presence)` samples come from.
//!
//! - `replay`: timestamped samples from a file or stdin
//! - `simulated`: deterministic synthetic operator for demos

pub mod replay;
pub mod simulated;

use std::time::Duration;

use crate::error::SourceError;

pub use replay::ReplaySource;
pub use simulated::SimulatedSource;

/// One tick of input.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    /// Eye-openness ratio; 0 is a valid fully-closed reading.
    pub ratio: f64,
    /// Whether a face was found in this tick.
    pub presence: bool,
    /// Offset from session start, when the source carries its own time.
    pub offset: Option<Duration>,
}

/// Item pulled from a source.
#[derive(Debug, Clone, PartialEq)]
pub enum SourceItem {
    Sample(Sample),
    /// Raw control-channel s-expression interleaved with the samples.
    Control(String),
}

/// Producer of per-tick samples.  `Ok(None)` means the input is exhausted.
pub trait SignalSource {
    fn next_item(&mut self) -> Result<Option<SourceItem>, SourceError>;

    /// Short name for logging.
    fn name(&self) -> &'static str;
}

/// Source selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceType {
    Replay,
    Simulate,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Replay => "replay",
            Self::Simulate => "simulate",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "replay" => Some(Self::Replay),
            "simulate" => Some(Self::Simulate),
            _ => None,
        }
    }
}
