//! drowsewatch — calibrated drowsiness alarm driven by a per-tick
//! eye-openness ratio.
//!
//! The [`engine`] is a synchronous per-tick transformation: calibrate a
//! personal baseline, classify eye closures, accumulate a bounded fatigue
//! score, and map it to a hysteretic alarm level.  Everything around it
//! (signal sources, alarm playback, session logging, reporting and the
//! control channel) consumes the immutable [`EngineSnapshot`].

pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod ipc;
pub mod output;
pub mod runner;
pub mod source;
pub mod state;

pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::EngineConfig;
pub use engine::{AlarmLevel, Engine, EngineSnapshot, EventKind, MonitorStatus};
pub use error::{ConfigError, SinkError, SourceError};
pub use state::MonitorState;
