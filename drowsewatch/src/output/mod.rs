//! Consumers of engine snapshots.
//!
//! - `alarm`: audible alert playback policy and sinks
//! - `session_log`: per-event CSV log
//! - `report`: periodic metrics and alarm events, exported as JSON

pub mod alarm;
pub mod report;
pub mod session_log;

pub use alarm::{AlarmPlayer, AlertSink, PlaybackAction, PlaybackMode, SilentSink, TerminalBell};
pub use report::{AlarmRecord, MetricRecord, ReportSummary, SessionReport};
pub use session_log::SessionLogger;
