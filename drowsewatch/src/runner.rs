//! Session runner — pulls samples from a source, drives the clock and
//! the engine, and fans out to the alarm, log, report and control
//! channel.
//!
//! Two pacing modes:
//! - offline (default): a [`ManualClock`] jumps to each sample's
//!   timestamp, so a recording replays as fast as it can be read
//! - real-time: the system clock, with samples released at their
//!   timestamps (or at the tick rate when they carry none)

use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Context;
use tracing::{info, warn};

use crate::clock::{Clock, ManualClock};
use crate::config::EngineConfig;
use crate::engine::{Engine, MonitorStatus};
use crate::error::SourceError;
use crate::ipc;
use crate::output::{AlarmPlayer, AlertSink, SessionLogger, SessionReport, SilentSink, TerminalBell};
use crate::source::{ReplaySource, SignalSource, SimulatedSource, SourceItem, SourceType};
use crate::state::MonitorState;

/// Global flag set by SIGTERM/SIGINT handlers.
static SHUTDOWN_REQUESTED: AtomicBool = AtomicBool::new(false);

/// Session time between periodic status lines.
const STATUS_INTERVAL_S: f64 = 60.0;

/// Runner options, normally filled from the command line.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub source: SourceType,
    /// Replay input; stdin when absent.
    pub input: Option<PathBuf>,
    pub session_log: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub realtime: bool,
    pub tick_hz: f64,
    /// Stop after this many seconds of session time.
    pub exit_after: Option<f64>,
    pub bell: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            source: SourceType::Replay,
            input: None,
            session_log: None,
            report: None,
            realtime: false,
            tick_hz: 30.0,
            exit_after: None,
            bell: false,
        }
    }
}

/// What a finished session looked like.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub ticks: u64,
    pub duration_s: f64,
    pub final_status: Option<MonitorStatus>,
    pub final_score: f64,
    pub microsleeps: u32,
    pub control_messages: u64,
    pub skipped_lines: u64,
}

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Exhausted,
    ExitTimer,
    Signal,
    InputError,
}

/// Install signal handlers for graceful shutdown (SIGTERM, SIGINT).
fn install_signal_handlers() {
    unsafe {
        libc::signal(libc::SIGTERM, signal_handler as libc::sighandler_t);
        libc::signal(libc::SIGINT, signal_handler as libc::sighandler_t);
    }
}

extern "C" fn signal_handler(_sig: libc::c_int) {
    SHUTDOWN_REQUESTED.store(true, Ordering::SeqCst);
}

/// Run a whole session with the configured source, writing control
/// responses and status events to stdout.
pub fn run(config: EngineConfig, options: &RunOptions) -> anyhow::Result<RunSummary> {
    let mut source = open_source(&config, options)?;
    let sink: Box<dyn AlertSink> = if options.bell {
        Box::new(TerminalBell::new(io::stderr()))
    } else {
        Box::new(SilentSink::default())
    };

    install_signal_handlers();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    info!(
        "Session starting: source {}, {} pacing at {:.0} Hz",
        source.name(),
        if options.realtime { "real-time" } else { "offline" },
        options.tick_hz
    );

    if options.realtime {
        let engine = Engine::new(config);
        let mut state = build_state(engine, sink, options);
        let start = Instant::now();
        let summary = drive(&mut state, source.as_mut(), options, &mut out, |offset| {
            let target = start + offset;
            let now = Instant::now();
            if target > now {
                thread::sleep(target - now);
            }
        })?;
        finish(&mut state, options);
        Ok(summary)
    } else {
        let clock = ManualClock::new();
        let engine = Engine::with_clock(config, clock.clone());
        let mut state = build_state(engine, sink, options);
        let summary = drive(&mut state, source.as_mut(), options, &mut out, |offset| {
            if !clock.set_offset(offset) {
                warn!("Sample offset {:?} is behind the clock, holding time", offset);
            }
        })?;
        finish(&mut state, options);
        Ok(summary)
    }
}

fn open_source(config: &EngineConfig, options: &RunOptions) -> anyhow::Result<Box<dyn SignalSource>> {
    match options.source {
        SourceType::Replay => match &options.input {
            Some(path) => {
                let file = File::open(path)
                    .with_context(|| format!("failed to open replay input {}", path.display()))?;
                info!("Replaying {}", path.display());
                Ok(replay_source(BufReader::new(file)))
            }
            None => {
                info!("Replaying from stdin");
                Ok(replay_source(io::stdin().lock()))
            }
        },
        SourceType::Simulate => {
            let duration_s = options
                .exit_after
                .unwrap_or_else(|| SimulatedSource::default_duration_s(config.calibration_s));
            Ok(Box::new(SimulatedSource::new(
                options.tick_hz,
                config.calibration_s,
                duration_s,
            )))
        }
    }
}

/// Assemble the monitor state; an unopenable session log is reported
/// and skipped.
pub fn build_state<C: Clock>(
    engine: Engine<C>,
    sink: Box<dyn AlertSink>,
    options: &RunOptions,
) -> MonitorState<C> {
    let mut state = MonitorState::new(engine, AlarmPlayer::new(sink));
    if let Some(path) = &options.session_log {
        match SessionLogger::open(path) {
            Ok(logger) => state = state.with_session_log(logger),
            Err(e) => warn!("Session log {} unavailable, continuing without it: {}", path.display(), e),
        }
    }
    if options.report.is_some() {
        state = state.with_report(SessionReport::new());
    }
    state
}

/// The session loop.  `pace` is called with each sample's offset from
/// session start before the tick runs.
pub fn drive<C, W, P>(
    state: &mut MonitorState<C>,
    source: &mut dyn SignalSource,
    options: &RunOptions,
    out: &mut W,
    mut pace: P,
) -> anyhow::Result<RunSummary>
where
    C: Clock,
    W: Write,
    P: FnMut(Duration),
{
    let period = Duration::from_secs_f64(1.0 / options.tick_hz.max(1.0));
    let mut sample_index: u32 = 0;
    let mut skipped_lines = 0u64;
    let mut next_status_s = STATUS_INTERVAL_S;

    let reason = loop {
        if SHUTDOWN_REQUESTED.load(Ordering::SeqCst) {
            info!("Shutdown signal received, exiting");
            break StopReason::Signal;
        }

        if let Some(limit) = options.exit_after {
            if state.session_s() >= limit {
                info!("Exit timer fired after {:.1}s", limit);
                break StopReason::ExitTimer;
            }
        }

        let item = match source.next_item() {
            Ok(Some(item)) => item,
            Ok(None) => break StopReason::Exhausted,
            Err(e @ (SourceError::Parse { .. } | SourceError::NonMonotonic { .. })) => {
                warn!("Skipping input: {}", e);
                skipped_lines += 1;
                continue;
            }
            Err(e) => {
                warn!("Signal input failed, ending session: {}", e);
                break StopReason::InputError;
            }
        };

        match item {
            SourceItem::Control(raw) => {
                if let Some(response) = ipc::handle_message(state, &raw) {
                    writeln!(out, "{}", response)?;
                    out.flush()?;
                }
            }
            SourceItem::Sample(sample) => {
                let offset = sample.offset.unwrap_or(period * sample_index);
                sample_index = sample_index.saturating_add(1);
                pace(offset);

                let previous = state.last_status;
                let snapshot = state.tick(sample.ratio, sample.presence);
                let status = snapshot.status();
                if previous != Some(status) {
                    let score = format!("{:.1}", snapshot.fatigue_score);
                    let level = format!(":{}", status.as_str().to_lowercase().replace('_', "-"));
                    let event = ipc::format_event("status", &[("level", &level), ("score", &score)]);
                    writeln!(out, "{}", event)?;
                    out.flush()?;
                }

                let session_s = state.session_s();
                if session_s >= next_status_s {
                    info!(
                        "Status: {} score {:.1}, {} blink(s)/60s, {} microsleep(s), {} tick(s)",
                        status.as_str(),
                        snapshot.fatigue_score,
                        snapshot.blink_count_last_60s,
                        snapshot.microsleep_count,
                        state.ticks
                    );
                    while next_status_s <= session_s {
                        next_status_s += STATUS_INTERVAL_S;
                    }
                }
            }
        }
    };

    let snapshot = state.engine.snapshot();
    let summary = RunSummary {
        ticks: state.ticks,
        duration_s: state.session_s(),
        final_status: state.last_status,
        final_score: snapshot.fatigue_score,
        microsleeps: snapshot.microsleep_count,
        control_messages: state.control_messages,
        skipped_lines,
    };
    info!(
        "Session ended ({:?}): {} tick(s) over {:.1}s, final score {:.1}, {} microsleep(s)",
        reason, summary.ticks, summary.duration_s, summary.final_score, summary.microsleeps
    );
    Ok(summary)
}

/// Silence the alarm and export the report, if one was requested.
fn finish<C: Clock>(state: &mut MonitorState<C>, options: &RunOptions) {
    state.alarm.silence();
    if let (Some(report), Some(path)) = (state.report.as_ref(), options.report.as_ref()) {
        if let Err(e) = report.export_json(path) {
            warn!("Failed to write session report {}: {}", path.display(), e);
        }
    }
}

/// Replay source over any buffered reader, for callers that already
/// hold the input.
pub fn replay_source<R: BufRead + 'static>(reader: R) -> Box<dyn SignalSource> {
    Box::new(ReplaySource::new(reader))
}

// ── Tests ───────────────────────────────────────────────────
