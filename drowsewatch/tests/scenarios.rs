//! End-to-end scenarios through the engine and runner with a manual clock.

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::time::Duration;

use drowsewatch::output::SilentSink;
use drowsewatch::runner::{self, RunOptions};
use drowsewatch::{
    AlarmLevel, Engine, EngineConfig, EngineSnapshot, EventKind, ManualClock, MonitorStatus,
};

fn engine(config: EngineConfig) -> (Engine<ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    (Engine::with_clock(config, clock.clone()), clock)
}

fn short_calibration() -> EngineConfig {
    EngineConfig {
        calibration_s: 1.0,
        ..EngineConfig::default()
    }
}

/// Feed 0.30 at 10 Hz until calibration completes.
fn calibrate(engine: &mut Engine<ManualClock>, clock: &ManualClock) -> EngineSnapshot {
    let mut snap = engine.update(0.30, true);
    while snap.is_calibrating {
        clock.advance(Duration::from_millis(100));
        snap = engine.update(0.30, true);
    }
    snap
}

/// Close for `closed` then reopen; returns the reopening snapshot.
fn closure(engine: &mut Engine<ManualClock>, clock: &ManualClock, closed: Duration) -> EngineSnapshot {
    engine.update(0.05, true);
    clock.advance(closed);
    engine.update(0.30, true)
}

#[test]
fn test_default_calibration_completes_at_sixty_seconds() {
    let (mut engine, clock) = engine(EngineConfig::default());
    let mut ticks = 0;
    let mut snap = engine.update(0.30, true);
    while snap.is_calibrating {
        ticks += 1;
        clock.advance(Duration::from_millis(100));
        snap = engine.update(0.30, true);
    }
    assert_eq!(ticks, 600);
    assert_eq!(clock.elapsed(), Duration::from_secs(60));
    assert!((snap.baseline_ratio - 0.30).abs() < 1e-9);
    assert!((snap.threshold - 0.21).abs() < 1e-9);
}

#[test]
fn test_sparse_calibration_uses_fallback_baseline() {
    let (mut engine, clock) = engine(EngineConfig::default());
    engine.update(0.30, true);
    clock.advance(Duration::from_secs(60));
    let snap = engine.update(0.30, true);
    assert!(!snap.is_calibrating);
    assert!((snap.baseline_ratio - 0.28).abs() < 1e-9);
    assert!((snap.threshold - 0.196).abs() < 1e-9);
    assert!(engine.baseline().map_or(false, |b| b.fallback));
}

#[test]
fn test_microsleeps_escalate_then_hysteresis_releases() {
    let (mut engine, clock) = engine(short_calibration());
    calibrate(&mut engine, &clock);
    clock.advance(Duration::from_secs(5));
    engine.update(0.30, true);
    clock.advance(Duration::from_secs(1));
    engine.update(0.30, true);

    let snap = closure(&mut engine, &clock, Duration::from_secs(3));
    assert_eq!(snap.last_event, Some(EventKind::Microsleep));
    assert_eq!(snap.fatigue_score, 38.5);
    assert_eq!(snap.alarm_level, AlarmLevel::Warning);

    // Dampened: +20 instead of +40.
    let snap = closure(&mut engine, &clock, Duration::from_secs(3));
    assert_eq!(snap.fatigue_score, 57.0);
    assert_eq!(snap.alarm_level, AlarmLevel::Warning);

    let snap = closure(&mut engine, &clock, Duration::from_secs(3));
    assert_eq!(snap.fatigue_score, 75.5);
    assert_eq!(snap.alarm_level, AlarmLevel::Critical);
    assert_eq!(snap.microsleep_count, 3);
    assert_eq!(snap.status(), MonitorStatus::Critical);

    // Recovery at baseline: 0.5 points per second.
    let mut levels = Vec::new();
    for _ in 0..73 {
        clock.advance(Duration::from_secs(1));
        let snap = engine.update(0.30, true);
        levels.push((snap.fatigue_score, snap.alarm_level));
    }
    assert_eq!(levels[30], (60.0, AlarmLevel::Critical));
    assert_eq!(levels[31], (59.5, AlarmLevel::Warning));
    assert_eq!(levels[70], (40.0, AlarmLevel::Warning));
    assert_eq!(levels[71], (39.5, AlarmLevel::Normal));
    // Still above the warning threshold, so the alarm re-arms.
    assert_eq!(levels[72], (39.0, AlarmLevel::Warning));
}

#[test]
fn test_rapid_cluster_scores_once() {
    let (mut engine, clock) = engine(short_calibration());
    calibrate(&mut engine, &clock);
    clock.advance(Duration::from_secs(6));
    engine.update(0.30, true);

    let mut clusters = 0;
    let mut cluster_score = None;
    for _ in 0..9 {
        let snap = closure(&mut engine, &clock, Duration::from_millis(200));
        assert!(matches!(
            snap.last_event,
            Some(EventKind::NormalBlink) | Some(EventKind::RapidCluster)
        ));
        if snap.last_event == Some(EventKind::RapidCluster) {
            clusters += 1;
            cluster_score = Some(snap.fatigue_score);
        }
        clock.advance(Duration::from_millis(800));
        engine.update(0.30, true);
    }
    assert_eq!(clusters, 1);
    assert_eq!(cluster_score, Some(20.0));
    assert_eq!(engine.total_blinks(), 9);
}

#[test]
fn test_long_blink_boundaries() {
    let (mut engine, clock) = engine(short_calibration());
    calibrate(&mut engine, &clock);
    clock.advance(Duration::from_secs(6));
    engine.update(0.30, true);

    let snap = closure(&mut engine, &clock, Duration::from_millis(699));
    assert_eq!(snap.last_event, Some(EventKind::NormalBlink));
    let snap = closure(&mut engine, &clock, Duration::from_millis(700));
    assert_eq!(snap.last_event, Some(EventKind::LongBlink));
    // +10, less one whole second of decay since the last decay tick.
    assert_eq!(snap.fatigue_score, 9.5);
    assert!((snap.blink_duration - 0.7).abs() < 1e-9);
    let snap = closure(&mut engine, &clock, Duration::from_millis(2499));
    assert_eq!(snap.last_event, Some(EventKind::LongBlink));
    let snap = closure(&mut engine, &clock, Duration::from_millis(2500));
    assert_eq!(snap.last_event, Some(EventKind::Microsleep));
}

#[test]
fn test_face_loss_freezes_then_resumes() {
    let (mut engine, clock) = engine(short_calibration());
    calibrate(&mut engine, &clock);
    clock.advance(Duration::from_secs(6));
    engine.update(0.30, true);
    let before = closure(&mut engine, &clock, Duration::from_secs(3));
    assert_eq!(before.status(), MonitorStatus::Warning);

    for _ in 0..20 {
        clock.advance(Duration::from_millis(500));
        let snap = engine.update(0.0, false);
        assert_eq!(snap.status(), MonitorStatus::NoFace);
        assert_eq!(snap.fatigue_score, before.fatigue_score);
        assert_eq!(snap.alarm_level, before.alarm_level);
    }

    clock.advance(Duration::from_millis(500));
    let after = engine.update(0.30, true);
    assert!(after.face_detected);
    assert_eq!(after.status(), MonitorStatus::Warning);
    assert!(after.fatigue_score < before.fatigue_score);
}

#[test]
fn test_closure_spanning_face_loss_counts_the_gap() {
    let (mut engine, clock) = engine(short_calibration());
    calibrate(&mut engine, &clock);
    clock.advance(Duration::from_secs(6));
    engine.update(0.30, true);

    engine.update(0.05, true);
    clock.advance(Duration::from_millis(300));
    let snap = engine.update(0.05, true);
    assert_eq!(snap.last_event, None);

    for _ in 0..4 {
        clock.advance(Duration::from_millis(500));
        let snap = engine.update(0.0, false);
        assert_eq!(snap.status(), MonitorStatus::NoFace);
        assert_eq!(snap.microsleep_count, 0);
    }

    clock.advance(Duration::from_millis(300));
    let snap = engine.update(0.30, true);
    assert_eq!(snap.last_event, Some(EventKind::Microsleep));
    assert!((snap.blink_duration - 2.6).abs() < 1e-9);
    assert_eq!(snap.microsleep_count, 1);
}

#[test]
fn test_demo_recording_replays() {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("..")
        .join("demos")
        .join("drowsy_session.csv");
    let file = File::open(&path).unwrap();
    let mut source = runner::replay_source(BufReader::new(file));

    let clock = ManualClock::new();
    let engine = Engine::with_clock(EngineConfig::default(), clock.clone());
    let options = RunOptions::default();
    let mut state = runner::build_state(engine, Box::new(SilentSink::default()), &options);
    let mut out = Vec::new();

    let summary = runner::drive(&mut state, source.as_mut(), &options, &mut out, |offset| {
        clock.set_offset(offset);
    })
    .unwrap();

    assert_eq!(summary.ticks, 1000);
    assert_eq!(summary.microsleeps, 2);
    assert_eq!(summary.skipped_lines, 0);
    assert_eq!(summary.control_messages, 1);
    assert_eq!(summary.final_status, Some(MonitorStatus::Warning));

    let text = String::from_utf8(out).unwrap();
    assert!(text.contains(":level :no-face"));
    assert!(text.contains("(:type :response :id 1 :status :ok :fatigue (:status :warning"));
}
