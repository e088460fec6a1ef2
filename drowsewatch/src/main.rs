//! drowsewatch — drowsiness alarm over a replayed or simulated
//! eye-openness signal.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use drowsewatch::config::EngineConfig;
use drowsewatch::runner::{self, RunOptions};
use drowsewatch::source::SourceType;

#[derive(Parser, Debug)]
#[command(name = "drowsewatch", about = "Calibrated drowsiness alarm")]
struct Cli {
    /// Signal source: replay or simulate
    #[arg(long, default_value = "replay")]
    source: String,

    /// Replay input file (default: stdin)
    #[arg(long)]
    input: Option<PathBuf>,

    /// Engine config (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append per-event rows to this CSV file
    #[arg(long)]
    session_log: Option<PathBuf>,

    /// Write a JSON session report here on exit
    #[arg(long)]
    report: Option<PathBuf>,

    /// Pace samples against the wall clock instead of replaying offline
    #[arg(long)]
    realtime: bool,

    /// Tick rate for samples without timestamps and for simulation
    #[arg(long, default_value_t = 30.0)]
    tick_hz: f64,

    /// Exit after N seconds of session time
    #[arg(long)]
    exit_after: Option<f64>,

    /// Ring the terminal bell on alarms
    #[arg(long)]
    bell: bool,

    /// Override calibration duration (seconds)
    #[arg(long)]
    calibration_s: Option<f64>,

    /// Override warning threshold
    #[arg(long)]
    warning_threshold: Option<f64>,

    /// Override silence threshold
    #[arg(long)]
    silence_threshold: Option<f64>,

    /// Override critical threshold
    #[arg(long)]
    critical_threshold: Option<f64>,

    /// Override post-calibration grace period (seconds)
    #[arg(long)]
    grace_period_s: Option<f64>,

    /// Show version and exit
    #[arg(long)]
    version: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut EngineConfig) {
        let overrides = [
            (self.calibration_s, &mut config.calibration_s),
            (self.warning_threshold, &mut config.warning_threshold),
            (self.silence_threshold, &mut config.silence_threshold),
            (self.critical_threshold, &mut config.critical_threshold),
            (self.grace_period_s, &mut config.grace_period_s),
        ];
        for (value, field) in overrides {
            if let Some(v) = value {
                *field = v;
            }
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.version {
        println!("drowsewatch {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    // Logs go to stderr; stdout carries control responses and events.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "drowsewatch=info".into()),
        )
        .init();

    info!("drowsewatch v{} starting", env!("CARGO_PKG_VERSION"));

    let source = match SourceType::from_str(&cli.source) {
        Some(source) => source,
        None => {
            eprintln!("Unknown source: {}. Use: replay or simulate", cli.source);
            std::process::exit(1);
        }
    };

    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    cli.apply_overrides(&mut config);
    config.validate().context("invalid engine configuration")?;

    let options = RunOptions {
        source,
        input: cli.input,
        session_log: cli.session_log,
        report: cli.report,
        realtime: cli.realtime,
        tick_hz: cli.tick_hz,
        exit_after: cli.exit_after,
        bell: cli.bell,
    };

    let summary = runner::run(config, &options)?;
    info!(
        "drowsewatch done: {} tick(s), final status {}, {} skipped line(s)",
        summary.ticks,
        summary.final_status.map_or("none", |s| s.as_str()),
        summary.skipped_lines
    );
    Ok(())
}
