//! TVM Replay - torsional vibration mitigation replay
//!
//! Loads a recorded drilling log, scores stick-slip severity, runs the
//! auto-driller over it and either reports, exports or replays the result.
//!
//! # Usage
//!
//! ```bash
//! # Run summary for one well
//! tvm-replay analyze --csv "data/Norway-NA-15_47_9-F-9 A time.csv"
//!
//! # JSON export for a dashboard
//! tvm-replay export --csv data/f9a.csv --out web/public/data
//!
//! # Replay at 20x from the middle of the log
//! tvm-replay play --csv data/f9a.csv --speed 20 --from 0.5
//! ```
//!
//! # Environment Variables
//!
//! - `TVM_CONFIG`: Path to replay_config.toml (default: ./replay_config.toml)
//! - `RUST_LOG`: Logging level (default: info)

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tvm_replay::analysis::{analyze, Analysis};
use tvm_replay::config::{self, defaults::TELEMETRY_DOWNSAMPLE, ReplayConfig};
use tvm_replay::playback::{PlaybackHandle, SlowFrame};
use tvm_replay::report;
use tvm_replay::volve::{VolveConfig, VolveReplay};

// ============================================================================
// CLI Arguments
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "tvm-replay")]
#[command(about = "Stick-slip detection and auto-driller replay for recorded drilling logs")]
#[command(version)]
struct CliArgs {
    /// Path to a replay_config.toml (takes precedence over TVM_CONFIG)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: SubCommand,
}

#[derive(clap::Subcommand, Debug)]
enum SubCommand {
    /// Print a run summary: events, nominals, MWD validation
    Analyze {
        /// Volve time-log CSV
        #[arg(long)]
        csv: PathBuf,
    },

    /// Write telemetry.json, events.json and metadata.json
    Export {
        #[arg(long)]
        csv: PathBuf,
        /// Output directory (created if missing)
        #[arg(long)]
        out: PathBuf,
        /// Keep every Nth telemetry row
        #[arg(long, default_value_t = TELEMETRY_DOWNSAMPLE)]
        downsample: usize,
    },

    /// Replay the log, printing throttled frames until the end or Ctrl+C
    Play {
        #[arg(long)]
        csv: PathBuf,
        /// Samples advanced per tick (default from config)
        #[arg(long)]
        speed: Option<u32>,
        /// Start position as a fraction of the log, 0.0 to 1.0
        #[arg(long, default_value_t = 0.0)]
        from: f64,
    },

    /// Print the effective configuration as TOML
    ShowConfig,
}

// ============================================================================
// Startup
// ============================================================================

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_config(path: Option<&Path>) -> Result<ReplayConfig> {
    match path {
        Some(p) => ReplayConfig::load_from_file(p)
            .with_context(|| format!("Failed to load config {}", p.display())),
        None => Ok(ReplayConfig::load()),
    }
}

fn load_and_analyze(csv: &Path, config: &ReplayConfig) -> Result<(VolveReplay, Analysis)> {
    let replay = VolveReplay::load(csv, VolveConfig::default())
        .with_context(|| format!("Failed to load {}", csv.display()))?;
    let analysis = analyze(replay.samples(), config).context("Analysis rejected the configuration")?;
    Ok((replay, analysis))
}

// ============================================================================
// Subcommands
// ============================================================================

fn run_analyze(csv: &Path, config: &ReplayConfig) -> Result<()> {
    let (replay, analysis) = load_and_analyze(csv, config)?;
    let info = &replay.info;

    println!("=== {} ({}, {}) ===", config.well.name, config.well.field, config.well.section);
    println!("  Source:     {}", info.source);
    println!("  Rows:       {} raw, {} on bottom", info.raw_rows, info.on_bottom_rows);
    if let Some((lo, hi)) = info.depth_range_m {
        println!("  Depth:      {lo:.0} - {hi:.0} m");
    }
    println!(
        "  Duration:   {:.1} hours, median spacing {}",
        info.duration_s / 3600.0,
        analysis
            .sample_interval_s
            .map_or_else(|| "n/a".to_string(), |dt| format!("{dt:.1} s"))
    );
    println!(
        "  Detection:  {} events, {:.1}% of rows flagged (threshold {:.2}, sustain {} samples)",
        analysis.events.len(),
        analysis.flagged_fraction() * 100.0,
        analysis.detection_params.threshold,
        analysis.detection_params.min_sustain_samples,
    );
    println!(
        "  Nominals:   WOB {:.2} kkgf, RPM {:.1} (holdoff {} samples)",
        analysis.controller_params.nominal_a,
        analysis.controller_params.nominal_b,
        analysis.controller_params.holdoff_samples,
    );

    match &analysis.validation {
        Some(v) => println!(
            "  MWD check:  r = {:.3} (p = {:.2e}), precision {:.2}, recall {:.2}, F1 {:.2}, max PKtoPK {:.0} rpm",
            v.pearson_r, v.p_value, v.precision, v.recall, v.f1, v.mwd_max_pktopk_rpm
        ),
        None => println!("  MWD check:  no MWD stick-slip channel"),
    }

    let tf = &analysis.torsional;
    if tf.dominant_freq_hz > 0.0 {
        println!(
            "  Torsional:  {:.4} Hz, period {:.1} s, {:.2} osc/min (worst event)",
            tf.dominant_freq_hz, tf.period_s, tf.oscillations_per_minute
        );
    } else {
        println!("  Torsional:  no event long enough for a spectrum");
    }

    if !analysis.events.is_empty() {
        println!();
        println!("  {:>4}  {:>9}  {:>7}  {:>7}  {:>6}  {:<8}", "id", "start s", "dur s", "depth", "peak", "label");
        for e in analysis.events.iter().take(15) {
            println!(
                "  {:>4}  {:>9.0}  {:>7.0}  {:>7}  {:>6.2}  {:<8}",
                e.event_id,
                e.start_elapsed_s,
                e.duration_s,
                e.depth_m.map_or_else(|| "-".to_string(), |d| format!("{d:.0}")),
                e.peak_severity,
                e.severity.to_string(),
            );
        }
        if analysis.events.len() > 15 {
            println!("  ... {} more", analysis.events.len() - 15);
        }
    }
    Ok(())
}

fn run_export(csv: &Path, out: &Path, downsample: usize, config: &ReplayConfig) -> Result<()> {
    let (_, analysis) = load_and_analyze(csv, config)?;
    let summary = report::export(&analysis, config, out, downsample)
        .with_context(|| format!("Failed to export to {}", out.display()))?;

    println!("Wrote {} ({} rows)", summary.telemetry_path.display(), summary.telemetry_rows);
    println!("Wrote {} ({} events)", summary.events_path.display(), summary.events);
    println!("Wrote {}", summary.metadata_path.display());
    Ok(())
}

async fn run_play(csv: &Path, speed: Option<u32>, from: f64, config: &ReplayConfig) -> Result<()> {
    let (_, analysis) = load_and_analyze(csv, config)?;
    let (processed, outputs) = analysis.into_playback();

    let mut handle = PlaybackHandle::new(
        processed,
        outputs,
        Duration::from_millis(config.playback.tick_interval_ms),
    )?;
    handle
        .set_slow_interval(Duration::from_millis(config.playback.slow_interval_ms))
        .await;
    handle.set_speed(speed.unwrap_or(config.playback.speed)).await?;
    handle.seek(from).await;

    let mut frames = handle.frames();
    if let Some(frame) = frames.borrow_and_update().as_ref() {
        print_frame(frame);
    }

    // Graceful shutdown via Ctrl+C
    let cancel_token = CancellationToken::new();
    let shutdown_token = cancel_token.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Received Ctrl+C, stopping playback");
        shutdown_token.cancel();
    });

    let state = handle.snapshot().await;
    info!(cursor = state.cursor_index, speed = state.speed_multiplier, "Starting playback");
    handle.play().await;

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => break,
            changed = frames.changed() => {
                if changed.is_err() {
                    break;
                }
                let frame = frames.borrow_and_update().clone();
                if let Some(frame) = frame {
                    print_frame(&frame);
                }
                if !handle.snapshot().await.is_playing {
                    break;
                }
            }
        }
    }

    handle.shutdown().await;
    let state = handle.snapshot().await;
    info!(cursor = state.cursor_index, "Playback stopped");
    Ok(())
}

fn print_frame(frame: &SlowFrame) {
    let s = &frame.sample.sample;
    let o = &frame.output;
    println!(
        "{:>9.1}s  depth {:>7}  sev {:.2} ({:.2} {:<8})  {:<10}  WOB {:>5} -> {:>5.1}  RPM {:>4} -> {:>5.1}",
        s.elapsed_s,
        s.bit_depth_m.map_or_else(|| "-".to_string(), |d| format!("{d:.1}")),
        frame.sample.severity,
        frame.smoothed_severity,
        frame.sample.severity_label.to_string(),
        o.state.to_string(),
        s.wob_kkgf.map_or_else(|| "-".to_string(), |w| format!("{w:.1}")),
        o.setpoint_a,
        s.rpm.map_or_else(|| "-".to_string(), |r| format!("{r:.0}")),
        o.setpoint_b,
    );
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_json);

    config::init(load_config(args.config.as_deref())?);
    let config = config::get();
    info!(well = %config.well.name, field = %config.well.field, "TVM Replay starting");

    match args.command {
        SubCommand::Analyze { csv } => run_analyze(&csv, config),
        SubCommand::Export { csv, out, downsample } => run_export(&csv, &out, downsample, config),
        SubCommand::Play { csv, speed, from } => run_play(&csv, speed, from, config).await,
        SubCommand::ShowConfig => {
            print!("{}", config.to_toml()?);
            Ok(())
        }
    }
}
