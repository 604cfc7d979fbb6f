//! AquaFeed: Main Entry Point
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  FrameSource        PwmActuator      LogEventSink  CsvCycleLog │
//! │  (nokhwa/synthetic) (sysfs/sim)      FeatureChannelSink        │
//! │  JsonFileConfig (ConfigPort)                                   │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │            FeederService (pure logic)                  │    │
//! │  │  Vision · Fusion · FSM · Anomaly · PI                  │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  ControlLoop (control thread) · acquisition thread             │
//! └────────────────────────────────────────────────────────────────┘
//! ```

use std::fs::File;
use std::io::{self, BufRead, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use log::{info, warn};
use tracing_subscriber::EnvFilter;

use aquafeed::adapters::{CsvCycleLog, FeatureChannelSink, JsonFileConfig, LogEventSink, MultiSink};
use aquafeed::app::AppCommand;
use aquafeed::app::ports::ConfigPort;
use aquafeed::camera::FrameSource;
use aquafeed::camera::synthetic::SyntheticCamera;
use aquafeed::config::{ConfigStore, SystemConfig};
use aquafeed::drivers::{PwmActuator, PwmChannel, SimulatedPwmChannel, SysfsPwmChannel};
use aquafeed::runner::{ControlLoop, ExitReason, StopHandle};

const DEFAULT_CONFIG_PATH: &str = "config/aquafeed.json";

#[derive(Parser)]
#[command(name = "aquafeed", version, about = "Vision-guided aquaculture feeder controller")]
struct Cli {
    /// JSON configuration document.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the feeding controller.
    Run {
        /// Synthetic camera and in-memory PWM instead of real hardware.
        #[arg(long)]
        simulate: bool,
        /// Cycle log path (overrides `logging.csv_output.file_path`).
        #[arg(long)]
        csv: Option<String>,
        /// Disable the cycle log.
        #[arg(long, conflicts_with = "csv")]
        no_csv: bool,
        /// Write the per-frame feature vector as JSON lines to this file.
        #[arg(long)]
        features: Option<PathBuf>,
        /// Stop after this many seconds.
        #[arg(long)]
        duration: Option<f64>,
    },
    /// Load, validate and print the effective configuration.
    CheckConfig,
    /// Sweep the PWM output and report its linearity.
    PwmTest {
        #[arg(long, default_value_t = 11)]
        points: usize,
        /// Settling time per point (ms).
        #[arg(long, default_value_t = 100)]
        dwell_ms: u64,
        #[arg(long)]
        simulate: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_thread_names(true)
        .init();

    let cli = Cli::parse();
    let config_path = cli.config.clone();

    match cli.cmd {
        Commands::Run {
            simulate,
            csv,
            no_csv,
            features,
            duration,
        } => {
            info!("AquaFeed v{}", env!("CARGO_PKG_VERSION"));
            let config = load_config(config_path.as_deref())?;
            let opts = RunOptions {
                config_path,
                csv: if no_csv { None } else { csv_target(&config, csv) },
                features,
                duration: duration.map(Duration::from_secs_f64),
            };
            if simulate {
                let actuator = PwmActuator::new(SimulatedPwmChannel::new(), &config.hardware.pwm);
                let source = FrameSource::open(SyntheticCamera::from_config, &config.hardware.camera)
                    .context("synthetic camera failed to start")?;
                run(config, source, actuator, opts)
            } else {
                let channel = SysfsPwmChannel::open(&config.hardware.pwm).context("PWM hardware unavailable")?;
                let actuator = PwmActuator::new(channel, &config.hardware.pwm);
                let source = open_camera(&config)?;
                run(config, source, actuator, opts)
            }
        }
        Commands::CheckConfig => {
            let config = load_config(config_path.as_deref())?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            println!("configuration OK");
            Ok(())
        }
        Commands::PwmTest {
            points,
            dwell_ms,
            simulate,
        } => {
            let config = load_config(config_path.as_deref())?;
            let dwell = Duration::from_millis(dwell_ms);
            if simulate {
                pwm_test(PwmActuator::new(SimulatedPwmChannel::new(), &config.hardware.pwm), points, dwell)
            } else {
                let channel = SysfsPwmChannel::open(&config.hardware.pwm).context("PWM hardware unavailable")?;
                pwm_test(PwmActuator::new(channel, &config.hardware.pwm), points, dwell)
            }
        }
    }
}

// ── Configuration ─────────────────────────────────────────────

fn load_config(path: Option<&Path>) -> Result<SystemConfig> {
    match path {
        // An explicit file must exist and be valid.
        Some(p) => JsonFileConfig::new(p)
            .load()
            .with_context(|| format!("loading config {}", p.display())),
        None => JsonFileConfig::new(DEFAULT_CONFIG_PATH)
            .load_or_default()
            .context("default config is invalid"),
    }
}

fn csv_target(config: &SystemConfig, cli: Option<String>) -> Option<String> {
    cli.or_else(|| {
        let out = &config.logging.csv_output;
        out.enable.then(|| out.file_path.clone())
    })
}

// ── Run ───────────────────────────────────────────────────────

struct RunOptions {
    config_path: Option<PathBuf>,
    csv: Option<String>,
    features: Option<PathBuf>,
    duration: Option<Duration>,
}

#[cfg(feature = "camera")]
fn open_camera(config: &SystemConfig) -> Result<FrameSource> {
    use aquafeed::camera::nokhwa_device::NokhwaCamera;
    FrameSource::open(NokhwaCamera::open, &config.hardware.camera)
        .with_context(|| format!("camera {} could not be opened", config.hardware.camera.device_id))
}

#[cfg(not(feature = "camera"))]
fn open_camera(_config: &SystemConfig) -> Result<FrameSource> {
    bail!("built without the `camera` feature; rebuild with it or pass --simulate")
}

fn run<C: PwmChannel>(
    config: SystemConfig,
    mut source: FrameSource,
    mut actuator: PwmActuator<C>,
    opts: RunOptions,
) -> Result<()> {
    let mut sink = MultiSink::new().with(LogEventSink::new());
    if let Some(template) = &opts.csv {
        sink.push(CsvCycleLog::create(template).with_context(|| format!("creating cycle log {template}"))?);
    }
    if let Some(path) = &opts.features {
        let file = File::create(path).with_context(|| format!("creating feature stream {}", path.display()))?;
        sink.push(FeatureChannelSink::new(BufWriter::new(file)));
    }

    actuator
        .start(Some(config.hardware.pwm.min_duty_cycle))
        .context("PWM could not be started")?;

    let store = Arc::new(ConfigStore::new(config));
    let stop = StopHandle::new();
    let (tx, rx) = mpsc::channel();
    spawn_console(stop.clone(), tx, opts.config_path.clone())?;

    let mut control = ControlLoop::new(Arc::clone(&store), stop).with_commands(rx);
    if let Some(d) = opts.duration {
        control = control.with_duration(d);
    }
    info!("controller running; type `q` + Enter to stop");
    let summary = control.run(&mut source, &mut actuator, &mut sink);

    drop(source);
    actuator.stop().context("PWM could not be stopped")?;

    if summary.reason == ExitReason::CameraLost {
        bail!("camera lost after {:.1}s", summary.runtime.as_secs_f64());
    }
    Ok(())
}

/// Operator console on stdin:
/// `q` stops, `reset` restarts the cycle, `reset-vision` clears feature
/// history, `reload` re-reads the config file.
fn spawn_console(stop: StopHandle, tx: Sender<AppCommand>, config_path: Option<PathBuf>) -> Result<()> {
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let cmd = match line.trim() {
                    "q" | "quit" | "stop" => {
                        stop.stop();
                        break;
                    }
                    "reset" => AppCommand::ResetController,
                    "reset-vision" => AppCommand::ResetVision,
                    "reload" => {
                        let path = config_path.as_deref().unwrap_or(Path::new(DEFAULT_CONFIG_PATH));
                        match JsonFileConfig::new(path).load() {
                            Ok(cfg) => AppCommand::UpdateConfig(Box::new(cfg)),
                            Err(e) => {
                                warn!("reload failed: {e}");
                                continue;
                            }
                        }
                    }
                    "" => continue,
                    other => {
                        warn!("unknown console command `{other}`");
                        continue;
                    }
                };
                if tx.send(cmd).is_err() {
                    break;
                }
            }
        })
        .context("console thread could not be spawned")?;
    Ok(())
}

// ── PWM self-test ─────────────────────────────────────────────

fn pwm_test<C: PwmChannel>(mut actuator: PwmActuator<C>, points: usize, dwell: Duration) -> Result<()> {
    actuator.start(None).context("PWM could not be started")?;
    let report = actuator
        .linearity_test(points, dwell)
        .context("linearity test failed")?;
    actuator.stop().context("PWM could not be stopped")?;

    println!("{:>10} {:>10} {:>8}", "commanded", "actual", "error");
    for p in &report.points {
        println!("{:>10.2} {:>10.2} {:>8.3}", p.commanded, p.actual, p.error);
    }
    println!(
        "max error {:.3}%, avg error {:.3}%, linearity score {:.3}",
        report.max_error, report.avg_error, report.linearity_score
    );
    Ok(())
}
