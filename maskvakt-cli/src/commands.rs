use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use crossbeam::channel::{self, RecvTimeoutError};
use maskvakt_config::MaskvaktConfig;
use maskvakt_engine::MonitorRuntime;
use maskvakt_telemetry::EventLogger;
use tracing::{info, warn};

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Capture, detect and alert until interrupted
    Run(RunArgs),
    /// Load and validate the configuration, then exit
    CheckConfig(ConfigArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ConfigArgs {
    /// Configuration file; defaults to config/maskvakt.yaml plus MASKVAKT_* overrides
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub config: ConfigArgs,
    /// Seconds between status lines in the log (0 disables them)
    #[arg(long, default_value_t = 60)]
    pub status_interval: u64,
}

fn load_config(args: &ConfigArgs) -> Result<MaskvaktConfig, maskvakt_config::ConfigError> {
    match &args.config {
        Some(path) => MaskvaktConfig::load_from_path(path),
        None => MaskvaktConfig::load(),
    }
}

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run(args),
        Commands::CheckConfig(args) => check_config(args),
    }
}

fn check_config(args: ConfigArgs) -> anyhow::Result<()> {
    let config = load_config(&args).context("loading configuration")?;
    let summary = serde_json::json!({
        "cameras": config.capture.cameras.iter().map(|c| &c.id).collect::<Vec<_>>(),
        "workers": config.pipeline.workers,
        "inference_endpoint": config.inference.endpoint,
        "cooldown_secs": config.alerts.cooldown_secs,
        "telegram": config.alerts.telegram.enabled,
        "mqtt": config.alerts.mqtt.enabled,
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn run(args: RunArgs) -> anyhow::Result<()> {
    let config = load_config(&args.config).context("loading configuration")?;
    EventLogger::init(&config.telemetry).map_err(|e| anyhow!(e).context("installing logger"))?;

    let (stop_tx, stop_rx) = channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })?;

    let runtime = MonitorRuntime::builder(config)
        .build()
        .context("building monitor runtime")?;
    let report = runtime.start().context("starting monitor")?;
    for (camera_id, reason) in &report.camera_failures {
        warn!(camera_id = %camera_id, reason = %reason, "Camera not started");
    }
    info!(cameras = report.cameras_started, "Monitor running, press Ctrl-C to stop");

    let tick = match args.status_interval {
        0 => Duration::MAX,
        secs => Duration::from_secs(secs),
    };
    loop {
        match stop_rx.recv_timeout(tick) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {
                let status = runtime.status();
                info!(
                    cameras_running = status.cameras.running,
                    frames_processed = status.pipeline.frames_processed,
                    rate = status.pipeline.processing_rate,
                    alerts = status.alerts.delivered,
                    healthy = status.is_healthy(),
                    "Status"
                );
            }
        }
    }

    info!("Shutting down");
    runtime.shutdown();
    Ok(())
}
