//! sentryd - person detection monitor
//!
//! This daemon:
//! 1. Loads the detection model (fatal on failure)
//! 2. Opens the camera (fatal on failure)
//! 3. Reads frames, runs detection and sounds an alert for the first
//!    person seen per frame, at most once per cooldown window
//! 4. Shows annotated frames in a window, a snapshot file or nowhere
//! 5. Stops on `q`/Esc, Ctrl-C, or when a lost camera cannot be reopened
//!
//! Exit status: 0 on a requested stop, 1 on a runtime failure, 2 when
//! startup fails.

use anyhow::{Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;
use std::process::ExitCode;

use person_sentry::{
    alert::{build_player, AlertGate, AlertNotifier},
    config::{BackendKind, DisplayMode, SentryConfig},
    load_detector, open_display, open_source, LoopSettings, MonitorLoop, StopSignal,
};

#[path = "../ui.rs"]
mod ui;

const EXIT_STARTUP_FAILURE: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Watch a camera and sound an alert when a person appears"
)]
struct Args {
    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, env = "SENTRY_CONFIG")]
    config: Option<PathBuf>,

    /// Camera index; opens /dev/video<N>.
    #[arg(long)]
    camera_index: Option<u32>,

    /// Explicit device, e.g. /dev/video2 or stub://porch.
    #[arg(long)]
    camera_device: Option<String>,

    /// Detection model path or identifier.
    #[arg(long)]
    model: Option<String>,

    /// Detector backend (tract|stub).
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Minimum confidence for a detection to count, in [0, 1].
    #[arg(long)]
    threshold: Option<f32>,

    /// Seconds between alerts.
    #[arg(long)]
    cooldown: Option<f64>,

    /// Where annotated frames go (window|snapshot|headless).
    #[arg(long)]
    display: Option<DisplayMode>,

    /// Draw a frame counter on every displayed frame.
    #[arg(long)]
    status_line: bool,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());

    let mut monitor = match prepare(&args, &ui) {
        Ok(monitor) => monitor,
        Err(err) => {
            log::error!("startup failed: {:#}", err);
            return ExitCode::from(EXIT_STARTUP_FAILURE);
        }
    };

    let termination = monitor.run();
    if termination.is_clean() {
        log::info!("sentryd stopped: {}", termination);
    } else {
        log::error!("sentryd stopped: {}", termination);
    }
    ExitCode::from(termination.exit_code())
}

fn prepare(args: &Args, ui: &ui::Ui) -> Result<MonitorLoop> {
    let config = staged(ui, "Load configuration", || load_config(args))?;
    let detector = staged(ui, "Load detection model", || load_detector(&config.model))?;
    let player = staged(ui, "Prepare alert sound", || build_player(&config.alert))?;

    let stop = StopSignal::new();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || handler_stop.request())
        .context("failed to install Ctrl-C handler")?;

    let mut settings = LoopSettings::from_config(&config);
    settings.status_line = args.status_line;

    let monitor = staged(ui, "Open camera", || {
        let source = open_source(&config.camera)?;
        let mut monitor = MonitorLoop::new(
            source,
            detector,
            AlertGate::new(config.alert.cooldown_secs),
            Box::new(AlertNotifier::new(player)),
            open_display(&config.display),
            settings,
            stop,
        );
        monitor.start()?;
        Ok(monitor)
    })?;

    log::info!(
        "sentryd running (cooldown {:.0}s). Press q in the window or Ctrl-C to stop.",
        config.alert.cooldown_secs
    );
    Ok(monitor)
}

fn load_config(args: &Args) -> Result<SentryConfig> {
    let mut config = match &args.config {
        Some(path) => SentryConfig::load_from(path)?,
        None => SentryConfig::load()?,
    };
    if let Some(index) = args.camera_index {
        config.camera.index = index;
    }
    if let Some(device) = &args.camera_device {
        config.camera.device = Some(device.clone());
    }
    if let Some(model) = &args.model {
        config.model.identifier = model.clone();
    }
    if let Some(backend) = args.backend {
        config.model.backend = backend;
    }
    if let Some(threshold) = args.threshold {
        config.detection.confidence_threshold = threshold;
    }
    if let Some(cooldown) = args.cooldown {
        config.alert.cooldown_secs = cooldown;
    }
    if let Some(display) = args.display {
        config.display.mode = display;
    }
    config.validate()?;
    Ok(config)
}

fn staged<T>(ui: &ui::Ui, name: &str, f: impl FnOnce() -> Result<T>) -> Result<T> {
    let stage = ui.stage(name);
    let result = f();
    if result.is_err() {
        stage.fail();
    }
    result
}
