//! sentry_detect - run the configured detector once over an image file.
//!
//! Prints the detections as JSON on stdout and optionally writes an
//! annotated copy of the image. Useful for checking a model, a labels
//! file or a threshold before pointing `sentryd` at a camera.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::io::IsTerminal;
use std::path::PathBuf;

use person_sentry::{
    config::{BackendKind, SentryConfig},
    frame::unix_now,
    load_detector, Annotator, Detection, Frame,
};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run person detection on a single image")]
struct Args {
    /// Image to analyse (JPEG or PNG).
    image: PathBuf,

    /// Config file (TOML, or JSON with a .json extension).
    #[arg(long, env = "SENTRY_CONFIG")]
    config: Option<PathBuf>,

    /// Detection model path or identifier.
    #[arg(long)]
    model: Option<String>,

    /// Detector backend (tract|stub).
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Newline-separated class names for the model.
    #[arg(long)]
    labels: Option<PathBuf>,

    /// Minimum confidence to report, in [0, 1].
    #[arg(long)]
    threshold: Option<f32>,

    /// Write an annotated copy of the image here.
    #[arg(long, value_name = "PATH")]
    annotated_out: Option<PathBuf>,

    /// UI mode for stderr progress (auto|plain|pretty).
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

#[derive(Serialize)]
struct DetectReport<'a> {
    image: String,
    width: u32,
    height: u32,
    detector: &'static str,
    target_label: &'a str,
    confidence_threshold: f32,
    /// Whether an alert would have been considered for this frame.
    target_found: bool,
    detections: Vec<&'a Detection>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let ui = ui::Ui::from_args(&args.ui, std::io::stderr().is_terminal());

    let mut config = match &args.config {
        Some(path) => SentryConfig::load_from(path)?,
        None => SentryConfig::load()?,
    };
    if let Some(model) = &args.model {
        config.model.identifier = model.clone();
    }
    if let Some(backend) = args.backend {
        config.model.backend = backend;
    }
    if let Some(labels) = &args.labels {
        config.model.labels_path = Some(labels.clone());
    }
    if let Some(threshold) = args.threshold {
        config.detection.confidence_threshold = threshold;
    }
    config.validate()?;

    let mut detector = {
        let _stage = ui.stage("Load detection model");
        load_detector(&config.model)?
    };

    let mut frame = {
        let _stage = ui.stage("Decode image");
        let image = image::open(&args.image)
            .with_context(|| format!("failed to open image {}", args.image.display()))?
            .to_rgb8();
        Frame::new(image, unix_now())
    };

    let threshold = config.detection.confidence_threshold;
    let detections = {
        let _stage = ui.stage("Run detection");
        detector.detect(&frame, threshold)?
    };
    let reported: Vec<&Detection> = detections
        .iter()
        .filter(|detection| detection.confidence >= threshold)
        .collect();
    let target = config.detection.target_label.as_str();

    let report = DetectReport {
        image: args.image.display().to_string(),
        width: frame.width(),
        height: frame.height(),
        detector: detector.name(),
        target_label: target,
        confidence_threshold: threshold,
        target_found: reported.iter().any(|d| d.qualifies(target, threshold)),
        detections: reported,
    };
    println!("{}", serde_json::to_string_pretty(&report)?);

    if let Some(out) = &args.annotated_out {
        let kept: Vec<Detection> = report.detections.iter().map(|d| (*d).clone()).collect();
        Annotator::new(target).annotate(&mut frame, &kept);
        frame
            .image()
            .save(out)
            .with_context(|| format!("failed to write {}", out.display()))?;
        log::info!("annotated image written to {}", out.display());
    }
    Ok(())
}
