//! Output sinks for annotated frames.
//!
//! - `window`: on-screen window, `q`/Esc quits (feature: display-opencv)
//! - `snapshot`: latest frame written to a JPEG file every cycle
//! - `headless`: frames are dropped; stop with Ctrl-C
//!
//! A window that cannot be opened degrades to headless with a warning
//! instead of failing startup.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;

use crate::config::{DisplayMode, DisplaySettings};
use crate::frame::Frame;

#[cfg(feature = "display-opencv")]
mod window;

#[cfg(feature = "display-opencv")]
pub use window::WindowDisplay;

const SNAPSHOT_QUALITY: u8 = 85;

/// What the loop should do after a frame was shown.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayEvent {
    Continue,
    /// The operator asked to quit.
    Quit,
}

pub trait DisplaySink {
    /// Present one annotated frame and poll for operator input.
    fn show(&mut self, frame: &Frame) -> Result<DisplayEvent>;

    /// Tear down any window or file handle. Idempotent.
    fn close(&mut self) {}

    fn describe(&self) -> String;
}

#[derive(Debug, Default)]
pub struct HeadlessDisplay {
    shown: u64,
}

impl HeadlessDisplay {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shown(&self) -> u64 {
        self.shown
    }
}

impl DisplaySink for HeadlessDisplay {
    fn show(&mut self, _frame: &Frame) -> Result<DisplayEvent> {
        self.shown += 1;
        Ok(DisplayEvent::Continue)
    }

    fn describe(&self) -> String {
        "headless".to_string()
    }
}

/// Writes every frame to the same JPEG path.
///
/// The image is encoded next to the target and renamed over it, so readers
/// never observe a half-written file.
#[derive(Debug)]
pub struct SnapshotDisplay {
    path: PathBuf,
    staging: PathBuf,
    written: u64,
}

impl SnapshotDisplay {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut staging = path.clone().into_os_string();
        staging.push(".tmp");
        Self {
            path,
            staging: PathBuf::from(staging),
            written: 0,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl DisplaySink for SnapshotDisplay {
    fn show(&mut self, frame: &Frame) -> Result<DisplayEvent> {
        let file = std::fs::File::create(&self.staging)
            .with_context(|| format!("failed to create {}", self.staging.display()))?;
        let mut writer = std::io::BufWriter::new(file);
        JpegEncoder::new_with_quality(&mut writer, SNAPSHOT_QUALITY)
            .encode_image(frame.image())
            .with_context(|| format!("failed to encode snapshot {}", self.path.display()))?;
        drop(writer);
        std::fs::rename(&self.staging, &self.path)
            .with_context(|| format!("failed to publish snapshot {}", self.path.display()))?;
        self.written += 1;
        Ok(DisplayEvent::Continue)
    }

    fn close(&mut self) {
        // A failed cycle can leave the staging file behind.
        let _ = std::fs::remove_file(&self.staging);
    }

    fn describe(&self) -> String {
        format!("snapshot {}", self.path.display())
    }
}

/// Build the sink selected by the display settings.
pub fn open_display(settings: &DisplaySettings) -> Box<dyn DisplaySink> {
    match settings.mode {
        DisplayMode::Headless => Box::new(HeadlessDisplay::new()),
        DisplayMode::Snapshot => {
            log::info!("writing annotated frames to {}", settings.snapshot_path.display());
            Box::new(SnapshotDisplay::new(settings.snapshot_path.clone()))
        }
        DisplayMode::Window => open_window(settings),
    }
}

#[cfg(feature = "display-opencv")]
fn open_window(settings: &DisplaySettings) -> Box<dyn DisplaySink> {
    match WindowDisplay::open(&settings.window_title) {
        Ok(window) => Box::new(window),
        Err(err) => {
            log::warn!("failed to open display window: {:#}. Running headless.", err);
            Box::new(HeadlessDisplay::new())
        }
    }
}

#[cfg(not(feature = "display-opencv"))]
fn open_window(_settings: &DisplaySettings) -> Box<dyn DisplaySink> {
    log::warn!("window display requires the display-opencv feature. Running headless.");
    Box::new(HeadlessDisplay::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_never_quits() {
        let mut display = HeadlessDisplay::new();
        let frame = Frame::filled(8, 8, [0, 0, 0], 0.0);
        assert_eq!(display.show(&frame).unwrap(), DisplayEvent::Continue);
        assert_eq!(display.show(&frame).unwrap(), DisplayEvent::Continue);
        assert_eq!(display.shown(), 2);
    }

    #[test]
    fn snapshot_writes_decodable_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest.jpg");
        let mut display = SnapshotDisplay::new(&path);
        let frame = Frame::filled(32, 24, [200, 10, 10], 0.0);

        assert_eq!(display.show(&frame).unwrap(), DisplayEvent::Continue);
        display.show(&frame).unwrap();
        display.close();

        let decoded = image::open(&path).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 24));
        assert_eq!(display.written(), 2);
        assert!(!dir.path().join("latest.jpg.tmp").exists());
    }

    #[test]
    fn snapshot_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut display = SnapshotDisplay::new(dir.path().join("missing").join("latest.jpg"));
        let frame = Frame::filled(4, 4, [0, 0, 0], 0.0);
        assert!(display.show(&frame).is_err());
    }

    #[test]
    fn headless_mode_builds_headless_sink() {
        let settings = DisplaySettings {
            mode: DisplayMode::Headless,
            window_title: "t".to_string(),
            snapshot_path: PathBuf::from("unused.jpg"),
        };
        assert_eq!(open_display(&settings).describe(), "headless");
    }
}
