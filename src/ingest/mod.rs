//! Frame ingestion sources.
//!
//! This module provides the camera side of the monitor:
//! - Synthetic scenes (`stub://` devices, testing and demos)
//! - USB/V4L2 devices (feature: ingest-v4l2)
//!
//! Every source implements `FrameSource`. A source:
//! - Opens the device selected by camera index (or explicit device path)
//! - Pulls one frame per `read` call, synchronously
//! - Reports a failed grab as `SourceError::Read` and does NOT retry;
//!   recovery policy belongs to the monitor loop
//! - Releases the device on `close`, which is idempotent

use anyhow::{anyhow, Result};

use crate::config::CameraSettings;
use crate::frame::Frame;

mod normalize;
pub mod synthetic;
#[cfg(feature = "ingest-v4l2")]
pub mod v4l2;

pub use synthetic::{SyntheticConfig, SyntheticSource};
#[cfg(feature = "ingest-v4l2")]
pub use v4l2::{V4l2Config, V4l2Source};

/// Failure reported by a frame source.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceError {
    /// The device could not be acquired (wrong index, busy, missing driver).
    Open { device: String, reason: String },
    /// A single grab failed. Transient from the source's point of view.
    Read { device: String, reason: String },
    /// `read` was called on a source that is not open.
    NotOpen { device: String },
}

impl std::fmt::Display for SourceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SourceError::Open { device, reason } => {
                write!(f, "could not open video stream {}: {}", device, reason)
            }
            SourceError::Read { device, reason } => {
                write!(f, "failed to grab frame from {}: {}", device, reason)
            }
            SourceError::NotOpen { device } => write!(f, "video stream {} is not open", device),
        }
    }
}

impl std::error::Error for SourceError {}

/// Camera contract used by the monitor loop.
pub trait FrameSource {
    /// Acquire the device. Called once at startup and once per reconnect.
    fn open(&mut self, camera_index: u32) -> Result<(), SourceError>;

    /// Grab the next frame.
    fn read(&mut self) -> Result<Frame, SourceError>;

    /// Release the device. Safe to call on an already-closed source.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Human-readable device name for logs.
    fn describe(&self) -> String;
}

/// Scoped ownership of a frame source: the device is released when the
/// guard is dropped, on every exit path including unwinding.
pub struct SourceGuard {
    source: Box<dyn FrameSource>,
}

impl SourceGuard {
    pub fn new(source: Box<dyn FrameSource>) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &dyn FrameSource {
        self.source.as_ref()
    }

    pub fn source_mut(&mut self) -> &mut dyn FrameSource {
        self.source.as_mut()
    }

    /// Release now rather than at drop.
    pub fn release(&mut self) {
        if self.source.is_open() {
            self.source.close();
            log::info!("released video stream {}", self.source.describe());
        }
    }
}

impl Drop for SourceGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// Build (but do not open) the source for the configured camera.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    let device = settings.device_path();
    if let Some(name) = device.strip_prefix("stub://") {
        return Ok(Box::new(SyntheticSource::new(SyntheticConfig {
            name: name.to_string(),
            width: settings.width,
            height: settings.height,
            ..SyntheticConfig::default()
        })));
    }
    if device.contains("://") {
        return Err(anyhow!(
            "camera device {} is not a local device (only /dev paths and stub:// are supported)",
            device
        ));
    }

    #[cfg(feature = "ingest-v4l2")]
    {
        Ok(Box::new(V4l2Source::new(V4l2Config {
            device: settings.device.clone(),
            target_fps: settings.target_fps,
            width: settings.width,
            height: settings.height,
        })))
    }
    #[cfg(not(feature = "ingest-v4l2"))]
    {
        Err(anyhow!(
            "camera device {} requires the ingest-v4l2 feature",
            device
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSource {
        open: bool,
        closes: Arc<AtomicUsize>,
    }

    impl FrameSource for CountingSource {
        fn open(&mut self, _camera_index: u32) -> Result<(), SourceError> {
            self.open = true;
            Ok(())
        }

        fn read(&mut self) -> Result<Frame, SourceError> {
            Err(SourceError::NotOpen {
                device: self.describe(),
            })
        }

        fn close(&mut self) {
            if self.open {
                self.closes.fetch_add(1, Ordering::SeqCst);
            }
            self.open = false;
        }

        fn is_open(&self) -> bool {
            self.open
        }

        fn describe(&self) -> String {
            "counting".to_string()
        }
    }

    #[test]
    fn guard_releases_open_source_on_drop() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut source = CountingSource {
            open: false,
            closes: closes.clone(),
        };
        source.open(0).unwrap();
        {
            let _guard = SourceGuard::new(Box::new(source));
        }
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn guard_release_is_idempotent() {
        let closes = Arc::new(AtomicUsize::new(0));
        let mut source = CountingSource {
            open: false,
            closes: closes.clone(),
        };
        source.open(0).unwrap();
        let mut guard = SourceGuard::new(Box::new(source));
        guard.release();
        guard.release();
        drop(guard);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn stub_device_selects_synthetic_source() {
        let settings = CameraSettings {
            index: 0,
            device: Some("stub://porch".to_string()),
            width: 64,
            height: 48,
            target_fps: 10,
        };
        let source = open_source(&settings).unwrap();
        assert_eq!(source.describe(), "stub://porch");
        assert!(!source.is_open());
    }

    #[test]
    fn remote_urls_are_rejected() {
        let settings = CameraSettings {
            index: 0,
            device: Some("rtsp://camera".to_string()),
            width: 64,
            height: 48,
            target_fps: 10,
        };
        assert!(open_source(&settings).is_err());
    }
}
