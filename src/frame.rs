//! Frame model.
//!
//! A `Frame` is one RGB24 image pulled from the camera together with the
//! wall-clock time it was captured. Frames live for exactly one monitor
//! cycle:
//! - the source produces it and hands ownership to the loop
//! - the detector borrows it read-only
//! - the annotator borrows it mutably to draw overlays
//! - the display sink borrows it read-only, then it is dropped
//!
//! Frames are never persisted by the monitor loop.

use anyhow::{anyhow, Result};
use image::{Rgb, RgbImage};
use std::time::{SystemTime, UNIX_EPOCH};

/// Number of interleaved channels in every frame buffer.
pub const CHANNELS: u32 = 3;

/// Seconds since the UNIX epoch as a float, the timestamp unit used by
/// frames and the alert gate.
pub fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}

/// One captured RGB24 image.
#[derive(Clone)]
pub struct Frame {
    image: RgbImage,
    /// Capture timestamp, seconds since the UNIX epoch.
    pub captured_at: f64,
}

impl Frame {
    pub fn new(image: RgbImage, captured_at: f64) -> Self {
        Self { image, captured_at }
    }

    /// Build a frame from a packed RGB24 buffer, validating its length.
    pub fn from_rgb(pixels: Vec<u8>, width: u32, height: u32, captured_at: f64) -> Result<Self> {
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|v| v.checked_mul(CHANNELS as usize))
            .ok_or_else(|| anyhow!("frame dimensions overflow"))?;
        if pixels.len() != expected {
            return Err(anyhow!(
                "expected {} RGB bytes for {}x{}, received {}",
                expected,
                width,
                height,
                pixels.len()
            ));
        }
        let image = RgbImage::from_raw(width, height, pixels)
            .ok_or_else(|| anyhow!("failed to wrap {}x{} RGB buffer", width, height))?;
        Ok(Self::new(image, captured_at))
    }

    /// Uniformly coloured frame.
    pub fn filled(width: u32, height: u32, color: [u8; 3], captured_at: f64) -> Self {
        Self::new(
            RgbImage::from_pixel(width, height, Rgb(color)),
            captured_at,
        )
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn image_mut(&mut self) -> &mut RgbImage {
        &mut self.image
    }

    /// Packed RGB24 pixel data, row-major.
    pub fn pixels(&self) -> &[u8] {
        self.image.as_raw()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("width", &self.width())
            .field("height", &self.height())
            .field("captured_at", &self.captured_at)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rgb_validates_length() {
        assert!(Frame::from_rgb(vec![0u8; 12], 2, 2, 0.0).is_ok());
        assert!(Frame::from_rgb(vec![0u8; 11], 2, 2, 0.0).is_err());
    }

    #[test]
    fn filled_frame_reports_dimensions() {
        let frame = Frame::filled(8, 4, [10, 20, 30], 42.5);
        assert_eq!(frame.width(), 8);
        assert_eq!(frame.height(), 4);
        assert_eq!(frame.pixels().len(), 8 * 4 * 3);
        assert_eq!(&frame.pixels()[..3], &[10, 20, 30]);
        assert_eq!(frame.captured_at, 42.5);
    }

    #[test]
    fn unix_now_is_after_2020() {
        assert!(unix_now() > 1_577_836_800.0);
    }
}
