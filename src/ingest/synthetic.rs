//! Synthetic frame source.
//!
//! `stub://` devices produce a dim gradient scene in which a bright,
//! roughly person-shaped figure walks across the frame for part of every
//! cycle. Paired with the bright-blob detector this exercises the whole
//! monitor loop without a camera or a model.
//!
//! Scripted read failures (`fail_reads_at`) let tests drive the reconnect
//! path deterministically.

use std::collections::BTreeSet;

use crate::frame::{unix_now, Frame};
use crate::ingest::{FrameSource, SourceError};

/// Pixel value of the figure. Background never exceeds `BACKGROUND_MAX`.
pub const FIGURE_LEVEL: u8 = 235;
const BACKGROUND_MAX: u8 = 96;

/// Configuration for a synthetic source.
#[derive(Clone, Debug)]
pub struct SyntheticConfig {
    /// Name shown after `stub://`.
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Frames per scene cycle.
    pub figure_period: u64,
    /// Leading frames of each cycle during which the figure is visible.
    pub figure_frames: u64,
    /// 1-based read numbers (counted across reconnects) that fail.
    pub fail_reads_at: BTreeSet<u64>,
    /// When set, `open` fails.
    pub refuse_open: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            name: "front_camera".to_string(),
            width: 640,
            height: 480,
            figure_period: 100,
            figure_frames: 20,
            fail_reads_at: BTreeSet::new(),
            refuse_open: false,
        }
    }
}

pub struct SyntheticSource {
    config: SyntheticConfig,
    open: bool,
    reads: u64,
    frames_captured: u64,
}

impl SyntheticSource {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            open: false,
            reads: 0,
            frames_captured: 0,
        }
    }

    pub fn frames_captured(&self) -> u64 {
        self.frames_captured
    }

    /// Figure bounds `(x1, y1, x2, y2)` for the given frame number, if visible.
    pub fn figure_bounds(&self, frame_number: u64) -> Option<(u32, u32, u32, u32)> {
        let period = self.config.figure_period.max(1);
        let phase = frame_number % period;
        if phase >= self.config.figure_frames {
            return None;
        }
        let width = self.config.width;
        let height = self.config.height;
        let body_w = (width / 10).max(2);
        let body_h = (height / 3).max(2);
        let head = (body_w / 2).max(1);
        let total_h = body_h + head;
        if total_h >= height || body_w >= width {
            return None;
        }

        // Walk left to right across the visible window.
        let travel = width - body_w;
        let steps = self.config.figure_frames.max(1);
        let x1 = ((travel as u64 * phase) / steps) as u32;
        let y1 = (height - total_h) / 2;
        Some((x1, y1, x1 + body_w, y1 + total_h))
    }

    fn render(&self, frame_number: u64) -> Vec<u8> {
        let width = self.config.width as usize;
        let height = self.config.height as usize;
        let mut pixels = vec![0u8; width * height * 3];

        for y in 0..height {
            for x in 0..width {
                let shade = ((x + y + frame_number as usize) % (BACKGROUND_MAX as usize + 1)) as u8;
                let offset = (y * width + x) * 3;
                pixels[offset] = shade;
                pixels[offset + 1] = shade / 2;
                pixels[offset + 2] = BACKGROUND_MAX - shade;
            }
        }

        if let Some((x1, y1, x2, y2)) = self.figure_bounds(frame_number) {
            let body_w = x2 - x1;
            let head = (body_w / 2).max(1);
            let head_x1 = x1 + (body_w - head) / 2;
            for y in y1..y2 {
                let in_head = y < y1 + head;
                for x in x1..x2 {
                    if in_head && (x < head_x1 || x >= head_x1 + head) {
                        continue;
                    }
                    let offset = (y as usize * width + x as usize) * 3;
                    pixels[offset..offset + 3].fill(FIGURE_LEVEL);
                }
            }
        }

        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn open(&mut self, _camera_index: u32) -> Result<(), SourceError> {
        if self.config.refuse_open {
            return Err(SourceError::Open {
                device: self.describe(),
                reason: "synthetic device configured to refuse open".to_string(),
            });
        }
        self.open = true;
        log::info!(
            "SyntheticSource: connected to {} ({}x{})",
            self.describe(),
            self.config.width,
            self.config.height
        );
        Ok(())
    }

    fn read(&mut self) -> Result<Frame, SourceError> {
        if !self.open {
            return Err(SourceError::NotOpen {
                device: self.describe(),
            });
        }
        self.reads += 1;
        if self.config.fail_reads_at.contains(&self.reads) {
            return Err(SourceError::Read {
                device: self.describe(),
                reason: format!("scripted failure on read {}", self.reads),
            });
        }

        let frame_number = self.frames_captured;
        self.frames_captured += 1;
        let pixels = self.render(frame_number);
        Frame::from_rgb(pixels, self.config.width, self.config.height, unix_now()).map_err(
            |err| SourceError::Read {
                device: self.describe(),
                reason: err.to_string(),
            },
        )
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn describe(&self) -> String {
        format!("stub://{}", self.config.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> SyntheticConfig {
        SyntheticConfig {
            name: "test".to_string(),
            width: 80,
            height: 60,
            figure_period: 10,
            figure_frames: 5,
            ..SyntheticConfig::default()
        }
    }

    #[test]
    fn produces_frames_after_open() {
        let mut source = SyntheticSource::new(small_config());
        assert!(matches!(source.read(), Err(SourceError::NotOpen { .. })));

        source.open(0).unwrap();
        let frame = source.read().unwrap();
        assert_eq!(frame.width(), 80);
        assert_eq!(frame.height(), 60);
        assert!(frame.captured_at > 0.0);
    }

    #[test]
    fn figure_is_drawn_only_while_visible() {
        let mut source = SyntheticSource::new(small_config());
        source.open(0).unwrap();

        let visible = source.read().unwrap();
        assert!(visible.pixels().iter().any(|&p| p == FIGURE_LEVEL));

        for _ in 1..5 {
            source.read().unwrap();
        }
        let hidden = source.read().unwrap();
        assert!(hidden.pixels().iter().all(|&p| p <= BACKGROUND_MAX));
    }

    #[test]
    fn scripted_failures_report_read_errors() {
        let mut config = small_config();
        config.fail_reads_at = [2].into_iter().collect();
        let mut source = SyntheticSource::new(config);
        source.open(0).unwrap();

        assert!(source.read().is_ok());
        assert!(matches!(source.read(), Err(SourceError::Read { .. })));
        assert!(source.read().is_ok());
    }

    #[test]
    fn close_is_idempotent() {
        let mut source = SyntheticSource::new(small_config());
        source.open(0).unwrap();
        source.close();
        source.close();
        assert!(!source.is_open());
    }

    #[test]
    fn refuse_open_reports_open_error() {
        let mut config = small_config();
        config.refuse_open = true;
        let mut source = SyntheticSource::new(config);
        assert!(matches!(source.open(0), Err(SourceError::Open { .. })));
    }
}
