use anyhow::Result;

use crate::detect::backend::{DetectionCapability, Detector};
use crate::detect::labels::LabelVocabulary;
use crate::detect::result::{BoundingBox, Detection};
use crate::frame::Frame;

const DEFAULT_BRIGHTNESS: u8 = 200;
const DEFAULT_MIN_PIXELS: usize = 16;

/// CPU backend that localizes the bright region of a frame.
///
/// Every pixel whose mean channel value reaches the brightness cut counts
/// as foreground. When enough foreground exists, one detection is
/// reported: the foreground bounding box, labeled with class 0 of the
/// vocabulary, with confidence equal to the fraction of the box that is
/// foreground. Pairs with `stub://` cameras.
pub struct BrightBlobBackend {
    labels: LabelVocabulary,
    brightness: u8,
    min_pixels: usize,
}

impl BrightBlobBackend {
    pub fn new(labels: LabelVocabulary) -> Self {
        Self {
            labels,
            brightness: DEFAULT_BRIGHTNESS,
            min_pixels: DEFAULT_MIN_PIXELS,
        }
    }

    pub fn with_min_pixels(mut self, min_pixels: usize) -> Self {
        self.min_pixels = min_pixels.max(1);
        self
    }
}

impl Default for BrightBlobBackend {
    fn default() -> Self {
        Self::new(LabelVocabulary::coco())
    }
}

impl Detector for BrightBlobBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::Classification | DetectionCapability::Localization
        )
    }

    fn detect(&mut self, frame: &Frame, _confidence_threshold: f32) -> Result<Vec<Detection>> {
        let cut = self.brightness as u16 * 3;
        let mut count = 0usize;
        let (mut min_x, mut min_y) = (u32::MAX, u32::MAX);
        let (mut max_x, mut max_y) = (0u32, 0u32);

        for (x, y, pixel) in frame.image().enumerate_pixels() {
            let [r, g, b] = pixel.0;
            if r as u16 + g as u16 + b as u16 >= cut {
                count += 1;
                min_x = min_x.min(x);
                min_y = min_y.min(y);
                max_x = max_x.max(x);
                max_y = max_y.max(y);
            }
        }

        if count < self.min_pixels {
            return Ok(Vec::new());
        }

        let bbox = BoundingBox::new(
            min_x as f32,
            min_y as f32,
            (max_x + 1) as f32,
            (max_y + 1) as f32,
        )?;
        let confidence = count as f32 / bbox.area();
        Ok(vec![Detection::new(0, self.labels.name(0), confidence, bbox)])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn dark_frame_yields_nothing() {
        let mut backend = BrightBlobBackend::default();
        let frame = Frame::filled(32, 32, [40, 40, 40], 0.0);
        assert!(backend.detect(&frame, 0.5).unwrap().is_empty());
    }

    #[test]
    fn bright_block_is_localized_as_person() {
        let mut backend = BrightBlobBackend::default();
        let mut frame = Frame::filled(64, 48, [10, 10, 10], 0.0);
        for y in 10..30 {
            for x in 20..28 {
                frame.image_mut().put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }

        let detections = backend.detect(&frame, 0.5).unwrap();
        assert_eq!(detections.len(), 1);
        let detection = &detections[0];
        assert_eq!(detection.label, "person");
        assert_eq!(detection.confidence, 1.0);
        assert_eq!(
            detection.bbox,
            BoundingBox::new(20.0, 10.0, 28.0, 30.0).unwrap()
        );
    }

    #[test]
    fn small_specks_are_ignored() {
        let mut backend = BrightBlobBackend::default().with_min_pixels(10);
        let mut frame = Frame::filled(16, 16, [0, 0, 0], 0.0);
        frame.image_mut().put_pixel(3, 3, Rgb([255, 255, 255]));
        assert!(backend.detect(&frame, 0.5).unwrap().is_empty());
    }
}
