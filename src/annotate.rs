//! Detection overlays.
//!
//! Draws a rectangle and a `LABEL 0.87` tag for every detection handed in.
//! Only the frame's pixel buffer is touched. Text uses a built-in 5x7
//! bitmap font rendered upper-case.

use image::{Rgb, RgbImage};

use crate::detect::Detection;
use crate::frame::Frame;

pub const TARGET_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
pub const OTHER_COLOR: Rgb<u8> = Rgb([255, 191, 0]);
const LABEL_BACKGROUND: Rgb<u8> = Rgb([0, 0, 0]);
const STATUS_COLOR: Rgb<u8> = Rgb([255, 255, 255]);

const GLYPH_WIDTH: i32 = 5;
const GLYPH_HEIGHT: i32 = 7;
const GLYPH_ADVANCE: i32 = 6;
/// Gap between the tag baseline and the box top, as in the classic overlay.
const LABEL_OFFSET: i32 = 10;

#[derive(Clone, Debug)]
pub struct Annotator {
    target_label: String,
    thickness: i32,
}

impl Annotator {
    pub fn new(target_label: impl Into<String>) -> Self {
        Self {
            target_label: target_label.into(),
            thickness: 2,
        }
    }

    pub fn with_thickness(mut self, thickness: u32) -> Self {
        self.thickness = thickness.max(1) as i32;
        self
    }

    /// Overlay every detection onto the frame.
    pub fn annotate(&self, frame: &mut Frame, detections: &[Detection]) {
        let image = frame.image_mut();
        for detection in detections {
            let color = if detection.label == self.target_label {
                TARGET_COLOR
            } else {
                OTHER_COLOR
            };
            let (x1, y1, x2, y2) = detection.bbox.pixel_corners();
            for inset in 0..self.thickness {
                draw_rectangle(image, x1 + inset, y1 + inset, x2 - inset, y2 - inset, color);
            }

            let text = format!("{} {:.2}", detection.label, detection.confidence);
            let label_y = if y1 - LABEL_OFFSET >= 0 {
                y1 - LABEL_OFFSET
            } else {
                y1 + self.thickness + 1
            };
            let text_width = text_width(&text);
            fill_rect(
                image,
                x1,
                label_y - 1,
                x1 + text_width,
                label_y + GLYPH_HEIGHT,
                LABEL_BACKGROUND,
            );
            draw_text(image, x1 + 1, label_y, &text, color);
        }
    }

    /// Status line in the bottom-left corner, e.g. frame counters.
    pub fn status(&self, frame: &mut Frame, text: &str) {
        let image = frame.image_mut();
        let y = image.height() as i32 - GLYPH_HEIGHT - 3;
        fill_rect(image, 0, y - 1, text_width(text) + 2, y + GLYPH_HEIGHT, LABEL_BACKGROUND);
        draw_text(image, 2, y, text, STATUS_COLOR);
    }
}

fn text_width(text: &str) -> i32 {
    text.chars().count() as i32 * GLYPH_ADVANCE
}

fn put(image: &mut RgbImage, x: i32, y: i32, color: Rgb<u8>) {
    if x >= 0 && y >= 0 && (x as u32) < image.width() && (y as u32) < image.height() {
        image.put_pixel(x as u32, y as u32, color);
    }
}

fn draw_rectangle(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    if left > right || top > bottom {
        return;
    }
    for x in left..=right {
        put(image, x, top, color);
        put(image, x, bottom, color);
    }
    for y in top..=bottom {
        put(image, left, y, color);
        put(image, right, y, color);
    }
}

fn fill_rect(image: &mut RgbImage, left: i32, top: i32, right: i32, bottom: i32, color: Rgb<u8>) {
    let width = image.width() as i32;
    let height = image.height() as i32;
    let (left, right) = (left.max(0), right.min(width - 1));
    let (top, bottom) = (top.max(0), bottom.min(height - 1));
    for y in top..=bottom {
        for x in left..=right {
            image.put_pixel(x as u32, y as u32, color);
        }
    }
}

fn draw_text(image: &mut RgbImage, mut x: i32, y: i32, text: &str, color: Rgb<u8>) {
    for ch in text.chars().flat_map(char::to_uppercase) {
        if let Some(glyph) = glyph_bits(ch) {
            for (row, pattern) in glyph.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (pattern >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        put(image, x + col, y + row as i32, color);
                    }
                }
            }
        }
        x += GLYPH_ADVANCE;
    }
}

fn glyph_bits(ch: char) -> Option<[u8; 7]> {
    let rows = match ch {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'B' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10001, 0b10001, 0b11110],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'F' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b10000],
        'G' => [0b01110, 0b10001, 0b10000, 0b10111, 0b10001, 0b10001, 0b01111],
        'H' => [0b10001, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'J' => [0b00111, 0b00010, 0b00010, 0b00010, 0b00010, 0b10010, 0b01100],
        'K' => [0b10001, 0b10010, 0b10100, 0b11000, 0b10100, 0b10010, 0b10001],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'M' => [0b10001, 0b11011, 0b10101, 0b10101, 0b10001, 0b10001, 0b10001],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'Q' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10101, 0b10010, 0b01101],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'U' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'X' => [0b10001, 0b10001, 0b01010, 0b00100, 0b01010, 0b10001, 0b10001],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        'Z' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b10000, 0b11111],
        '0' => [0b01110, 0b10001, 0b10011, 0b10101, 0b11001, 0b10001, 0b01110],
        '1' => [0b00100, 0b01100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        '2' => [0b01110, 0b10001, 0b00001, 0b00010, 0b00100, 0b01000, 0b11111],
        '3' => [0b11110, 0b00001, 0b00001, 0b01110, 0b00001, 0b00001, 0b11110],
        '4' => [0b00010, 0b00110, 0b01010, 0b10010, 0b11111, 0b00010, 0b00010],
        '5' => [0b11111, 0b10000, 0b11110, 0b00001, 0b00001, 0b10001, 0b01110],
        '6' => [0b00110, 0b01000, 0b10000, 0b11110, 0b10001, 0b10001, 0b01110],
        '7' => [0b11111, 0b00001, 0b00010, 0b00100, 0b01000, 0b01000, 0b01000],
        '8' => [0b01110, 0b10001, 0b10001, 0b01110, 0b10001, 0b10001, 0b01110],
        '9' => [0b01110, 0b10001, 0b10001, 0b01111, 0b00001, 0b00010, 0b01100],
        '%' => [0b10001, 0b10010, 0b00100, 0b01000, 0b10010, 0b10001, 0b00000],
        '-' => [0, 0, 0, 0b11111, 0, 0, 0],
        ':' => [0, 0b01100, 0b01100, 0, 0b01100, 0b01100, 0],
        ',' => [0, 0, 0, 0, 0b01100, 0b00100, 0b01000],
        '(' => [0b00010, 0b00100, 0b01000, 0b01000, 0b01000, 0b00100, 0b00010],
        ')' => [0b01000, 0b00100, 0b00010, 0b00010, 0b00010, 0b00100, 0b01000],
        '.' => [0, 0, 0, 0, 0, 0b00110, 0b00110],
        ' ' => [0; 7],
        _ => return None,
    };
    Some(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn person(x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection::new(0, "person", 0.9, BoundingBox::new(x1, y1, x2, y2).unwrap())
    }

    #[test]
    fn no_detections_leaves_frame_untouched() {
        let mut frame = Frame::filled(40, 30, [7, 7, 7], 0.0);
        let before = frame.pixels().to_vec();
        Annotator::new("person").annotate(&mut frame, &[]);
        assert_eq!(frame.pixels(), before.as_slice());
    }

    #[test]
    fn box_outline_uses_target_color() {
        let mut frame = Frame::filled(100, 100, [7, 7, 7], 0.0);
        Annotator::new("person").annotate(&mut frame, &[person(20.0, 30.0, 60.0, 90.0)]);
        assert_eq!(*frame.image().get_pixel(40, 90), TARGET_COLOR);
        assert_eq!(*frame.image().get_pixel(20, 60), TARGET_COLOR);
        // Interior is untouched.
        assert_eq!(*frame.image().get_pixel(40, 60), Rgb([7, 7, 7]));
    }

    #[test]
    fn other_labels_use_other_color() {
        let mut frame = Frame::filled(100, 100, [7, 7, 7], 0.0);
        let dog = Detection::new(16, "dog", 0.95, BoundingBox::new(20.0, 30.0, 60.0, 90.0).unwrap());
        Annotator::new("person").annotate(&mut frame, &[dog]);
        assert_eq!(*frame.image().get_pixel(40, 90), OTHER_COLOR);
    }

    #[test]
    fn label_is_drawn_above_box() {
        let mut frame = Frame::filled(100, 100, [7, 7, 7], 0.0);
        Annotator::new("person").annotate(&mut frame, &[person(20.0, 40.0, 80.0, 90.0)]);
        let tag_rows = 30..37u32;
        let tagged = tag_rows
            .flat_map(|y| (21..80u32).map(move |x| (x, y)))
            .any(|(x, y)| *frame.image().get_pixel(x, y) == TARGET_COLOR);
        assert!(tagged);
    }

    #[test]
    fn boxes_touching_edges_do_not_panic() {
        let mut frame = Frame::filled(20, 20, [0, 0, 0], 0.0);
        Annotator::new("person")
            .with_thickness(3)
            .annotate(&mut frame, &[person(0.0, 0.0, 20.0, 20.0)]);
        Annotator::new("person").status(&mut frame, "frame 12");
    }

    #[test]
    fn every_digit_has_a_glyph() {
        for ch in "0123456789.:- PERSONDOG".chars() {
            assert!(glyph_bits(ch).is_some(), "missing glyph {:?}", ch);
        }
    }
}
