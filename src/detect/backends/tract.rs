#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::imageops::{self, FilterType};
use tract_onnx::prelude::*;

use crate::detect::backend::{DetectionCapability, Detector, ExecutionDevice};
use crate::detect::labels::LabelVocabulary;
use crate::detect::result::{non_max_suppression, BoundingBox, Detection};
use crate::frame::Frame;

/// Candidates below this are never decoded, whatever threshold is asked for.
const DEFAULT_CONFIDENCE_FLOOR: f32 = 0.25;
const DEFAULT_IOU_THRESHOLD: f32 = 0.45;
const MAX_DETECTIONS: usize = 300;

/// Tract-based backend for YOLOv8-style ONNX detectors.
///
/// The model takes a `[1, 3, S, S]` float RGB tensor scaled to `[0, 1]` and
/// returns `[1, 4 + C, N]` (or the transposed `[1, N, 4 + C]`): a centre/size
/// box followed by one score per class for each of `N` candidates.
/// Execution is CPU-only.
pub struct TractBackend {
    model: TypedRunnableModel<TypedModel>,
    input_size: u32,
    labels: LabelVocabulary,
    confidence_floor: f32,
    iou_threshold: f32,
}

impl TractBackend {
    /// Load an ONNX model from disk and prepare it for inference.
    pub fn new<P: AsRef<Path>>(
        model_path: P,
        input_size: u32,
        labels: LabelVocabulary,
        device: ExecutionDevice,
    ) -> Result<Self> {
        let model_path = model_path.as_ref();
        match device {
            ExecutionDevice::Accelerated => log::warn!(
                "TractBackend: accelerated execution unavailable, running {} on CPU",
                model_path.display()
            ),
            ExecutionDevice::Auto | ExecutionDevice::Cpu => {
                log::info!("TractBackend: using CPU for detection")
            }
        }

        let size = input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(model_path)
            .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
            .with_input_fact(
                0,
                InferenceFact::dt_shape(f32::datum_type(), tvec!(1, 3, size, size)),
            )
            .context("failed to set input fact")?
            .into_optimized()
            .context("failed to optimize ONNX model")?
            .into_runnable()
            .context("failed to build runnable ONNX model")?;

        Ok(Self {
            model,
            input_size,
            labels,
            confidence_floor: DEFAULT_CONFIDENCE_FLOOR,
            iou_threshold: DEFAULT_IOU_THRESHOLD,
        })
    }

    fn build_input(&self, frame: &Frame) -> Tensor {
        let size = self.input_size;
        let resized = imageops::resize(frame.image(), size, size, FilterType::Triangle);
        let size = size as usize;
        tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, channel, y, x)| {
            resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0
        })
        .into_tensor()
    }

    fn decode(&self, outputs: TVec<TValue>, frame: &Frame, floor: f32) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 {
            return Err(anyhow!("unexpected detector output shape {:?}", shape));
        }

        // YOLOv8 exports features-first; some exports transpose.
        let features_first = shape[1] < shape[2];
        let (features, candidates) = if features_first {
            (shape[1], shape[2])
        } else {
            (shape[2], shape[1])
        };
        if features < 5 {
            return Err(anyhow!(
                "detector output requires at least 5 features (box + one class), got {}",
                features
            ));
        }
        let at = |feature: usize, candidate: usize| -> f32 {
            if features_first {
                view[[0, feature, candidate]]
            } else {
                view[[0, candidate, feature]]
            }
        };

        let scale_x = frame.width() as f32 / self.input_size as f32;
        let scale_y = frame.height() as f32 / self.input_size as f32;

        let mut found = Vec::new();
        for n in 0..candidates {
            let (class_id, score) = (4..features)
                .map(|f| (f - 4, at(f, n)))
                .fold((0usize, f32::NEG_INFINITY), |best, next| {
                    if next.1 > best.1 {
                        next
                    } else {
                        best
                    }
                });
            if score.is_nan() || score < floor {
                continue;
            }

            let bbox = BoundingBox::from_center(
                at(0, n) * scale_x,
                at(1, n) * scale_y,
                at(2, n) * scale_x,
                at(3, n) * scale_y,
            )
            .and_then(|bbox| bbox.clamp_to(frame.width(), frame.height()));
            let Ok(bbox) = bbox else {
                continue;
            };
            found.push(Detection::new(
                class_id,
                self.labels.name(class_id),
                score,
                bbox,
            ));
        }

        let mut kept = non_max_suppression(found, self.iou_threshold);
        kept.truncate(MAX_DETECTIONS);
        Ok(kept)
    }
}

impl Detector for TractBackend {
    fn name(&self) -> &'static str {
        "tract"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::Classification | DetectionCapability::Localization
        )
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>> {
        let input = self.build_input(frame);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let floor = confidence_threshold.min(self.confidence_floor);
        self.decode(outputs, frame, floor)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = Frame::filled(self.input_size, self.input_size, [114, 114, 114], 0.0);
        self.detect(&blank, 1.0).map(|_| ())
    }
}
