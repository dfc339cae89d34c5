//! Object detection.
//!
//! The model is an external collaborator reached through the `Detector`
//! trait. Backends return every detection with its confidence; the
//! target-label and threshold gate lives in the monitor loop so that a
//! detector stays reusable for any class.

mod backend;
mod backends;
mod labels;
mod result;

use anyhow::{anyhow, Result};

use crate::config::{BackendKind, ModelSettings};

pub use backend::{DetectionCapability, Detector, ExecutionDevice};
pub use backends::{BrightBlobBackend, ScriptedBackend, ScriptedReply};
#[cfg(feature = "backend-tract")]
pub use backends::TractBackend;
pub use labels::{LabelVocabulary, COCO_LABELS};
pub use result::{non_max_suppression, BoundingBox, Detection};

/// Load the configured detector. Any failure here is fatal at startup.
pub fn load_detector(settings: &ModelSettings) -> Result<Box<dyn Detector>> {
    let labels = match &settings.labels_path {
        Some(path) => LabelVocabulary::load(path)?,
        None => LabelVocabulary::coco(),
    };

    let mut detector: Box<dyn Detector> = match settings.backend {
        BackendKind::Stub => Box::new(BrightBlobBackend::new(labels)),
        BackendKind::Tract => load_tract(settings, labels)?,
    };

    for capability in [
        DetectionCapability::Classification,
        DetectionCapability::Localization,
    ] {
        if !detector.supports(capability) {
            return Err(anyhow!(
                "detector backend {} does not support {:?}",
                detector.name(),
                capability
            ));
        }
    }

    detector.warm_up()?;
    log::info!(
        "model '{}' loaded successfully (backend={}, device={:?})",
        settings.identifier,
        detector.name(),
        settings.device
    );
    Ok(detector)
}

#[cfg(feature = "backend-tract")]
fn load_tract(settings: &ModelSettings, labels: LabelVocabulary) -> Result<Box<dyn Detector>> {
    Ok(Box::new(TractBackend::new(
        &settings.identifier,
        settings.input_size,
        labels,
        settings.device,
    )?))
}

#[cfg(not(feature = "backend-tract"))]
fn load_tract(settings: &ModelSettings, _labels: LabelVocabulary) -> Result<Box<dyn Detector>> {
    Err(anyhow!(
        "model '{}' requires the backend-tract feature",
        settings.identifier
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SentryConfig;

    #[test]
    fn stub_backend_loads_without_model_file() {
        let mut settings = SentryConfig::default().model;
        settings.backend = BackendKind::Stub;
        settings.identifier = "does-not-exist.onnx".to_string();
        let detector = load_detector(&settings).unwrap();
        assert_eq!(detector.name(), "stub");
    }

    #[test]
    fn missing_labels_file_is_fatal() {
        let mut settings = SentryConfig::default().model;
        settings.backend = BackendKind::Stub;
        settings.labels_path = Some("/nonexistent/labels.txt".into());
        assert!(load_detector(&settings).is_err());
    }

    #[test]
    fn missing_model_file_is_fatal() {
        let mut settings = SentryConfig::default().model;
        settings.backend = BackendKind::Tract;
        settings.identifier = "/nonexistent/yolov8n.onnx".to_string();
        assert!(load_detector(&settings).is_err());
    }
}
