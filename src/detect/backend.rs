use anyhow::Result;
use serde::Deserialize;

use crate::detect::result::Detection;
use crate::frame::Frame;

/// Detection capabilities a backend may offer.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DetectionCapability {
    /// Assigns class labels with confidences.
    Classification,
    /// Produces bounding boxes in frame pixel space.
    Localization,
}

/// Where inference runs. Chosen once at initialization; it affects latency
/// only, never the detections produced.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionDevice {
    /// Accelerated when the backend can, general-purpose otherwise.
    #[default]
    Auto,
    Cpu,
    Accelerated,
}

impl std::str::FromStr for ExecutionDevice {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "cpu" => Ok(Self::Cpu),
            "accelerated" | "gpu" | "cuda" => Ok(Self::Accelerated),
            other => Err(anyhow::anyhow!("unknown execution device '{}'", other)),
        }
    }
}

/// Object detector contract.
///
/// Implementations return every detection they produce, each with its own
/// confidence. `confidence_threshold` is advisory: a backend may use it to
/// bound candidate extraction but must not drop a detection whose
/// confidence is at or above it. Target-label gating is the caller's job.
pub trait Detector {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Returns true when the backend supports a capability.
    fn supports(&self, capability: DetectionCapability) -> bool;

    /// Run detection on one frame. Coordinates are in the frame's pixel space.
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<Vec<Detection>>;

    /// Optional warm-up hook, run once before the first frame.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
