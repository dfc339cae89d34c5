use std::collections::VecDeque;

use anyhow::{anyhow, Result};

use crate::detect::backend::{DetectionCapability, Detector};
use crate::detect::result::Detection;
use crate::frame::Frame;

/// One scripted reply: detections, or a per-frame inference failure.
pub type ScriptedReply = std::result::Result<Vec<Detection>, String>;

/// Backend that replays a fixed sequence of replies, one per frame.
///
/// Once the script is exhausted every further frame has no detections.
/// Used for tests and for replaying recorded detection sequences.
#[derive(Default)]
pub struct ScriptedBackend {
    script: VecDeque<ScriptedReply>,
    calls: usize,
}

impl ScriptedBackend {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = ScriptedReply>,
    {
        Self {
            script: script.into_iter().collect(),
            calls: 0,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl Detector for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn supports(&self, capability: DetectionCapability) -> bool {
        matches!(
            capability,
            DetectionCapability::Classification | DetectionCapability::Localization
        )
    }

    fn detect(&mut self, _frame: &Frame, _confidence_threshold: f32) -> Result<Vec<Detection>> {
        self.calls += 1;
        match self.script.pop_front() {
            Some(Ok(detections)) => Ok(detections),
            Some(Err(reason)) => Err(anyhow!("scripted inference failure: {}", reason)),
            None => Ok(Vec::new()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::result::BoundingBox;

    #[test]
    fn replays_script_then_goes_quiet() {
        let bbox = BoundingBox::new(0.0, 0.0, 4.0, 4.0).unwrap();
        let mut backend = ScriptedBackend::new(vec![
            Ok(vec![Detection::new(0, "person", 0.9, bbox)]),
            Err("model crashed".to_string()),
        ]);
        let frame = Frame::filled(4, 4, [0, 0, 0], 0.0);

        assert_eq!(backend.detect(&frame, 0.5).unwrap().len(), 1);
        assert!(backend.detect(&frame, 0.5).is_err());
        assert!(backend.detect(&frame, 0.5).unwrap().is_empty());
        assert_eq!(backend.calls(), 3);
        assert_eq!(backend.remaining(), 0);
    }
}
