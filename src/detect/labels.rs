use std::path::Path;

use anyhow::{anyhow, Context, Result};

/// The 80 COCO class names, in model output order.
pub const COCO_LABELS: [&str; 80] = [
    "person",
    "bicycle",
    "car",
    "motorcycle",
    "airplane",
    "bus",
    "train",
    "truck",
    "boat",
    "traffic light",
    "fire hydrant",
    "stop sign",
    "parking meter",
    "bench",
    "bird",
    "cat",
    "dog",
    "horse",
    "sheep",
    "cow",
    "elephant",
    "bear",
    "zebra",
    "giraffe",
    "backpack",
    "umbrella",
    "handbag",
    "tie",
    "suitcase",
    "frisbee",
    "skis",
    "snowboard",
    "sports ball",
    "kite",
    "baseball bat",
    "baseball glove",
    "skateboard",
    "surfboard",
    "tennis racket",
    "bottle",
    "wine glass",
    "cup",
    "fork",
    "knife",
    "spoon",
    "bowl",
    "banana",
    "apple",
    "sandwich",
    "orange",
    "broccoli",
    "carrot",
    "hot dog",
    "pizza",
    "donut",
    "cake",
    "chair",
    "couch",
    "potted plant",
    "bed",
    "dining table",
    "toilet",
    "tv",
    "laptop",
    "mouse",
    "remote",
    "keyboard",
    "cell phone",
    "microwave",
    "oven",
    "toaster",
    "sink",
    "refrigerator",
    "book",
    "clock",
    "vase",
    "scissors",
    "teddy bear",
    "hair drier",
    "toothbrush",
];

/// Class id → name mapping exposed by a detection model.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LabelVocabulary {
    names: Vec<String>,
}

impl LabelVocabulary {
    pub fn coco() -> Self {
        Self {
            names: COCO_LABELS.iter().map(|name| name.to_string()).collect(),
        }
    }

    pub fn from_names<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(anyhow!("label vocabulary must not be empty"));
        }
        Ok(Self { names })
    }

    /// One class name per line; blank lines and `#` comments are skipped.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read labels file {}", path.display()))?;
        Self::from_names(
            raw.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#')),
        )
        .with_context(|| format!("invalid labels file {}", path.display()))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Name for a class id. Ids outside the vocabulary render as `class<N>`.
    pub fn name(&self, class_id: usize) -> String {
        self.names
            .get(class_id)
            .cloned()
            .unwrap_or_else(|| format!("class{}", class_id))
    }

    pub fn id_of(&self, name: &str) -> Option<usize> {
        self.names.iter().position(|candidate| candidate == name)
    }
}

impl Default for LabelVocabulary {
    fn default() -> Self {
        Self::coco()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn coco_vocabulary_starts_with_person() {
        let labels = LabelVocabulary::coco();
        assert_eq!(labels.len(), 80);
        assert_eq!(labels.name(0), "person");
        assert_eq!(labels.name(16), "dog");
        assert_eq!(labels.id_of("person"), Some(0));
    }

    #[test]
    fn unknown_ids_render_as_class_numbers() {
        let labels = LabelVocabulary::coco();
        assert_eq!(labels.name(512), "class512");
    }

    #[test]
    fn loads_labels_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "# custom model").unwrap();
        writeln!(file, "intruder").unwrap();
        writeln!(file).unwrap();
        writeln!(file, " cat ").unwrap();

        let labels = LabelVocabulary::load(file.path()).unwrap();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels.name(0), "intruder");
        assert_eq!(labels.name(1), "cat");
    }

    #[test]
    fn empty_labels_file_is_rejected() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(LabelVocabulary::load(file.path()).is_err());
    }
}
