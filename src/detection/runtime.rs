use anyhow::Context;
use image::RgbImage;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::models::Point;

/// Model class id -> human-readable class name
pub type ClassNames = HashMap<u32, String>;

/// Class identifier as emitted by a model: an ordinal or a label
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClassId {
    Index(u32),
    Name(String),
}

impl From<u32> for ClassId {
    fn from(id: u32) -> Self {
        ClassId::Index(id)
    }
}

impl From<&str> for ClassId {
    fn from(name: &str) -> Self {
        ClassId::Name(name.to_string())
    }
}

/// Box in center form, image pixel units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CenterBox {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

/// One raw detection as any model runtime binding must report it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawDetection {
    pub class_id: ClassId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    pub confidence: f32,
    pub bbox: CenterBox,
    /// Segmentation outline in image pixel coordinates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mask: Option<Vec<Point>>,
}

impl RawDetection {
    pub fn new(class_id: impl Into<ClassId>, confidence: f32, bbox: CenterBox) -> Self {
        Self {
            class_id: class_id.into(),
            class_name: None,
            confidence,
            bbox,
            mask: None,
        }
    }

    pub fn with_class_name(mut self, name: impl Into<String>) -> Self {
        self.class_name = Some(name.into());
        self
    }

    pub fn with_mask(mut self, mask: Vec<Point>) -> Self {
        self.mask = Some(mask);
        self
    }
}

/// Thresholds forwarded to the runtime's own filtering / NMS
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InferenceParams {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
}

/// A loaded model. Inference takes `&mut self`: handles are not reentrant,
/// callers sharing one must serialize access.
pub trait ModelRuntime: Send {
    /// The model's own id -> name table, if it has one
    fn class_names(&self) -> Option<ClassNames> {
        None
    }

    fn infer(&mut self, image: &RgbImage, params: &InferenceParams) -> anyhow::Result<Vec<RawDetection>>;

    /// One result set per input image, in input order
    fn infer_batch(
        &mut self,
        images: &[RgbImage],
        params: &InferenceParams,
    ) -> Vec<anyhow::Result<Vec<RawDetection>>> {
        images.iter().map(|image| self.infer(image, params)).collect()
    }
}

/// Builds a runtime from a verified weights file
pub trait ModelLoader {
    fn load(&self, weights: &Path) -> anyhow::Result<Box<dyn ModelRuntime>>;
}

impl<F> ModelLoader for F
where
    F: Fn(&Path) -> anyhow::Result<Box<dyn ModelRuntime>>,
{
    fn load(&self, weights: &Path) -> anyhow::Result<Box<dyn ModelRuntime>> {
        self(weights)
    }
}

/// Raw detections recorded from an external inference service
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Recording {
    #[serde(default)]
    pub class_names: Option<ClassNames>,
    /// One detection list per inference call, replayed in order
    #[serde(default)]
    pub frames: Vec<Vec<RawDetection>>,
}

/// Runtime that replays a `Recording`, cycling through its frames
#[derive(Debug, Clone)]
pub struct RecordedRuntime {
    recording: Recording,
    cursor: usize,
}

impl RecordedRuntime {
    pub fn new(recording: Recording) -> Self {
        Self {
            recording,
            cursor: 0,
        }
    }
}

impl ModelRuntime for RecordedRuntime {
    fn class_names(&self) -> Option<ClassNames> {
        self.recording.class_names.clone()
    }

    fn infer(&mut self, _image: &RgbImage, _params: &InferenceParams) -> anyhow::Result<Vec<RawDetection>> {
        if self.recording.frames.is_empty() {
            return Ok(Vec::new());
        }
        let frame = self.recording.frames[self.cursor % self.recording.frames.len()].clone();
        self.cursor += 1;
        Ok(frame)
    }
}

/// Loads a JSON `Recording` from the weights path
pub struct RecordedLoader;

impl ModelLoader for RecordedLoader {
    fn load(&self, weights: &Path) -> anyhow::Result<Box<dyn ModelRuntime>> {
        let raw = std::fs::read_to_string(weights)
            .with_context(|| format!("failed to read recording {}", weights.display()))?;
        let recording: Recording = serde_json::from_str(&raw)
            .with_context(|| format!("invalid recording {}", weights.display()))?;
        Ok(Box::new(RecordedRuntime::new(recording)))
    }
}
