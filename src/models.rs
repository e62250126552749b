use serde::{Deserialize, Serialize, Serializer, ser::SerializeMap};
use std::fmt;
use std::ops::{Index, IndexMut};
use time::OffsetDateTime;
use uuid::Uuid;

/// The four fixed ripeness stages a detected fruit can be assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RipenessStage {
    NotMature,
    Mature,
    Ripe,
    OverRipe,
}

impl RipenessStage {
    /// All stages in positional order (also the order of model class ids 0..=3)
    pub const ALL: [RipenessStage; 4] = [
        RipenessStage::NotMature,
        RipenessStage::Mature,
        RipenessStage::Ripe,
        RipenessStage::OverRipe,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Human-readable name, as used by the model's class table
    pub fn display_name(self) -> &'static str {
        match self {
            RipenessStage::NotMature => "Not Mature",
            RipenessStage::Mature => "Mature",
            RipenessStage::Ripe => "Ripe",
            RipenessStage::OverRipe => "Over Ripe",
        }
    }

    /// Stable snake_case key used in serialized distributions
    pub fn key(self) -> &'static str {
        match self {
            RipenessStage::NotMature => "not_mature",
            RipenessStage::Mature => "mature",
            RipenessStage::Ripe => "ripe",
            RipenessStage::OverRipe => "over_ripe",
        }
    }

    /// Tie-break priority for the dominant stage: riper stages win ties.
    pub fn priority(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for RipenessStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// One value per ripeness stage. Always holds exactly four entries.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PerStage<T>([T; 4]);

impl<T> PerStage<T> {
    pub fn from_fn(f: impl FnMut(RipenessStage) -> T) -> Self {
        Self(RipenessStage::ALL.map(f))
    }

    pub fn iter(&self) -> impl Iterator<Item = (RipenessStage, &T)> {
        RipenessStage::ALL.into_iter().zip(self.0.iter())
    }

    pub fn values(&self) -> &[T; 4] {
        &self.0
    }
}

impl<T> Index<RipenessStage> for PerStage<T> {
    type Output = T;

    fn index(&self, stage: RipenessStage) -> &T {
        &self.0[stage.index()]
    }
}

impl<T> IndexMut<RipenessStage> for PerStage<T> {
    fn index_mut(&mut self, stage: RipenessStage) -> &mut T {
        &mut self.0[stage.index()]
    }
}

impl<T: Serialize> Serialize for PerStage<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        for (stage, value) in self.iter() {
            map.serialize_entry(stage.key(), value)?;
        }
        map.end()
    }
}

/// 2-D point in image pixel coordinates. Serialized as `[x, y]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "(f32, f32)", into = "(f32, f32)")]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<(f32, f32)> for Point {
    fn from((x, y): (f32, f32)) -> Self {
        Self { x, y }
    }
}

impl From<Point> for (f32, f32) {
    fn from(p: Point) -> Self {
        (p.x, p.y)
    }
}

/// Axis-aligned bounding box in corner form (top-left + size)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl BoundingBox {
    pub fn x2(&self) -> f32 {
        self.x + self.width
    }

    pub fn y2(&self) -> f32 {
        self.y + self.height
    }

    /// width / height, or 0 for a flat box
    pub fn aspect_ratio(&self) -> f32 {
        if self.height > 0.0 {
            self.width / self.height
        } else {
            0.0
        }
    }

    /// Corners in clockwise order starting at the top-left
    pub fn corners(&self) -> Vec<Point> {
        vec![
            Point::new(self.x, self.y),
            Point::new(self.x2(), self.y),
            Point::new(self.x2(), self.y2()),
            Point::new(self.x, self.y2()),
        ]
    }
}

/// A validated ripeness detection. Built once per accepted raw detection.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub category: RipenessStage,
    /// Display name of `category`
    pub class_name: &'static str,
    pub confidence: f32,
    pub polygon: Vec<Point>,
    pub bbox: BoundingBox,
    pub area: f32,
    pub centroid: Point,
    pub quality_score: f32,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct QualityMetrics {
    pub total_detections: usize,
    pub avg_confidence: f32,
    pub avg_quality_score: f32,
    /// Accepted detections per megapixel of the analysed image
    pub detection_density: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisMetadata {
    pub analysis_id: Uuid,
    /// Size of the image the model saw (after preprocessing)
    pub image_width: u32,
    pub image_height: u32,
    /// Size of the image as supplied by the caller
    pub original_width: u32,
    pub original_height: u32,
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    pub ripeness_distribution: PerStage<usize>,
    pub dominant_ripeness: Option<RipenessStage>,
    pub consistency_warnings: Vec<String>,
    /// Candidates dropped for low confidence or failed quality checks
    pub rejected_detections: usize,
    /// Raw records whose class is not a ripeness stage
    pub unmapped_records: usize,
    /// Raw records skipped as malformed
    pub skipped_records: usize,
}

impl AnalysisMetadata {
    pub fn empty() -> Self {
        Self {
            analysis_id: Uuid::new_v4(),
            image_width: 0,
            image_height: 0,
            original_width: 0,
            original_height: 0,
            confidence_threshold: 0.0,
            iou_threshold: 0.0,
            ripeness_distribution: PerStage::default(),
            dominant_ripeness: None,
            consistency_warnings: Vec::new(),
            rejected_detections: 0,
            unmapped_records: 0,
            skipped_records: 0,
        }
    }
}

/// Outcome of classifying one image
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisResult {
    pub success: bool,
    pub detections: Vec<Detection>,
    /// Seconds
    pub processing_time: f64,
    pub model_version: String,
    pub quality_metrics: QualityMetrics,
    pub metadata: AnalysisMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl AnalysisResult {
    /// An empty, unsuccessful result carrying the failure reason
    pub fn failed(
        message: impl Into<String>,
        processing_time: f64,
        model_version: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            detections: Vec::new(),
            processing_time,
            model_version: model_version.into(),
            quality_metrics: QualityMetrics::default(),
            metadata: AnalysisMetadata::empty(),
            error_message: Some(message.into()),
        }
    }

    /// Flat per-detection format kept for older consumers
    pub fn to_legacy(&self) -> Vec<LegacyDetection> {
        self.detections
            .iter()
            .map(|d| LegacyDetection {
                bbox: [d.bbox.x, d.bbox.y, d.bbox.x2(), d.bbox.y2()],
                ripeness: d.category.display_name(),
                confidence: d.confidence,
                polygon: d.polygon.clone(),
                area: d.area,
                quality_score: d.quality_score,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LegacyDetection {
    /// x1, y1, x2, y2
    pub bbox: [f32; 4],
    pub ripeness: &'static str,
    pub confidence: f32,
    pub polygon: Vec<Point>,
    pub area: f32,
    pub quality_score: f32,
}
