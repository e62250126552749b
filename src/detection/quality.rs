use crate::config::Config;
use crate::detection::extraction::DetectionCandidate;
use crate::models::PerStage;

/// Area (px²) at which the area sub-score saturates
pub const REFERENCE_AREA: f32 = 10_000.0;
/// Vertex count at which the polygon-richness sub-score saturates
pub const REFERENCE_VERTICES: f32 = 8.0;

/// Accept/reject decision with the reasons for a rejection
#[derive(Debug, Clone, PartialEq)]
pub struct Validation {
    pub accepted: bool,
    pub reasons: Vec<String>,
}

/// Scores detection candidates and filters out implausible ones
#[derive(Debug, Clone)]
pub struct QualityValidator {
    thresholds: PerStage<f32>,
    min_polygon_area: f32,
    max_aspect_ratio: f32,
}

impl QualityValidator {
    pub fn new(config: &Config) -> Self {
        Self {
            thresholds: PerStage::from_fn(|stage| config.effective_threshold(stage)),
            min_polygon_area: config.min_polygon_area,
            max_aspect_ratio: config.max_aspect_ratio,
        }
    }

    /// Mean of the confidence, area and vertex-richness sub-scores, each clipped to [0, 1]
    pub fn score(&self, candidate: &DetectionCandidate) -> f32 {
        let confidence = candidate.confidence.clamp(0.0, 1.0);
        let area = (candidate.area / REFERENCE_AREA).clamp(0.0, 1.0);
        let vertices = (candidate.polygon.len() as f32 / REFERENCE_VERTICES).clamp(0.0, 1.0);
        (confidence + area + vertices) / 3.0
    }

    pub fn validate(&self, candidate: &DetectionCandidate) -> Validation {
        let mut reasons = Vec::new();

        let threshold = self.thresholds[candidate.category];
        if candidate.confidence < threshold {
            reasons.push(format!(
                "Low confidence: {:.2} < {:.2}",
                candidate.confidence, threshold
            ));
        }

        if candidate.polygon.len() < 3 {
            reasons.push("Invalid polygon: Less than 3 vertices".to_string());
        }

        if candidate.area < self.min_polygon_area {
            reasons.push(format!(
                "Small detection area: {:.1} < {:.1}",
                candidate.area, self.min_polygon_area
            ));
        }

        let aspect_ratio = candidate.bbox.aspect_ratio();
        if aspect_ratio > self.max_aspect_ratio {
            reasons.push(format!(
                "Extreme aspect ratio: {:.2} > {:.2}",
                aspect_ratio, self.max_aspect_ratio
            ));
        }

        Validation {
            accepted: reasons.is_empty(),
            reasons,
        }
    }
}
