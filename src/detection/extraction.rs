use time::OffsetDateTime;

use crate::config::Config;
use crate::detection::categories::CategoryMapper;
use crate::detection::polygon::{self, PolygonProcessor};
use crate::detection::runtime::{CenterBox, RawDetection};
use crate::error::{ClassifierError, Result};
use crate::models::{BoundingBox, Detection, PerStage, Point, RipenessStage};

/// The image a batch of raw detections refers to
#[derive(Debug, Clone, Copy)]
pub struct FrameInfo {
    /// Caller's image size; detections are reported and clamped in this space
    pub width: u32,
    pub height: u32,
    /// Factors from the runtime's input coordinates to the caller's
    pub scale_x: f32,
    pub scale_y: f32,
    /// Capture time of the inference call, stamped on every detection
    pub captured_at: OffsetDateTime,
}

impl FrameInfo {
    /// Frame whose raw detections are already in caller coordinates
    pub fn new(width: u32, height: u32, captured_at: OffsetDateTime) -> Self {
        Self {
            width,
            height,
            scale_x: 1.0,
            scale_y: 1.0,
            captured_at,
        }
    }

    /// Frame for a runtime that saw the image resized to `analysed`
    pub fn rescaled(original: (u32, u32), analysed: (u32, u32), captured_at: OffsetDateTime) -> Self {
        let factor = |orig: u32, seen: u32| if seen == 0 { 1.0 } else { orig as f32 / seen as f32 };
        Self {
            width: original.0,
            height: original.1,
            scale_x: factor(original.0, analysed.0),
            scale_y: factor(original.1, analysed.1),
            captured_at,
        }
    }

    fn to_caller(&self, p: Point) -> Point {
        Point::new(p.x * self.scale_x, p.y * self.scale_y)
    }
}

/// A normalized detection that has not been scored or validated yet
#[derive(Debug, Clone)]
pub struct DetectionCandidate {
    pub category: RipenessStage,
    pub confidence: f32,
    pub polygon: Vec<Point>,
    pub bbox: BoundingBox,
    pub area: f32,
    pub centroid: Point,
    pub timestamp: OffsetDateTime,
}

impl DetectionCandidate {
    pub fn into_detection(self, quality_score: f32) -> Detection {
        Detection {
            category: self.category,
            class_name: self.category.display_name(),
            confidence: self.confidence,
            polygon: self.polygon,
            bbox: self.bbox,
            area: self.area,
            centroid: self.centroid,
            quality_score,
            timestamp: self.timestamp,
        }
    }
}

/// What became of one raw record
#[derive(Debug, Clone)]
pub enum Extraction {
    Candidate(DetectionCandidate),
    Unmapped,
    BelowThreshold {
        category: RipenessStage,
        confidence: f32,
        threshold: f32,
    },
}

/// All records of one frame, sorted by outcome
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    pub candidates: Vec<DetectionCandidate>,
    pub unmapped: usize,
    pub below_threshold: usize,
    /// Malformed records, skipped
    pub skipped: usize,
}

/// Turns raw model records into detection candidates
#[derive(Debug, Clone)]
pub struct DetectionExtractor {
    mapper: CategoryMapper,
    polygons: PolygonProcessor,
    thresholds: PerStage<f32>,
}

impl DetectionExtractor {
    pub fn new(config: &Config, mapper: CategoryMapper) -> Self {
        Self {
            mapper,
            polygons: PolygonProcessor::new(config.smoothing_epsilon),
            thresholds: PerStage::from_fn(|stage| config.effective_threshold(stage)),
        }
    }

    /// Process every record; a malformed record is logged and skipped
    pub fn extract_all(&self, raws: &[RawDetection], frame: &FrameInfo) -> ExtractionOutcome {
        let mut outcome = ExtractionOutcome::default();

        for (i, raw) in raws.iter().enumerate() {
            match self.extract(raw, frame) {
                Ok(Extraction::Candidate(candidate)) => outcome.candidates.push(candidate),
                Ok(Extraction::Unmapped) => {
                    tracing::debug!(record = i, class_id = ?raw.class_id, "unmapped class, dropped");
                    outcome.unmapped += 1;
                }
                Ok(Extraction::BelowThreshold {
                    category,
                    confidence,
                    threshold,
                }) => {
                    tracing::debug!(
                        record = i,
                        %category,
                        "confidence {:.2} below threshold {:.2}",
                        confidence,
                        threshold
                    );
                    outcome.below_threshold += 1;
                }
                Err(e) => {
                    tracing::warn!(record = i, "skipping raw detection: {}", e);
                    outcome.skipped += 1;
                }
            }
        }

        outcome
    }

    pub fn extract(&self, raw: &RawDetection, frame: &FrameInfo) -> Result<Extraction> {
        let Some(category) = self.mapper.map(&raw.class_id, raw.class_name.as_deref()) else {
            return Ok(Extraction::Unmapped);
        };

        if !(0.0..=1.0).contains(&raw.confidence) {
            return Err(malformed(format!("confidence {} outside [0, 1]", raw.confidence)));
        }
        let threshold = self.thresholds[category];
        if raw.confidence < threshold {
            return Ok(Extraction::BelowThreshold {
                category,
                confidence: raw.confidence,
                threshold,
            });
        }

        let bbox = corner_box(raw, frame)?;

        let polygon = match raw.mask.as_deref() {
            None | Some([]) => bbox.corners(),
            Some(mask) if mask.len() < 3 => {
                return Err(malformed(format!("mask has only {} points", mask.len())));
            }
            Some(mask) if !mask.iter().all(Point::is_finite) => {
                return Err(malformed("mask has non-finite points"));
            }
            Some(mask) => {
                let mask: Vec<Point> = mask.iter().map(|p| frame.to_caller(*p)).collect();
                self.polygons.smooth(&mask)
            }
        };

        let area = self.polygons.area(&polygon);
        let centroid = polygon::centroid(&polygon);

        Ok(Extraction::Candidate(DetectionCandidate {
            category,
            confidence: raw.confidence,
            polygon,
            bbox,
            area,
            centroid,
            timestamp: frame.captured_at,
        }))
    }
}

/// Center-form box to corner form in caller coordinates, clamped to the image
fn corner_box(raw: &RawDetection, frame: &FrameInfo) -> Result<BoundingBox> {
    let b = raw.bbox;
    if ![b.cx, b.cy, b.w, b.h].iter().all(|v| v.is_finite()) {
        return Err(malformed("box has non-finite coordinates"));
    }
    if b.w <= 0.0 || b.h <= 0.0 {
        return Err(malformed(format!("box has non-positive size {}x{}", b.w, b.h)));
    }
    let b = CenterBox {
        cx: b.cx * frame.scale_x,
        cy: b.cy * frame.scale_y,
        w: b.w * frame.scale_x,
        h: b.h * frame.scale_y,
    };

    let (max_x, max_y) = (frame.width as f32, frame.height as f32);
    let x1 = (b.cx - b.w / 2.0).clamp(0.0, max_x);
    let y1 = (b.cy - b.h / 2.0).clamp(0.0, max_y);
    let x2 = (b.cx + b.w / 2.0).clamp(0.0, max_x);
    let y2 = (b.cy + b.h / 2.0).clamp(0.0, max_y);
    if x2 <= x1 || y2 <= y1 {
        return Err(malformed("box lies outside the image"));
    }

    Ok(BoundingBox {
        x: x1,
        y: y1,
        width: x2 - x1,
        height: y2 - y1,
    })
}

fn malformed(message: impl Into<String>) -> ClassifierError {
    ClassifierError::PerDetection(message.into())
}
