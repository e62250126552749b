use rayon::prelude::*;
use serde::Serialize;

use crate::detection::polygon::raster_iou;
use crate::models::{Detection, Point, RipenessStage};

/// Overlap above which two differently-classified detections are flagged
pub const CONSISTENCY_IOU_THRESHOLD: f32 = 0.3;

/// Two detections that probably cover the same fruit but disagree on ripeness
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OverlapWarning {
    pub first: usize,
    pub second: usize,
    pub iou: f32,
    pub first_category: RipenessStage,
    pub second_category: RipenessStage,
}

impl OverlapWarning {
    pub fn message(&self) -> String {
        format!(
            "Detections {} ({}) and {} ({}) overlap with IoU {:.2}: possible duplicate of one fruit",
            self.first, self.first_category, self.second, self.second_category, self.iou
        )
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsistencyReport {
    pub warnings: Vec<OverlapWarning>,
}

impl ConsistencyReport {
    pub fn is_consistent(&self) -> bool {
        self.warnings.is_empty()
    }

    pub fn messages(&self) -> Vec<String> {
        self.warnings.iter().map(OverlapWarning::message).collect()
    }
}

/// Advisory cross-detection check. Never removes detections.
#[derive(Debug, Clone, Copy)]
pub struct ConsistencyValidator {
    pub iou_threshold: f32,
}

impl Default for ConsistencyValidator {
    fn default() -> Self {
        Self {
            iou_threshold: CONSISTENCY_IOU_THRESHOLD,
        }
    }
}

impl ConsistencyValidator {
    pub fn check(&self, detections: &[Detection]) -> ConsistencyReport {
        let pairs: Vec<(usize, usize)> = (0..detections.len())
            .flat_map(|i| (i + 1..detections.len()).map(move |j| (i, j)))
            .filter(|&(i, j)| detections[i].category != detections[j].category)
            .filter(|&(i, j)| bounds_overlap(&detections[i].polygon, &detections[j].polygon))
            .collect();

        let warnings: Vec<OverlapWarning> = pairs
            .par_iter()
            .filter_map(|&(i, j)| {
                let (a, b) = (&detections[i], &detections[j]);
                let iou = raster_iou(&a.polygon, &b.polygon);
                (iou > self.iou_threshold).then_some(OverlapWarning {
                    first: i,
                    second: j,
                    iou,
                    first_category: a.category,
                    second_category: b.category,
                })
            })
            .collect();

        for warning in &warnings {
            tracing::warn!("{}", warning.message());
        }

        ConsistencyReport { warnings }
    }
}

fn bounds(polygon: &[Point]) -> (f32, f32, f32, f32) {
    polygon.iter().fold(
        (f32::INFINITY, f32::INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY),
        |(x0, y0, x1, y1), p| (x0.min(p.x), y0.min(p.y), x1.max(p.x), y1.max(p.y)),
    )
}

fn bounds_overlap(a: &[Point], b: &[Point]) -> bool {
    let (ax0, ay0, ax1, ay1) = bounds(a);
    let (bx0, by0, bx1, by1) = bounds(b);
    ax0 <= bx1 && bx0 <= ax1 && ay0 <= by1 && by0 <= ay1
}
