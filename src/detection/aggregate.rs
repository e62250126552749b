use crate::models::{Detection, PerStage, QualityMetrics, RipenessStage};

/// Per-image summary of the accepted detections
#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub counts: PerStage<usize>,
    pub dominant: Option<RipenessStage>,
    pub metrics: QualityMetrics,
}

pub struct ResultAggregator;

impl ResultAggregator {
    /// `width` x `height` is the caller's image, used for the per-megapixel density
    pub fn aggregate(detections: &[Detection], width: u32, height: u32) -> Aggregate {
        let counts = Self::counts(detections);
        let total = detections.len();

        let (avg_confidence, avg_quality_score) = if total == 0 {
            (0.0, 0.0)
        } else {
            let n = total as f32;
            (
                detections.iter().map(|d| d.confidence).sum::<f32>() / n,
                detections.iter().map(|d| d.quality_score).sum::<f32>() / n,
            )
        };

        let pixels = width as f64 * height as f64;
        let detection_density = if pixels > 0.0 {
            (total as f64 / pixels * 1_000_000.0) as f32
        } else {
            0.0
        };

        Aggregate {
            counts,
            dominant: Self::dominant(&counts),
            metrics: QualityMetrics {
                total_detections: total,
                avg_confidence,
                avg_quality_score,
                detection_density,
            },
        }
    }

    /// Zero-initialized count for every stage, incremented per detection
    pub fn counts(detections: &[Detection]) -> PerStage<usize> {
        let mut counts = PerStage::<usize>::default();
        for detection in detections {
            counts[detection.category] += 1;
        }
        counts
    }

    /// Stage with the highest count; ties go to the riper stage.
    /// `None` when nothing was counted.
    pub fn dominant(counts: &PerStage<usize>) -> Option<RipenessStage> {
        counts
            .iter()
            .filter(|(_, count)| **count > 0)
            .max_by_key(|(stage, count)| (**count, stage.priority()))
            .map(|(stage, _)| stage)
    }
}
