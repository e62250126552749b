//! Per-image aggregation: category counts, dominant stage and quality metrics.

mod common;

use ripeness::detection::aggregate::ResultAggregator;
use ripeness::detection::consistency::ConsistencyValidator;
use ripeness::detection::polygon::raster_iou;

use common::*;

#[test]
fn test_counts_always_have_four_stages() {
    let detections = vec![
        make_detection(RipenessStage::Ripe, 0.9, 0.8),
        make_detection(RipenessStage::Ripe, 0.8, 0.7),
        make_detection(RipenessStage::NotMature, 0.95, 0.9),
    ];

    let aggregate = ResultAggregator::aggregate(&detections, 1000, 1000);

    assert_eq!(aggregate.counts.values(), &[1, 0, 2, 0]);
    assert_eq!(aggregate.counts.values().iter().sum::<usize>(), detections.len());
    assert_eq!(aggregate.dominant, Some(RipenessStage::Ripe));

    let json = serde_json::to_value(aggregate.counts).expect("counts serialize");
    let keys: Vec<_> = json.as_object().expect("map").keys().cloned().collect();
    assert_eq!(keys.len(), 4);
    for stage in RipenessStage::ALL {
        assert!(keys.contains(&stage.key().to_string()));
    }
}

#[test]
fn test_dominant_tie_goes_to_riper_stage() {
    let detections = vec![
        make_detection(RipenessStage::Mature, 0.9, 0.8),
        make_detection(RipenessStage::Ripe, 0.9, 0.8),
    ];
    let aggregate = ResultAggregator::aggregate(&detections, 100, 100);
    assert_eq!(aggregate.dominant, Some(RipenessStage::Ripe));

    let detections = vec![
        make_detection(RipenessStage::OverRipe, 0.9, 0.8),
        make_detection(RipenessStage::NotMature, 0.9, 0.8),
        make_detection(RipenessStage::Mature, 0.9, 0.8),
    ];
    let aggregate = ResultAggregator::aggregate(&detections, 100, 100);
    assert_eq!(aggregate.dominant, Some(RipenessStage::OverRipe));
}

#[test]
fn test_empty_image_aggregates_to_zero() {
    let aggregate = ResultAggregator::aggregate(&[], 640, 480);

    assert_eq!(aggregate.dominant, None);
    assert_eq!(aggregate.metrics.total_detections, 0);
    assert_eq!(aggregate.metrics.avg_confidence, 0.0);
    assert_eq!(aggregate.metrics.avg_quality_score, 0.0);
    assert_eq!(aggregate.metrics.detection_density, 0.0);
    assert_eq!(aggregate.counts.values(), &[0, 0, 0, 0]);
}

#[test]
fn test_metrics_are_means_and_density_per_megapixel() {
    let detections = vec![
        make_detection(RipenessStage::Ripe, 0.8, 0.6),
        make_detection(RipenessStage::Mature, 1.0, 0.8),
    ];

    let metrics = ResultAggregator::aggregate(&detections, 1000, 500).metrics;

    assert_eq!(metrics.total_detections, 2);
    assert!((metrics.avg_confidence - 0.9).abs() < 1e-6);
    assert!((metrics.avg_quality_score - 0.7).abs() < 1e-6);
    assert!((metrics.detection_density - 4.0).abs() < 1e-4);
}

#[test]
fn test_consistency_flags_overlapping_disagreement() {
    let mut first = make_detection(RipenessStage::Ripe, 0.9, 0.8);
    first.polygon = square(0.0, 0.0, 100.0);
    let mut second = make_detection(RipenessStage::Mature, 0.9, 0.8);
    second.polygon = square(20.0, 0.0, 100.0);
    let mut same_stage = make_detection(RipenessStage::Ripe, 0.9, 0.8);
    same_stage.polygon = square(10.0, 0.0, 100.0);
    let mut far_away = make_detection(RipenessStage::OverRipe, 0.9, 0.8);
    far_away.polygon = square(500.0, 500.0, 50.0);

    let report = ConsistencyValidator::default().check(&[first, second, same_stage, far_away]);

    // (0, 1) and (1, 2) disagree and overlap; far_away overlaps nothing
    assert!(!report.is_consistent());
    let pairs: Vec<_> = report.warnings.iter().map(|w| (w.first, w.second)).collect();
    assert_eq!(pairs, vec![(0, 1), (1, 2)]);
    assert!(report.messages()[0].contains("overlap"));
}

fn disagreeing_pair(first: Vec<Point>, second: Vec<Point>) -> [Detection; 2] {
    let mut a = make_detection(RipenessStage::Ripe, 0.9, 0.8);
    a.polygon = first;
    let mut b = make_detection(RipenessStage::Mature, 0.9, 0.8);
    b.polygon = second;
    [a, b]
}

#[test]
fn test_overlap_equal_to_threshold_is_not_flagged() {
    let pair = disagreeing_pair(square(0.0, 0.0, 100.0), square(40.0, 0.0, 100.0));
    let iou = raster_iou(&pair[0].polygon, &pair[1].polygon);
    assert!(iou > 0.0 && iou < 1.0, "iou {}", iou);

    let at = ConsistencyValidator { iou_threshold: iou }.check(&pair);
    let just_below = ConsistencyValidator { iou_threshold: iou - 1e-4 }.check(&pair);

    assert!(at.is_consistent());
    assert_eq!(just_below.warnings.len(), 1);
    assert_eq!(just_below.warnings[0].iou, iou);
}

#[test]
fn test_default_threshold_boundary() {
    // Rasterised IoU of these is at most 0.3 (6 of 20 columns)
    let at_boundary = disagreeing_pair(square(0.0, 0.0, 12.0), square(7.0, 0.0, 12.0));
    assert!(ConsistencyValidator::default().check(&at_boundary).is_consistent());

    // One column more overlap puts it above 0.3
    let above = disagreeing_pair(square(0.0, 0.0, 12.0), square(6.0, 0.0, 12.0));
    let report = ConsistencyValidator::default().check(&above);
    assert_eq!(report.warnings.len(), 1);
    assert!(report.warnings[0].iou > 0.3);
}
