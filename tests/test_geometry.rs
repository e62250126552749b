//! Polygon area, centroid, smoothing and raster IoU.

mod common;

use ripeness::detection::polygon::{PolygonProcessor, area, centroid, raster_iou};

use common::*;

#[test]
fn test_unit_square_area_is_one() {
    let unit = square(0.0, 0.0, 1.0);
    assert!((area(&unit) - 1.0).abs() < 1e-6);
}

#[test]
fn test_area_ignores_winding_order() {
    let mut ring = square(10.0, 10.0, 20.0);
    let clockwise = area(&ring);
    ring.reverse();
    assert_eq!(clockwise, area(&ring));
    assert!((clockwise - 400.0).abs() < 1e-3);
}

#[test]
fn test_area_of_degenerate_polygon_is_zero() {
    assert_eq!(area(&[]), 0.0);
    assert_eq!(area(&[Point::new(0.0, 0.0), Point::new(5.0, 5.0)]), 0.0);
}

#[test]
fn test_centroid_of_square() {
    let c = centroid(&square(0.0, 0.0, 100.0));
    assert!((c.x - 50.0).abs() < 1e-3 && (c.y - 50.0).abs() < 1e-3);
}

#[test]
fn test_centroid_of_collinear_points_is_vertex_mean() {
    let line = vec![Point::new(0.0, 0.0), Point::new(2.0, 0.0), Point::new(4.0, 0.0)];
    let c = centroid(&line);
    assert_eq!((c.x, c.y), (2.0, 0.0));
}

#[test]
fn test_smooth_simplifies_dense_contour() {
    let processor = PolygonProcessor::new(0.01);
    let dense = circle(100.0, 100.0, 50.0, 200);

    let smoothed = processor.smooth(&dense);

    assert!(smoothed.len() >= 4, "got {} points", smoothed.len());
    assert!(smoothed.len() < dense.len());
    // simplification keeps the shape roughly intact
    let ratio = area(&smoothed) / area(&dense);
    assert!(ratio > 0.9 && ratio <= 1.0 + 1e-3, "area ratio {}", ratio);
}

#[test]
fn test_smooth_never_drops_below_four_points() {
    // A huge tolerance would collapse the ring; the input comes back instead
    let processor = PolygonProcessor::new(0.49);
    let ring = circle(0.0, 0.0, 10.0, 12);

    let smoothed = processor.smooth(&ring);

    assert!(smoothed.len() >= 4);
}

#[test]
fn test_smooth_reduces_square_contour_to_its_corners() {
    // Unit-step outline of a 100x100 square, starting halfway along the top edge
    let mut contour = Vec::with_capacity(400);
    contour.extend((50..100).map(|x| Point::new(x as f32, 0.0)));
    contour.extend((0..100).map(|y| Point::new(100.0, y as f32)));
    contour.extend((0..100).map(|x| Point::new(100.0 - x as f32, 100.0)));
    contour.extend((0..100).map(|y| Point::new(0.0, 100.0 - y as f32)));
    contour.extend((0..50).map(|x| Point::new(x as f32, 0.0)));
    assert_eq!(contour.len(), 400);

    let smoothed = PolygonProcessor::new(0.01).smooth(&contour);

    assert_eq!(smoothed.len(), 4, "got {:?}", smoothed);
    for corner in square(0.0, 0.0, 100.0) {
        assert!(smoothed.contains(&corner), "missing corner {:?} in {:?}", corner, smoothed);
    }
    assert!((area(&smoothed) - 10_000.0).abs() < 1e-3);
}

#[test]
fn test_smooth_leaves_small_polygons_alone() {
    let processor = PolygonProcessor::new(0.01);
    let quad = square(0.0, 0.0, 10.0);
    assert_eq!(processor.smooth(&quad), quad);

    let triangle = vec![Point::new(0.0, 0.0), Point::new(10.0, 0.0), Point::new(0.0, 10.0)];
    assert_eq!(processor.smooth(&triangle), triangle);
}

#[test]
fn test_smooth_with_zero_epsilon_is_identity() {
    let processor = PolygonProcessor::new(0.0);
    let ring = circle(50.0, 50.0, 20.0, 30);
    assert_eq!(processor.smooth(&ring), ring);
}

#[test]
fn test_iou_of_polygon_with_itself_is_one() {
    let ring = circle(60.0, 60.0, 40.0, 32);
    assert!((raster_iou(&ring, &ring) - 1.0).abs() < 1e-6);
}

#[test]
fn test_iou_of_disjoint_polygons_is_zero() {
    let a = square(0.0, 0.0, 50.0);
    let b = square(200.0, 200.0, 50.0);
    assert_eq!(raster_iou(&a, &b), 0.0);
}

#[test]
fn test_iou_of_shifted_squares() {
    // Geometric IoU is 8000 / 12000
    let a = square(0.0, 0.0, 100.0);
    let b = square(20.0, 0.0, 100.0);

    let iou = raster_iou(&a, &b);

    assert!((iou - 2.0 / 3.0).abs() < 0.05, "iou {}", iou);
    assert_eq!(iou, raster_iou(&b, &a));
}

#[test]
fn test_iou_rejects_degenerate_input() {
    let a = square(0.0, 0.0, 10.0);
    let line = vec![Point::new(0.0, 0.0), Point::new(10.0, 10.0)];
    assert_eq!(raster_iou(&a, &line), 0.0);
}
