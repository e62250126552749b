use image::{GrayImage, Luma};
use imageproc::drawing::draw_polygon_mut;
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point as GridPoint;

use crate::models::Point;

/// Longest side of the IoU raster grid; larger pairs are scaled down to fit
const MAX_GRID_SIDE: f32 = 2048.0;

/// Smooths and measures detection polygons
#[derive(Debug, Clone, Copy)]
pub struct PolygonProcessor {
    /// Approximation tolerance as a fraction of the closed perimeter
    pub epsilon_factor: f32,
}

impl PolygonProcessor {
    pub fn new(epsilon_factor: f32) -> Self {
        Self { epsilon_factor }
    }

    /// Douglas-Peucker approximation of a closed contour.
    /// Rings of 4 or fewer points, and results that would have fewer than 4, come back unchanged.
    pub fn smooth(&self, polygon: &[Point]) -> Vec<Point> {
        let mut ring = polygon.to_vec();
        if ring.len() > 1 && same_point(ring[0], ring[ring.len() - 1]) {
            ring.pop();
        }
        if ring.len() <= 4 || self.epsilon_factor <= 0.0 {
            return polygon.to_vec();
        }

        let curve: Vec<GridPoint<f32>> = ring.iter().map(|p| GridPoint::new(p.x, p.y)).collect();
        let epsilon = self.epsilon_factor as f64 * arc_length(&curve, true);
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return polygon.to_vec();
        }

        // The ring is split into two open chains between a pair of far-apart
        // vertices, so the starting vertex carries no weight in the result.
        let (start, end) = split_vertices(&ring);
        if start == end {
            return polygon.to_vec();
        }
        let mut rotated = curve;
        rotated.rotate_left(start);
        let split = (end + ring.len() - start) % ring.len();
        let mut closing = rotated[split..].to_vec();
        closing.push(rotated[0]);

        let first = approximate_polygon_dp(&rotated[..=split], epsilon, false);
        let second = approximate_polygon_dp(&closing, epsilon, false);
        let inner = &second[1..second.len() - 1];
        let approx: Vec<Point> = first
            .iter()
            .chain(inner)
            .map(|p| Point::new(p.x, p.y))
            .collect();

        if approx.len() < 4 {
            polygon.to_vec()
        } else {
            approx
        }
    }

    pub fn area(&self, polygon: &[Point]) -> f32 {
        area(polygon)
    }
}

/// Shoelace area; 0 for fewer than 3 vertices
pub fn area(polygon: &[Point]) -> f32 {
    signed_area(polygon).abs()
}

fn signed_area(polygon: &[Point]) -> f32 {
    if polygon.len() < 3 {
        return 0.0;
    }
    let n = polygon.len();
    let mut sum = 0.0f64;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        sum += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    (sum / 2.0) as f32
}

/// Area centroid, or the vertex mean for degenerate polygons
pub fn centroid(polygon: &[Point]) -> Point {
    if polygon.is_empty() {
        return Point::new(0.0, 0.0);
    }

    let a = signed_area(polygon) as f64;
    if a.abs() < 1e-6 {
        let n = polygon.len() as f32;
        let (sx, sy) = polygon
            .iter()
            .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
        return Point::new(sx / n, sy / n);
    }

    let n = polygon.len();
    let (mut cx, mut cy) = (0.0f64, 0.0f64);
    for i in 0..n {
        let p = polygon[i];
        let q = polygon[(i + 1) % n];
        let cross = p.x as f64 * q.y as f64 - q.x as f64 * p.y as f64;
        cx += (p.x as f64 + q.x as f64) * cross;
        cy += (p.y as f64 + q.y as f64) * cross;
    }
    Point::new((cx / (6.0 * a)) as f32, (cy / (6.0 * a)) as f32)
}

/// Intersection-over-union of two polygons, measured by filling both into
/// binary masks on a shared grid covering their combined bounding box.
pub fn raster_iou(a: &[Point], b: &[Point]) -> f32 {
    if a.len() < 3 || b.len() < 3 {
        return 0.0;
    }

    let mut min_x = f32::INFINITY;
    let mut min_y = f32::INFINITY;
    let mut max_x = f32::NEG_INFINITY;
    let mut max_y = f32::NEG_INFINITY;
    for p in a.iter().chain(b) {
        if !p.is_finite() {
            return 0.0;
        }
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let (min_x, min_y) = (min_x.floor(), min_y.floor());

    let span = (max_x - min_x).max(max_y - min_y);
    let scale = if span > MAX_GRID_SIDE { MAX_GRID_SIDE / span } else { 1.0 };
    let width = ((max_x - min_x) * scale).ceil() as u32 + 1;
    let height = ((max_y - min_y) * scale).ceil() as u32 + 1;

    let mask_a = rasterize(a, min_x, min_y, scale, width, height);
    let mask_b = rasterize(b, min_x, min_y, scale, width, height);

    let mut intersection = 0u64;
    let mut union = 0u64;
    for (pa, pb) in mask_a.as_raw().iter().zip(mask_b.as_raw()) {
        let (in_a, in_b) = (*pa > 0, *pb > 0);
        intersection += u64::from(in_a && in_b);
        union += u64::from(in_a || in_b);
    }

    if union == 0 {
        0.0
    } else {
        intersection as f32 / union as f32
    }
}

fn rasterize(polygon: &[Point], origin_x: f32, origin_y: f32, scale: f32, width: u32, height: u32) -> GrayImage {
    let mut mask = GrayImage::new(width, height);

    let mut points: Vec<GridPoint<i32>> = Vec::with_capacity(polygon.len());
    for p in polygon {
        let gp = GridPoint::new(
            ((p.x - origin_x) * scale).round() as i32,
            ((p.y - origin_y) * scale).round() as i32,
        );
        if points.last() != Some(&gp) {
            points.push(gp);
        }
    }
    // the fill routine rejects explicitly closed rings
    while points.len() > 1 && points.first() == points.last() {
        points.pop();
    }

    if points.len() >= 3 {
        draw_polygon_mut(&mut mask, &points, Luma([255u8]));
    }
    mask
}

/// Indices of the vertex farthest from the vertex mean and of the vertex farthest from that one
fn split_vertices(ring: &[Point]) -> (usize, usize) {
    let n = ring.len() as f32;
    let (sx, sy) = ring.iter().fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));
    let mean = Point::new(sx / n, sy / n);
    let start = farthest_from(ring, mean);
    (start, farthest_from(ring, ring[start]))
}

fn farthest_from(ring: &[Point], origin: Point) -> usize {
    ring.iter()
        .map(|p| (p.x - origin.x).powi(2) + (p.y - origin.y).powi(2))
        .enumerate()
        .max_by(|(_, a), (_, b)| a.total_cmp(b))
        .map_or(0, |(i, _)| i)
}

fn same_point(a: Point, b: Point) -> bool {
    a.x == b.x && a.y == b.y
}
