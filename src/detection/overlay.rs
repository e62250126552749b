use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_circle_mut, draw_hollow_polygon_mut, draw_hollow_rect_mut};
use imageproc::point::Point as GridPoint;
use imageproc::rect::Rect;

use crate::models::{Detection, RipenessStage};

pub fn stage_color(stage: RipenessStage) -> Rgb<u8> {
    match stage {
        RipenessStage::NotMature => Rgb([46, 160, 67]),
        RipenessStage::Mature => Rgb([190, 200, 40]),
        RipenessStage::Ripe => Rgb([250, 200, 20]),
        RipenessStage::OverRipe => Rgb([140, 70, 20]),
    }
}

/// Draw each detection's polygon, box and centroid onto a copy of `image`
pub fn draw_overlays(image: &RgbImage, detections: &[Detection]) -> RgbImage {
    let mut canvas = image.clone();

    for detection in detections {
        let color = stage_color(detection.category);

        let bbox = &detection.bbox;
        let (w, h) = (bbox.width.round() as u32, bbox.height.round() as u32);
        if w > 0 && h > 0 {
            let rect = Rect::at(bbox.x.round() as i32, bbox.y.round() as i32).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, rect, color);
        }

        let mut outline: Vec<GridPoint<f32>> = detection
            .polygon
            .iter()
            .map(|p| GridPoint::new(p.x, p.y))
            .collect();
        if outline.len() > 1 && outline.first() == outline.last() {
            outline.pop();
        }
        if outline.len() >= 3 {
            draw_hollow_polygon_mut(&mut canvas, &outline, color);
        }

        let c = detection.centroid;
        draw_filled_circle_mut(&mut canvas, (c.x.round() as i32, c.y.round() as i32), 3, color);
    }

    canvas
}
