mod common;

use ripeness::detection::overlay::{draw_overlays, stage_color};

use common::*;

#[test]
fn test_overlay_draws_in_stage_color() {
    let image = grey_image(200, 200);
    let detection = make_detection(RipenessStage::Ripe, 0.9, 0.8);

    let annotated = draw_overlays(&image, &[detection]);

    assert_eq!(annotated.dimensions(), image.dimensions());
    assert_eq!(*annotated.get_pixel(0, 0), stage_color(RipenessStage::Ripe));
    assert_eq!(*annotated.get_pixel(50, 50), stage_color(RipenessStage::Ripe));
    // outside every detection the image is untouched
    assert_eq!(annotated.get_pixel(150, 150), image.get_pixel(150, 150));
    // the input is not modified
    assert_eq!(*image.get_pixel(0, 0), image::Rgb([128, 128, 128]));
}

#[test]
fn test_stage_colors_are_distinct() {
    let colors: Vec<_> = RipenessStage::ALL.iter().map(|s| stage_color(*s)).collect();
    for (i, a) in colors.iter().enumerate() {
        for b in &colors[i + 1..] {
            assert_ne!(a, b);
        }
    }
}
