//! Image preprocessing and the debug-capable step pipeline.

mod common;

use image::{GrayImage, Luma};
use ripeness::config::PreprocessingSettings;
use ripeness::detection::preprocessing::{ImagePreprocessor, clahe, normalize_contrast, resize_to_fit};
use ripeness::detection::steps::{ContrastNormalizationStep, DenoiseStep};
use ripeness::Pipeline;

use common::*;

fn settings(max_image_size: u32) -> PreprocessingSettings {
    PreprocessingSettings {
        max_image_size,
        ..Config::default().preprocessing
    }
}

#[test]
fn test_resize_keeps_aspect_ratio() {
    let resized = resize_to_fit(grey_image(3000, 1500), 1024);
    assert_eq!(resized.dimensions(), (1024, 512));

    let portrait = resize_to_fit(grey_image(100, 400), 200);
    assert_eq!(portrait.dimensions(), (50, 200));
}

#[test]
fn test_small_images_are_not_upscaled() {
    let resized = resize_to_fit(grey_image(300, 200), 1024);
    assert_eq!(resized.dimensions(), (300, 200));
}

#[test]
fn test_clahe_stretches_low_contrast_luma() {
    // a narrow 100..=131 gradient; one tile and no effective clipping is plain equalization
    let img = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x / 2) as u8]));

    let out = clahe(&img, 1000.0, 1);

    assert_eq!(out.dimensions(), img.dimensions());
    let (min, max) = out
        .pixels()
        .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p[0]), hi.max(p[0])));
    assert!(max - min > 200, "range {}..{}", min, max);
    assert_eq!(max, 255);
}

#[test]
fn test_clahe_keeps_dimensions_with_many_tiles() {
    let img = GrayImage::from_fn(13, 7, |x, y| Luma([(x * 10 + y) as u8]));
    let out = clahe(&img, 2.0, 8);
    assert_eq!(out.dimensions(), (13, 7));
}

#[test]
fn test_normalize_contrast_keeps_dimensions() {
    let img = grey_image(37, 23);
    let out = normalize_contrast(&img, 2.0, 8);
    assert_eq!(out.dimensions(), (37, 23));
}

#[test]
fn test_preprocessor_resizes_then_normalizes() {
    let preprocessor = ImagePreprocessor::new(&settings(128));

    let out = preprocessor.preprocess(&grey_image(512, 256), 0);

    assert_eq!(out.dimensions(), (128, 64));
    assert_eq!(preprocessor.pipeline().len(), 2);
}

#[test]
fn test_preprocessor_without_steps() {
    let mut s = settings(64);
    s.normalize = false;
    s.denoise = false;
    let preprocessor = ImagePreprocessor::new(&s);

    let img = grey_image(32, 32);
    assert!(preprocessor.pipeline().is_empty());
    assert_eq!(preprocessor.preprocess(&img, 0), img);
}

#[test]
fn test_pipeline_debug_output() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let debug_dir = dir.path().join("debug");
    let pipeline = Pipeline::new()
        .add_step_boxed(Box::new(ContrastNormalizationStep {
            clip_limit: 2.0,
            tiles: 4,
        }))
        .add_step_boxed(Box::new(DenoiseStep))
        .with_debug(debug_dir.clone())?;

    pipeline.run(grey_image(40, 30), 1)?;

    assert!(debug_dir.join("00_input/02.png").is_file());
    assert!(debug_dir.join("01_contrast_normalization/02.png").is_file());
    assert!(debug_dir.join("02_denoise/02.png").is_file());
    Ok(())
}

#[test]
fn test_debug_dir_must_be_empty() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    std::fs::write(dir.path().join("leftover.png"), b"x")?;

    let result = Pipeline::new().with_debug(dir.path().to_path_buf());

    assert!(result.is_err());
    Ok(())
}

#[test]
fn test_run_partial_stops_early() -> anyhow::Result<()> {
    let dir = tempfile::TempDir::new()?;
    let pipeline = Pipeline::new()
        .add_step_boxed(Box::new(ContrastNormalizationStep {
            clip_limit: 2.0,
            tiles: 2,
        }))
        .add_step_boxed(Box::new(DenoiseStep))
        .with_debug(dir.path().join("out"))?;

    pipeline.run_partial(grey_image(16, 16), 0, 1)?;

    assert!(dir.path().join("out/01_contrast_normalization/01.png").is_file());
    assert!(!dir.path().join("out/02_denoise").exists());
    Ok(())
}

#[test]
fn test_empty_image_fails_normalization_step() {
    let pipeline = Pipeline::new().add_step_boxed(Box::new(ContrastNormalizationStep {
        clip_limit: 2.0,
        tiles: 8,
    }));
    assert!(pipeline.run(image::RgbImage::new(0, 0), 0).is_err());
}
