use crate::detection::preprocessing;
use crate::pipeline::{PipelineContext, PipelineStep};
use anyhow::Result;
use image::RgbImage;

/// CLAHE on the luma channel
pub struct ContrastNormalizationStep {
    pub clip_limit: f32,
    pub tiles: u32,
}

impl PipelineStep for ContrastNormalizationStep {
    fn process(&self, image: RgbImage, _context: &PipelineContext) -> Result<RgbImage> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            anyhow::bail!("cannot normalize an empty {}x{} image", width, height);
        }
        Ok(preprocessing::normalize_contrast(&image, self.clip_limit, self.tiles))
    }

    fn name(&self) -> &str {
        "Contrast Normalization"
    }
}

/// 3x3 median denoise
pub struct DenoiseStep;

impl PipelineStep for DenoiseStep {
    fn process(&self, image: RgbImage, _context: &PipelineContext) -> Result<RgbImage> {
        Ok(preprocessing::denoise(&image))
    }

    fn name(&self) -> &str {
        "Denoise"
    }
}
