use image::imageops::FilterType;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::filter::median_filter;

use crate::config::PreprocessingSettings;
use crate::detection::steps::{ContrastNormalizationStep, DenoiseStep};
use crate::pipeline::Pipeline;

/// Resize so the longer side is at most `max_size`, preserving aspect ratio.
/// Images already small enough are returned untouched.
pub fn resize_to_fit(img: RgbImage, max_size: u32) -> RgbImage {
    let (width, height) = img.dimensions();
    let longer = width.max(height);
    if longer <= max_size || longer == 0 {
        return img;
    }

    let scale = max_size as f32 / longer as f32;
    let new_w = ((width as f32 * scale).round() as u32).clamp(1, max_size);
    let new_h = ((height as f32 * scale).round() as u32).clamp(1, max_size);
    image::imageops::resize(&img, new_w, new_h, FilterType::Triangle)
}

/// Split an RGB image into its luma plane and per-pixel chroma (Cb, Cr)
pub fn split_luma_chroma(img: &RgbImage) -> (GrayImage, Vec<(f32, f32)>) {
    let (width, height) = img.dimensions();
    let mut luma = GrayImage::new(width, height);
    let mut chroma = Vec::with_capacity((width * height) as usize);

    for (x, y, pixel) in img.enumerate_pixels() {
        let [r, g, b] = pixel.0.map(f32::from);
        let y_val = 0.299 * r + 0.587 * g + 0.114 * b;
        let cb = 128.0 - 0.168_736 * r - 0.331_264 * g + 0.5 * b;
        let cr = 128.0 + 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        luma.put_pixel(x, y, Luma([clamp_u8(y_val)]));
        chroma.push((cb, cr));
    }

    (luma, chroma)
}

/// Recombine a luma plane with chroma produced by `split_luma_chroma`
pub fn merge_luma_chroma(luma: &GrayImage, chroma: &[(f32, f32)]) -> RgbImage {
    let (width, height) = luma.dimensions();
    let mut out = RgbImage::new(width, height);

    for (i, (x, y, pixel)) in luma.enumerate_pixels().enumerate() {
        let y_val = pixel[0] as f32;
        let (cb, cr) = chroma[i];
        let r = y_val + 1.402 * (cr - 128.0);
        let g = y_val - 0.344_136 * (cb - 128.0) - 0.714_136 * (cr - 128.0);
        let b = y_val + 1.772 * (cb - 128.0);
        out.put_pixel(x, y, Rgb([clamp_u8(r), clamp_u8(g), clamp_u8(b)]));
    }

    out
}

/// Contrast-limited adaptive histogram equalization on a single channel.
///
/// The image is split into a `tiles` x `tiles` grid (fewer on tiny images);
/// each tile gets a clipped, equalized lookup table and every pixel is
/// bilinearly interpolated between the four nearest tile tables.
pub fn clahe(img: &GrayImage, clip_limit: f32, tiles: u32) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }

    let tile_w = width.div_ceil(tiles.clamp(1, width));
    let tile_h = height.div_ceil(tiles.clamp(1, height));
    // rounding up the tile size can leave fewer tiles than requested
    let tiles_x = width.div_ceil(tile_w);
    let tiles_y = height.div_ceil(tile_h);

    let mut luts = Vec::with_capacity((tiles_x * tiles_y) as usize);
    for ty in 0..tiles_y {
        for tx in 0..tiles_x {
            let x0 = tx * tile_w;
            let y0 = ty * tile_h;
            let x1 = (x0 + tile_w).min(width);
            let y1 = (y0 + tile_h).min(height);
            luts.push(tile_lut(img, x0, y0, x1, y1, clip_limit));
        }
    }

    let lut_at = |tx: usize, ty: usize| &luts[ty * tiles_x as usize + tx];
    let mut out = GrayImage::new(width, height);

    for (x, y, pixel) in img.enumerate_pixels() {
        let (x0, x1, wx) = neighbour_tiles(x, tile_w, tiles_x);
        let (y0, y1, wy) = neighbour_tiles(y, tile_h, tiles_y);
        let v = pixel[0] as usize;

        let top = lut_at(x0, y0)[v] * (1.0 - wx) + lut_at(x1, y0)[v] * wx;
        let bottom = lut_at(x0, y1)[v] * (1.0 - wx) + lut_at(x1, y1)[v] * wx;
        out.put_pixel(x, y, Luma([clamp_u8(top * (1.0 - wy) + bottom * wy)]));
    }

    out
}

/// Equalization table for one tile, with the histogram clipped at
/// `clip_limit` times the mean bin height and the excess spread evenly.
fn tile_lut(img: &GrayImage, x0: u32, y0: u32, x1: u32, y1: u32, clip_limit: f32) -> [f32; 256] {
    let mut hist = [0u32; 256];
    for y in y0..y1 {
        for x in x0..x1 {
            hist[img.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let total = (x1 - x0) * (y1 - y0);
    let limit = ((clip_limit * total as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let bonus = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += bonus + u32::from(i < remainder);
    }

    let scale = 255.0 / total.max(1) as f32;
    let mut lut = [0f32; 256];
    let mut cumulative = 0u32;
    for (i, bin) in hist.iter().enumerate() {
        cumulative += bin;
        lut[i] = cumulative as f32 * scale;
    }
    lut
}

/// Indices of the two tiles whose centres surround `pos`, plus the weight of the second
fn neighbour_tiles(pos: u32, tile_size: u32, tiles: u32) -> (usize, usize, f32) {
    let last = (tiles - 1) as f32;
    let f = (pos as f32 + 0.5) / tile_size as f32 - 0.5;
    let lower = f.floor();
    let i0 = lower.clamp(0.0, last) as usize;
    let i1 = (lower + 1.0).clamp(0.0, last) as usize;
    let weight = (f - lower).clamp(0.0, 1.0);
    (i0, i1, weight)
}

/// CLAHE applied to the luma channel only; chroma is carried through unchanged
pub fn normalize_contrast(img: &RgbImage, clip_limit: f32, tiles: u32) -> RgbImage {
    let (luma, chroma) = split_luma_chroma(img);
    let equalized = clahe(&luma, clip_limit, tiles);
    merge_luma_chroma(&equalized, &chroma)
}

/// Mild edge-preserving denoise (3x3 median)
pub fn denoise(img: &RgbImage) -> RgbImage {
    median_filter(img, 1, 1)
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

/// Prepares caller images for the model: resize, then contrast
/// normalization and denoise as a step pipeline.
pub struct ImagePreprocessor {
    max_image_size: u32,
    pipeline: Pipeline,
}

impl ImagePreprocessor {
    pub fn new(settings: &PreprocessingSettings) -> Self {
        let mut pipeline = Pipeline::new();
        if settings.normalize {
            pipeline = pipeline.add_step_boxed(Box::new(ContrastNormalizationStep {
                clip_limit: settings.clahe_clip_limit,
                tiles: settings.clahe_tiles,
            }));
        }
        if settings.denoise {
            pipeline = pipeline.add_step_boxed(Box::new(DenoiseStep));
        }

        Self {
            max_image_size: settings.max_image_size,
            pipeline,
        }
    }

    /// Replace the normalization pipeline (e.g. one with debug output enabled)
    pub fn with_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Never fails: if normalization errors, the resized image is returned.
    pub fn preprocess(&self, img: &RgbImage, item: usize) -> RgbImage {
        let resized = resize_to_fit(img.clone(), self.max_image_size);
        if self.pipeline.is_empty() {
            return resized;
        }

        match self.pipeline.run(resized.clone(), item) {
            Ok(normalized) => normalized,
            Err(e) => {
                tracing::warn!(item, "image normalization failed, using resized image: {:#}", e);
                resized
            }
        }
    }
}
