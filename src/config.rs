use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::error::{ClassifierError, Result};
use crate::models::{PerStage, RipenessStage};

pub const DEFAULT_CONFIDENCE_THRESHOLD: f32 = 0.75;
pub const DEFAULT_IOU_THRESHOLD: f32 = 0.5;
pub const DEFAULT_MAX_IMAGE_SIZE: u32 = 1024;
pub const DEFAULT_MIN_POLYGON_AREA: f32 = 100.0;
pub const DEFAULT_MAX_ASPECT_RATIO: f32 = 5.0;
pub const DEFAULT_SMOOTHING_EPSILON: f32 = 0.01;
pub const DEFAULT_CLAHE_CLIP_LIMIT: f32 = 2.0;
pub const DEFAULT_CLAHE_TILES: u32 = 8;
pub const DEFAULT_MONITOR_WINDOW: usize = 1000;
const DEFAULT_WEIGHTS_PATH: &str = "models/ripeness/best.onnx";

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    confidence_threshold: Option<f32>,
    iou_threshold: Option<f32>,
    category_thresholds: Option<CategoryThresholdsFile>,
    quality: Option<QualityConfigFile>,
    preprocessing: Option<PreprocessingConfigFile>,
    polygon: Option<PolygonConfigFile>,
    model: Option<ModelConfigFile>,
    monitor: Option<MonitorConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct CategoryThresholdsFile {
    not_mature: Option<f32>,
    mature: Option<f32>,
    ripe: Option<f32>,
    over_ripe: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct QualityConfigFile {
    min_polygon_area: Option<f32>,
    max_aspect_ratio: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PreprocessingConfigFile {
    max_image_size: Option<u32>,
    normalize: Option<bool>,
    clahe_clip_limit: Option<f32>,
    clahe_tiles: Option<u32>,
    denoise: Option<bool>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct PolygonConfigFile {
    smoothing_epsilon: Option<f32>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct ModelConfigFile {
    weights_path: Option<PathBuf>,
    expected_sha256: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct MonitorConfigFile {
    window: Option<usize>,
}

/// Classifier configuration. Supplied once at construction, read-only afterwards.
#[derive(Debug, Clone)]
pub struct Config {
    pub confidence_threshold: f32,
    pub iou_threshold: f32,
    /// Per-stage confidence thresholds overriding `confidence_threshold`
    pub category_thresholds: PerStage<Option<f32>>,
    pub min_polygon_area: f32,
    pub max_aspect_ratio: f32,
    /// Douglas-Peucker tolerance as a fraction of the polygon perimeter
    pub smoothing_epsilon: f32,
    pub preprocessing: PreprocessingSettings,
    pub model: ModelSettings,
    /// Number of processing-time samples kept by the performance monitor
    pub monitor_window: usize,
}

#[derive(Debug, Clone)]
pub struct PreprocessingSettings {
    pub max_image_size: u32,
    pub normalize: bool,
    pub clahe_clip_limit: f32,
    pub clahe_tiles: u32,
    pub denoise: bool,
}

#[derive(Debug, Clone)]
pub struct ModelSettings {
    pub weights_path: PathBuf,
    /// Hex SHA-256 the weights file must match, if set
    pub expected_sha256: Option<String>,
    /// Directory relative weights paths are resolved against
    pub base_dir: Option<PathBuf>,
}

impl ModelSettings {
    pub fn resolved_weights_path(&self) -> PathBuf {
        match &self.base_dir {
            Some(base) if self.weights_path.is_relative() => base.join(&self.weights_path),
            _ => self.weights_path.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::from_file(ConfigFile::default())
    }
}

impl Config {
    /// Load from an optional TOML file (falling back to `RIPENESS_CONFIG`),
    /// apply environment overrides, then validate.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var("RIPENESS_CONFIG").ok().map(PathBuf::from);
        let path = path.map(Path::to_path_buf).or(env_path);

        let mut cfg = match path {
            Some(path) => {
                let mut cfg = Self::from_file(read_config_file(&path)?);
                cfg.model.base_dir = path.parent().map(Path::to_path_buf);
                cfg
            }
            None => Self::default(),
        };
        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse and validate a TOML document, without environment overrides
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(raw)
            .map_err(|e| ClassifierError::Configuration(format!("invalid config: {}", e)))?;
        let cfg = Self::from_file(file);
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: ConfigFile) -> Self {
        let category = file.category_thresholds.unwrap_or_default();
        let quality = file.quality.unwrap_or_default();
        let pre = file.preprocessing.unwrap_or_default();
        let model = file.model.unwrap_or_default();

        Self {
            confidence_threshold: file
                .confidence_threshold
                .unwrap_or(DEFAULT_CONFIDENCE_THRESHOLD),
            iou_threshold: file.iou_threshold.unwrap_or(DEFAULT_IOU_THRESHOLD),
            category_thresholds: PerStage::from_fn(|stage| match stage {
                RipenessStage::NotMature => category.not_mature,
                RipenessStage::Mature => category.mature,
                RipenessStage::Ripe => category.ripe,
                RipenessStage::OverRipe => category.over_ripe,
            }),
            min_polygon_area: quality
                .min_polygon_area
                .unwrap_or(DEFAULT_MIN_POLYGON_AREA),
            max_aspect_ratio: quality
                .max_aspect_ratio
                .unwrap_or(DEFAULT_MAX_ASPECT_RATIO),
            smoothing_epsilon: file
                .polygon
                .and_then(|p| p.smoothing_epsilon)
                .unwrap_or(DEFAULT_SMOOTHING_EPSILON),
            preprocessing: PreprocessingSettings {
                max_image_size: pre.max_image_size.unwrap_or(DEFAULT_MAX_IMAGE_SIZE),
                normalize: pre.normalize.unwrap_or(true),
                clahe_clip_limit: pre.clahe_clip_limit.unwrap_or(DEFAULT_CLAHE_CLIP_LIMIT),
                clahe_tiles: pre.clahe_tiles.unwrap_or(DEFAULT_CLAHE_TILES),
                denoise: pre.denoise.unwrap_or(true),
            },
            model: ModelSettings {
                weights_path: model
                    .weights_path
                    .unwrap_or_else(|| PathBuf::from(DEFAULT_WEIGHTS_PATH)),
                expected_sha256: model.expected_sha256,
                base_dir: None,
            },
            monitor_window: file
                .monitor
                .and_then(|m| m.window)
                .unwrap_or(DEFAULT_MONITOR_WINDOW),
        }
    }

    /// Apply `RIPENESS_*` overrides looked up through `lookup`
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        let present = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = present("RIPENESS_CONFIDENCE_THRESHOLD") {
            self.confidence_threshold = parse_env("RIPENESS_CONFIDENCE_THRESHOLD", &value)?;
        }
        if let Some(value) = present("RIPENESS_IOU_THRESHOLD") {
            self.iou_threshold = parse_env("RIPENESS_IOU_THRESHOLD", &value)?;
        }
        if let Some(value) = present("RIPENESS_MAX_IMAGE_SIZE") {
            self.preprocessing.max_image_size = parse_env("RIPENESS_MAX_IMAGE_SIZE", &value)?;
        }
        if let Some(value) = present("RIPENESS_WEIGHTS_PATH") {
            self.model.weights_path = PathBuf::from(value.trim());
            self.model.base_dir = None;
        }
        if let Some(value) = present("RIPENESS_EXPECTED_SHA256") {
            self.model.expected_sha256 = Some(value.trim().to_string());
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        check_unit("confidence_threshold", self.confidence_threshold)?;
        check_unit("iou_threshold", self.iou_threshold)?;
        for (stage, threshold) in self.category_thresholds.iter() {
            if let Some(t) = threshold {
                check_unit(&format!("category_thresholds.{}", stage.key()), *t)?;
            }
        }
        if self.preprocessing.max_image_size == 0 {
            return Err(config_error("max_image_size must be greater than zero"));
        }
        if !(self.min_polygon_area.is_finite() && self.min_polygon_area >= 0.0) {
            return Err(config_error("min_polygon_area must be a non-negative number"));
        }
        if !(self.max_aspect_ratio.is_finite() && self.max_aspect_ratio > 0.0) {
            return Err(config_error("max_aspect_ratio must be greater than zero"));
        }
        if !(0.0..0.5).contains(&self.smoothing_epsilon) {
            return Err(config_error("smoothing_epsilon must be in [0, 0.5)"));
        }
        if !(self.preprocessing.clahe_clip_limit.is_finite()
            && self.preprocessing.clahe_clip_limit >= 1.0)
        {
            return Err(config_error("clahe_clip_limit must be at least 1.0"));
        }
        if self.preprocessing.clahe_tiles == 0 {
            return Err(config_error("clahe_tiles must be greater than zero"));
        }
        if self.monitor_window == 0 {
            return Err(config_error("monitor window must be greater than zero"));
        }
        if self.model.weights_path.as_os_str().is_empty() {
            return Err(config_error("model weights path must not be empty"));
        }
        if let Some(digest) = &self.model.expected_sha256 {
            if digest.len() != 64 || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
                return Err(config_error("expected_sha256 must be 64 hex characters"));
            }
        }
        Ok(())
    }

    /// Per-stage override if configured, else the global threshold
    pub fn effective_threshold(&self, stage: RipenessStage) -> f32 {
        self.category_thresholds[stage].unwrap_or(self.confidence_threshold)
    }

    pub fn with_weights_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.model.weights_path = path.into();
        self.model.base_dir = None;
        self
    }

    pub fn with_category_threshold(mut self, stage: RipenessStage, threshold: f32) -> Self {
        self.category_thresholds[stage] = Some(threshold);
        self
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        config_error(format!("failed to read config file {}: {}", path.display(), e))
    })?;
    toml::from_str(&raw)
        .map_err(|e| config_error(format!("invalid config file {}: {}", path.display(), e)))
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| config_error(format!("{} has an invalid value: {}", key, value)))
}

fn check_unit(name: &str, value: f32) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(config_error(format!("{} must be within [0, 1], got {}", name, value)))
    }
}

fn config_error(message: impl Into<String>) -> ClassifierError {
    ClassifierError::Configuration(message.into())
}
