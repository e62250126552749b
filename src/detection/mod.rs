pub mod aggregate;
pub mod categories;
pub mod consistency;
pub mod extraction;
pub mod model;
pub mod monitor;
pub mod overlay;
pub mod polygon;
pub mod preprocessing;
pub mod quality;
pub mod runtime;
pub mod steps;

use base64::Engine;
use image::{DynamicImage, ImageReader, RgbImage};
use rayon::prelude::*;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::config::Config;
use crate::error::{ClassifierError, Result};
use crate::models::{AnalysisMetadata, AnalysisResult};
use crate::pipeline::Pipeline;
use aggregate::ResultAggregator;
use categories::CategoryMapper;
use consistency::ConsistencyValidator;
use extraction::{DetectionExtractor, FrameInfo};
use model::{LifecycleState, LoadedModel, ModelInfo, ModelState, UNKNOWN_VERSION};
use monitor::{PerformanceMonitor, PerformanceSummary};
use preprocessing::ImagePreprocessor;
use quality::QualityValidator;
use runtime::{InferenceParams, ModelLoader, RawDetection};

/// Ripeness classifier: preprocessing, model inference and the
/// extraction / validation / aggregation chain for each image.
///
/// Owned by the caller. Inference on one instance is serialized; use one
/// instance per thread for parallel inference.
pub struct RipenessClassifier {
    config: Config,
    state: ModelState,
    preprocessor: ImagePreprocessor,
    extractor: DetectionExtractor,
    validator: QualityValidator,
    consistency: ConsistencyValidator,
    monitor: Arc<PerformanceMonitor>,
}

/// One image between preprocessing and post-processing
struct PreparedImage {
    original_size: (u32, u32),
    image: RgbImage,
    elapsed: Duration,
}

/// Bookkeeping kept for a prepared image while the runtime holds its pixels
struct Prepared {
    original_size: (u32, u32),
    analysed_size: (u32, u32),
    elapsed: Duration,
}

impl RipenessClassifier {
    /// Validate `config` and load the model through `loader`.
    ///
    /// Only an invalid configuration is an error. A model that cannot be
    /// loaded leaves the classifier in `LoadFailed`, where every call
    /// returns an unsuccessful result.
    pub fn new(config: Config, loader: &dyn ModelLoader) -> Result<Self> {
        config.validate()?;

        let mut state = ModelState::Uninitialized;
        state.initialize(&config.model, loader);

        let class_names = match &state {
            ModelState::Ready(model) => model.info.class_names.clone(),
            _ => None,
        };

        Ok(Self {
            preprocessor: ImagePreprocessor::new(&config.preprocessing),
            extractor: DetectionExtractor::new(&config, CategoryMapper::new(class_names)),
            validator: QualityValidator::new(&config),
            consistency: ConsistencyValidator::default(),
            monitor: Arc::new(PerformanceMonitor::new(config.monitor_window)),
            state,
            config,
        })
    }

    /// Share a performance monitor with other classifiers
    pub fn with_monitor(mut self, monitor: Arc<PerformanceMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Replace the normalization pipeline, e.g. with debug output enabled
    pub fn with_preprocessing_pipeline(mut self, pipeline: Pipeline) -> Self {
        self.preprocessor = self.preprocessor.with_pipeline(pipeline);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn state(&self) -> LifecycleState {
        self.state.kind()
    }

    pub fn model_info(&self) -> Option<&ModelInfo> {
        match &self.state {
            ModelState::Ready(model) => Some(&model.info),
            _ => None,
        }
    }

    pub fn model_version(&self) -> &str {
        self.model_info().map_or(UNKNOWN_VERSION, ModelInfo::version)
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    pub fn monitor(&self) -> &Arc<PerformanceMonitor> {
        &self.monitor
    }

    pub fn performance_stats(&self) -> Option<PerformanceSummary> {
        self.monitor.summary()
    }

    fn inference_params(&self) -> InferenceParams {
        InferenceParams {
            confidence_threshold: self.config.confidence_threshold,
            iou_threshold: self.config.iou_threshold,
        }
    }

    fn ready_model(&self) -> Result<&LoadedModel> {
        match &self.state {
            ModelState::Ready(model) => Ok(model),
            ModelState::LoadFailed { reason } => {
                tracing::warn!("classification requested but model failed to load: {}", reason);
                Err(ClassifierError::ModelUnavailable(reason.clone()))
            }
            other => Err(ClassifierError::ModelUnavailable(format!(
                "model is {:?}",
                other.kind()
            ))),
        }
    }

    /// Classify one RGB image
    pub fn classify(&self, image: &RgbImage) -> AnalysisResult {
        self.classify_item(image, 0)
    }

    /// Like `classify`; `item` numbers the image in preprocessing debug output
    pub fn classify_item(&self, image: &RgbImage, item: usize) -> AnalysisResult {
        let started = Instant::now();
        let model = match self.ready_model() {
            Ok(model) => model,
            Err(e) => return self.failed(e, started.elapsed()),
        };

        let prepared = match self.prepare(image, item) {
            Ok(prepared) => prepared,
            Err(e) => return self.failed(e, started.elapsed()),
        };

        let captured_at = OffsetDateTime::now_utc();
        let inference_started = Instant::now();
        let raws = model.runtime().infer(&prepared.image, &self.inference_params());
        let inference_time = inference_started.elapsed();

        let before_post = prepared.elapsed + inference_time;
        let prepared = Prepared {
            original_size: prepared.original_size,
            analysed_size: prepared.image.dimensions(),
            elapsed: prepared.elapsed,
        };
        match raws {
            Ok(raws) => self.complete(&prepared, &raws, captured_at, before_post),
            Err(e) => self.failed(
                ClassifierError::PerCall(format!("inference failed: {:#}", e)),
                started.elapsed(),
            ),
        }
    }

    /// Classify several images with one runtime call.
    ///
    /// Results come back in input order. A failing image yields an
    /// unsuccessful result at its index without affecting the others.
    pub fn classify_batch(&self, images: &[RgbImage]) -> Vec<AnalysisResult> {
        let started = Instant::now();
        let model = match self.ready_model() {
            Ok(model) => model,
            Err(e) => {
                let failed = self.failed(e, started.elapsed());
                return images
                    .iter()
                    .map(|_| {
                        let mut result = failed.clone();
                        result.metadata.analysis_id = Uuid::new_v4();
                        result
                    })
                    .collect();
            }
        };

        let prepared: Vec<Result<PreparedImage>> = images
            .par_iter()
            .enumerate()
            .map(|(i, image)| self.prepare(image, i))
            .collect();

        let mut slots: Vec<Result<Prepared>> =
            Vec::with_capacity(images.len());
        let mut batch: Vec<RgbImage> = Vec::new();
        for item in prepared {
            match item {
                Ok(p) => {
                    slots.push(Ok(Prepared {
                        original_size: p.original_size,
                        analysed_size: p.image.dimensions(),
                        elapsed: p.elapsed,
                    }));
                    batch.push(p.image);
                }
                Err(e) => slots.push(Err(e)),
            }
        }

        let captured_at = OffsetDateTime::now_utc();
        let inference_started = Instant::now();
        let outputs = if batch.is_empty() {
            Vec::new()
        } else {
            model.runtime().infer_batch(&batch, &self.inference_params())
        };
        let inference_share = if batch.is_empty() {
            Duration::ZERO
        } else {
            inference_started.elapsed() / batch.len() as u32
        };
        if outputs.len() != batch.len() {
            tracing::warn!(
                "runtime returned {} result sets for {} images",
                outputs.len(),
                batch.len()
            );
        }

        let mut outputs = outputs.into_iter();
        let mut results = Vec::with_capacity(images.len());
        for slot in slots {
            let prepared = match slot {
                Ok(prepared) => prepared,
                Err(e) => {
                    results.push(self.failed(e, Duration::ZERO));
                    continue;
                }
            };
            let before_post = prepared.elapsed + inference_share;

            let result = match outputs.next() {
                Some(Ok(raws)) => self.complete(&prepared, &raws, captured_at, before_post),
                Some(Err(e)) => self.failed(
                    ClassifierError::PerCall(format!("inference failed: {:#}", e)),
                    before_post,
                ),
                None => self.failed(
                    ClassifierError::PerCall("runtime returned no result for this image".to_string()),
                    before_post,
                ),
            };
            results.push(result);
        }

        tracing::info!(
            images = images.len(),
            failed = results.iter().filter(|r| !r.success).count(),
            "batch classification finished in {:.3}s",
            started.elapsed().as_secs_f64()
        );
        results
    }

    /// Decode and classify an image file
    pub fn classify_path(&self, path: &Path) -> AnalysisResult {
        match load_image(path) {
            Ok(image) => self.classify_dynamic(&image),
            Err(e) => self.image_load_failed(path, &e),
        }
    }

    /// Unsuccessful result for an image file that could not be decoded
    pub fn image_load_failed(&self, path: &Path, error: &anyhow::Error) -> AnalysisResult {
        self.failed(
            ClassifierError::PerCall(format!("could not load image from {}: {:#}", path.display(), error)),
            Duration::ZERO,
        )
    }

    /// Classify a base64 payload, with or without a `data:image/...;base64,` prefix
    pub fn classify_base64(&self, data: &str) -> AnalysisResult {
        let payload = data.split_once(',').map_or(data, |(_, rest)| rest).trim();
        let decoded = base64::engine::general_purpose::STANDARD
            .decode(payload)
            .map_err(anyhow::Error::from)
            .and_then(|bytes| image::load_from_memory(&bytes).map_err(anyhow::Error::from));

        match decoded {
            Ok(image) => self.classify_dynamic(&image),
            Err(e) => self.failed(
                ClassifierError::PerCall(format!("could not decode base64 image: {:#}", e)),
                Duration::ZERO,
            ),
        }
    }

    /// Classify any decoded image; alpha and grayscale inputs are converted to RGB
    pub fn classify_dynamic(&self, image: &DynamicImage) -> AnalysisResult {
        self.classify(&image.to_rgb8())
    }

    fn prepare(&self, image: &RgbImage, item: usize) -> Result<PreparedImage> {
        let started = Instant::now();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ClassifierError::PerCall(format!(
                "input image is empty ({}x{})",
                width, height
            )));
        }

        let prepared = self.preprocessor.preprocess(image, item);
        Ok(PreparedImage {
            original_size: (width, height),
            image: prepared,
            elapsed: started.elapsed(),
        })
    }

    /// Extraction, validation, consistency check and aggregation for one image
    fn complete(
        &self,
        prepared: &Prepared,
        raws: &[RawDetection],
        captured_at: OffsetDateTime,
        elapsed_before: Duration,
    ) -> AnalysisResult {
        let post_started = Instant::now();
        // Raw detections refer to the analysed image; results use the caller's
        let frame = FrameInfo::rescaled(prepared.original_size, prepared.analysed_size, captured_at);
        let (width, height) = prepared.original_size;

        let outcome = self.extractor.extract_all(raws, &frame);

        let mut detections = Vec::with_capacity(outcome.candidates.len());
        let mut rejected = outcome.below_threshold;
        for candidate in outcome.candidates {
            let validation = self.validator.validate(&candidate);
            if validation.accepted {
                let score = self.validator.score(&candidate);
                detections.push(candidate.into_detection(score));
            } else {
                tracing::debug!(category = %candidate.category, "detection filtered out: {:?}", validation.reasons);
                rejected += 1;
            }
        }

        let report = self.consistency.check(&detections);
        let aggregate = ResultAggregator::aggregate(&detections, width, height);
        let processing_time = secs(elapsed_before + post_started.elapsed());

        tracing::info!(
            detections = detections.len(),
            dominant = ?aggregate.dominant,
            "classification complete in {:.3}s",
            processing_time
        );

        let result = AnalysisResult {
            success: true,
            processing_time,
            model_version: self.model_version().to_string(),
            quality_metrics: aggregate.metrics,
            metadata: AnalysisMetadata {
                analysis_id: Uuid::new_v4(),
                image_width: prepared.analysed_size.0,
                image_height: prepared.analysed_size.1,
                original_width: prepared.original_size.0,
                original_height: prepared.original_size.1,
                confidence_threshold: self.config.confidence_threshold,
                iou_threshold: self.config.iou_threshold,
                ripeness_distribution: aggregate.counts,
                dominant_ripeness: aggregate.dominant,
                consistency_warnings: report.messages(),
                rejected_detections: rejected,
                unmapped_records: outcome.unmapped,
                skipped_records: outcome.skipped,
            },
            detections,
            error_message: None,
        };

        self.monitor.record(result.processing_time, &result.detections);
        result
    }

    fn failed(&self, error: ClassifierError, elapsed: Duration) -> AnalysisResult {
        tracing::error!("classification failed: {}", error);
        let mut result = AnalysisResult::failed(error.to_string(), secs(elapsed), self.model_version());
        result.metadata.confidence_threshold = self.config.confidence_threshold;
        result.metadata.iou_threshold = self.config.iou_threshold;
        result
    }
}

/// Open an image file, guessing the format from its contents
pub fn load_image(path: &Path) -> anyhow::Result<DynamicImage> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image)
}

fn secs(duration: Duration) -> f64 {
    duration.as_secs_f64()
}
