pub mod config;
pub mod detection;
pub mod error;
pub mod models;
pub mod pipeline;

pub use config::Config;
pub use detection::RipenessClassifier;
pub use detection::model::{LifecycleState, ModelInfo};
pub use detection::monitor::{PerformanceMonitor, PerformanceSummary};
pub use detection::runtime::{
    CenterBox, ClassId, ClassNames, InferenceParams, ModelLoader, ModelRuntime, RawDetection,
    RecordedLoader, RecordedRuntime, Recording,
};
pub use error::{ClassifierError, Result};
pub use models::{
    AnalysisMetadata, AnalysisResult, BoundingBox, Detection, LegacyDetection, PerStage, Point,
    QualityMetrics, RipenessStage,
};
pub use pipeline::{DebugConfig, Pipeline, PipelineContext, PipelineStep};
