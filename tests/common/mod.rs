#![allow(dead_code)]

mod fixtures;
pub use fixtures::*;

// Re-export commonly used types from ripeness for tests
pub use ripeness::{
    AnalysisResult, CenterBox, ClassId, ClassNames, ClassifierError, Config, Detection,
    InferenceParams, LifecycleState, ModelRuntime, PerStage, Point, RawDetection,
    RipenessClassifier, RipenessStage,
};
