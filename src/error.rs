use thiserror::Error;

/// Failure taxonomy of the classifier.
///
/// Only `Configuration` ever reaches a caller as an `Err`. The other variants
/// are folded into `AnalysisResult`s or logged and skipped.
#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("classification failed: {0}")]
    PerCall(String),

    #[error("malformed detection: {0}")]
    PerDetection(String),
}

pub type Result<T, E = ClassifierError> = std::result::Result<T, E>;
