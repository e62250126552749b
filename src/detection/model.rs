use serde::Serialize;
use sha2::{Digest, Sha256};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use time::OffsetDateTime;

use crate::config::ModelSettings;
use crate::detection::runtime::{ClassNames, ModelLoader, ModelRuntime};
use crate::error::{ClassifierError, Result};

/// Length of the digest prefix used as the model version string
const VERSION_LEN: usize = 8;
pub const UNKNOWN_VERSION: &str = "unknown";

/// Facts about the loaded weights
#[derive(Debug, Clone, Serialize)]
pub struct ModelInfo {
    pub path: PathBuf,
    pub sha256: String,
    #[serde(with = "time::serde::rfc3339")]
    pub loaded_at: OffsetDateTime,
    pub class_names: Option<ClassNames>,
}

impl ModelInfo {
    pub fn version(&self) -> &str {
        &self.sha256[..VERSION_LEN.min(self.sha256.len())]
    }
}

pub struct LoadedModel {
    pub info: ModelInfo,
    runtime: Mutex<Box<dyn ModelRuntime>>,
}

impl LoadedModel {
    pub fn new(info: ModelInfo, runtime: Box<dyn ModelRuntime>) -> Self {
        Self {
            info,
            runtime: Mutex::new(runtime),
        }
    }

    /// Exclusive access to the runtime handle
    pub fn runtime(&self) -> MutexGuard<'_, Box<dyn ModelRuntime>> {
        // A panic inside a runtime leaves no state we rely on
        self.runtime.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for LoadedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadedModel").field("info", &self.info).finish()
    }
}

/// Observable lifecycle phase of a classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleState {
    Uninitialized,
    Loading,
    Ready,
    LoadFailed,
}

/// Uninitialized -> Loading -> Ready | LoadFailed. Ready and LoadFailed are terminal.
#[derive(Debug)]
pub enum ModelState {
    Uninitialized,
    Loading,
    Ready(LoadedModel),
    LoadFailed { reason: String },
}

impl ModelState {
    pub fn kind(&self) -> LifecycleState {
        match self {
            ModelState::Uninitialized => LifecycleState::Uninitialized,
            ModelState::Loading => LifecycleState::Loading,
            ModelState::Ready(_) => LifecycleState::Ready,
            ModelState::LoadFailed { .. } => LifecycleState::LoadFailed,
        }
    }

    /// Run the load transition. Does nothing unless still uninitialized.
    pub fn initialize(&mut self, settings: &ModelSettings, loader: &dyn ModelLoader) {
        if !matches!(self, ModelState::Uninitialized) {
            return;
        }
        *self = ModelState::Loading;

        *self = match load_model(settings, loader) {
            Ok(model) => {
                tracing::info!(
                    path = %model.info.path.display(),
                    version = model.info.version(),
                    "model loaded"
                );
                ModelState::Ready(model)
            }
            Err(e) => {
                tracing::error!("model load failed: {}", e);
                let reason = match e {
                    ClassifierError::ModelUnavailable(reason) => reason,
                    other => other.to_string(),
                };
                ModelState::LoadFailed { reason }
            }
        };
    }
}

/// Resolve the weights path, verify its digest and build the runtime
pub fn load_model(settings: &ModelSettings, loader: &dyn ModelLoader) -> Result<LoadedModel> {
    let path = settings.resolved_weights_path();
    if !path.is_file() {
        return Err(ClassifierError::ModelUnavailable(format!(
            "weights file not found: {}",
            path.display()
        )));
    }

    let sha256 = file_sha256(&path).map_err(|e| {
        ClassifierError::ModelUnavailable(format!("failed to hash {}: {}", path.display(), e))
    })?;
    tracing::info!(path = %path.display(), hash = &sha256[..VERSION_LEN], "loading model");

    if let Some(expected) = &settings.expected_sha256 {
        if !expected.eq_ignore_ascii_case(&sha256) {
            return Err(ClassifierError::ModelUnavailable(format!(
                "weights digest mismatch: expected {}, found {}",
                expected, sha256
            )));
        }
    }

    let runtime = loader
        .load(&path)
        .map_err(|e| ClassifierError::ModelUnavailable(format!("{:#}", e)))?;

    let class_names = runtime.class_names();
    if let Some(names) = &class_names {
        if names.len() != 4 {
            tracing::warn!("expected 4 model classes, found {}", names.len());
        }
    }

    let info = ModelInfo {
        path,
        sha256,
        loaded_at: OffsetDateTime::now_utc(),
        class_names,
    };
    Ok(LoadedModel::new(info, runtime))
}

/// Hex SHA-256 of a file, streamed in fixed-size chunks
pub fn file_sha256(path: &Path) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}
