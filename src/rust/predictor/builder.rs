use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{error, info, warn};
use tokenizers::Tokenizer;

use super::backend::ClassificationBackend;
use super::device::{resolve_device, CapabilityReporter, OrtCapabilities};
use super::encoding::{configure_tokenizer, encode, MAX_SEQUENCE_LENGTH};
use super::error::PredictorError;
use super::labels::LabelMap;
use super::model::OnnxClassifier;
use super::predictor::Predictor;
use crate::model_manager::ModelManager;
use crate::runtime::{create_session_builder, RuntimeConfig};

const TOKENIZER_FILE: &str = "tokenizer.json";
const PROBE_TEXT: &str = "Test input to infer model output size";

/// Where the model artifacts come from, which also decides the head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ModelSource {
    /// A directory holding a fine-tuned export; its stored head is used as-is.
    LocalDir { model_path: PathBuf, tokenizer_path: PathBuf },
    /// A hub repository in the model cache holding a base encoder; a fresh head is attached.
    Hub { repo_id: String, model_path: PathBuf, tokenizer_path: PathBuf },
}

impl ModelSource {
    fn location(&self) -> String {
        match self {
            Self::LocalDir { model_path, .. } => model_path.to_string_lossy().to_string(),
            Self::Hub { repo_id, .. } => repo_id.clone(),
        }
    }

    fn paths(&self) -> (&Path, &Path) {
        match self {
            Self::LocalDir { model_path, tokenizer_path } => (model_path, tokenizer_path),
            Self::Hub { model_path, tokenizer_path, .. } => (model_path, tokenizer_path),
        }
    }
}

/// A builder for constructing a [`Predictor`] with a fluent interface.
///
/// Nothing is loaded until [`build`](Self::build) is called, so setters can be chained in
/// any order.
pub struct PredictorBuilder {
    model: Option<String>,
    device: Option<String>,
    label_map: Option<LabelMap>,
    runtime_config: RuntimeConfig,
    capabilities: Box<dyn CapabilityReporter + Send + Sync>,
    manager: Option<ModelManager>,
}

impl Default for PredictorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictorBuilder {
    pub fn new() -> Self {
        Self {
            model: None,
            device: None,
            label_map: None,
            runtime_config: RuntimeConfig::default(),
            capabilities: Box::new(OrtCapabilities),
            manager: None,
        }
    }

    /// Model to load: a local directory, or a hub repository id already in the model cache.
    ///
    /// A local directory must contain `tokenizer.json` and `model.onnx` (or
    /// `onnx/model.onnx`) exported with its classification head. A hub repository is
    /// expected to hold a base encoder; a fresh, untrained head sized to the label map is
    /// attached to it, so its scores are meaningless until that head is fine-tuned.
    pub fn with_model(mut self, identifier: impl Into<String>) -> Self {
        self.model = Some(identifier.into());
        self
    }

    /// Forces a device (`cpu`, `cuda`, `gpu`, `mps`, `coreml`, `accelerator`) instead of probing.
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = Some(device.into());
        self
    }

    pub fn with_label_map(mut self, label_map: LabelMap) -> Self {
        self.label_map = Some(label_map);
        self
    }

    /// Sets the runtime configuration for ONNX model execution
    pub fn with_runtime_config(mut self, config: RuntimeConfig) -> Self {
        self.runtime_config = config;
        self
    }

    /// Replaces the capability reporter used to probe for a device.
    pub fn with_capabilities(mut self, capabilities: impl CapabilityReporter + Send + Sync + 'static) -> Self {
        self.capabilities = Box::new(capabilities);
        self
    }

    /// Cache used to resolve hub identifiers. Defaults to [`ModelManager::new_default`].
    pub fn with_model_manager(mut self, manager: ModelManager) -> Self {
        self.manager = Some(manager);
        self
    }

    pub(crate) fn resolve_source(&self, identifier: &str) -> Result<ModelSource, PredictorError> {
        let dir = Path::new(identifier);
        if dir.is_dir() {
            let tokenizer_path = dir.join(TOKENIZER_FILE);
            if !tokenizer_path.exists() {
                return Err(PredictorError::ModelLoadError(format!(
                    "Tokenizer file not found: {}",
                    tokenizer_path.display()
                )));
            }
            let model_path = [dir.join("model.onnx"), dir.join("onnx").join("model.onnx")]
                .into_iter()
                .find(|path| path.exists())
                .ok_or_else(|| {
                    PredictorError::ModelLoadError(format!(
                        "No model.onnx found in {}",
                        dir.display()
                    ))
                })?;
            return Ok(ModelSource::LocalDir { model_path, tokenizer_path });
        }

        ModelManager::validate_repo_id(identifier)
            .map_err(|e| PredictorError::ModelLoadError(e.to_string()))?;
        let manager = match &self.manager {
            Some(manager) => manager.clone(),
            None => ModelManager::new_default().map_err(|e| {
                PredictorError::ModelLoadError(format!("Failed to create model manager: {}", e))
            })?,
        };
        if !manager.is_model_downloaded(identifier) {
            return Err(PredictorError::ModelLoadError(format!(
                "'{}' is neither a local directory nor a downloaded model. \
                 Download it first using ModelManager::download_model()",
                identifier
            )));
        }
        Ok(ModelSource::Hub {
            repo_id: identifier.to_string(),
            model_path: manager.get_model_path(identifier),
            tokenizer_path: manager.get_tokenizer_path(identifier),
        })
    }

    /// Loads tokenizer and model, binds them to the resolved device and returns the predictor.
    ///
    /// # Errors
    /// Every failure is a `ModelLoadError`: missing identifier, unknown device name,
    /// unresolvable artifacts, an unreadable tokenizer, a graph without the expected
    /// inputs and outputs, or a device that cannot be bound.
    pub fn build(self) -> Result<Predictor, PredictorError> {
        let identifier = self
            .model
            .clone()
            .ok_or_else(|| PredictorError::ModelLoadError("Model identifier must be set".into()))?;

        let device = resolve_device(self.device.as_deref(), self.capabilities.as_ref())
            .map_err(|e| PredictorError::ModelLoadError(e.to_string()))?;
        let label_map = self.label_map.clone().unwrap_or_default();
        let source = self.resolve_source(&identifier)?;
        let (model_path, tokenizer_path) = source.paths();

        info!("Loading model '{}' on device {}", identifier, device);

        let mut tokenizer = Tokenizer::from_file(tokenizer_path).map_err(|e| {
            error!("Failed to load tokenizer: {}", e);
            PredictorError::ModelLoadError(format!("Failed to load tokenizer: {}", e))
        })?;
        configure_tokenizer(&mut tokenizer, MAX_SEQUENCE_LENGTH)?;
        info!("Tokenizer loaded successfully");

        let probe = encode(&tokenizer, PROBE_TEXT)
            .map_err(|e| PredictorError::ModelLoadError(e.to_string()))?;
        let session = create_session_builder(&self.runtime_config, device)?.commit_from_file(model_path)?;

        let backend = match &source {
            ModelSource::LocalDir { .. } => OnnxClassifier::with_stored_head(session, &probe)?,
            ModelSource::Hub { .. } => {
                warn!(
                    "Attaching an untrained classification head to '{}'; scores are not meaningful \
                     until it is fine-tuned",
                    identifier
                );
                OnnxClassifier::with_fresh_head(session, label_map.class_count(), &probe)?
            }
        };
        info!("Model structure validated successfully");

        if backend.num_classes() != label_map.class_count() {
            warn!(
                "Model emits {} classes but the label map covers {}; unmapped classes use their index",
                backend.num_classes(),
                label_map.class_count()
            );
        }

        let policy = self.runtime_config.execution_policy_for(device);
        info!(
            "Predictor ready: {} classes, head {}, {:?} execution",
            backend.num_classes(),
            backend.head_status(),
            policy
        );

        Predictor::from_parts(
            source.location(),
            device,
            tokenizer,
            Arc::new(backend),
            label_map,
            policy,
        )
    }
}
