use serde::{Deserialize, Serialize};

mod backend;
pub mod builder;
mod device;
mod encoding;
mod error;
mod labels;
mod model;
#[allow(clippy::module_inception)]
mod predictor;
mod scoring;

#[cfg(test)]
pub(crate) mod test_support;

pub use backend::{ClassificationBackend, HeadStatus};
pub use builder::PredictorBuilder;
pub use device::{probe_device, resolve_device, CapabilityReporter, DeviceKind, OrtCapabilities};
pub use encoding::{EncodedBatch, MAX_SEQUENCE_LENGTH};
pub use error::PredictorError;
pub use labels::LabelMap;
pub use model::OnnxClassifier;
pub use predictor::{Predictor, DEFAULT_TOP_K};

use crate::runtime::ExecutionPolicy;

/// One scored label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub label: String,
    /// Probability in `[0.0, 1.0]`
    pub score: f32,
}

/// Output of a single `predict` call.
#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// Highest score first
    pub predictions: Vec<ClassificationResult>,
    /// Wall-clock seconds spent tokenizing, running the model and ranking
    pub processing_time: f64,
}

/// Information about the current state and configuration of a predictor
#[derive(Debug, Clone, Serialize)]
pub struct PredictorInfo {
    /// Model directory or hub repository the predictor was loaded from
    pub model_location: String,
    pub device: DeviceKind,
    pub head_status: HeadStatus,
    /// Number of logits the model emits
    pub num_classes: usize,
    /// Label for each class index
    pub labels: Vec<String>,
    #[serde(skip)]
    pub execution_policy: ExecutionPolicy,
}
