//! Wire types shared by the HTTP server and the remote client.

use serde::{Deserialize, Serialize};

use crate::predictor::{ClassificationResult, Prediction, DEFAULT_TOP_K};

/// Smallest accepted `top_k`.
pub const MIN_TOP_K: usize = 1;
/// Largest accepted `top_k`.
pub const MAX_TOP_K: usize = 10;

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

/// Body of `POST /classify`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifyRequest {
    /// Text to classify, at least one character
    pub text: String,
    /// Number of labels to return, in `[1, 10]`
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

impl ClassifyRequest {
    pub fn new(text: impl Into<String>, top_k: usize) -> Self {
        Self {
            text: text.into(),
            top_k,
        }
    }

    /// Checks field constraints, returning a message naming the first violation.
    pub fn validate(&self) -> Result<(), String> {
        if self.text.is_empty() {
            return Err("text must contain at least 1 character".to_string());
        }
        if !(MIN_TOP_K..=MAX_TOP_K).contains(&self.top_k) {
            return Err(format!(
                "top_k must be between {} and {}, got {}",
                MIN_TOP_K, MAX_TOP_K, self.top_k
            ));
        }
        Ok(())
    }
}

/// Body returned by `POST /classify`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifyResponse {
    /// The input text, echoed verbatim
    pub text: String,
    pub predictions: Vec<ClassificationResult>,
    /// Seconds spent in the predictor
    #[serde(default)]
    pub processing_time: Option<f64>,
}

impl ClassifyResponse {
    pub fn from_prediction(text: String, prediction: Prediction) -> Self {
        Self {
            text,
            predictions: prediction.predictions,
            processing_time: Some(prediction.processing_time),
        }
    }
}

/// Body returned by `GET /health`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub model_loaded: bool,
}

/// Body returned by `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceMetadata {
    pub message: String,
    pub version: String,
    pub docs: String,
    pub health: String,
}

/// Body of every error response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub detail: String,
}
