use ort::Error as OrtError;
use std::fmt;

/// Errors raised while loading or running a predictor.
#[derive(Debug)]
pub enum PredictorError {
    /// Tokenizer or weights could not be resolved, or the device could not be bound.
    /// Raised only during construction; no partially loaded predictor is ever returned.
    ModelLoadError(String),
    /// Tokenizer failed to encode an input
    TokenizerError(String),
    /// Forward pass or output extraction failed
    InferenceError(String),
    /// Caller passed an argument the predictor cannot work with
    ValidationError(String),
}

impl PredictorError {
    /// Whether the error happened while building the predictor rather than while serving a call.
    pub fn is_load_failure(&self) -> bool {
        matches!(self, Self::ModelLoadError(_))
    }
}

impl fmt::Display for PredictorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModelLoadError(msg) => write!(f, "Model load error: {}", msg),
            Self::TokenizerError(msg) => write!(f, "Tokenizer error: {}", msg),
            Self::InferenceError(msg) => write!(f, "Inference error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
        }
    }
}

impl std::error::Error for PredictorError {}

// ORT errors reaching this conversion come from session construction;
// forward-pass failures are mapped to InferenceError explicitly at the call site.
impl From<OrtError> for PredictorError {
    fn from(err: OrtError) -> Self {
        PredictorError::ModelLoadError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        let err = PredictorError::InferenceError("out of memory".into());
        assert_eq!(err.to_string(), "Inference error: out of memory");
        assert!(!err.is_load_failure());

        let err = PredictorError::ModelLoadError("tokenizer.json missing".into());
        assert!(err.to_string().starts_with("Model load error"));
        assert!(err.is_load_failure());
    }
}
