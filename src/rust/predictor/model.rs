use std::collections::HashMap;

use log::debug;
use ndarray::{s, Array1, Array2, Ix2, Ix3};
use ort::session::Session;
use ort::value::Tensor;

use super::backend::{ClassificationBackend, HeadStatus};
use super::encoding::EncodedBatch;
use super::error::PredictorError;

const INPUT_IDS: &str = "input_ids";
const ATTENTION_MASK: &str = "attention_mask";
const TOKEN_TYPE_IDS: &str = "token_type_ids";

/// How logits are obtained from the graph output.
#[derive(Debug)]
enum Head {
    /// Output 0 already holds logits `[batch, num_classes]`.
    Stored,
    /// Output 0 holds hidden states `[batch, seq, hidden]`; a linear layer over the
    /// first token's state produces logits.
    Attached { weight: Array2<f32>, bias: Array1<f32> },
}

/// Sequence classifier backed by an ONNX Runtime session.
///
/// The session accepts `input_ids` and `attention_mask` (and optionally `token_type_ids`),
/// each shaped `[batch_size, sequence_length]`.
#[derive(Debug)]
pub struct OnnxClassifier {
    session: Session,
    input_names: Vec<String>,
    head: Head,
    num_classes: usize,
}

impl OnnxClassifier {
    /// Wraps a session whose first output is classification logits.
    ///
    /// The class count is whatever the stored head produces; it is read by running a
    /// probe input through the session.
    pub(crate) fn with_stored_head(
        session: Session,
        probe: &EncodedBatch,
    ) -> Result<Self, PredictorError> {
        let input_names = Self::validate_session(&session)?;
        let mut classifier = Self {
            session,
            input_names,
            head: Head::Stored,
            num_classes: 0,
        };
        let logits = classifier
            .forward(probe)
            .map_err(|e| PredictorError::ModelLoadError(format!("Probe inference failed: {}", e)))?;
        classifier.num_classes = logits.ncols();
        if classifier.num_classes == 0 {
            return Err(PredictorError::ModelLoadError("Model produces no class logits".into()));
        }
        debug!("Stored classification head has {} classes", classifier.num_classes);
        Ok(classifier)
    }

    /// Wraps a base encoder session and attaches a fresh, zero-initialised head with
    /// `num_classes` outputs. Until the head is trained every class scores equally.
    pub(crate) fn with_fresh_head(
        session: Session,
        num_classes: usize,
        probe: &EncodedBatch,
    ) -> Result<Self, PredictorError> {
        if num_classes == 0 {
            return Err(PredictorError::ModelLoadError(
                "Cannot attach a classification head with zero classes".into(),
            ));
        }
        let input_names = Self::validate_session(&session)?;
        let hidden = Self::run_hidden_states(&session, &input_names, probe)
            .map_err(|e| PredictorError::ModelLoadError(format!("Probe inference failed: {}", e)))?;
        let hidden_size = hidden.ncols();
        debug!(
            "Attaching fresh classification head: hidden size {}, {} classes",
            hidden_size, num_classes
        );
        Ok(Self {
            session,
            input_names,
            head: Head::Attached {
                weight: Array2::zeros((num_classes, hidden_size)),
                bias: Array1::zeros(num_classes),
            },
            num_classes,
        })
    }

    /// Checks the graph has the inputs this crate can feed and at least one output.
    fn validate_session(session: &Session) -> Result<Vec<String>, PredictorError> {
        let input_names: Vec<String> = session.inputs.iter().map(|input| input.name.clone()).collect();
        if input_names.len() < 2 {
            return Err(PredictorError::ModelLoadError(format!(
                "Model must have at least 2 inputs (input_ids and attention_mask), found {}",
                input_names.len()
            )));
        }
        if let Some(unknown) = input_names
            .iter()
            .find(|name| ![INPUT_IDS, ATTENTION_MASK, TOKEN_TYPE_IDS].contains(&name.as_str()))
        {
            return Err(PredictorError::ModelLoadError(format!(
                "Unsupported model input '{}'",
                unknown
            )));
        }
        if session.outputs.is_empty() {
            return Err(PredictorError::ModelLoadError(
                "Model must have at least 1 output".to_string(),
            ));
        }
        Ok(input_names)
    }

    fn run_raw(
        session: &Session,
        input_names: &[String],
        batch: &EncodedBatch,
    ) -> Result<ndarray::ArrayD<f32>, PredictorError> {
        let mut input_tensors = HashMap::new();
        for name in input_names {
            let array = match name.as_str() {
                INPUT_IDS => &batch.input_ids,
                ATTENTION_MASK => &batch.attention_mask,
                _ => &batch.token_type_ids,
            };
            let tensor = Tensor::from_array(array.clone()).map_err(|e| {
                PredictorError::InferenceError(format!("Failed to create {} tensor: {}", name, e))
            })?;
            input_tensors.insert(name.as_str(), tensor);
        }

        let outputs = session
            .run(input_tensors)
            .map_err(|e| PredictorError::InferenceError(format!("Failed to run model: {}", e)))?;
        let output_tensor = outputs[0].try_extract_tensor::<f32>().map_err(|e| {
            PredictorError::InferenceError(format!("Failed to extract output tensor: {}", e))
        })?;
        Ok(output_tensor.to_owned())
    }

    /// First-token hidden state for each row, `[batch, hidden]`.
    fn run_hidden_states(
        session: &Session,
        input_names: &[String],
        batch: &EncodedBatch,
    ) -> Result<Array2<f32>, PredictorError> {
        let raw = Self::run_raw(session, input_names, batch)?;
        let states = raw.into_dimensionality::<Ix3>().map_err(|e| {
            PredictorError::InferenceError(format!(
                "Expected hidden states shaped [batch, sequence, hidden]: {}",
                e
            ))
        })?;
        Ok(states.slice(s![.., 0, ..]).to_owned())
    }
}

impl ClassificationBackend for OnnxClassifier {
    fn forward(&self, batch: &EncodedBatch) -> Result<Array2<f32>, PredictorError> {
        match &self.head {
            Head::Stored => {
                let raw = Self::run_raw(&self.session, &self.input_names, batch)?;
                raw.into_dimensionality::<Ix2>().map_err(|e| {
                    PredictorError::InferenceError(format!(
                        "Expected logits shaped [batch, classes]: {}",
                        e
                    ))
                })
            }
            Head::Attached { weight, bias } => {
                let hidden = Self::run_hidden_states(&self.session, &self.input_names, batch)?;
                Ok(hidden.dot(&weight.t()) + bias)
            }
        }
    }

    fn num_classes(&self) -> usize {
        self.num_classes
    }

    fn head_status(&self) -> HeadStatus {
        match self.head {
            Head::Stored => HeadStatus::Pretrained,
            Head::Attached { .. } => HeadStatus::Uninitialized,
        }
    }
}
