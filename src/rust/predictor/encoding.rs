use ndarray::Array2;
use tokenizers::{PaddingParams, PaddingStrategy, Tokenizer, TruncationParams};

use super::error::PredictorError;

/// Inputs longer than this many tokens are truncated.
pub const MAX_SEQUENCE_LENGTH: usize = 256;

/// Model inputs for a batch of encoded texts, each of shape `[batch_size, sequence_length]`.
///
/// `attention_mask` is 1 for real tokens and 0 for padding.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedBatch {
    pub input_ids: Array2<i64>,
    pub attention_mask: Array2<i64>,
    pub token_type_ids: Array2<i64>,
}

impl EncodedBatch {
    pub fn batch_size(&self) -> usize {
        self.input_ids.nrows()
    }

    pub fn sequence_length(&self) -> usize {
        self.input_ids.ncols()
    }
}

/// Enables truncation to `max_length` and longest-in-batch padding on the tokenizer.
pub(crate) fn configure_tokenizer(
    tokenizer: &mut Tokenizer,
    max_length: usize,
) -> Result<(), PredictorError> {
    tokenizer
        .with_truncation(Some(TruncationParams {
            max_length,
            ..Default::default()
        }))
        .map_err(|e| PredictorError::ModelLoadError(format!("Failed to configure truncation: {}", e)))?;

    // keep the pad token the tokenizer ships with, only force the strategy
    let padding = match tokenizer.get_padding() {
        Some(existing) => PaddingParams {
            strategy: PaddingStrategy::BatchLongest,
            ..existing.clone()
        },
        None => PaddingParams::default(),
    };
    tokenizer.with_padding(Some(padding));
    Ok(())
}

/// Encodes a list of texts into one padded batch.
///
/// A text that produces no tokens at all (an empty string with a tokenizer that adds no
/// special tokens) is represented by a single attended padding token, so every row of the
/// batch is a valid minimal sequence.
pub(crate) fn encode_batch(tokenizer: &Tokenizer, texts: &[&str]) -> Result<EncodedBatch, PredictorError> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| PredictorError::TokenizerError(e.to_string()))?;

    let pad_id = tokenizer.get_padding().map(|p| p.pad_id).unwrap_or(0) as i64;
    let seq_len = encodings
        .iter()
        .map(|encoding| encoding.get_ids().len())
        .max()
        .unwrap_or(0)
        .max(1);
    let batch_size = encodings.len();

    let mut input_ids = Array2::from_elem((batch_size, seq_len), pad_id);
    let mut attention_mask = Array2::<i64>::zeros((batch_size, seq_len));
    let mut token_type_ids = Array2::<i64>::zeros((batch_size, seq_len));

    for (row, encoding) in encodings.iter().enumerate() {
        let ids = encoding.get_ids();
        let mask = encoding.get_attention_mask();
        let type_ids = encoding.get_type_ids();
        for col in 0..ids.len() {
            input_ids[[row, col]] = i64::from(ids[col]);
            attention_mask[[row, col]] = i64::from(mask[col]);
            token_type_ids[[row, col]] = i64::from(type_ids[col]);
        }
        // rows that were only padding still attend to their first position
        if attention_mask.row(row).sum() == 0 {
            attention_mask[[row, 0]] = 1;
        }
    }

    Ok(EncodedBatch {
        input_ids,
        attention_mask,
        token_type_ids,
    })
}

/// Encodes a single text as a batch of one.
pub(crate) fn encode(tokenizer: &Tokenizer, text: &str) -> Result<EncodedBatch, PredictorError> {
    encode_batch(tokenizer, &[text])
}
