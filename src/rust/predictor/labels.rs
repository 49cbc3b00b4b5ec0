use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::PredictorError;

/// Immutable mapping from class index to a human-readable label.
///
/// Lookups never fail: an index without an entry decodes to its decimal form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LabelMap {
    labels: BTreeMap<usize, String>,
}

impl Default for LabelMap {
    /// `{0: "neutral", 1: "positive", 2: "negative"}`
    fn default() -> Self {
        Self::from_names(["neutral", "positive", "negative"])
    }
}

impl LabelMap {
    /// Builds a map where each name's position is its class index.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            labels: names.into_iter().map(Into::into).enumerate().collect(),
        }
    }

    /// Builds a map from explicit `(index, label)` pairs. Later pairs win on duplicate indices.
    pub fn from_pairs<I, S>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (usize, S)>,
        S: Into<String>,
    {
        Self {
            labels: pairs.into_iter().map(|(idx, label)| (idx, label.into())).collect(),
        }
    }

    /// Returns the label for `index`, or the index itself rendered as a string.
    pub fn label(&self, index: usize) -> String {
        self.labels
            .get(&index)
            .cloned()
            .unwrap_or_else(|| index.to_string())
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Number of classes the map covers: highest mapped index plus one.
    ///
    /// Equal to [`len`](Self::len) unless the map was built from sparse pairs.
    pub fn class_count(&self) -> usize {
        self.labels.keys().next_back().map_or(0, |last| last + 1)
    }

    /// `(index, label)` entries in ascending index order. Unmapped indices are absent.
    pub fn entries(&self) -> Vec<(usize, String)> {
        self.labels
            .iter()
            .map(|(idx, label)| (*idx, label.clone()))
            .collect()
    }
}

impl FromStr for LabelMap {
    type Err = PredictorError;

    /// Parses a comma-separated list such as `neutral,positive,negative`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let names: Vec<&str> = s.split(',').map(str::trim).collect();
        if let Some(pos) = names.iter().position(|name| name.is_empty()) {
            return Err(PredictorError::ValidationError(format!(
                "Label {} cannot be empty",
                pos + 1
            )));
        }
        Ok(Self::from_names(names))
    }
}

impl fmt::Display for LabelMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self
            .labels
            .iter()
            .map(|(idx, label)| format!("{}={}", idx, label))
            .collect();
        write!(f, "{{{}}}", rendered.join(", "))
    }
}
