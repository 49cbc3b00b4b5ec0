use ndarray::{Array1, ArrayView1};

/// Numerically stable softmax over a logits vector.
pub(crate) fn softmax(logits: ArrayView1<f32>) -> Array1<f32> {
    if logits.is_empty() {
        return Array1::zeros(0);
    }
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps = logits.mapv(|x| (x - max).exp());
    let sum = exps.sum();
    exps / sum
}

/// Clamps a requested `top_k` into `[1, num_classes]`.
pub(crate) fn clamp_top_k(top_k: usize, num_classes: usize) -> usize {
    top_k.max(1).min(num_classes.max(1))
}

/// Indices of the `k` highest probabilities, highest first.
/// Equal probabilities keep ascending index order.
pub(crate) fn rank(probs: ArrayView1<f32>, k: usize) -> Vec<(usize, f32)> {
    let mut ranked: Vec<(usize, f32)> = probs.iter().cloned().enumerate().collect();
    // stable sort: ties stay in index order
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked.truncate(k);
    ranked
}
