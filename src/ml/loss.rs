// ============================================================
// Layer 5 — Masked Sequence Loss
// ============================================================
// Token-level cross-entropy, weighted per position and averaged
// over every weighted position in the batch:
//
//   loss = Σ_{b,t} w[b,t] · -log p(target[b,t]) / (Σ w + ε)
//
// With the default length mask, padding after each reply's
// _EOS contributes nothing.

use burn::{prelude::*, tensor::activation::log_softmax};

const EPSILON: f64 = 1e-12;

/// `logits` `[batch, T, vocab]`, `targets` and `weights` `[batch, T]`.
pub fn sequence_loss<B: Backend>(
    logits:  Tensor<B, 3>,
    targets: Tensor<B, 2, Int>,
    weights: Tensor<B, 2>,
) -> Tensor<B, 1> {
    let [batch, steps, _] = logits.dims();

    let nll = log_softmax(logits, 2)
        .gather(2, targets.reshape([batch, steps, 1]))
        .reshape([batch, steps])
        .neg();

    let total  = (nll * weights.clone()).sum();
    let weight = weights.sum().add_scalar(EPSILON);
    total / weight
}

/// `exp(loss)`, saturating for losses too large to be meaningful.
pub fn perplexity(loss: f64) -> f64 {
    if loss < 300.0 { loss.exp() } else { f64::INFINITY }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::TensorData;

    type TestBackend = NdArray;

    fn scalar(t: Tensor<TestBackend, 1>) -> f64 {
        t.into_scalar().elem::<f64>()
    }

    #[test]
    fn test_uniform_logits_give_log_vocab() {
        let device  = Default::default();
        let logits  = Tensor::<TestBackend, 3>::zeros([2, 3, 8], &device);
        let targets = Tensor::<TestBackend, 2, Int>::ones([2, 3], &device);
        let weights = Tensor::<TestBackend, 2>::ones([2, 3], &device);

        let loss = scalar(sequence_loss(logits, targets, weights));
        assert!((loss - (8.0f64).ln()).abs() < 1e-5);
    }

    #[test]
    fn test_zero_weight_positions_are_ignored() {
        let device = Default::default();
        // position (0, 1) strongly predicts token 0 but the target is 1
        let mut raw = vec![0.0f32; 2 * 2 * 3];
        raw[3] = 50.0;
        let logits  = Tensor::<TestBackend, 3>::from_data(TensorData::new(raw, [2, 2, 3]), &device);
        let targets = Tensor::<TestBackend, 2, Int>::ones([2, 2], &device);

        let all_on  = Tensor::<TestBackend, 2>::ones([2, 2], &device);
        let masked  = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 0.0, 1.0, 1.0], [2, 2]),
            &device,
        );

        let with_bad = scalar(sequence_loss(logits.clone(), targets.clone(), all_on));
        let without  = scalar(sequence_loss(logits, targets, masked));

        assert!(with_bad > 10.0);
        assert!((without - (3.0f64).ln()).abs() < 1e-5);
    }

    #[test]
    fn test_confident_correct_prediction_has_low_loss() {
        let device = Default::default();
        let mut raw = vec![0.0f32; 4];
        raw[2] = 20.0;
        let logits  = Tensor::<TestBackend, 3>::from_data(TensorData::new(raw, [1, 1, 4]), &device);
        let targets = Tensor::<TestBackend, 2, Int>::from_data(TensorData::new(vec![2i64], [1, 1]), &device);
        let weights = Tensor::<TestBackend, 2>::ones([1, 1], &device);

        assert!(scalar(sequence_loss(logits, targets, weights)) < 1e-6);
    }

    #[test]
    fn test_perplexity_saturates() {
        assert!((perplexity(0.0) - 1.0).abs() < 1e-12);
        assert!(perplexity(400.0).is_infinite());
    }
}
