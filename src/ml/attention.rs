// ============================================================
// Layer 5 — Luong Attention
// ============================================================
// Multiplicative attention over the encoder outputs:
//
//   keys        = W_m · memory                       (once per batch)
//   score_t     = query · key_t                      (masked past length)
//   alignments  = softmax(score)
//   context     = Σ_t alignments_t · memory_t
//   attention   = W_a · [cell_output; context]
//
// The attention vector is both the decoder output for this step
// and part of the decoder input for the next one.
//
// Reference: Luong et al. (2015) Effective Approaches to
//            Attention-based Neural Machine Translation

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::activation::softmax,
};

/// Score given to padded memory positions before the softmax.
const MASKED_SCORE: f32 = -1.0e9;

#[derive(Config, Debug)]
pub struct LuongAttentionConfig {
    /// Width of each encoder output
    pub memory_size:    usize,
    /// Width of the decoder cell output (the query)
    pub query_size:     usize,
    /// Width of the produced attention vector
    pub attention_size: usize,
}

impl LuongAttentionConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> LuongAttention<B> {
        LuongAttention {
            memory_layer: LinearConfig::new(self.memory_size, self.query_size)
                .with_bias(false)
                .init(device),
            attention_layer: LinearConfig::new(self.query_size + self.memory_size, self.attention_size)
                .with_bias(false)
                .init(device),
            attention_size: self.attention_size,
        }
    }
}

#[derive(Module, Debug)]
pub struct LuongAttention<B: Backend> {
    pub memory_layer:    Linear<B>,
    pub attention_layer: Linear<B>,
    pub attention_size:  usize,
}

/// Encoder outputs prepared for repeated lookups during decoding.
#[derive(Debug, Clone)]
pub struct AttentionMemory<B: Backend> {
    /// `[batch, src_len, memory_size]`
    pub values: Tensor<B, 3>,
    /// `[batch, src_len, query_size]`
    pub keys:   Tensor<B, 3>,
    /// `[batch, src_len]`, true on padding
    pub padded: Tensor<B, 2, Bool>,
}

impl<B: Backend> LuongAttention<B> {
    /// `memory_mask` is `[batch, src_len]` with 1.0 on real tokens.
    pub fn prepare(&self, values: Tensor<B, 3>, memory_mask: Tensor<B, 2>) -> AttentionMemory<B> {
        let keys = self.memory_layer.forward(values.clone());
        AttentionMemory {
            values,
            keys,
            padded: memory_mask.lower_elem(0.5),
        }
    }

    /// Attention vector all-zero, used before the first decoder step.
    pub fn zero_attention(&self, batch_size: usize, device: &B::Device) -> Tensor<B, 2> {
        Tensor::zeros([batch_size, self.attention_size], device)
    }

    /// `[batch, src_len]` probabilities, 0 on padded positions.
    pub fn alignments(&self, query: Tensor<B, 2>, memory: &AttentionMemory<B>) -> Tensor<B, 2> {
        let [batch, width] = query.dims();
        let [_, src_len, _] = memory.keys.dims();

        let scores = memory
            .keys
            .clone()
            .matmul(query.reshape([batch, width, 1]))
            .reshape([batch, src_len])
            .mask_fill(memory.padded.clone(), MASKED_SCORE);

        softmax(scores, 1)
    }

    /// Weighted sum of the memory values, `[batch, memory_size]`.
    pub fn context(&self, alignments: Tensor<B, 2>, memory: &AttentionMemory<B>) -> Tensor<B, 2> {
        let [batch, src_len] = alignments.dims();
        let [_, _, memory_size] = memory.values.dims();

        alignments
            .reshape([batch, 1, src_len])
            .matmul(memory.values.clone())
            .reshape([batch, memory_size])
    }

    /// Returns the attention vector and the alignments used to build it.
    pub fn attend(
        &self,
        cell_output: Tensor<B, 2>,
        memory:      &AttentionMemory<B>,
    ) -> (Tensor<B, 2>, Tensor<B, 2>) {
        let alignments = self.alignments(cell_output.clone(), memory);
        let context    = self.context(alignments.clone(), memory);
        let attention  = self.attention_layer.forward(Tensor::cat(vec![cell_output, context], 1));
        (attention, alignments)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;
    use burn::tensor::{Distribution, TensorData};

    type TestBackend = NdArray;

    fn setup() -> (LuongAttention<TestBackend>, AttentionMemory<TestBackend>) {
        let device    = Default::default();
        let attention = LuongAttentionConfig::new(6, 4, 5).init::<TestBackend>(&device);
        let values    = Tensor::<TestBackend, 3>::random([2, 3, 6], Distribution::Default, &device);
        let mask = Tensor::<TestBackend, 2>::from_data(
            TensorData::new(vec![1.0f32, 1.0, 1.0, 1.0, 0.0, 0.0], [2, 3]),
            &device,
        );
        let memory = attention.prepare(values, mask);
        (attention, memory)
    }

    #[test]
    fn test_alignments_sum_to_one_and_skip_padding() {
        let (attention, memory) = setup();
        let query = Tensor::<TestBackend, 2>::random([2, 4], Distribution::Default, &Default::default());

        let weights: Vec<f32> = attention
            .alignments(query, &memory)
            .into_data()
            .iter::<f32>()
            .collect();

        let first: f32  = weights[0..3].iter().sum();
        let second: f32 = weights[3..6].iter().sum();
        assert!((first - 1.0).abs() < 1e-5);
        assert!((second - 1.0).abs() < 1e-5);
        // second row only has one real position
        assert!((weights[3] - 1.0).abs() < 1e-5);
        assert!(weights[4].abs() < 1e-6 && weights[5].abs() < 1e-6);
    }

    #[test]
    fn test_context_of_single_position_is_that_value() {
        let (attention, memory) = setup();
        let query = Tensor::<TestBackend, 2>::zeros([2, 4], &Default::default());
        let alignments = attention.alignments(query, &memory);
        let context: Vec<f32> = attention.context(alignments, &memory).into_data().iter::<f32>().collect();

        let first_value: Vec<f32> = memory
            .values
            .clone()
            .slice([1..2, 0..1, 0..6])
            .into_data()
            .iter::<f32>()
            .collect();
        for (c, v) in context[6..].iter().zip(&first_value) {
            assert!((c - v).abs() < 1e-5);
        }
    }

    #[test]
    fn test_attend_shapes() {
        let (attention, memory) = setup();
        let query = Tensor::<TestBackend, 2>::ones([2, 4], &Default::default());
        let (vector, alignments) = attention.attend(query, &memory);
        assert_eq!(vector.dims(), [2, 5]);
        assert_eq!(alignments.dims(), [2, 3]);
    }
}
