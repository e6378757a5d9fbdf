// ============================================================
// Layer 4 — Step Feeds and Tensor Batches
// ============================================================
// Two stages, split so the first one is testable without Burn:
//
//   pad_batch()       Vec<TokenPair>  →  StepInput   (plain Vecs)
//   Seq2SeqBatcher    StepInput       →  Seq2SeqBatch (tensors)
//
// Decoder rows are laid out as
//
//   _GO w1 w2 .. wn _EOS _PAD .. _PAD          (width = bucket.decoder_size)
//
// with decoder_inputs_length = n. The decoder is unrolled for
// T = max(n) + 1 steps:
//
//   inputs  = columns 0..T     (_GO w1 .. wn)
//   targets = columns 1..T+1   (w1 .. wn _EOS)
//   mask    = 1 for t < n + 1, else 0

use burn::{prelude::*, tensor::TensorData};

use crate::domain::bucket::Bucket;
use crate::domain::dialogue::TokenPair;
use crate::domain::vocab::{EOS_ID, GO_ID, PAD_ID};
use crate::ml::error::{ModelError, ModelResult};

// ─── StepInput ────────────────────────────────────────────────────────────────
/// The feed accepted by `Seq2SeqSession::step`, batch-major.
#[derive(Debug, Clone, PartialEq)]
pub struct StepInput {
    /// `[batch][enc_width]` query token ids, PAD-padded
    pub encoder_inputs:        Vec<Vec<u32>>,
    /// `[batch]` number of real query tokens per row
    pub encoder_inputs_length: Vec<usize>,
    /// `[batch][dec_width]` `_GO w.. _EOS _PAD..` rows
    pub decoder_inputs:        Vec<Vec<u32>>,
    /// `[batch]` reply length without `_GO` / `_EOS`
    pub decoder_inputs_length: Vec<usize>,
    /// Optional `[batch][max_decode_len]` loss weights; the length
    /// mask is used when absent
    pub target_weights:        Option<Vec<Vec<f32>>>,
}

impl StepInput {
    pub fn batch_size(&self) -> usize {
        self.encoder_inputs.len()
    }

    /// Number of decoder steps: the longest reply plus its `_EOS`.
    pub fn max_decode_len(&self) -> usize {
        self.decoder_inputs_length.iter().copied().max().unwrap_or(0) + 1
    }

    /// Feed for greedy decoding: queries only, the decoder side just
    /// caps the number of generated tokens at `bucket.max_reply_len() + 1`.
    pub fn for_inference(queries: &[Vec<u32>], bucket: Bucket) -> Self {
        let mut encoder_inputs        = Vec::with_capacity(queries.len());
        let mut encoder_inputs_length = Vec::with_capacity(queries.len());

        for query in queries {
            let query = &query[..query.len().min(bucket.encoder_size)];
            let mut row = query.to_vec();
            row.resize(bucket.encoder_size, PAD_ID);
            encoder_inputs.push(row);
            encoder_inputs_length.push(query.len());
        }

        let mut go_row = vec![PAD_ID; bucket.decoder_size];
        go_row[0] = GO_ID;

        Self {
            encoder_inputs,
            encoder_inputs_length,
            decoder_inputs:        vec![go_row; queries.len()],
            decoder_inputs_length: vec![bucket.max_reply_len(); queries.len()],
            target_weights:        None,
        }
    }

    /// Check every shape and id before the feed is turned into tensors.
    pub fn validate(&self, input_vocab_size: usize, target_vocab_size: usize) -> ModelResult<()> {
        let batch = self.batch_size();
        if batch == 0 {
            return Err(ModelError::EmptyBatch);
        }

        let check_rows = |field: &'static str, found: usize| {
            if found == batch {
                Ok(())
            } else {
                Err(ModelError::BatchSizeMismatch { field, expected: batch, found })
            }
        };
        check_rows("encoder_inputs_length", self.encoder_inputs_length.len())?;
        check_rows("decoder_inputs",        self.decoder_inputs.len())?;
        check_rows("decoder_inputs_length", self.decoder_inputs_length.len())?;

        let enc_width = check_matrix("encoder_inputs", &self.encoder_inputs, input_vocab_size)?;
        let dec_width = check_matrix("decoder_inputs", &self.decoder_inputs, target_vocab_size)?;

        for (row, &length) in self.encoder_inputs_length.iter().enumerate() {
            if length == 0 || length > enc_width {
                return Err(ModelError::LengthOutOfRange {
                    field: "encoder_inputs_length", row, length, min: 1, max: enc_width,
                });
            }
        }

        // _GO and _EOS need two extra columns
        let max_reply = dec_width.saturating_sub(2);
        for (row, &length) in self.decoder_inputs_length.iter().enumerate() {
            if dec_width < 2 || length > max_reply {
                return Err(ModelError::LengthOutOfRange {
                    field: "decoder_inputs_length", row, length, min: 0, max: max_reply,
                });
            }
        }

        if let Some(weights) = &self.target_weights {
            let cols = self.max_decode_len();
            if weights.len() != batch {
                return Err(ModelError::BatchSizeMismatch {
                    field: "target_weights", expected: batch, found: weights.len(),
                });
            }
            if let Some((row, w)) = weights.iter().enumerate().find(|(_, w)| w.len() != cols) {
                return Err(ModelError::TargetWeightsShape {
                    rows: batch, cols, row, found: w.len(),
                });
            }
        }

        Ok(())
    }
}

/// Returns the common row width, or the first shape / vocabulary error.
fn check_matrix(field: &'static str, rows: &[Vec<u32>], vocab_size: usize) -> ModelResult<usize> {
    let width = rows.first().map(Vec::len).unwrap_or(0);
    for (row, values) in rows.iter().enumerate() {
        if values.len() != width {
            return Err(ModelError::RaggedRow { field, row, expected: width, found: values.len() });
        }
        if let Some(&token) = values.iter().find(|&&t| t as usize >= vocab_size) {
            return Err(ModelError::TokenOutOfVocab { field, token, vocab_size });
        }
    }
    Ok(width)
}

// ─── pad_batch ────────────────────────────────────────────────────────────────
/// Lay out a batch of pairs in the shape of `bucket`.
///
/// Pairs longer than the bucket are truncated; the bucketing stage
/// normally guarantees they fit.
pub fn pad_batch(pairs: &[TokenPair], bucket: Bucket) -> StepInput {
    let mut encoder_inputs        = Vec::with_capacity(pairs.len());
    let mut encoder_inputs_length = Vec::with_capacity(pairs.len());
    let mut decoder_inputs        = Vec::with_capacity(pairs.len());
    let mut decoder_inputs_length = Vec::with_capacity(pairs.len());

    for pair in pairs {
        let query = &pair.query[..pair.query.len().min(bucket.encoder_size)];
        let mut enc = query.to_vec();
        enc.resize(bucket.encoder_size, PAD_ID);
        encoder_inputs.push(enc);
        encoder_inputs_length.push(query.len());

        let reply = &pair.reply[..pair.reply.len().min(bucket.max_reply_len())];
        let mut dec = Vec::with_capacity(bucket.decoder_size);
        dec.push(GO_ID);
        dec.extend_from_slice(reply);
        dec.push(EOS_ID);
        dec.resize(bucket.decoder_size, PAD_ID);
        decoder_inputs.push(dec);
        decoder_inputs_length.push(reply.len());
    }

    StepInput {
        encoder_inputs,
        encoder_inputs_length,
        decoder_inputs,
        decoder_inputs_length,
        target_weights: None,
    }
}

// ─── Seq2SeqBatch ─────────────────────────────────────────────────────────────
/// Tensors for one step. Float masks hold 1.0 on real positions.
#[derive(Debug, Clone)]
pub struct Seq2SeqBatch<B: Backend> {
    /// `[batch, enc_width]`
    pub encoder_inputs:  Tensor<B, 2, Int>,
    /// `[batch, enc_width]`
    pub encoder_mask:    Tensor<B, 2>,
    /// `[batch, T]` — `_GO w1 .. wn`
    pub decoder_inputs:  Tensor<B, 2, Int>,
    /// `[batch, T]` — `w1 .. wn _EOS`
    pub decoder_targets: Tensor<B, 2, Int>,
    /// `[batch, T]` — 1.0 while `t < n + 1`
    pub decoder_mask:    Tensor<B, 2>,
    /// `[batch, T]` — loss weights
    pub target_weights:  Tensor<B, 2>,
    /// `T`
    pub max_decode_len:  usize,
}

// ─── Seq2SeqBatcher ───────────────────────────────────────────────────────────
/// Builds tensors on a fixed device from already validated feeds.
#[derive(Clone, Debug)]
pub struct Seq2SeqBatcher<B: Backend> {
    pub device: B::Device,
}

impl<B: Backend> Seq2SeqBatcher<B> {
    pub fn new(device: B::Device) -> Self {
        Self { device }
    }

    /// `input` must have passed `StepInput::validate`.
    pub fn batch(&self, input: &StepInput) -> Seq2SeqBatch<B> {
        let batch     = input.batch_size();
        let enc_width = input.encoder_inputs[0].len();
        let steps     = input.max_decode_len();

        let enc_flat: Vec<i64> = input
            .encoder_inputs
            .iter()
            .flat_map(|row| row.iter().map(|&t| t as i64))
            .collect();
        let enc_mask = length_mask(&input.encoder_inputs_length, enc_width, 0);

        let mut dec_in  = Vec::with_capacity(batch * steps);
        let mut dec_tgt = Vec::with_capacity(batch * steps);
        for row in &input.decoder_inputs {
            dec_in.extend(row[..steps].iter().map(|&t| t as i64));
            dec_tgt.extend(row[1..=steps].iter().map(|&t| t as i64));
        }
        let dec_mask = length_mask(&input.decoder_inputs_length, steps, 1);

        let weights = match &input.target_weights {
            Some(w) => w.iter().flatten().copied().collect(),
            None    => dec_mask.clone(),
        };

        Seq2SeqBatch {
            encoder_inputs:  self.int_tensor(enc_flat, [batch, enc_width]),
            encoder_mask:    self.float_tensor(enc_mask, [batch, enc_width]),
            decoder_inputs:  self.int_tensor(dec_in, [batch, steps]),
            decoder_targets: self.int_tensor(dec_tgt, [batch, steps]),
            decoder_mask:    self.float_tensor(dec_mask, [batch, steps]),
            target_weights:  self.float_tensor(weights, [batch, steps]),
            max_decode_len:  steps,
        }
    }

    fn int_tensor(&self, values: Vec<i64>, shape: [usize; 2]) -> Tensor<B, 2, Int> {
        Tensor::from_data(TensorData::new(values, shape), &self.device)
    }

    fn float_tensor(&self, values: Vec<f32>, shape: [usize; 2]) -> Tensor<B, 2> {
        Tensor::from_data(TensorData::new(values, shape), &self.device)
    }
}

/// Row-major `[lengths.len(), width]` mask with 1.0 where `t < len + extra`.
fn length_mask(lengths: &[usize], width: usize, extra: usize) -> Vec<f32> {
    lengths
        .iter()
        .flat_map(|&len| (0..width).map(move |t| if t < len + extra { 1.0 } else { 0.0 }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    fn bucket() -> Bucket {
        Bucket::new(4, 6)
    }

    fn feed() -> StepInput {
        pad_batch(
            &[
                TokenPair::new(vec![5, 6], vec![7, 8, 9]),
                TokenPair::new(vec![4], vec![10]),
            ],
            bucket(),
        )
    }

    #[test]
    fn test_pad_batch_layout() {
        let input = feed();
        assert_eq!(input.encoder_inputs, vec![vec![5, 6, 0, 0], vec![4, 0, 0, 0]]);
        assert_eq!(input.encoder_inputs_length, vec![2, 1]);
        assert_eq!(input.decoder_inputs, vec![
            vec![GO_ID, 7, 8, 9, EOS_ID, PAD_ID],
            vec![GO_ID, 10, EOS_ID, PAD_ID, PAD_ID, PAD_ID],
        ]);
        assert_eq!(input.decoder_inputs_length, vec![3, 1]);
        assert_eq!(input.max_decode_len(), 4);
    }

    #[test]
    fn test_pad_batch_truncates_long_pairs() {
        let input = pad_batch(&[TokenPair::new(vec![5; 9], vec![6; 9])], bucket());
        assert_eq!(input.encoder_inputs_length, vec![4]);
        assert_eq!(input.decoder_inputs_length, vec![4]);
        assert_eq!(input.decoder_inputs[0][5], EOS_ID);
    }

    #[test]
    fn test_validate_accepts_padded_feed() {
        assert_eq!(feed().validate(20, 20), Ok(()));
    }

    #[test]
    fn test_validate_rejects_empty_batch() {
        let input = pad_batch(&[], bucket());
        assert_eq!(input.validate(20, 20), Err(ModelError::EmptyBatch));
    }

    #[test]
    fn test_validate_rejects_length_mismatch() {
        let mut input = feed();
        input.decoder_inputs_length.pop();
        assert!(matches!(
            input.validate(20, 20),
            Err(ModelError::BatchSizeMismatch { field: "decoder_inputs_length", .. })
        ));
    }

    #[test]
    fn test_validate_rejects_ragged_rows() {
        let mut input = feed();
        input.encoder_inputs[1].push(0);
        assert!(matches!(input.validate(20, 20), Err(ModelError::RaggedRow { row: 1, .. })));
    }

    #[test]
    fn test_validate_rejects_out_of_vocab_token() {
        assert!(matches!(
            feed().validate(6, 20),
            Err(ModelError::TokenOutOfVocab { field: "encoder_inputs", token: 6, .. })
        ));
    }

    #[test]
    fn test_validate_rejects_bad_lengths() {
        let mut input = feed();
        input.encoder_inputs_length[0] = 0;
        assert!(matches!(input.validate(20, 20), Err(ModelError::LengthOutOfRange { .. })));

        let mut input = feed();
        input.decoder_inputs_length[1] = 5;
        assert!(matches!(
            input.validate(20, 20),
            Err(ModelError::LengthOutOfRange { field: "decoder_inputs_length", max: 4, .. })
        ));
    }

    #[test]
    fn test_validate_checks_target_weight_shape() {
        let mut input = feed();
        input.target_weights = Some(vec![vec![1.0; 4], vec![1.0; 3]]);
        assert!(matches!(
            input.validate(20, 20),
            Err(ModelError::TargetWeightsShape { row: 1, cols: 4, .. })
        ));
    }

    #[test]
    fn test_inference_feed_caps_decoding() {
        let input = StepInput::for_inference(&[vec![5, 6, 7, 8, 9]], bucket());
        assert_eq!(input.encoder_inputs, vec![vec![5, 6, 7, 8]]);
        assert_eq!(input.encoder_inputs_length, vec![4]);
        assert_eq!(input.max_decode_len(), 5);
        assert_eq!(input.validate(20, 20), Ok(()));
    }

    #[test]
    fn test_batcher_shifts_targets_and_masks() {
        let batcher = Seq2SeqBatcher::<TestBackend>::new(Default::default());
        let batch   = batcher.batch(&feed());

        assert_eq!(batch.max_decode_len, 4);
        assert_eq!(batch.decoder_inputs.dims(), [2, 4]);

        let inputs: Vec<i64> = batch.decoder_inputs.into_data().iter::<i64>().collect();
        assert_eq!(inputs, vec![1, 7, 8, 9, 1, 10, 2, 0]);

        let targets: Vec<i64> = batch.decoder_targets.into_data().iter::<i64>().collect();
        assert_eq!(targets, vec![7, 8, 9, 2, 10, 2, 0, 0]);

        let mask: Vec<f32> = batch.decoder_mask.into_data().iter::<f32>().collect();
        assert_eq!(mask, vec![1.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 0.0]);

        let enc_mask: Vec<f32> = batch.encoder_mask.into_data().iter::<f32>().collect();
        assert_eq!(enc_mask, vec![1.0, 1.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0]);
    }
}
