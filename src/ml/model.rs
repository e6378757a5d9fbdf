// ============================================================
// Layer 5 — Attention Seq2Seq Model (Burn)
// ============================================================
// query ids ─► embedding ─► stacked encoder ─► outputs ─┐
//                                                       │ memory
// reply ids ─► embedding ─► [x; attention] ─► stacked decoder
//                                   ▲              │
//                                   │       Luong attention
//                                   └──────────────┤
//                                          output projection ─► logits
//
// The decoder starts from a zero state: the encoder reaches it
// only through attention.

use burn::{
    nn::{Embedding, Initializer, Linear, LinearConfig},
    prelude::*,
    tensor::TensorData,
};

use crate::data::batcher::{Seq2SeqBatch, Seq2SeqBatcher, StepInput};
use crate::domain::vocab::{EOS_ID, GO_ID, PAD_ID, SPECIAL_TOKENS};
use crate::ml::attention::{AttentionMemory, LuongAttention, LuongAttentionConfig};
use crate::ml::cell::{blend, RnnState, StackedCell, StackedCellConfig};
use crate::ml::error::{ModelError, ModelResult};

#[derive(Config, Debug)]
pub struct Seq2SeqConfig {
    pub input_vocab_size:  usize,
    pub target_vocab_size: usize,
    pub enc_hidden_size:   usize,
    pub enc_num_layers:    usize,
    pub dec_hidden_size:   usize,
    pub dec_num_layers:    usize,
    /// LSTM cells when true, GRU cells otherwise
    #[config(default = true)]
    pub use_lstm:          bool,
}

impl Seq2SeqConfig {
    pub fn validate(&self) -> ModelResult<()> {
        let min_vocab = SPECIAL_TOKENS.len() + 1;
        if self.input_vocab_size < min_vocab || self.target_vocab_size < min_vocab {
            return Err(ModelError::InvalidConfig(format!(
                "vocabularies need at least {min_vocab} entries (special tokens plus one word)"
            )));
        }
        let sizes = [
            ("enc_hidden_size", self.enc_hidden_size),
            ("enc_num_layers",  self.enc_num_layers),
            ("dec_hidden_size", self.dec_hidden_size),
            ("dec_num_layers",  self.dec_num_layers),
        ];
        if let Some((name, _)) = sizes.iter().find(|(_, v)| *v == 0) {
            return Err(ModelError::InvalidConfig(format!("{name} must be positive")));
        }
        Ok(())
    }

    pub fn init<B: Backend>(&self, device: &B::Device) -> ChatSeq2SeqModel<B> {
        let enc_embedding = xavier_embedding(self.input_vocab_size, self.enc_hidden_size, device);
        let dec_embedding = xavier_embedding(self.target_vocab_size, self.dec_hidden_size, device);

        let encoder = StackedCellConfig::new(self.enc_hidden_size, self.enc_hidden_size, self.enc_num_layers)
            .with_use_lstm(self.use_lstm)
            .init(device);
        // decoder input is [embedded token; previous attention]
        let decoder = StackedCellConfig::new(2 * self.dec_hidden_size, self.dec_hidden_size, self.dec_num_layers)
            .with_use_lstm(self.use_lstm)
            .init(device);

        let attention = LuongAttentionConfig::new(self.enc_hidden_size, self.dec_hidden_size, self.dec_hidden_size)
            .init(device);
        let output_projection = LinearConfig::new(self.dec_hidden_size, self.target_vocab_size).init(device);

        ChatSeq2SeqModel {
            enc_embedding,
            dec_embedding,
            encoder,
            decoder,
            attention,
            output_projection,
            input_vocab_size:  self.input_vocab_size,
            target_vocab_size: self.target_vocab_size,
        }
    }
}

/// `[vocab, width]` table, Xavier-uniform over both fans.
///
/// `EmbeddingConfig::init` gives the initializer no fan sizes, so the
/// weight is built here and wrapped directly.
fn xavier_embedding<B: Backend>(vocab: usize, width: usize, device: &B::Device) -> Embedding<B> {
    let weight = Initializer::XavierUniform { gain: 1.0 }
        .init_with([vocab, width], Some(vocab), Some(width), device);
    Embedding { weight }
}

#[derive(Module, Debug)]
pub struct ChatSeq2SeqModel<B: Backend> {
    pub enc_embedding:     Embedding<B>,
    pub dec_embedding:     Embedding<B>,
    pub encoder:           StackedCell<B>,
    pub decoder:           StackedCell<B>,
    pub attention:         LuongAttention<B>,
    pub output_projection: Linear<B>,
    pub input_vocab_size:  usize,
    pub target_vocab_size: usize,
}

pub struct EncoderOutput<B: Backend> {
    /// `[batch, src_len, enc_hidden]`, zero past each row's length
    pub outputs: Tensor<B, 3>,
    /// State after each row's last real token
    pub state:   RnnState<B>,
}

pub struct TrainOutput<B: Backend> {
    /// `[batch, T, target_vocab]`, zero on finished steps
    pub logits:        Tensor<B, 3>,
    pub encoder_state: RnnState<B>,
    pub decoder_state: RnnState<B>,
}

/// Carried between decoder steps: cell state plus the last attention vector.
#[derive(Debug, Clone)]
struct DecoderState<B: Backend> {
    cells:     RnnState<B>,
    attention: Tensor<B, 2>,
}

impl<B: Backend> ChatSeq2SeqModel<B> {
    /// `mask` is `[batch, src_len]` with 1.0 on real tokens.
    pub fn encode(&self, inputs: Tensor<B, 2, Int>, mask: Tensor<B, 2>) -> EncoderOutput<B> {
        let [batch, src_len] = inputs.dims();
        let device   = inputs.device();
        let embedded = self.enc_embedding.forward(inputs);
        let [_, _, width] = embedded.dims();

        let mut state   = self.encoder.zero_state(batch, &device);
        let mut outputs = Vec::with_capacity(src_len);
        for t in 0..src_len {
            let x = embedded.clone().slice([0..batch, t..t + 1, 0..width]).reshape([batch, width]);
            let m = mask.clone().slice([0..batch, t..t + 1]);
            let (out, next) = self.encoder.step_masked(x, &state, &m);
            outputs.push(out);
            state = next;
        }

        EncoderOutput {
            outputs: Tensor::stack::<3>(outputs, 1),
            state,
        }
    }

    fn decoder_step(
        &self,
        embedded: Tensor<B, 2>,
        state:    &DecoderState<B>,
        memory:   &AttentionMemory<B>,
    ) -> (Tensor<B, 2>, DecoderState<B>) {
        let input = Tensor::cat(vec![embedded, state.attention.clone()], 1);
        let (cell_output, cells) = self.decoder.step(input, &state.cells);
        let (attention, _) = self.attention.attend(cell_output, memory);
        let logits = self.output_projection.forward(attention.clone());
        (logits, DecoderState { cells, attention })
    }

    fn initial_decoder_state(&self, batch: usize, device: &B::Device) -> DecoderState<B> {
        DecoderState {
            cells:     self.decoder.zero_state(batch, device),
            attention: self.attention.zero_attention(batch, device),
        }
    }

    /// Teacher-forced pass over `batch.max_decode_len` decoder steps.
    pub fn forward_train(&self, batch: &Seq2SeqBatch<B>) -> TrainOutput<B> {
        let encoded = self.encode(batch.encoder_inputs.clone(), batch.encoder_mask.clone());
        let memory  = self.attention.prepare(encoded.outputs, batch.encoder_mask.clone());

        let [size, steps] = batch.decoder_inputs.dims();
        let device   = batch.decoder_inputs.device();
        let embedded = self.dec_embedding.forward(batch.decoder_inputs.clone());
        let [_, _, width] = embedded.dims();

        let mut state  = self.initial_decoder_state(size, &device);
        let mut logits = Vec::with_capacity(steps);
        for t in 0..steps {
            let x = embedded.clone().slice([0..size, t..t + 1, 0..width]).reshape([size, width]);
            let m = batch.decoder_mask.clone().slice([0..size, t..t + 1]);

            let (step_logits, next) = self.decoder_step(x, &state, &memory);
            // finished rows copy their state through and emit zeros
            state = DecoderState {
                cells:     next.cells.select(state.cells, &m),
                attention: blend(next.attention, state.attention, &m),
            };
            logits.push(step_logits * m);
        }

        TrainOutput {
            logits:        Tensor::stack::<3>(logits, 1),
            encoder_state: encoded.state,
            decoder_state: state.cells,
        }
    }

    /// Greedy decoding from `_GO`.
    ///
    /// A row is finished once it emits `_EOS`; later steps report
    /// `_PAD` for it. Decoding stops when all rows are finished or
    /// after `max_iterations` steps. Returns `[batch][steps]` ids.
    pub fn greedy_decode(
        &self,
        inputs:         Tensor<B, 2, Int>,
        mask:           Tensor<B, 2>,
        max_iterations: usize,
    ) -> Vec<Vec<u32>> {
        let [batch, _] = inputs.dims();
        let device  = inputs.device();
        let encoded = self.encode(inputs, mask.clone());
        let memory  = self.attention.prepare(encoded.outputs, mask);

        let mut state    = self.initial_decoder_state(batch, &device);
        let mut tokens   = vec![GO_ID; batch];
        let mut finished = vec![false; batch];
        let mut outputs  = vec![Vec::with_capacity(max_iterations); batch];

        for _ in 0..max_iterations {
            let ids: Vec<i64> = tokens.iter().map(|&t| t as i64).collect();
            let ids = Tensor::<B, 2, Int>::from_data(TensorData::new(ids, [batch, 1]), &device);
            let embedded = self.dec_embedding.forward(ids);
            let [_, _, width] = embedded.dims();

            let (logits, next) = self.decoder_step(embedded.reshape([batch, width]), &state, &memory);
            state = next;

            let predicted: Vec<i64> = logits.argmax(1).reshape([batch]).into_data().iter::<i64>().collect();
            for (row, &id) in predicted.iter().enumerate() {
                if finished[row] {
                    outputs[row].push(PAD_ID);
                    continue;
                }
                let id = id as u32;
                outputs[row].push(id);
                tokens[row] = id;
                finished[row] = id == EOS_ID;
            }

            if finished.iter().all(|&f| f) {
                break;
            }
        }

        outputs
    }

    /// Validate a feed and greedily decode it on `device`.
    pub fn predict(&self, input: &StepInput, device: &B::Device) -> ModelResult<Vec<Vec<u32>>> {
        input.validate(self.input_vocab_size, self.target_vocab_size)?;
        let batch = Seq2SeqBatcher::<B>::new(device.clone()).batch(input);
        Ok(self.greedy_decode(batch.encoder_inputs, batch.encoder_mask, batch.max_decode_len))
    }
}
