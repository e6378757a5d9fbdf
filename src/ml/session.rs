// ============================================================
// Layer 5 — Seq2Seq Session (the `step` entry point)
// ============================================================
// Owns everything a training run mutates: the model, the Adam
// optimiser, the learning rate and the global step counter.
//
// step(input, forward_only = true)   → greedy predictions
// step(input, forward_only = false)  → one clipped Adam update
//
// Training runs on an autodiff backend; prediction and
// evaluation run on `model.valid()` (inner backend, no graph).

use burn::{
    module::AutodiffModule,
    optim::{AdamConfig, GradientsParams, Optimizer},
    prelude::*,
    tensor::backend::AutodiffBackend,
};

use crate::data::batcher::{Seq2SeqBatcher, StepInput};
use crate::ml::cell::RnnState;
use crate::ml::clip::clip_by_global_norm;
use crate::ml::error::{ModelError, ModelResult};
use crate::ml::loss::sequence_loss;
use crate::ml::model::{ChatSeq2SeqModel, Seq2SeqConfig};

#[derive(Config, Debug)]
pub struct SessionConfig {
    pub learning_rate: f64,
    /// Multiplier applied by `decay_learning_rate`
    #[config(default = 0.99)]
    pub learning_rate_decay_factor: f64,
    #[config(default = 5.0)]
    pub max_gradient_norm: f64,
}

/// Result of one training update. States are detached from the graph.
#[derive(Debug, Clone)]
pub struct UpdateOutput<B: Backend> {
    /// Global gradient norm before clipping
    pub gradient_norm: f64,
    pub loss:          f64,
    pub encoder_state: RnnState<B>,
    pub decoder_state: RnnState<B>,
}

#[derive(Debug, Clone)]
pub enum StepOutput<B: Backend> {
    /// `[batch][steps]` greedily decoded ids
    Predictions(Vec<Vec<u32>>),
    Update(UpdateOutput<B>),
}

pub struct Seq2SeqSession<B: AutodiffBackend, O> {
    model:             ChatSeq2SeqModel<B>,
    optim:             O,
    batcher:           Seq2SeqBatcher<B>,
    device:            B::Device,
    learning_rate:     f64,
    decay_factor:      f64,
    max_gradient_norm: f64,
    global_step:       usize,
}

/// Fresh model with an Adam optimiser (ε = 1e-8).
pub fn adam_session<B: AutodiffBackend>(
    model_config:   &Seq2SeqConfig,
    session_config: &SessionConfig,
    device:         &B::Device,
) -> ModelResult<Seq2SeqSession<B, impl Optimizer<ChatSeq2SeqModel<B>, B>>> {
    model_config.validate()?;
    let model = model_config.init::<B>(device);
    adam_session_from_model(model, session_config, device)
}

/// Adam session around an existing (e.g. restored) model.
pub fn adam_session_from_model<B: AutodiffBackend>(
    model:          ChatSeq2SeqModel<B>,
    session_config: &SessionConfig,
    device:         &B::Device,
) -> ModelResult<Seq2SeqSession<B, impl Optimizer<ChatSeq2SeqModel<B>, B>>> {
    let optim = AdamConfig::new()
        .with_epsilon(1e-8)
        .init::<B, ChatSeq2SeqModel<B>>();
    Seq2SeqSession::new(model, optim, session_config, device)
}

impl<B, O> Seq2SeqSession<B, O>
where
    B: AutodiffBackend,
    O: Optimizer<ChatSeq2SeqModel<B>, B>,
{
    pub fn new(
        model:          ChatSeq2SeqModel<B>,
        optim:          O,
        session_config: &SessionConfig,
        device:         &B::Device,
    ) -> ModelResult<Self> {
        if !(session_config.learning_rate > 0.0) {
            return Err(ModelError::InvalidConfig("learning_rate must be positive".into()));
        }
        if !(session_config.max_gradient_norm > 0.0) {
            return Err(ModelError::InvalidConfig("max_gradient_norm must be positive".into()));
        }
        Ok(Self {
            model,
            optim,
            batcher:           Seq2SeqBatcher::new(device.clone()),
            device:            device.clone(),
            learning_rate:     session_config.learning_rate,
            decay_factor:      session_config.learning_rate_decay_factor,
            max_gradient_norm: session_config.max_gradient_norm,
            global_step:       0,
        })
    }

    /// Run a training update, or a greedy decode when `forward_only`.
    pub fn step(&mut self, input: &StepInput, forward_only: bool) -> ModelResult<StepOutput<B::InnerBackend>> {
        if forward_only {
            self.predict(input).map(StepOutput::Predictions)
        } else {
            self.train_step(input).map(StepOutput::Update)
        }
    }

    pub fn predict(&self, input: &StepInput) -> ModelResult<Vec<Vec<u32>>> {
        self.model.valid().predict(input, &self.device)
    }

    /// Loss of `input` without touching the parameters.
    pub fn eval_loss(&self, input: &StepInput) -> ModelResult<f64> {
        let model = self.model.valid();
        input.validate(model.input_vocab_size, model.target_vocab_size)?;

        let batch  = Seq2SeqBatcher::<B::InnerBackend>::new(self.device.clone()).batch(input);
        let output = model.forward_train(&batch);
        let loss   = sequence_loss(output.logits, batch.decoder_targets, batch.target_weights);
        Ok(loss.into_scalar().elem::<f64>())
    }

    pub fn train_step(&mut self, input: &StepInput) -> ModelResult<UpdateOutput<B::InnerBackend>> {
        input.validate(self.model.input_vocab_size, self.model.target_vocab_size)?;

        let batch  = self.batcher.batch(input);
        let output = self.model.forward_train(&batch);
        let loss   = sequence_loss(output.logits, batch.decoder_targets, batch.target_weights);

        let loss_value = loss.clone().into_scalar().elem::<f64>();
        if !loss_value.is_finite() {
            return Err(ModelError::NonFiniteLoss(loss_value, self.global_step));
        }

        let mut grads = GradientsParams::from_grads(loss.backward(), &self.model);
        let gradient_norm = clip_by_global_norm::<B, _>(&self.model, &mut grads, self.max_gradient_norm);

        self.model = self.optim.step(self.learning_rate, self.model.clone(), grads);
        self.global_step += 1;

        Ok(UpdateOutput {
            gradient_norm,
            loss:          loss_value,
            encoder_state: output.encoder_state.inner(),
            decoder_state: output.decoder_state.inner(),
        })
    }

    pub fn decay_learning_rate(&mut self) {
        self.learning_rate *= self.decay_factor;
        tracing::info!("Learning rate decayed to {:.6}", self.learning_rate);
    }

    /// Restore counters saved next to a checkpoint.
    pub fn resume(&mut self, global_step: usize, learning_rate: f64) {
        self.global_step   = global_step;
        self.learning_rate = learning_rate;
    }

    pub fn learning_rate(&self) -> f64 { self.learning_rate }

    pub fn global_step(&self) -> usize { self.global_step }

    pub fn model(&self) -> &ChatSeq2SeqModel<B> { &self.model }

    /// Adam moments and step counts, for saving next to the weights.
    pub fn optimizer_record(&self) -> O::Record {
        self.optim.to_record()
    }

    pub fn with_optimizer_record(mut self, record: O::Record) -> Self {
        self.optim = self.optim.load_record(record);
        self
    }
}
