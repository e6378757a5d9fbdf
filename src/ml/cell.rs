// ============================================================
// Layer 5 — Recurrent Cells
// ============================================================
// LSTM and GRU cells built from Burn `Linear` layers, and a
// stack of them that runs one time step at a time.
//
// LSTM (gates i, j, f, o from one projection of [x; h]):
//   c' = c ⊙ σ(f + 1) + σ(i) ⊙ tanh(j)
//   h' = tanh(c') ⊙ σ(o)
//
// GRU (reset r and update u from one projection of [x; h]):
//   h̃  = tanh(W [x; r ⊙ h])
//   h' = u ⊙ h + (1 - u) ⊙ h̃
//
// Each layer of a stack owns its own weights.

use burn::{
    nn::{Linear, LinearConfig},
    prelude::*,
    tensor::{activation::sigmoid, backend::AutodiffBackend},
};

/// Added to the LSTM forget gate so fresh cells start by remembering.
const FORGET_BIAS: f64 = 1.0;

#[derive(Config, Debug)]
pub struct RecurrentCellConfig {
    pub input_size:  usize,
    pub hidden_size: usize,
    #[config(default = true)]
    pub use_lstm:    bool,
}

impl RecurrentCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> RecurrentCell<B> {
        let joined = self.input_size + self.hidden_size;
        if self.use_lstm {
            RecurrentCell {
                gates:       LinearConfig::new(joined, 4 * self.hidden_size).init(device),
                candidate:   None,
                hidden_size: self.hidden_size,
            }
        } else {
            RecurrentCell {
                gates:       LinearConfig::new(joined, 2 * self.hidden_size).init(device),
                candidate:   Some(LinearConfig::new(joined, self.hidden_size).init(device)),
                hidden_size: self.hidden_size,
            }
        }
    }
}

/// One LSTM or GRU layer. A GRU is the variant with a candidate projection.
#[derive(Module, Debug)]
pub struct RecurrentCell<B: Backend> {
    pub gates:       Linear<B>,
    pub candidate:   Option<Linear<B>>,
    pub hidden_size: usize,
}

/// State of one layer. `cell` is only present for LSTM layers.
#[derive(Debug, Clone)]
pub struct LayerState<B: Backend> {
    pub hidden: Tensor<B, 2>,
    pub cell:   Option<Tensor<B, 2>>,
}

impl<B: Backend> LayerState<B> {
    /// Row-wise choice: `self` where `mask` is 1, `previous` where it is 0.
    /// `mask` is `[batch, 1]`.
    pub fn select(self, previous: Self, mask: &Tensor<B, 2>) -> Self {
        let cell = match (self.cell, previous.cell) {
            (Some(new), Some(old)) => Some(blend(new, old, mask)),
            (new, _)               => new,
        };
        Self {
            hidden: blend(self.hidden, previous.hidden, mask),
            cell,
        }
    }
}

impl<B: AutodiffBackend> LayerState<B> {
    pub fn inner(self) -> LayerState<B::InnerBackend> {
        LayerState {
            hidden: self.hidden.inner(),
            cell:   self.cell.map(|c| c.inner()),
        }
    }
}

/// `new * mask + old * (1 - mask)`, broadcasting a `[batch, 1]` mask.
pub fn blend<B: Backend>(new: Tensor<B, 2>, old: Tensor<B, 2>, mask: &Tensor<B, 2>) -> Tensor<B, 2> {
    let keep = mask.clone().neg().add_scalar(1.0);
    new * mask.clone() + old * keep
}

impl<B: Backend> RecurrentCell<B> {
    pub fn is_lstm(&self) -> bool {
        self.candidate.is_none()
    }

    pub fn zero_state(&self, batch_size: usize, device: &B::Device) -> LayerState<B> {
        let zeros = || Tensor::zeros([batch_size, self.hidden_size], device);
        LayerState {
            hidden: zeros(),
            cell:   self.is_lstm().then(zeros),
        }
    }

    /// One time step. `x` is `[batch, input_size]`; the new hidden
    /// state doubles as the layer output.
    pub fn step(&self, x: Tensor<B, 2>, state: &LayerState<B>) -> LayerState<B> {
        let h  = state.hidden.clone();
        let hs = self.hidden_size;

        match &self.candidate {
            None => {
                let c = state.cell.clone().unwrap_or_else(|| h.zeros_like());
                let gates = self.gates.forward(Tensor::cat(vec![x, h], 1));

                let i = gates.clone().narrow(1, 0, hs);
                let j = gates.clone().narrow(1, hs, hs);
                let f = gates.clone().narrow(1, 2 * hs, hs);
                let o = gates.narrow(1, 3 * hs, hs);

                let new_c = c * sigmoid(f.add_scalar(FORGET_BIAS)) + sigmoid(i) * j.tanh();
                let new_h = new_c.clone().tanh() * sigmoid(o);
                LayerState { hidden: new_h, cell: Some(new_c) }
            }
            Some(candidate) => {
                let ru = sigmoid(self.gates.forward(Tensor::cat(vec![x.clone(), h.clone()], 1)));
                let r  = ru.clone().narrow(1, 0, hs);
                let u  = ru.narrow(1, hs, hs);

                let cand  = candidate.forward(Tensor::cat(vec![x, r * h.clone()], 1)).tanh();
                let new_h = u.clone() * h + u.neg().add_scalar(1.0) * cand;
                LayerState { hidden: new_h, cell: None }
            }
        }
    }
}

// ─── Stacked cells ────────────────────────────────────────────────────────────

#[derive(Config, Debug)]
pub struct StackedCellConfig {
    pub input_size:  usize,
    pub hidden_size: usize,
    pub num_layers:  usize,
    #[config(default = true)]
    pub use_lstm:    bool,
}

impl StackedCellConfig {
    pub fn init<B: Backend>(&self, device: &B::Device) -> StackedCell<B> {
        let layers = (0..self.num_layers)
            .map(|depth| {
                let input_size = if depth == 0 { self.input_size } else { self.hidden_size };
                RecurrentCellConfig::new(input_size, self.hidden_size)
                    .with_use_lstm(self.use_lstm)
                    .init(device)
            })
            .collect();
        StackedCell { layers, hidden_size: self.hidden_size }
    }
}

#[derive(Module, Debug)]
pub struct StackedCell<B: Backend> {
    pub layers:      Vec<RecurrentCell<B>>,
    pub hidden_size: usize,
}

/// State of every layer of a stack, bottom layer first.
#[derive(Debug, Clone)]
pub struct RnnState<B: Backend> {
    pub layers: Vec<LayerState<B>>,
}

impl<B: Backend> RnnState<B> {
    pub fn select(self, previous: Self, mask: &Tensor<B, 2>) -> Self {
        let layers = self
            .layers
            .into_iter()
            .zip(previous.layers)
            .map(|(new, old)| new.select(old, mask))
            .collect();
        Self { layers }
    }

    /// Hidden state of the top layer, `[batch, hidden]`.
    pub fn top_hidden(&self) -> Option<&Tensor<B, 2>> {
        self.layers.last().map(|l| &l.hidden)
    }
}

impl<B: AutodiffBackend> RnnState<B> {
    pub fn inner(self) -> RnnState<B::InnerBackend> {
        RnnState { layers: self.layers.into_iter().map(LayerState::inner).collect() }
    }
}

impl<B: Backend> StackedCell<B> {
    pub fn zero_state(&self, batch_size: usize, device: &B::Device) -> RnnState<B> {
        RnnState {
            layers: self.layers.iter().map(|l| l.zero_state(batch_size, device)).collect(),
        }
    }

    /// Run every layer for one step; returns the top output and the new state.
    pub fn step(&self, x: Tensor<B, 2>, state: &RnnState<B>) -> (Tensor<B, 2>, RnnState<B>) {
        let mut input  = x;
        let mut layers = Vec::with_capacity(self.layers.len());
        for (cell, layer_state) in self.layers.iter().zip(&state.layers) {
            let next = cell.step(input, layer_state);
            input = next.hidden.clone();
            layers.push(next);
        }
        (input, RnnState { layers })
    }

    /// Like `step`, but rows whose `mask` is 0 keep their previous
    /// state and emit a zero output. `mask` is `[batch, 1]`.
    pub fn step_masked(
        &self,
        x:     Tensor<B, 2>,
        state: &RnnState<B>,
        mask:  &Tensor<B, 2>,
    ) -> (Tensor<B, 2>, RnnState<B>) {
        let (output, next) = self.step(x, state);
        let next = next.select(state.clone(), mask);
        (output * mask.clone(), next)
    }
}
