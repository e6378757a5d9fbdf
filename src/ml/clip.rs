// ============================================================
// Layer 5 — Global-Norm Gradient Clipping
// ============================================================
// Burn's built-in clipping works per parameter. Recurrent nets
// are usually clipped on the norm of *all* gradients together,
// which keeps the update direction intact:
//
//   global_norm = sqrt(Σ_p ‖g_p‖²)
//   g_p        ← g_p · max_norm / max(global_norm, max_norm)

use burn::{
    module::{ModuleVisitor, Param},
    optim::GradientsParams,
    prelude::*,
    tensor::backend::AutodiffBackend,
};

struct SquaredNorm<'a> {
    grads: &'a GradientsParams,
    sum:   f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for SquaredNorm<'_> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = self.grads.get::<B::InnerBackend, D>(param.id) {
            self.sum += grad.powi_scalar(2).sum().into_scalar().elem::<f64>();
        }
    }
}

struct ScaleGrads<'a> {
    grads: &'a mut GradientsParams,
    scale: f64,
}

impl<B: AutodiffBackend> ModuleVisitor<B> for ScaleGrads<'_> {
    fn visit_float<const D: usize>(&mut self, param: &Param<Tensor<B, D>>) {
        if let Some(grad) = self.grads.remove::<B::InnerBackend, D>(param.id) {
            self.grads.register::<B::InnerBackend, D>(param.id, grad.mul_scalar(self.scale));
        }
    }
}

/// Norm of every gradient of `module` taken as one vector.
pub fn global_norm<B: AutodiffBackend, M: Module<B>>(module: &M, grads: &GradientsParams) -> f64 {
    let mut visitor = SquaredNorm { grads, sum: 0.0 };
    module.visit(&mut visitor);
    visitor.sum.sqrt()
}

/// Rescale `grads` so their global norm is at most `max_norm`.
/// Returns the norm measured before clipping.
pub fn clip_by_global_norm<B: AutodiffBackend, M: Module<B>>(
    module:   &M,
    grads:    &mut GradientsParams,
    max_norm: f64,
) -> f64 {
    let norm = global_norm::<B, M>(module, grads);
    if norm > max_norm && norm.is_finite() {
        let mut visitor = ScaleGrads { grads, scale: max_norm / norm };
        module.visit(&mut visitor);
    }
    norm
}
