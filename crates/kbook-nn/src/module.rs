use kbook_core::{Tensor, Result};

/// Base trait for all framework layers.
pub trait Module: Send + Sync {
    /// Forward pass.
    fn forward(&self, input: &Tensor) -> Result<Tensor>;

    /// Learnable parameters, in registration order.
    fn parameters(&self) -> Vec<&Tensor> {
        self.named_parameters().into_iter().map(|(_, t)| t).collect()
    }

    /// Named parameters (`"weight"`, `"0.bias"`, ...).
    fn named_parameters(&self) -> Vec<(String, &Tensor)>;

    /// Set training/eval mode.
    fn train(&mut self, _mode: bool) {}

    /// Whether the module is in training mode.
    fn is_training(&self) -> bool {
        true
    }
}
