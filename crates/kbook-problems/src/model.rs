use kbook_core::{KbookError, Result, Tensor};
use kbook_nn::Module;

/// A runnable model: one or more input tensors in, one tensor out.
pub trait Model: Send + Sync {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor>;
}

/// Borrow exactly `N` inputs, or fail with the count that arrived.
pub fn expect_inputs<const N: usize>(inputs: &[Tensor]) -> Result<&[Tensor; N]> {
    inputs.try_into().map_err(|_| {
        KbookError::InvalidArgument(format!("model takes {N} input(s), got {}", inputs.len()))
    })
}

/// Single-input model backed by a framework module.
pub struct ModuleModel<M: Module> {
    module: M,
}

impl<M: Module> ModuleModel<M> {
    pub fn new(module: M) -> Self {
        Self { module }
    }

    pub fn module(&self) -> &M {
        &self.module
    }
}

impl<M: Module> Model for ModuleModel<M> {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        let [x] = expect_inputs::<1>(inputs)?;
        self.module.forward(x)
    }
}

/// Model defined by a closure over its inputs.
pub struct FnModel<F> {
    f: F,
}

impl<F> FnModel<F>
where
    F: Fn(&[Tensor]) -> Result<Tensor> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

impl<F> Model for FnModel<F>
where
    F: Fn(&[Tensor]) -> Result<Tensor> + Send + Sync,
{
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        (self.f)(inputs)
    }
}
