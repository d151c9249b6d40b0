use rand::Rng;

use kbook_core::{KbookError, Result, Tensor};

use crate::module::Module;

/// Fully connected linear layer: y = x @ W^T + b
pub struct Linear {
    weight: Tensor, // [out_features, in_features]
    bias: Option<Tensor>,
    training: bool,
}

impl Linear {
    /// Weights and bias drawn from `rng`, uniform in `±1/√in_features`.
    pub fn init<R: Rng + ?Sized>(in_features: usize, out_features: usize, bias: bool, rng: &mut R) -> Result<Self> {
        if in_features == 0 {
            return Err(KbookError::InvalidArgument("linear layer needs at least one input feature".into()));
        }
        let bound = 1.0 / (in_features as f32).sqrt();
        let weight = Tensor::rand_uniform_with(&[out_features, in_features], -bound, bound, rng);
        let bias = bias.then(|| Tensor::rand_uniform_with(&[out_features], -bound, bound, rng));
        Ok(Self { weight, bias, training: true })
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }
}

impl Module for Linear {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let output = input.matmul(&self.weight.transpose()?)?;
        match &self.bias {
            Some(bias) => output.add(bias),
            None => Ok(output),
        }
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = vec![("weight".into(), &self.weight)];
        if let Some(ref b) = self.bias {
            params.push(("bias".into(), b));
        }
        params
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}
