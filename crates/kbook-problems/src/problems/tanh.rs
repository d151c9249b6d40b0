//! Level 1 / 22: Tanh activation.

use kbook_core::{Device, Result, Tensor};
use kbook_kernels::Backend;
use kbook_nn::Tanh as TanhLayer;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::model::{expect_inputs, Model, ModuleModel};
use crate::problem::{OpKind, Problem, ProblemSpec};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Tanh {
    pub batch_size: usize,
    pub dim: usize,
}

impl Tanh {
    pub fn documented() -> Self {
        Self { batch_size: 16, dim: 16384 }
    }

    pub fn tiny() -> Self {
        Self { batch_size: 3, dim: 333 }
    }
}

/// One thread per element: `out[i] = tanh(x[i])`.
struct TanhKernel {
    backend: Backend,
}

impl Model for TanhKernel {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        let [x] = expect_inputs::<1>(inputs)?;
        self.backend.tanh_activation(x)
    }
}

impl Problem for Tanh {
    fn spec(&self) -> ProblemSpec {
        ProblemSpec {
            name: "tanh",
            level: 1,
            index: 22,
            op: OpKind::Tanh,
            description: "Tanh activation applied element-wise",
        }
    }

    fn inputs(&self, rng: &mut StdRng) -> Vec<Tensor> {
        vec![Tensor::randn_with(&[self.batch_size, self.dim], rng)]
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.batch_size, self.dim]
    }

    fn reference(&self, _rng: &mut StdRng) -> Result<Box<dyn Model>> {
        Ok(Box::new(ModuleModel::new(TanhLayer)))
    }

    fn solution(&self, _rng: &mut StdRng, device: Device) -> Result<Option<Box<dyn Model>>> {
        let model: Box<dyn Model> = Box::new(TanhKernel { backend: Backend::new(device)? });
        Ok(Some(model))
    }
}
