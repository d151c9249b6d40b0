//! Level 1 / 29: Softplus activation.

use kbook_core::{Device, Result, Tensor};
use kbook_kernels::Backend;
use kbook_nn::Softplus as SoftplusLayer;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::model::{expect_inputs, FnModel, Model, ModuleModel};
use crate::problem::{OpKind, Problem, ProblemSpec};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Softplus {
    pub batch_size: usize,
    pub dim: usize,
}

impl Softplus {
    pub fn documented() -> Self {
        Self { batch_size: 16, dim: 16384 }
    }

    pub fn tiny() -> Self {
        Self { batch_size: 2, dim: 512 }
    }
}

impl Problem for Softplus {
    fn spec(&self) -> ProblemSpec {
        ProblemSpec {
            name: "softplus",
            level: 1,
            index: 29,
            op: OpKind::Softplus,
            description: "Softplus activation applied element-wise",
        }
    }

    /// Standard normal inputs never reach the region where the kernel's
    /// `ln(1 + eˣ)` and the framework's thresholded form differ.
    fn inputs(&self, rng: &mut StdRng) -> Vec<Tensor> {
        vec![Tensor::randn_with(&[self.batch_size, self.dim], rng)]
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.batch_size, self.dim]
    }

    fn reference(&self, _rng: &mut StdRng) -> Result<Box<dyn Model>> {
        Ok(Box::new(ModuleModel::new(SoftplusLayer)))
    }

    fn solution(&self, _rng: &mut StdRng, device: Device) -> Result<Option<Box<dyn Model>>> {
        let backend = Backend::new(device)?;
        let model: Box<dyn Model> = Box::new(FnModel::new(move |inputs: &[Tensor]| {
            let [x] = expect_inputs::<1>(inputs)?;
            backend.softplus(x)
        }));
        Ok(Some(model))
    }
}
