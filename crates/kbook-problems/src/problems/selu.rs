//! Level 1 / 27: SELU activation.

use kbook_core::{Device, Result, Tensor};
use kbook_kernels::Backend;
use kbook_nn::Selu as SeluLayer;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::model::{expect_inputs, FnModel, Model, ModuleModel};
use crate::problem::{OpKind, Problem, ProblemSpec};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Selu {
    pub batch_size: usize,
    pub dim: usize,
}

impl Selu {
    /// Published sizes: 16 rows of 16384.
    pub fn documented() -> Self {
        Self { batch_size: 16, dim: 16384 }
    }

    /// Tiny preset for tests; the row length leaves a ragged last block.
    pub fn tiny() -> Self {
        Self { batch_size: 4, dim: 1000 }
    }
}

impl Problem for Selu {
    fn spec(&self) -> ProblemSpec {
        ProblemSpec {
            name: "selu",
            level: 1,
            index: 27,
            op: OpKind::Selu,
            description: "SELU activation applied element-wise",
        }
    }

    fn inputs(&self, rng: &mut StdRng) -> Vec<Tensor> {
        vec![Tensor::randn_with(&[self.batch_size, self.dim], rng)]
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.batch_size, self.dim]
    }

    fn reference(&self, _rng: &mut StdRng) -> Result<Box<dyn Model>> {
        Ok(Box::new(ModuleModel::new(SeluLayer)))
    }

    fn solution(&self, _rng: &mut StdRng, device: Device) -> Result<Option<Box<dyn Model>>> {
        let backend = Backend::new(device)?;
        let model: Box<dyn Model> = Box::new(FnModel::new(move |inputs: &[Tensor]| {
            let [x] = expect_inputs::<1>(inputs)?;
            backend.selu(x)
        }));
        Ok(Some(model))
    }
}
