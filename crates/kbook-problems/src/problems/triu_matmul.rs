//! Level 1 / 14: product of two upper-triangular matrices.

use kbook_core::{Device, Result, Tensor};
use kbook_kernels::Backend;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::model::{expect_inputs, FnModel, Model};
use crate::problem::{OpKind, Problem, ProblemSpec};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UpperTriangularMatmul {
    pub n: usize,
}

impl UpperTriangularMatmul {
    pub fn documented() -> Self {
        Self { n: 4096 }
    }

    /// Spans several 16x16 tiles with a ragged edge.
    pub fn tiny() -> Self {
        Self { n: 37 }
    }
}

/// Standard normal `n x n` matrix with the strict lower triangle zeroed.
fn triu_randn(n: usize, rng: &mut StdRng) -> Tensor {
    let mut t = Tensor::randn_with(&[n, n], rng);
    if let Some(data) = t.as_f32_slice_mut() {
        for row in 1..n {
            data[row * n..row * n + row].fill(0.0);
        }
    }
    t
}

impl Problem for UpperTriangularMatmul {
    fn spec(&self) -> ProblemSpec {
        ProblemSpec {
            name: "upper_triangular_matmul",
            level: 1,
            index: 14,
            op: OpKind::UpperTriangularMatmul,
            description: "Matrix product of two upper-triangular N x N matrices, kept upper-triangular",
        }
    }

    fn inputs(&self, rng: &mut StdRng) -> Vec<Tensor> {
        vec![triu_randn(self.n, rng), triu_randn(self.n, rng)]
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.n, self.n]
    }

    fn reference(&self, _rng: &mut StdRng) -> Result<Box<dyn Model>> {
        Ok(Box::new(FnModel::new(|inputs: &[Tensor]| {
            let [a, b] = expect_inputs::<2>(inputs)?;
            a.matmul(b)?.triu(0)
        })))
    }

    fn solution(&self, _rng: &mut StdRng, device: Device) -> Result<Option<Box<dyn Model>>> {
        let backend = Backend::new(device)?;
        let model: Box<dyn Model> = Box::new(FnModel::new(move |inputs: &[Tensor]| {
            let [a, b] = expect_inputs::<2>(inputs)?;
            backend.upper_triangular_matmul(a, b)
        }));
        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_inputs_are_upper_triangular() {
        let inputs = UpperTriangularMatmul { n: 5 }.inputs(&mut StdRng::seed_from_u64(3));
        assert_eq!(inputs.len(), 2);
        for t in &inputs {
            assert_eq!(t.max_abs_diff(&t.triu(0).unwrap()).unwrap(), 0.0);
        }
    }
}
