//! Element-wise arithmetic and matrix multiplication.

use rayon::prelude::*;

use crate::error::KbookError;
use crate::shape::Shape;
use crate::tensor::Tensor;
use crate::Result;

/// Element count above which element-wise maps run on the rayon pool.
const PAR_THRESHOLD: usize = 1 << 15;

impl Tensor {
    /// Element-wise addition with broadcasting.
    pub fn add(&self, other: &Tensor) -> Result<Tensor> {
        binary_op(self, other, |a, b| a + b)
    }

    /// Clamp every element to `[min, max]`.
    pub fn clamp(&self, min: f32, max: f32) -> Result<Tensor> {
        self.map(move |a| a.clamp(min, max))
    }

    /// Apply `op` to every element.
    ///
    /// This is the building block of the framework activations.
    pub fn map<F>(&self, op: F) -> Result<Tensor>
    where
        F: Fn(f32) -> f32 + Sync + Send,
    {
        let a = self.contiguous();
        let data = f32_data(&a)?;
        let result: Vec<f32> = if data.len() >= PAR_THRESHOLD {
            data.par_iter().map(|&v| op(v)).collect()
        } else {
            data.iter().map(|&v| op(v)).collect()
        };
        Ok(Tensor::from_f32_vec(result, a.shape().dims()))
    }

    /// Matrix multiplication `[M, K] @ [K, N] -> [M, N]`.
    pub fn matmul(&self, other: &Tensor) -> Result<Tensor> {
        let a = self.contiguous();
        let b = other.contiguous();
        match (a.shape().dims(), b.shape().dims()) {
            (&[m, k1], &[k2, n]) => {
                if k1 != k2 {
                    return Err(KbookError::MatmulDimMismatch { m, k1, k2, n });
                }
                let c = matmul_slices(f32_data(&a)?, f32_data(&b)?, m, k1, n);
                Ok(Tensor::from_f32_vec(c, &[m, n]))
            }
            (a_dims, b_dims) => Err(KbookError::ShapeMismatch {
                expected: a_dims.to_vec(),
                got: b_dims.to_vec(),
            }),
        }
    }
}

fn f32_data(t: &Tensor) -> Result<&[f32]> {
    t.as_f32_slice().ok_or(KbookError::NotContiguous)
}

/// Row-parallel `[m, k] @ [k, n]` in i-p-j order.
fn matmul_slices(a: &[f32], b: &[f32], m: usize, k: usize, n: usize) -> Vec<f32> {
    let mut c = vec![0.0f32; m * n];
    if n == 0 {
        return c;
    }
    c.par_chunks_mut(n).enumerate().for_each(|(i, row)| {
        for p in 0..k {
            let a_val = a[i * k + p];
            if a_val == 0.0 {
                continue;
            }
            let b_row = &b[p * n..(p + 1) * n];
            for (c_ij, &b_pj) in row.iter_mut().zip(b_row) {
                *c_ij += a_val * b_pj;
            }
        }
    });
    c
}

/// Element-wise binary op with broadcasting.
fn binary_op(a: &Tensor, b: &Tensor, op: impl Fn(f32, f32) -> f32 + Sync) -> Result<Tensor> {
    let out_shape = a.shape().broadcast_with(b.shape()).ok_or_else(|| {
        KbookError::BroadcastError {
            a: a.shape().dims().to_vec(),
            b: b.shape().dims().to_vec(),
        }
    })?;

    let a_cont = a.contiguous();
    let b_cont = b.contiguous();
    let a_data = f32_data(&a_cont)?;
    let b_data = f32_data(&b_cont)?;

    // Fast path: identical shapes
    let result: Vec<f32> = if a.shape() == b.shape() {
        a_data.par_iter().zip(b_data.par_iter()).map(|(&x, &y)| op(x, y)).collect()
    } else {
        (0..out_shape.numel())
            .into_par_iter()
            .map(|i| {
                let ai = broadcast_index(i, &out_shape, a.shape());
                let bi = broadcast_index(i, &out_shape, b.shape());
                op(a_data[ai], b_data[bi])
            })
            .collect()
    };

    Ok(Tensor::from_f32_vec(result, out_shape.dims()))
}

/// Source index of a broadcast element.
fn broadcast_index(flat_idx: usize, out_shape: &Shape, src_shape: &Shape) -> usize {
    let out_strides = out_shape.contiguous_strides();
    let src_strides = src_shape.contiguous_strides();
    let lead = out_shape.ndim() - src_shape.ndim();

    let mut remaining = flat_idx;
    let mut src_idx = 0;
    for (axis, &stride) in out_strides.iter().enumerate() {
        let coord = remaining / stride;
        remaining %= stride;
        if axis >= lead {
            let s = axis - lead;
            // size-1 source axes broadcast: coordinate maps to 0
            if src_shape.dims()[s] > 1 {
                src_idx += coord * src_strides[s];
            }
        }
    }
    src_idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_same_shape() {
        let a = Tensor::from_f32(&[1.0, 2.0, 3.0], &[3]);
        let b = Tensor::from_f32(&[10.0, 20.0, 30.0], &[3]);
        assert_eq!(a.add(&b).unwrap().as_f32_slice().unwrap(), &[11.0, 22.0, 33.0]);
    }

    #[test]
    fn test_broadcast_bias_row() {
        // [2, 3] + [3]: the Linear bias case
        let x = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let b = Tensor::from_f32(&[10.0, 20.0, 30.0], &[3]);
        let y = x.add(&b).unwrap();
        assert_eq!(y.shape().dims(), &[2, 3]);
        assert_eq!(y.as_f32_slice().unwrap(), &[11.0, 22.0, 33.0, 14.0, 25.0, 36.0]);
    }

    #[test]
    fn test_broadcast_error() {
        let a = Tensor::ones(&[2, 3]);
        let b = Tensor::ones(&[4, 3]);
        assert!(matches!(a.add(&b), Err(KbookError::BroadcastError { .. })));
    }

    #[test]
    fn test_map_and_clamp() {
        let t = Tensor::from_f32(&[-2.0, 0.0, 4.0], &[3]);
        assert_eq!(t.clamp(0.0, 1.0).unwrap().as_f32_slice().unwrap(), &[0.0, 0.0, 1.0]);
        assert_eq!(t.map(|v| v * 0.5).unwrap().as_f32_slice().unwrap(), &[-1.0, 0.0, 2.0]);
        let big = Tensor::ones(&[PAR_THRESHOLD + 3]).map(|v| v + 1.0).unwrap();
        assert!(big.as_f32_slice().unwrap().iter().all(|&v| v == 2.0));
    }

    #[test]
    fn test_matmul_2d() {
        let a = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let b = Tensor::from_f32(&[7.0, 8.0, 9.0, 10.0, 11.0, 12.0], &[3, 2]);
        let c = a.matmul(&b).unwrap();
        assert_eq!(c.shape().dims(), &[2, 2]);
        assert_eq!(c.as_f32_slice().unwrap(), &[58.0, 64.0, 139.0, 154.0]);
    }

    #[test]
    fn test_matmul_transposed_view() {
        let a = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let at = a.transpose().unwrap();
        let c = at.matmul(&Tensor::from_f32(&[1.0, 0.0, 0.0, 1.0], &[2, 2])).unwrap();
        assert_eq!(c.as_f32_slice().unwrap(), &[1.0, 3.0, 2.0, 4.0]);
    }

    #[test]
    fn test_matmul_dim_mismatch() {
        let a = Tensor::ones(&[2, 2]);
        let b = Tensor::ones(&[3, 1]);
        assert!(matches!(a.matmul(&b), Err(KbookError::MatmulDimMismatch { .. })));
        assert!(a.matmul(&Tensor::ones(&[2])).is_err());
        assert!(Tensor::ones(&[2, 2, 2]).matmul(&Tensor::ones(&[2, 2, 2])).is_err());
    }
}
