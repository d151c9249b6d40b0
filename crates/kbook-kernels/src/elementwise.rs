//! One-thread-per-element kernels: activations and the residual add.

use tracing::debug;

use kbook_core::{KbookError, Result, Tensor};

use crate::input_slice;
use crate::launch::{grid_1d, launch_1d, BLOCK_SIZE};

const SELU_ALPHA: f32 = 1.673_263_2;
const SELU_SCALE: f32 = 1.050_701;

/// Launch `body` once per element of `x` on a 1-D grid of
/// [`BLOCK_SIZE`]-thread blocks.
fn map_kernel(name: &str, x: &Tensor, body: impl Fn(f32) -> f32 + Sync) -> Result<Tensor> {
    let x = x.contiguous();
    let input = input_slice(&x)?;
    let size = input.len();
    let mut out = vec![0.0f32; size];
    if size > 0 {
        let cfg = grid_1d(size, BLOCK_SIZE);
        debug!(
            kernel = name,
            grid = ?cfg.grid_dim,
            block = ?cfg.block_dim,
            threads = cfg.total_threads(),
            "launch"
        );
        launch_1d(cfg, &mut out, |t| {
            let idx = t.global_x();
            (idx < size).then(|| body(input[idx]))
        })?;
    }
    Ok(Tensor::from_f32_vec(out, x.shape().dims()))
}

/// `out[i] = tanh(x[i])`
pub fn tanh_activation(x: &Tensor) -> Result<Tensor> {
    map_kernel("tanh_activation", x, f32::tanh)
}

/// `out[i] = ln(1 + exp(x[i]))`, with no large-input cutoff.
pub fn softplus(x: &Tensor) -> Result<Tensor> {
    map_kernel("softplus", x, |v| v.exp().ln_1p())
}

/// `out[i] = λ·x` for positive x, `λ·α·(exp(x) − 1)` otherwise.
pub fn selu(x: &Tensor) -> Result<Tensor> {
    map_kernel("selu", x, |v| {
        if v > 0.0 {
            SELU_SCALE * v
        } else {
            SELU_SCALE * SELU_ALPHA * v.exp_m1()
        }
    })
}

pub fn relu(x: &Tensor) -> Result<Tensor> {
    map_kernel("relu", x, |v| v.max(0.0))
}

/// `out[i] = a[i] + b[i]` for same-shape inputs.
pub fn elementwise_add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.shape() != b.shape() {
        return Err(KbookError::ShapeMismatch {
            expected: a.shape().dims().to_vec(),
            got: b.shape().dims().to_vec(),
        });
    }
    let a = a.contiguous();
    let b = b.contiguous();
    let (lhs, rhs) = (input_slice(&a)?, input_slice(&b)?);
    let size = lhs.len();
    let mut out = vec![0.0f32; size];
    if size > 0 {
        let cfg = grid_1d(size, BLOCK_SIZE);
        debug!(
            kernel = "elementwise_add",
            grid = ?cfg.grid_dim,
            block = ?cfg.block_dim,
            threads = cfg.total_threads(),
            "launch"
        );
        launch_1d(cfg, &mut out, |t| {
            let idx = t.global_x();
            (idx < size).then(|| lhs[idx] + rhs[idx])
        })?;
    }
    Ok(Tensor::from_f32_vec(out, a.shape().dims()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tanh_activation() {
        let x = Tensor::from_f32(&[-1.0, 0.0, 2.0], &[3]);
        let y = tanh_activation(&x).unwrap().to_vec();
        assert_eq!(y, vec![(-1.0f32).tanh(), 0.0, 2.0f32.tanh()]);
    }

    #[test]
    fn test_softplus_kernel_formula() {
        let x = Tensor::from_f32(&[0.0, -5.0, 10.0], &[3]);
        let y = softplus(&x).unwrap().to_vec();
        assert!((y[0] - std::f32::consts::LN_2).abs() < 1e-7);
        assert!((y[1] - (-5.0f32).exp().ln_1p()).abs() < 1e-7);
        assert!((y[2] - 10.000_045).abs() < 1e-5);
    }

    #[test]
    fn test_selu_and_relu() {
        let x = Tensor::from_f32(&[2.0, -2.0], &[1, 2]);
        let s = selu(&x).unwrap();
        assert_eq!(s.shape().dims(), &[1, 2]);
        let s = s.to_vec();
        assert!((s[0] - 2.101_402).abs() < 1e-5);
        assert!((s[1] - (-1.520_166_4)).abs() < 1e-5);
        assert_eq!(relu(&x).unwrap().to_vec(), vec![2.0, 0.0]);
    }

    #[test]
    fn test_ragged_last_block() {
        // 257 elements: second block has one live thread
        let n = BLOCK_SIZE + 1;
        let x = Tensor::from_f32_vec(vec![0.5; n], &[n]);
        let y = tanh_activation(&x).unwrap().to_vec();
        assert_eq!(y.len(), n);
        assert!(y.iter().all(|&v| v == 0.5f32.tanh()));
    }

    #[test]
    fn test_elementwise_add() {
        let a = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        let b = Tensor::from_f32(&[10.0, 20.0, 30.0, 40.0], &[2, 2]);
        let c = elementwise_add(&a, &b).unwrap();
        assert_eq!(c.shape().dims(), &[2, 2]);
        assert_eq!(c.as_f32_slice().unwrap(), &[11.0, 22.0, 33.0, 44.0]);
    }

    #[test]
    fn test_elementwise_add_shape_mismatch() {
        let a = Tensor::ones(&[2, 2]);
        let b = Tensor::ones(&[4]);
        assert!(matches!(elementwise_add(&a, &b), Err(KbookError::ShapeMismatch { .. })));
    }

    #[test]
    fn test_empty_input() {
        let x = Tensor::from_f32(&[], &[0, 3]);
        assert_eq!(tanh_activation(&x).unwrap().shape().dims(), &[0, 3]);
    }

    #[test]
    fn test_strided_view_input() {
        let x = Tensor::from_f32(&[-1.0, 2.0, -3.0, 4.0, -5.0, 6.0], &[2, 3]).transpose().unwrap();
        let y = relu(&x).unwrap();
        assert_eq!(y.shape().dims(), &[3, 2]);
        assert_eq!(y.to_vec(), vec![0.0, 4.0, 2.0, 0.0, 0.0, 6.0]);
    }
}
