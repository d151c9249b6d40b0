//! Upper-triangular matrix product on a 2-D grid of 16x16 blocks.

use tracing::debug;

use kbook_core::{KbookError, Result, Tensor};

use crate::input_slice;
use crate::launch::{grid_2d, launch_2d, TILE};

/// Side length of a square 2-D tensor.
pub(crate) fn square_side(t: &Tensor) -> Result<usize> {
    match *t.shape().dims() {
        [r, c] if r == c => Ok(r),
        ref dims => Err(KbookError::ShapeMismatch {
            expected: vec![dims.first().copied().unwrap_or(0); 2],
            got: dims.to_vec(),
        }),
    }
}

/// `C = A·B` for upper-triangular `N x N` inputs.
///
/// Thread `(row, col)` with `row <= col` sums `A[row, k]·B[k, col]` over
/// `k = row..=col`, the only terms that can be non-zero. Cells below the
/// diagonal are never written.
pub fn upper_triangular_matmul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let n = square_side(a)?;
    if b.shape() != a.shape() {
        return Err(KbookError::ShapeMismatch {
            expected: vec![n, n],
            got: b.shape().dims().to_vec(),
        });
    }
    let a = a.contiguous();
    let b = b.contiguous();
    let (lhs, rhs) = (input_slice(&a)?, input_slice(&b)?);

    let mut out = vec![0.0f32; n * n];
    if n > 0 {
        let cfg = grid_2d(n, n, TILE, TILE);
        debug!(
            kernel = "upper_triangular_matmul",
            grid = ?cfg.grid_dim,
            block = ?cfg.block_dim,
            threads = cfg.total_threads(),
            "launch"
        );
        launch_2d(cfg, &mut out, n, n, |t| {
            let row = t.global_y();
            let col = t.global_x();
            if row < n && col < n && row <= col {
                let mut sum = 0.0f32;
                for k in row..=col {
                    sum += lhs[row * n + k] * rhs[k * n + col];
                }
                Some(sum)
            } else {
                None
            }
        })?;
    }
    Ok(Tensor::from_f32_vec(out, &[n, n]))
}
