//! # kbook-kernels
//!
//! Hand-written data-parallel kernels and the launch model they run on.
//!
//! Every kernel is written the way a CUDA kernel is: a per-thread body that
//! derives its global index from `(block_idx, block_dim, thread_idx)`, guards
//! against the ragged edge of the grid, and stores to exactly one output
//! element. On the CPU the grid is emulated with rayon (one task per block);
//! with the `cuda` feature the same kernels are compiled with NVRTC and
//! launched on a GPU.

pub mod error;
pub mod launch;
pub mod elementwise;
pub mod matmul;
pub mod conv;
pub mod backend;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use error::LaunchError;
pub use launch::{grid_1d, grid_2d, launch_1d, launch_2d, LaunchConfig, ThreadCtx, BLOCK_SIZE, TILE};
pub use elementwise::{elementwise_add, relu, selu, softplus, tanh_activation};
pub use matmul::upper_triangular_matmul;
pub use conv::{conv2d, ConvParams};
pub use backend::Backend;

use kbook_core::{KbookError, Result, Tensor};

/// Data of a kernel input that has already been made contiguous.
pub(crate) fn input_slice(t: &Tensor) -> Result<&[f32]> {
    t.as_f32_slice().ok_or(KbookError::NotContiguous)
}
