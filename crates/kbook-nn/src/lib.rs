//! # kbook-nn
//!
//! The framework layers reference models are written against.
//! Semantics follow the usual deep-learning framework defaults (NCHW layout,
//! training mode on construction).

pub mod module;
pub mod activations;
pub mod conv;
pub mod batch_norm;
pub mod pool;
pub mod linear;
pub mod sequential;

pub use module::Module;
pub use activations::{ReLU, Selu, Softplus, Tanh};
pub use conv::{Conv2d, Conv2dConfig};
pub use batch_norm::BatchNorm2d;
pub use pool::{AdaptiveAvgPool2d, MaxPool2d};
pub use linear::Linear;
pub use sequential::Sequential;

use kbook_core::{KbookError, Result, Tensor};

/// Split a `[batch, channels, height, width]` tensor into its dims.
pub(crate) fn nchw(input: &Tensor) -> Result<[usize; 4]> {
    match *input.shape().dims() {
        [n, c, h, w] => Ok([n, c, h, w]),
        ref other => Err(KbookError::ShapeMismatch {
            expected: vec![0, 0, 0, 0],
            got: other.to_vec(),
        }),
    }
}
