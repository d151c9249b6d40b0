/// Errors produced by tensor construction and tensor operations.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum KbookError {
    #[error("shape mismatch: expected {expected:?}, got {got:?}")]
    ShapeMismatch { expected: Vec<usize>, got: Vec<usize> },

    #[error("cannot broadcast shapes {a:?} and {b:?}")]
    BroadcastError { a: Vec<usize>, b: Vec<usize> },

    #[error("matmul dimension mismatch: [{m}, {k1}] @ [{k2}, {n}]")]
    MatmulDimMismatch { m: usize, k1: usize, k2: usize, n: usize },

    #[error("cannot reshape {numel} elements into {shape:?}")]
    InvalidReshape { numel: usize, shape: Vec<isize> },

    #[error("axis {axis} out of range for {ndim}D tensor")]
    InvalidAxis { axis: usize, ndim: usize },

    #[error("tensor is not contiguous (call .contiguous() first)")]
    NotContiguous,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("kernel error: {0}")]
    Kernel(String),
}
