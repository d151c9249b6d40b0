//! # kbook-core
//!
//! Core tensor engine behind the kbook example corpus.
//!
//! Provides the f32 `Tensor` used by every reference model and kernel:
//! - Zero-copy views (reshape, transpose)
//! - Seeded random factories for reproducible problem inputs
//! - The reference element-wise, matmul and triangular ops
//! - Tolerance comparison used to judge kernel output

pub mod device;
pub mod storage;
pub mod shape;
pub mod tensor;
pub mod ops;
pub mod error;
pub mod prelude;

pub use device::Device;
pub use storage::Storage;
pub use shape::Shape;
pub use tensor::Tensor;
pub use error::KbookError;

pub type Result<T> = std::result::Result<T, KbookError>;
