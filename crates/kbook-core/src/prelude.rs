//! Convenience re-exports for common kbook-core types.
//!
//! ```rust
//! use kbook_core::prelude::*;
//! ```

pub use crate::Tensor;
pub use crate::Device;
pub use crate::Shape;
pub use crate::KbookError;
pub use crate::Result;
