//! Reference tensor operations.
//!
//! All operations return new contiguous tensors (functional style).

pub mod arithmetic;
pub mod manipulation;
pub mod comparison;
