//! CUDA backend for the kernels.
//!
//! Provides:
//! - Device context management (lazy singleton per GPU)
//! - NVRTC compilation of the `.cu` sources with per-device module caching
//! - Host-tensor wrappers that upload, launch with the CPU grid shape, and
//!   copy the result back

pub mod context;
pub mod launch;
pub mod ops;
