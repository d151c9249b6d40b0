//! CUDA device context management.
//!
//! Lazily initialised `CudaDevice` handles, one per GPU index.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use cudarc::driver::CudaDevice;
use kbook_core::KbookError;
use parking_lot::Mutex;

static DEVICES: OnceLock<Mutex<HashMap<usize, Arc<CudaDevice>>>> = OnceLock::new();

fn devices() -> &'static Mutex<HashMap<usize, Arc<CudaDevice>>> {
    DEVICES.get_or_init(|| Mutex::new(HashMap::new()))
}

/// Get or create the handle for GPU `ordinal`.
pub fn get_device(ordinal: usize) -> Result<Arc<CudaDevice>, CudaError> {
    let mut map = devices().lock();
    if let Some(dev) = map.get(&ordinal) {
        return Ok(Arc::clone(dev));
    }
    let dev = CudaDevice::new(ordinal)
        .map_err(|e| CudaError::DeviceInit(format!("device {}: {}", ordinal, e)))?;
    map.insert(ordinal, Arc::clone(&dev));
    Ok(dev)
}

/// Whether GPU 0 can be opened.
pub fn is_cuda_available() -> bool {
    get_device(0).is_ok()
}

#[derive(Debug, thiserror::Error)]
pub enum CudaError {
    #[error("CUDA device init failed: {0}")]
    DeviceInit(String),

    #[error("PTX compilation failed for module '{module}': {msg}")]
    PtxCompile { module: String, msg: String },

    #[error("failed to load module '{module}': {msg}")]
    ModuleLoad { module: String, msg: String },

    #[error("function '{func}' not found in module '{module}'")]
    FuncNotFound { module: String, func: String },

    #[error("CUDA kernel launch failed: {0}")]
    LaunchError(String),

    #[error("CUDA memory error: {0}")]
    MemoryError(String),
}

impl From<CudaError> for KbookError {
    fn from(e: CudaError) -> Self {
        KbookError::Kernel(e.to_string())
    }
}
