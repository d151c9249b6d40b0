//! NVRTC compilation and module caching.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use cudarc::driver::{CudaDevice, CudaFunction};
use parking_lot::Mutex;
use tracing::debug;

use super::context::CudaError;
use crate::launch::LaunchConfig;

/// A `.cu` source and the entry points it defines.
#[derive(Debug, Clone, Copy)]
pub struct KernelModule {
    pub name: &'static str,
    pub source: &'static str,
    pub functions: &'static [&'static str],
}

/// Modules already loaded, keyed by (device, module name).
static LOADED: OnceLock<Mutex<HashSet<(usize, &'static str)>>> = OnceLock::new();

fn loaded_set() -> &'static Mutex<HashSet<(usize, &'static str)>> {
    LOADED.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Compile and load `module` on the device. No-op if already loaded.
fn ensure_module(device: &Arc<CudaDevice>, ordinal: usize, module: &KernelModule) -> Result<(), CudaError> {
    let key = (ordinal, module.name);
    let mut set = loaded_set().lock();
    if set.contains(&key) {
        return Ok(());
    }

    debug!(module = module.name, ordinal, "compiling with nvrtc");
    let ptx = cudarc::nvrtc::compile_ptx(module.source).map_err(|e| CudaError::PtxCompile {
        module: module.name.to_string(),
        msg: e.to_string(),
    })?;

    device
        .load_ptx(ptx, module.name, module.functions)
        .map_err(|e| CudaError::ModuleLoad {
            module: module.name.to_string(),
            msg: e.to_string(),
        })?;

    set.insert(key);
    Ok(())
}

/// Kernel function handle, loading its module if needed.
pub fn get_or_load_func(
    device: &Arc<CudaDevice>,
    ordinal: usize,
    module: &KernelModule,
    func_name: &str,
) -> Result<CudaFunction, CudaError> {
    ensure_module(device, ordinal, module)?;
    device
        .get_func(module.name, func_name)
        .ok_or_else(|| CudaError::FuncNotFound {
            module: module.name.to_string(),
            func: func_name.to_string(),
        })
}

impl From<LaunchConfig> for cudarc::driver::LaunchConfig {
    fn from(cfg: LaunchConfig) -> Self {
        cudarc::driver::LaunchConfig {
            grid_dim: cfg.grid_dim,
            block_dim: cfg.block_dim,
            shared_mem_bytes: cfg.shared_mem_bytes,
        }
    }
}
