//! Host-tensor entry points for the CUDA kernels.
//!
//! Each function uploads its inputs, launches the kernel with the same grid
//! shape as the CPU emulation, and copies the output back into a `Tensor`.

use std::sync::Arc;

use cudarc::driver::{CudaDevice, CudaSlice, LaunchAsync};
use kbook_core::{KbookError, Result, Tensor};
use tracing::debug;

use super::context::{get_device, CudaError};
use super::launch::{get_or_load_func, KernelModule};
use crate::conv::{ConvGeometry, ConvParams};
use crate::launch::{grid_1d, grid_2d, LaunchConfig, BLOCK_SIZE, TILE};
use crate::matmul::square_side;

const ACTIVATIONS: KernelModule = KernelModule {
    name: "activations",
    source: include_str!("kernels/activations.cu"),
    functions: &["tanh_activation_kernel", "softplus_kernel", "selu_kernel", "relu_kernel"],
};

const ELEMENTWISE_ADD: KernelModule = KernelModule {
    name: "elementwise_add",
    source: include_str!("kernels/elementwise_add.cu"),
    functions: &["elementwise_add_kernel"],
};

const UPPER_TRIANGULAR_MATMUL: KernelModule = KernelModule {
    name: "upper_triangular_matmul",
    source: include_str!("kernels/upper_triangular_matmul.cu"),
    functions: &["upper_triangular_matmul_kernel"],
};

const CONV2D: KernelModule = KernelModule {
    name: "conv2d",
    source: include_str!("kernels/conv2d.cu"),
    functions: &["conv2d_kernel"],
};

fn mem_err(e: impl std::fmt::Display) -> CudaError {
    CudaError::MemoryError(e.to_string())
}

fn upload(dev: &Arc<CudaDevice>, t: &Tensor) -> Result<CudaSlice<f32>> {
    let host = t.to_vec();
    Ok(dev.htod_sync_copy(&host).map_err(mem_err)?)
}

fn download(dev: &Arc<CudaDevice>, out: &CudaSlice<f32>, dims: &[usize]) -> Result<Tensor> {
    let host = dev.dtoh_sync_copy(out).map_err(mem_err)?;
    Ok(Tensor::from_f32_vec(host, dims))
}

fn log_launch(kernel: &str, ordinal: usize, cfg: &LaunchConfig) {
    debug!(kernel, device = %format!("cuda:{ordinal}"), grid = ?cfg.grid_dim, block = ?cfg.block_dim, "launch");
}

fn unary(ordinal: usize, x: &Tensor, func: &'static str) -> Result<Tensor> {
    let n = x.numel();
    if n == 0 {
        return Ok(Tensor::zeros(x.shape().dims()));
    }
    let dev = get_device(ordinal)?;
    let f = get_or_load_func(&dev, ordinal, &ACTIVATIONS, func)?;
    let input = upload(&dev, x)?;
    let mut out = dev.alloc_zeros::<f32>(n).map_err(mem_err)?;
    let cfg = grid_1d(n, BLOCK_SIZE);
    log_launch(func, ordinal, &cfg);
    unsafe { f.launch(cfg.into(), (&input, &mut out, n as i32)) }
        .map_err(|e| CudaError::LaunchError(e.to_string()))?;
    download(&dev, &out, x.shape().dims())
}

pub fn tanh_activation(ordinal: usize, x: &Tensor) -> Result<Tensor> {
    unary(ordinal, x, "tanh_activation_kernel")
}

pub fn softplus(ordinal: usize, x: &Tensor) -> Result<Tensor> {
    unary(ordinal, x, "softplus_kernel")
}

pub fn selu(ordinal: usize, x: &Tensor) -> Result<Tensor> {
    unary(ordinal, x, "selu_kernel")
}

pub fn relu(ordinal: usize, x: &Tensor) -> Result<Tensor> {
    unary(ordinal, x, "relu_kernel")
}

pub fn elementwise_add(ordinal: usize, a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.shape() != b.shape() {
        return Err(KbookError::ShapeMismatch {
            expected: a.shape().dims().to_vec(),
            got: b.shape().dims().to_vec(),
        });
    }
    let n = a.numel();
    if n == 0 {
        return Ok(Tensor::zeros(a.shape().dims()));
    }
    let dev = get_device(ordinal)?;
    let f = get_or_load_func(&dev, ordinal, &ELEMENTWISE_ADD, "elementwise_add_kernel")?;
    let lhs = upload(&dev, a)?;
    let rhs = upload(&dev, b)?;
    let mut out = dev.alloc_zeros::<f32>(n).map_err(mem_err)?;
    let cfg = grid_1d(n, BLOCK_SIZE);
    log_launch("elementwise_add", ordinal, &cfg);
    unsafe { f.launch(cfg.into(), (&lhs, &rhs, &mut out, n as i32)) }
        .map_err(|e| CudaError::LaunchError(e.to_string()))?;
    download(&dev, &out, a.shape().dims())
}

pub fn upper_triangular_matmul(ordinal: usize, a: &Tensor, b: &Tensor) -> Result<Tensor> {
    let n = square_side(a)?;
    if b.shape() != a.shape() {
        return Err(KbookError::ShapeMismatch {
            expected: vec![n, n],
            got: b.shape().dims().to_vec(),
        });
    }
    if n == 0 {
        return Ok(Tensor::zeros(&[0, 0]));
    }
    let dev = get_device(ordinal)?;
    let f = get_or_load_func(&dev, ordinal, &UPPER_TRIANGULAR_MATMUL, "upper_triangular_matmul_kernel")?;
    let lhs = upload(&dev, a)?;
    let rhs = upload(&dev, b)?;
    let mut out = dev.alloc_zeros::<f32>(n * n).map_err(mem_err)?;
    let cfg = grid_2d(n, n, TILE, TILE);
    log_launch("upper_triangular_matmul", ordinal, &cfg);
    unsafe { f.launch(cfg.into(), (&lhs, &rhs, &mut out, n as i32)) }
        .map_err(|e| CudaError::LaunchError(e.to_string()))?;
    download(&dev, &out, &[n, n])
}

pub fn conv2d(ordinal: usize, x: &Tensor, weight: &Tensor, bias: Option<&Tensor>, params: &ConvParams) -> Result<Tensor> {
    let geo = ConvGeometry::resolve(x, weight, bias, params)?;
    let total = geo.output_numel();
    if total == 0 {
        return Ok(Tensor::zeros(&geo.output_dims()));
    }
    let dev = get_device(ordinal)?;
    let f = get_or_load_func(&dev, ordinal, &CONV2D, "conv2d_kernel")?;
    let input = upload(&dev, x)?;
    let w = upload(&dev, weight)?;
    // the kernel reads the bias pointer only when has_bias is set
    let b = match bias {
        Some(t) => upload(&dev, t)?,
        None => dev.alloc_zeros::<f32>(1).map_err(mem_err)?,
    };
    let dims: Vec<i32> = [
        geo.batch,
        geo.in_channels,
        geo.in_h,
        geo.in_w,
        geo.out_channels,
        geo.kernel_h,
        geo.kernel_w,
        geo.out_h,
        geo.out_w,
        params.stride,
        params.padding,
        params.dilation,
        params.groups,
    ]
    .iter()
    .map(|&d| d as i32)
    .collect();
    let dims = dev.htod_sync_copy(&dims).map_err(mem_err)?;
    let mut out = dev.alloc_zeros::<f32>(total).map_err(mem_err)?;
    let cfg = grid_1d(total, BLOCK_SIZE);
    log_launch("conv2d", ordinal, &cfg);
    unsafe { f.launch(cfg.into(), (&input, &w, &b, &mut out, &dims, bias.is_some() as i32, total as i32)) }
        .map_err(|e| CudaError::LaunchError(e.to_string()))?;
    download(&dev, &out, &geo.output_dims())
}
