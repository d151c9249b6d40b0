//! Device dispatch for the kernels.

use kbook_core::{Device, KbookError, Result, Tensor};

use crate::conv::{self, ConvParams};
use crate::{elementwise, matmul};

#[cfg(feature = "cuda")]
use crate::cuda;

/// Runs the CUDA branch when the crate is built with `cuda`, otherwise
/// reports that GPU support is missing.
#[cfg(feature = "cuda")]
macro_rules! on_cuda {
    ($ordinal:expr, $call:expr) => {
        $call
    };
}

#[cfg(not(feature = "cuda"))]
macro_rules! on_cuda {
    ($ordinal:expr, $call:expr) => {
        Err(no_cuda($ordinal))
    };
}

#[cfg(not(feature = "cuda"))]
fn no_cuda(ordinal: usize) -> KbookError {
    KbookError::Kernel(format!("cuda:{ordinal} requested but kbook-kernels was built without the `cuda` feature"))
}

/// Where kernels run: the emulated grid on the CPU or a CUDA device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Backend {
    device: Device,
}

impl Backend {
    /// Check that `device` is usable and bind to it.
    pub fn new(device: Device) -> Result<Self> {
        if let Device::Cuda(ordinal) = device {
            let ready: Result<()> = on_cuda!(
                ordinal,
                cuda::context::get_device(ordinal).map(|_| ()).map_err(KbookError::from)
            );
            ready?;
        }
        Ok(Self { device })
    }

    pub fn cpu() -> Self {
        Self { device: Device::Cpu }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn tanh_activation(&self, x: &Tensor) -> Result<Tensor> {
        match self.device {
            Device::Cpu => elementwise::tanh_activation(x),
            Device::Cuda(ordinal) => on_cuda!(ordinal, cuda::ops::tanh_activation(ordinal, x)),
        }
    }

    pub fn softplus(&self, x: &Tensor) -> Result<Tensor> {
        match self.device {
            Device::Cpu => elementwise::softplus(x),
            Device::Cuda(ordinal) => on_cuda!(ordinal, cuda::ops::softplus(ordinal, x)),
        }
    }

    pub fn selu(&self, x: &Tensor) -> Result<Tensor> {
        match self.device {
            Device::Cpu => elementwise::selu(x),
            Device::Cuda(ordinal) => on_cuda!(ordinal, cuda::ops::selu(ordinal, x)),
        }
    }

    pub fn relu(&self, x: &Tensor) -> Result<Tensor> {
        match self.device {
            Device::Cpu => elementwise::relu(x),
            Device::Cuda(ordinal) => on_cuda!(ordinal, cuda::ops::relu(ordinal, x)),
        }
    }

    pub fn elementwise_add(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        match self.device {
            Device::Cpu => elementwise::elementwise_add(a, b),
            Device::Cuda(ordinal) => on_cuda!(ordinal, cuda::ops::elementwise_add(ordinal, a, b)),
        }
    }

    pub fn upper_triangular_matmul(&self, a: &Tensor, b: &Tensor) -> Result<Tensor> {
        match self.device {
            Device::Cpu => matmul::upper_triangular_matmul(a, b),
            Device::Cuda(ordinal) => on_cuda!(ordinal, cuda::ops::upper_triangular_matmul(ordinal, a, b)),
        }
    }

    pub fn conv2d(&self, x: &Tensor, weight: &Tensor, bias: Option<&Tensor>, params: &ConvParams) -> Result<Tensor> {
        match self.device {
            Device::Cpu => conv::conv2d(x, weight, bias, params),
            Device::Cuda(ordinal) => on_cuda!(ordinal, cuda::ops::conv2d(ordinal, x, weight, bias, params)),
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::cpu()
    }
}
