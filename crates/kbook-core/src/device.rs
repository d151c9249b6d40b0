use std::fmt;

/// Where a kernel runs.
///
/// Tensors always live in host memory; the device only selects the kernel
/// backend (emulated grid on the CPU, or a real CUDA launch).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Device {
    /// Grid-of-threads emulation on the CPU thread pool
    #[default]
    Cpu,
    /// CUDA GPU with device index
    Cuda(usize),
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "cpu"),
            Device::Cuda(idx) => write!(f, "cuda:{idx}"),
        }
    }
}

impl std::str::FromStr for Device {
    type Err = crate::KbookError;

    /// Parse `cpu`, `cuda` or `cuda:N`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "cpu" => Ok(Device::Cpu),
            "cuda" => Ok(Device::Cuda(0)),
            other => other
                .strip_prefix("cuda:")
                .and_then(|idx| idx.parse().ok())
                .map(Device::Cuda)
                .ok_or_else(|| crate::KbookError::InvalidArgument(format!("unknown device '{other}'"))),
        }
    }
}
