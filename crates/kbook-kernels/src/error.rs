use kbook_core::KbookError;

/// Failures of the emulated grid.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LaunchError {
    #[error("launch with an empty grid or block: grid {grid:?}, block {block:?}")]
    EmptyLaunch { grid: (u32, u32, u32), block: (u32, u32, u32) },

    #[error("thread stored to element {index} of a {len}-element output")]
    OutOfBounds { index: usize, len: usize },

    #[error("{expected}-D launch given a config with grid {grid:?}, block {block:?}")]
    Dimensionality {
        expected: usize,
        grid: (u32, u32, u32),
        block: (u32, u32, u32),
    },

    #[error("output holds {got} elements, launch expects {rows}x{cols}")]
    OutputSize { rows: usize, cols: usize, got: usize },
}

impl From<LaunchError> for KbookError {
    fn from(e: LaunchError) -> Self {
        KbookError::Kernel(e.to_string())
    }
}
