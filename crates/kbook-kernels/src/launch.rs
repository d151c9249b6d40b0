//! Grid/block/thread launch model, emulated on the CPU.
//!
//! A launch runs the kernel body once per thread of the grid. Each block owns
//! a disjoint slice of the output, so blocks run in parallel on the rayon
//! pool while the threads of a block run in order. A thread returns
//! `Some(v)` to store `v` to the element at its global index, or `None` when
//! its bounds guard skips the store (the element keeps its zero).

use rayon::prelude::*;

use crate::error::LaunchError;

/// Threads per block for 1-D kernels.
pub const BLOCK_SIZE: usize = 256;

/// Side of the square blocks used by 2-D kernels.
pub const TILE: usize = 16;

/// Grid and block dimensions of a launch, in CUDA's `(x, y, z)` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaunchConfig {
    pub grid_dim: (u32, u32, u32),
    pub block_dim: (u32, u32, u32),
    pub shared_mem_bytes: u32,
}

impl LaunchConfig {
    /// Total number of threads the launch runs.
    pub fn total_threads(&self) -> usize {
        let (gx, gy, gz) = self.grid_dim;
        let (bx, by, bz) = self.block_dim;
        [gx, gy, gz, bx, by, bz].iter().map(|&d| d as usize).product()
    }

    fn check_non_empty(&self) -> Result<(), LaunchError> {
        let (gx, gy, gz) = self.grid_dim;
        let (bx, by, bz) = self.block_dim;
        if [gx, gy, gz, bx, by, bz].contains(&0) {
            return Err(LaunchError::EmptyLaunch { grid: self.grid_dim, block: self.block_dim });
        }
        Ok(())
    }

    fn check_rank(&self, rank: usize) -> Result<(), LaunchError> {
        let flat = match rank {
            1 => self.grid_dim.1 == 1 && self.block_dim.1 == 1,
            _ => true,
        };
        if !flat || self.grid_dim.2 != 1 || self.block_dim.2 != 1 {
            return Err(LaunchError::Dimensionality {
                expected: rank,
                grid: self.grid_dim,
                block: self.block_dim,
            });
        }
        Ok(())
    }
}

/// Grid covering `n` elements with `block_size` threads per block.
pub fn grid_1d(n: usize, block_size: usize) -> LaunchConfig {
    let grid = n.div_ceil(block_size.max(1));
    LaunchConfig {
        grid_dim: (grid as u32, 1, 1),
        block_dim: (block_size as u32, 1, 1),
        shared_mem_bytes: 0,
    }
}

/// Grid covering a `rows x cols` output with `block_x x block_y` blocks.
/// `x` runs along columns, `y` along rows.
pub fn grid_2d(rows: usize, cols: usize, block_x: usize, block_y: usize) -> LaunchConfig {
    let grid_x = cols.div_ceil(block_x.max(1));
    let grid_y = rows.div_ceil(block_y.max(1));
    LaunchConfig {
        grid_dim: (grid_x as u32, grid_y as u32, 1),
        block_dim: (block_x as u32, block_y as u32, 1),
        shared_mem_bytes: 0,
    }
}

/// Built-in index variables of one thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadCtx {
    pub block_idx: (u32, u32, u32),
    pub block_dim: (u32, u32, u32),
    pub thread_idx: (u32, u32, u32),
}

impl ThreadCtx {
    /// `blockIdx.x * blockDim.x + threadIdx.x`
    pub fn global_x(&self) -> usize {
        self.block_idx.0 as usize * self.block_dim.0 as usize + self.thread_idx.0 as usize
    }

    /// `blockIdx.y * blockDim.y + threadIdx.y`
    pub fn global_y(&self) -> usize {
        self.block_idx.1 as usize * self.block_dim.1 as usize + self.thread_idx.1 as usize
    }
}

/// Blocks whose output range lies past the end of `out`: any store is an
/// out-of-bounds write.
fn check_idle_blocks<B, I, F>(
    blocks: B,
    cfg: &LaunchConfig,
    len: usize,
    index_of: I,
    kernel: &F,
) -> Result<(), LaunchError>
where
    B: IntoParallelIterator<Item = (u32, u32)>,
    I: Fn(&ThreadCtx) -> usize + Sync,
    F: Fn(&ThreadCtx) -> Option<f32> + Sync,
{
    let (bdx, bdy, _) = cfg.block_dim;
    blocks.into_par_iter().try_for_each(|(bx, by)| {
        for ty in 0..bdy {
            for tx in 0..bdx {
                let ctx = ThreadCtx {
                    block_idx: (bx, by, 0),
                    block_dim: cfg.block_dim,
                    thread_idx: (tx, ty, 0),
                };
                if kernel(&ctx).is_some() {
                    return Err(LaunchError::OutOfBounds { index: index_of(&ctx), len });
                }
            }
        }
        Ok(())
    })
}

/// Run a 1-D kernel over `out`.
///
/// Thread `i = blockIdx.x * blockDim.x + threadIdx.x` may store only to
/// `out[i]`.
pub fn launch_1d<F>(cfg: LaunchConfig, out: &mut [f32], kernel: F) -> Result<(), LaunchError>
where
    F: Fn(&ThreadCtx) -> Option<f32> + Sync,
{
    cfg.check_non_empty()?;
    cfg.check_rank(1)?;
    let grid_x = cfg.grid_dim.0 as usize;
    let block = cfg.block_dim.0 as usize;
    let len = out.len();

    out.par_chunks_mut(block)
        .enumerate()
        .take(grid_x)
        .try_for_each(|(bx, chunk)| {
            for tx in 0..block {
                let ctx = ThreadCtx {
                    block_idx: (bx as u32, 0, 0),
                    block_dim: cfg.block_dim,
                    thread_idx: (tx as u32, 0, 0),
                };
                if let Some(v) = kernel(&ctx) {
                    match chunk.get_mut(tx) {
                        Some(slot) => *slot = v,
                        None => return Err(LaunchError::OutOfBounds { index: ctx.global_x(), len }),
                    }
                }
            }
            Ok(())
        })?;

    let covered = len.div_ceil(block) as u32;
    if (grid_x as u32) > covered {
        check_idle_blocks(
            (covered..grid_x as u32).into_par_iter().map(|bx| (bx, 0)),
            &cfg,
            len,
            ThreadCtx::global_x,
            &kernel,
        )?;
    }
    Ok(())
}

/// Run a 2-D kernel over a row-major `rows x cols` output.
///
/// Thread `(row, col) = (global_y, global_x)` may store only to
/// `out[row * cols + col]`.
pub fn launch_2d<F>(
    cfg: LaunchConfig,
    out: &mut [f32],
    rows: usize,
    cols: usize,
    kernel: F,
) -> Result<(), LaunchError>
where
    F: Fn(&ThreadCtx) -> Option<f32> + Sync,
{
    cfg.check_non_empty()?;
    cfg.check_rank(2)?;
    if out.len() != rows * cols {
        return Err(LaunchError::OutputSize { rows, cols, got: out.len() });
    }
    let (grid_x, grid_y, _) = cfg.grid_dim;
    let (bdx, bdy, _) = cfg.block_dim;
    let len = out.len();
    let flat_index = move |ctx: &ThreadCtx| ctx.global_y() * cols + ctx.global_x();

    if cols > 0 {
        // one band of `block_dim.y` full rows per block row
        out.par_chunks_mut(bdy as usize * cols)
            .enumerate()
            .take(grid_y as usize)
            .try_for_each(|(by, band)| {
                for bx in 0..grid_x {
                    for ty in 0..bdy {
                        for tx in 0..bdx {
                            let ctx = ThreadCtx {
                                block_idx: (bx, by as u32, 0),
                                block_dim: cfg.block_dim,
                                thread_idx: (tx, ty, 0),
                            };
                            let Some(v) = kernel(&ctx) else { continue };
                            let col = ctx.global_x();
                            let local = ty as usize * cols + col;
                            match band.get_mut(local) {
                                Some(slot) if col < cols => *slot = v,
                                _ => return Err(LaunchError::OutOfBounds { index: flat_index(&ctx), len }),
                            }
                        }
                    }
                }
                Ok(())
            })?;
    }

    let covered = if cols == 0 { 0 } else { rows.div_ceil(bdy as usize) as u32 };
    if grid_y > covered {
        check_idle_blocks(
            (covered..grid_y)
                .into_par_iter()
                .flat_map(|by| (0..grid_x).into_par_iter().map(move |bx| (bx, by))),
            &cfg,
            len,
            flat_index,
            &kernel,
        )?;
    }
    Ok(())
}
