//! Pooling layers: MaxPool2d and AdaptiveAvgPool2d.
//!
//! All operate on 4D tensors with shape `[batch, channels, height, width]`.

use rayon::prelude::*;

use kbook_core::{KbookError, Result, Tensor};

use crate::module::Module;
use crate::nchw;

fn pooled_size(kernel_size: usize, stride: usize, padding: usize, in_h: usize, in_w: usize) -> Result<(usize, usize)> {
    if kernel_size == 0 || stride == 0 || padding * 2 > kernel_size {
        return Err(KbookError::InvalidArgument(format!(
            "pool kernel {kernel_size}, stride {stride}, padding {padding}: padding must be at most half the kernel"
        )));
    }
    let padded_h = in_h + 2 * padding;
    let padded_w = in_w + 2 * padding;
    if padded_h < kernel_size || padded_w < kernel_size {
        return Err(KbookError::ShapeMismatch {
            expected: vec![kernel_size, kernel_size],
            got: vec![padded_h, padded_w],
        });
    }
    Ok(((padded_h - kernel_size) / stride + 1, (padded_w - kernel_size) / stride + 1))
}

/// Run `window` once per output cell, one `(batch, channel)` plane per task.
fn pool_planes<F>(input: &Tensor, out_h: usize, out_w: usize, window: F) -> Result<Tensor>
where
    F: Fn(&[f32], usize, usize) -> f32 + Sync,
{
    let [batch, channels, in_h, in_w] = nchw(input)?;
    let data = input.contiguous();
    let x = data.as_f32_slice().ok_or(KbookError::NotContiguous)?;
    let in_plane = in_h * in_w;
    let out_plane = out_h * out_w;
    let mut output = vec![0.0f32; batch * channels * out_plane];
    if out_plane > 0 {
        output.par_chunks_mut(out_plane).enumerate().for_each(|(p, out)| {
            let src = &x[p * in_plane..(p + 1) * in_plane];
            for oh in 0..out_h {
                for ow in 0..out_w {
                    out[oh * out_w + ow] = window(src, oh, ow);
                }
            }
        });
    }
    Ok(Tensor::from_f32_vec(output, &[batch, channels, out_h, out_w]))
}

/// Valid input rows (or columns) under a padded window starting at `start`.
fn window_range(start: usize, kernel_size: usize, padding: usize, len: usize) -> std::ops::Range<usize> {
    let lo = start.saturating_sub(padding);
    let hi = (start + kernel_size).saturating_sub(padding).min(len);
    lo..hi.max(lo)
}

/// 2D max pooling layer. Padding cells never win.
///
/// Output `out_h = (height + 2*padding - kernel_size) / stride + 1`.
#[derive(Debug, Clone, Copy)]
pub struct MaxPool2d {
    kernel_size: usize,
    stride: usize,
    padding: usize,
}

impl MaxPool2d {
    pub fn new(kernel_size: usize, stride: usize, padding: usize) -> Self {
        Self { kernel_size, stride, padding }
    }

    pub fn output_size(&self, in_h: usize, in_w: usize) -> Result<(usize, usize)> {
        pooled_size(self.kernel_size, self.stride, self.padding, in_h, in_w)
    }
}

impl Module for MaxPool2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let [_, _, in_h, in_w] = nchw(input)?;
        let (out_h, out_w) = self.output_size(in_h, in_w)?;
        let (k, s, p) = (self.kernel_size, self.stride, self.padding);
        pool_planes(input, out_h, out_w, |src, oh, ow| {
            let mut max_val = f32::NEG_INFINITY;
            for ih in window_range(oh * s, k, p, in_h) {
                for iw in window_range(ow * s, k, p, in_w) {
                    let v = src[ih * in_w + iw];
                    if v > max_val || v.is_nan() {
                        max_val = v;
                    }
                }
            }
            max_val
        })
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> { vec![] }
}

/// Adaptive 2D average pooling to a fixed output size.
///
/// Output cell `i` averages input rows `⌊i·H/out⌋ .. ⌈(i+1)·H/out⌉`, so bins
/// may overlap when `H` is not a multiple of `out`.
#[derive(Debug, Clone, Copy)]
pub struct AdaptiveAvgPool2d {
    output_h: usize,
    output_w: usize,
}

impl AdaptiveAvgPool2d {
    pub fn new(output_h: usize, output_w: usize) -> Self {
        Self { output_h, output_w }
    }

    /// Global average pooling: output 1×1 per channel.
    pub fn global() -> Self {
        Self::new(1, 1)
    }
}

fn adaptive_bin(i: usize, in_len: usize, out_len: usize) -> std::ops::Range<usize> {
    let start = (i * in_len) / out_len;
    let end = ((i + 1) * in_len).div_ceil(out_len);
    start..end
}

impl Module for AdaptiveAvgPool2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let [_, _, in_h, in_w] = nchw(input)?;
        if self.output_h == 0 || self.output_w == 0 || in_h == 0 || in_w == 0 {
            return Err(KbookError::InvalidArgument(format!(
                "adaptive pool from {in_h}x{in_w} to {}x{}",
                self.output_h, self.output_w
            )));
        }
        let (out_h, out_w) = (self.output_h, self.output_w);
        pool_planes(input, out_h, out_w, |src, oh, ow| {
            let rows = adaptive_bin(oh, in_h, out_h);
            let cols = adaptive_bin(ow, in_w, out_w);
            let count = (rows.len() * cols.len()) as f32;
            let mut sum = 0.0f32;
            for ih in rows {
                for iw in cols.clone() {
                    sum += src[ih * in_w + iw];
                }
            }
            sum / count
        })
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> { vec![] }
}
