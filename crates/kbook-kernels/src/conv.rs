//! Direct 2-D convolution, one thread per output element.

use tracing::debug;

use kbook_core::{KbookError, Result, Tensor};

use crate::input_slice;
use crate::launch::{grid_1d, launch_1d, BLOCK_SIZE};

/// Stride, padding, dilation and groups of a convolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvParams {
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub groups: usize,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self { stride: 1, padding: 0, dilation: 1, groups: 1 }
    }
}

/// Resolved sizes of one convolution launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvGeometry {
    pub batch: usize,
    pub in_channels: usize,
    pub in_h: usize,
    pub in_w: usize,
    pub out_channels: usize,
    pub kernel_h: usize,
    pub kernel_w: usize,
    pub out_h: usize,
    pub out_w: usize,
}

impl ConvGeometry {
    /// Validate input/weight/bias shapes against `params`.
    pub fn resolve(x: &Tensor, weight: &Tensor, bias: Option<&Tensor>, params: &ConvParams) -> Result<Self> {
        let [batch, in_channels, in_h, in_w] = match *x.shape().dims() {
            [n, c, h, w] => [n, c, h, w],
            ref d => return Err(KbookError::ShapeMismatch { expected: vec![0, 0, 0, 0], got: d.to_vec() }),
        };
        let [out_channels, icpg, kernel_h, kernel_w] = match *weight.shape().dims() {
            [o, i, h, w] => [o, i, h, w],
            ref d => return Err(KbookError::ShapeMismatch { expected: vec![0, 0, 0, 0], got: d.to_vec() }),
        };
        let ConvParams { stride, padding, dilation, groups } = *params;
        if stride == 0 || dilation == 0 || groups == 0 || kernel_h == 0 || kernel_w == 0 {
            return Err(KbookError::InvalidArgument(format!("invalid conv2d parameters {params:?}")));
        }
        if in_channels != icpg * groups || out_channels % groups != 0 {
            return Err(KbookError::ShapeMismatch {
                expected: vec![out_channels, in_channels / groups, kernel_h, kernel_w],
                got: weight.shape().dims().to_vec(),
            });
        }
        if let Some(b) = bias {
            if b.shape().dims() != [out_channels] {
                return Err(KbookError::ShapeMismatch {
                    expected: vec![out_channels],
                    got: b.shape().dims().to_vec(),
                });
            }
        }
        let span_h = dilation * (kernel_h - 1) + 1;
        let span_w = dilation * (kernel_w - 1) + 1;
        let (padded_h, padded_w) = (in_h + 2 * padding, in_w + 2 * padding);
        if padded_h < span_h || padded_w < span_w {
            return Err(KbookError::ShapeMismatch {
                expected: vec![span_h, span_w],
                got: vec![padded_h, padded_w],
            });
        }
        Ok(Self {
            batch,
            in_channels,
            in_h,
            in_w,
            out_channels,
            kernel_h,
            kernel_w,
            out_h: (padded_h - span_h) / stride + 1,
            out_w: (padded_w - span_w) / stride + 1,
        })
    }

    pub fn output_dims(&self) -> [usize; 4] {
        [self.batch, self.out_channels, self.out_h, self.out_w]
    }

    pub fn output_numel(&self) -> usize {
        self.output_dims().iter().product()
    }
}

/// `y = conv2d(x, weight) + bias` over NCHW tensors.
///
/// The grid is 1-D over the flattened output; thread `idx` unpacks
/// `(n, oc, oh, ow)` from its index and accumulates its own receptive field.
pub fn conv2d(x: &Tensor, weight: &Tensor, bias: Option<&Tensor>, params: &ConvParams) -> Result<Tensor> {
    let geo = ConvGeometry::resolve(x, weight, bias, params)?;
    let x = x.contiguous();
    let weight = weight.contiguous();
    let bias = bias.map(Tensor::contiguous);
    let input = input_slice(&x)?;
    let w = input_slice(&weight)?;
    let b = bias.as_ref().map(input_slice).transpose()?;

    let total = geo.output_numel();
    let mut out = vec![0.0f32; total];
    if total > 0 {
        let icpg = geo.in_channels / params.groups;
        let ocpg = geo.out_channels / params.groups;
        let cfg = grid_1d(total, BLOCK_SIZE);
        debug!(
            kernel = "conv2d",
            grid = ?cfg.grid_dim,
            block = ?cfg.block_dim,
            threads = cfg.total_threads(),
            "launch"
        );
        launch_1d(cfg, &mut out, |t| {
            let idx = t.global_x();
            if idx >= total {
                return None;
            }
            let ow = idx % geo.out_w;
            let oh = (idx / geo.out_w) % geo.out_h;
            let oc = (idx / (geo.out_w * geo.out_h)) % geo.out_channels;
            let n = idx / (geo.out_w * geo.out_h * geo.out_channels);
            let group = oc / ocpg;

            let mut sum = b.map_or(0.0, |b| b[oc]);
            for icl in 0..icpg {
                let ic = group * icpg + icl;
                for kh in 0..geo.kernel_h {
                    let ih = (oh * params.stride + kh * params.dilation) as isize - params.padding as isize;
                    if ih < 0 || ih >= geo.in_h as isize {
                        continue;
                    }
                    for kw in 0..geo.kernel_w {
                        let iw = (ow * params.stride + kw * params.dilation) as isize - params.padding as isize;
                        if iw < 0 || iw >= geo.in_w as isize {
                            continue;
                        }
                        let x_idx = ((n * geo.in_channels + ic) * geo.in_h + ih as usize) * geo.in_w + iw as usize;
                        let w_idx = ((oc * icpg + icl) * geo.kernel_h + kh) * geo.kernel_w + kw;
                        sum += input[x_idx] * w[w_idx];
                    }
                }
            }
            Some(sum)
        })?;
    }
    Ok(Tensor::from_f32_vec(out, &geo.output_dims()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_kernel() {
        let x = Tensor::from_f32_vec((0..18).map(|v| v as f32).collect(), &[1, 2, 3, 3]);
        // 1x1 kernel picking channel 1
        let w = Tensor::from_f32(&[0.0, 1.0], &[1, 2, 1, 1]);
        let y = conv2d(&x, &w, None, &ConvParams::default()).unwrap();
        assert_eq!(y.shape().dims(), &[1, 1, 3, 3]);
        assert_eq!(y.to_vec(), (9..18).map(|v| v as f32).collect::<Vec<_>>());
    }

    #[test]
    fn test_bias_and_padding() {
        let x = Tensor::ones(&[1, 1, 2, 2]);
        let w = Tensor::ones(&[1, 1, 3, 3]);
        let bias = Tensor::from_f32(&[0.5], &[1]);
        let params = ConvParams { padding: 1, ..Default::default() };
        let y = conv2d(&x, &w, Some(&bias), &params).unwrap();
        assert_eq!(y.shape().dims(), &[1, 1, 2, 2]);
        assert_eq!(y.as_f32_slice().unwrap(), &[4.5, 4.5, 4.5, 4.5]);
    }

    #[test]
    fn test_dilation_and_stride() {
        let x = Tensor::from_f32_vec((0..25).map(|v| v as f32).collect(), &[1, 1, 5, 5]);
        let w = Tensor::ones(&[1, 1, 2, 2]);
        let params = ConvParams { stride: 2, dilation: 2, ..Default::default() };
        let y = conv2d(&x, &w, None, &params).unwrap();
        // span 3: out (5 - 3) / 2 + 1 = 2
        assert_eq!(y.shape().dims(), &[1, 1, 2, 2]);
        // top-left taps (0,0), (0,2), (2,0), (2,2)
        assert_eq!(y.to_vec()[0], 0.0 + 2.0 + 10.0 + 12.0);
    }

    #[test]
    fn test_geometry_errors() {
        let x = Tensor::ones(&[1, 3, 4, 4]);
        let w = Tensor::ones(&[2, 3, 3, 3]);
        let groups = ConvParams { groups: 3, ..Default::default() };
        assert!(conv2d(&x, &w, None, &groups).is_err());
        assert!(conv2d(&x, &Tensor::ones(&[2, 3, 5, 5]), None, &ConvParams::default()).is_err());
        assert!(conv2d(&x, &w, Some(&Tensor::ones(&[3])), &ConvParams::default()).is_err());
        assert!(conv2d(&Tensor::ones(&[3, 4, 4]), &w, None, &ConvParams::default()).is_err());
    }
}
