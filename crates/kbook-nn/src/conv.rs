//! 2D convolution.

use rand::Rng;
use rayon::prelude::*;

use kbook_core::{KbookError, Result, Tensor};

use crate::module::Module;
use crate::nchw;

/// Construction parameters of a [`Conv2d`].
///
/// Defaults mirror the framework: stride 1, no padding, no dilation, one
/// group, with bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Conv2dConfig {
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: (usize, usize),
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub groups: usize,
    pub bias: bool,
}

impl Conv2dConfig {
    /// Square-kernel config with framework defaults.
    pub fn new(in_channels: usize, out_channels: usize, kernel_size: usize) -> Self {
        Self {
            in_channels,
            out_channels,
            kernel_size: (kernel_size, kernel_size),
            stride: 1,
            padding: 0,
            dilation: 1,
            groups: 1,
            bias: true,
        }
    }

    pub fn stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn padding(mut self, padding: usize) -> Self {
        self.padding = padding;
        self
    }

    pub fn dilation(mut self, dilation: usize) -> Self {
        self.dilation = dilation;
        self
    }

    pub fn groups(mut self, groups: usize) -> Self {
        self.groups = groups;
        self
    }

    pub fn bias(mut self, bias: bool) -> Self {
        self.bias = bias;
        self
    }

    /// Reject configurations the framework refuses to build.
    pub fn validate(&self) -> Result<()> {
        let (kh, kw) = self.kernel_size;
        if kh == 0 || kw == 0 || self.stride == 0 || self.dilation == 0 {
            return Err(KbookError::InvalidArgument(format!(
                "conv2d kernel {kh}x{kw}, stride {} and dilation {} must be positive",
                self.stride, self.dilation
            )));
        }
        if self.groups == 0
            || self.in_channels == 0
            || self.in_channels % self.groups != 0
            || self.out_channels % self.groups != 0
        {
            return Err(KbookError::InvalidArgument(format!(
                "conv2d channels {} -> {} not divisible into {} groups",
                self.in_channels, self.out_channels, self.groups
            )));
        }
        Ok(())
    }

    /// Input channels seen by each output channel.
    pub fn in_channels_per_group(&self) -> usize {
        self.in_channels / self.groups
    }

    /// Output spatial size: `(H + 2p - d(k-1) - 1) / s + 1` per axis.
    pub fn output_size(&self, in_h: usize, in_w: usize) -> Result<(usize, usize)> {
        self.validate()?;
        let (kh, kw) = self.kernel_size;
        let span_h = self.dilation * (kh - 1) + 1;
        let span_w = self.dilation * (kw - 1) + 1;
        let padded_h = in_h + 2 * self.padding;
        let padded_w = in_w + 2 * self.padding;
        if padded_h < span_h || padded_w < span_w {
            return Err(KbookError::ShapeMismatch {
                expected: vec![span_h, span_w],
                got: vec![padded_h, padded_w],
            });
        }
        Ok((
            (padded_h - span_h) / self.stride + 1,
            (padded_w - span_w) / self.stride + 1,
        ))
    }
}

/// 2D convolution layer: y = conv2d(x, weight) + bias
///
/// Input shape: `[batch, in_channels, height, width]`
/// Output shape: `[batch, out_channels, out_h, out_w]`
pub struct Conv2d {
    weight: Tensor, // [out_channels, in_channels / groups, kh, kw]
    bias: Option<Tensor>,
    config: Conv2dConfig,
    training: bool,
}

impl Conv2d {
    /// Build with weights and bias (if any) drawn uniformly from
    /// `±1/√fan_in`, the framework's default Kaiming-uniform bound.
    pub fn init<R: Rng + ?Sized>(config: Conv2dConfig, rng: &mut R) -> Result<Self> {
        config.validate()?;
        let (kh, kw) = config.kernel_size;
        let icpg = config.in_channels_per_group();
        let fan_in = icpg * kh * kw;
        let limit = 1.0 / (fan_in as f32).sqrt();
        let weight = Tensor::rand_uniform_with(
            &[config.out_channels, icpg, kh, kw],
            -limit,
            limit,
            rng,
        );

        let bias = config
            .bias
            .then(|| Tensor::rand_uniform_with(&[config.out_channels], -limit, limit, rng));

        Ok(Self { weight, bias, config, training: true })
    }

    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }
}

impl Module for Conv2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let [batch, in_ch, in_h, in_w] = nchw(input)?;
        let cfg = &self.config;
        if in_ch != cfg.in_channels {
            return Err(KbookError::ShapeMismatch {
                expected: vec![batch, cfg.in_channels, in_h, in_w],
                got: vec![batch, in_ch, in_h, in_w],
            });
        }
        let (out_h, out_w) = cfg.output_size(in_h, in_w)?;

        let data = input.contiguous();
        let x = data.as_f32_slice().ok_or(KbookError::NotContiguous)?;
        let w = self.weight.contiguous();
        let w_data = w.as_f32_slice().ok_or(KbookError::NotContiguous)?;
        let b_data = match &self.bias {
            Some(b) => Some(b.to_vec()),
            None => None,
        };

        let (kh, kw) = cfg.kernel_size;
        let icpg = cfg.in_channels_per_group();
        let ocpg = cfg.out_channels / cfg.groups;
        let plane = out_h * out_w;
        let mut output = vec![0.0f32; batch * cfg.out_channels * plane];
        if plane == 0 {
            return Ok(Tensor::from_f32_vec(output, &[batch, cfg.out_channels, out_h, out_w]));
        }

        // one output plane (b, oc) per task
        output.par_chunks_mut(plane).enumerate().for_each(|(p, out_plane)| {
            let b = p / cfg.out_channels;
            let oc = p % cfg.out_channels;
            let group = oc / ocpg;
            let bias = b_data.as_ref().map_or(0.0, |bd| bd[oc]);

            for oh in 0..out_h {
                for ow in 0..out_w {
                    let mut acc = 0.0f32;
                    for icl in 0..icpg {
                        let ic = group * icpg + icl;
                        let x_base = (b * in_ch + ic) * in_h * in_w;
                        let w_base = (oc * icpg + icl) * kh * kw;
                        for ki in 0..kh {
                            let ih = (oh * cfg.stride + ki * cfg.dilation) as isize - cfg.padding as isize;
                            if ih < 0 || ih >= in_h as isize { continue; }
                            for kj in 0..kw {
                                let iw = (ow * cfg.stride + kj * cfg.dilation) as isize - cfg.padding as isize;
                                if iw < 0 || iw >= in_w as isize { continue; }
                                acc += x[x_base + ih as usize * in_w + iw as usize]
                                    * w_data[w_base + ki * kw + kj];
                            }
                        }
                    }
                    out_plane[oh * out_w + ow] = acc + bias;
                }
            }
        });

        Ok(Tensor::from_f32_vec(output, &[batch, cfg.out_channels, out_h, out_w]))
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = vec![("weight".into(), &self.weight)];
        if let Some(ref b) = self.bias {
            params.push(("bias".into(), b));
        }
        params
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}
