//! Level 1 / 63: standard 2D convolution with a square input and kernel.

use kbook_core::{Device, Result, Tensor};
use kbook_kernels::{Backend, ConvParams};
use kbook_nn::{Conv2d, Conv2dConfig};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::model::{expect_inputs, Model, ModuleModel};
use crate::problem::{InitArgs, OpKind, Problem, ProblemSpec};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConvStandard2dSquare {
    pub batch_size: usize,
    pub in_channels: usize,
    pub out_channels: usize,
    pub kernel_size: usize,
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub padding: usize,
    pub dilation: usize,
    pub groups: usize,
    pub bias: bool,
}

impl ConvStandard2dSquare {
    pub fn documented() -> Self {
        Self {
            batch_size: 16,
            in_channels: 3,
            out_channels: 64,
            kernel_size: 3,
            width: 256,
            height: 256,
            stride: 1,
            padding: 0,
            dilation: 1,
            groups: 1,
            bias: false,
        }
    }

    pub fn tiny() -> Self {
        Self {
            batch_size: 2,
            out_channels: 8,
            width: 19,
            height: 19,
            ..Self::documented()
        }
    }

    fn config(&self) -> Conv2dConfig {
        Conv2dConfig::new(self.in_channels, self.out_channels, self.kernel_size)
            .stride(self.stride)
            .padding(self.padding)
            .dilation(self.dilation)
            .groups(self.groups)
            .bias(self.bias)
    }
}

/// Conv layer whose forward runs the direct-convolution kernel.
struct Conv2dKernel {
    layer: Conv2d,
    params: ConvParams,
    backend: Backend,
}

impl Model for Conv2dKernel {
    fn forward(&self, inputs: &[Tensor]) -> Result<Tensor> {
        let [x] = expect_inputs::<1>(inputs)?;
        self.backend.conv2d(x, self.layer.weight(), self.layer.bias(), &self.params)
    }
}

impl Problem for ConvStandard2dSquare {
    fn spec(&self) -> ProblemSpec {
        ProblemSpec {
            name: "conv_standard_2d_square",
            level: 1,
            index: 63,
            op: OpKind::Conv2d,
            description: "Standard 2D convolution, square input and square kernel",
        }
    }

    fn init_args(&self) -> InitArgs {
        InitArgs::new(vec![
            ("in_channels", self.in_channels),
            ("out_channels", self.out_channels),
            ("kernel_size", self.kernel_size),
        ])
    }

    fn inputs(&self, rng: &mut StdRng) -> Vec<Tensor> {
        vec![Tensor::randn_with(&[self.batch_size, self.in_channels, self.height, self.width], rng)]
    }

    fn validate(&self) -> Result<()> {
        self.config().output_size(self.height, self.width).map(drop)
    }

    /// Spatial dims are zero when the preset does not validate.
    fn output_shape(&self) -> Vec<usize> {
        let (out_h, out_w) = self.config().output_size(self.height, self.width).unwrap_or((0, 0));
        vec![self.batch_size, self.out_channels, out_h, out_w]
    }

    fn reference(&self, rng: &mut StdRng) -> Result<Box<dyn Model>> {
        Ok(Box::new(ModuleModel::new(Conv2d::init(self.config(), rng)?)))
    }

    fn solution(&self, rng: &mut StdRng, device: Device) -> Result<Option<Box<dyn Model>>> {
        let model: Box<dyn Model> = Box::new(Conv2dKernel {
            layer: Conv2d::init(self.config(), rng)?,
            params: ConvParams {
                stride: self.stride,
                padding: self.padding,
                dilation: self.dilation,
                groups: self.groups,
            },
            backend: Backend::new(device)?,
        });
        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_documented_shapes() {
        let p = ConvStandard2dSquare::documented();
        assert_eq!(p.init_args().values(), vec![3, 64, 3]);
        assert_eq!(p.output_shape(), vec![16, 64, 254, 254]);
        assert_eq!(ConvStandard2dSquare::tiny().output_shape(), vec![2, 8, 17, 17]);
    }

    #[test]
    fn test_invalid_preset_is_rejected() {
        let p = ConvStandard2dSquare { stride: 0, ..ConvStandard2dSquare::tiny() };
        assert!(p.validate().is_err());
        assert_eq!(p.output_shape(), vec![2, 8, 0, 0]);

        let p = ConvStandard2dSquare { kernel_size: 0, ..ConvStandard2dSquare::tiny() };
        assert!(p.validate().is_err());
        assert_eq!(p.output_shape(), vec![2, 8, 0, 0]);

        let p = ConvStandard2dSquare { kernel_size: 25, ..ConvStandard2dSquare::tiny() };
        assert!(p.validate().is_err());
        assert!(ConvStandard2dSquare::documented().validate().is_ok());
    }
}
