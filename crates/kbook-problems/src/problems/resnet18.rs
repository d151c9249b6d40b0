//! Level 3 / 9: ResNet-18.
//!
//! The solution keeps every framework layer and replaces only the residual
//! addition at the end of each basic block with the `elementwise_add` kernel.

use kbook_core::{Device, Result, Tensor};
use kbook_kernels::Backend;
use kbook_nn::{
    activations, AdaptiveAvgPool2d, BatchNorm2d, Conv2d, Conv2dConfig, Linear, MaxPool2d, Module, ReLU,
    Sequential,
};
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

use crate::model::{Model, ModuleModel};
use crate::problem::{InitArgs, OpKind, Problem, ProblemSpec};

const BLOCKS_PER_STAGE: usize = 2;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResNet18 {
    pub batch_size: usize,
    pub num_classes: usize,
    pub in_channels: usize,
    pub image_size: usize,
    /// Channels of the stem and first stage; later stages double it.
    pub base_width: usize,
}

impl ResNet18 {
    pub fn documented() -> Self {
        Self {
            batch_size: 2,
            num_classes: 1000,
            in_channels: 3,
            image_size: 224,
            base_width: 64,
        }
    }

    /// Narrow, 32x32 variant. Layer 4 still sees two values per channel, so
    /// batch statistics stay defined.
    pub fn tiny() -> Self {
        Self {
            batch_size: 2,
            num_classes: 10,
            in_channels: 3,
            image_size: 32,
            base_width: 8,
        }
    }

    /// Build the network; `skip` selects how residuals are added.
    ///
    /// Parameters are drawn in a fixed order, so reference and solution
    /// built from equally seeded RNGs carry identical weights.
    pub fn build(&self, rng: &mut StdRng, skip: SkipAdd) -> Result<ResNet18Net> {
        let w = self.base_width;
        let stem = Sequential::new(vec![
            Box::new(Conv2d::init(
                Conv2dConfig::new(self.in_channels, w, 7).stride(2).padding(3).bias(false),
                rng,
            )?),
            Box::new(BatchNorm2d::new(w)),
            Box::new(ReLU),
            Box::new(MaxPool2d::new(3, 2, 1)),
        ]);

        let mut in_channels = w;
        let mut stages = Vec::with_capacity(4);
        for (i, width) in [w, 2 * w, 4 * w, 8 * w].into_iter().enumerate() {
            let stride = if i == 0 { 1 } else { 2 };
            let mut blocks = Vec::with_capacity(BLOCKS_PER_STAGE);
            let downsample = if stride != 1 || in_channels != width {
                Some(Sequential::new(vec![
                    Box::new(Conv2d::init(
                        Conv2dConfig::new(in_channels, width, 1).stride(stride).bias(false),
                        rng,
                    )?),
                    Box::new(BatchNorm2d::new(width)),
                ]))
            } else {
                None
            };
            blocks.push(BasicBlock::init(in_channels, width, stride, downsample, skip, rng)?);
            in_channels = width;
            for _ in 1..BLOCKS_PER_STAGE {
                blocks.push(BasicBlock::init(in_channels, width, 1, None, skip, rng)?);
            }
            stages.push(blocks);
        }

        Ok(ResNet18Net {
            stem,
            stages,
            avgpool: AdaptiveAvgPool2d::global(),
            fc: Linear::init(in_channels, self.num_classes, true, rng)?,
            training: true,
        })
    }
}

/// How a basic block adds its residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipAdd {
    /// Broadcasting tensor add of the framework.
    Framework,
    /// The `elementwise_add` kernel.
    Kernel(Backend),
}

impl SkipAdd {
    fn apply(&self, out: &Tensor, identity: &Tensor) -> Result<Tensor> {
        match self {
            SkipAdd::Framework => out.add(identity),
            SkipAdd::Kernel(backend) => backend.elementwise_add(out, identity),
        }
    }
}

/// conv3x3(stride) → BN → ReLU → conv3x3 → BN, plus the identity
/// (downsampled when the shape changes), then ReLU.
pub struct BasicBlock {
    conv1: Conv2d,
    bn1: BatchNorm2d,
    conv2: Conv2d,
    bn2: BatchNorm2d,
    downsample: Option<Sequential>,
    skip: SkipAdd,
}

impl BasicBlock {
    fn init(
        in_channels: usize,
        out_channels: usize,
        stride: usize,
        downsample: Option<Sequential>,
        skip: SkipAdd,
        rng: &mut StdRng,
    ) -> Result<Self> {
        let conv3x3 = |cin, s| Conv2dConfig::new(cin, out_channels, 3).stride(s).padding(1).bias(false);
        Ok(Self {
            conv1: Conv2d::init(conv3x3(in_channels, stride), rng)?,
            bn1: BatchNorm2d::new(out_channels),
            conv2: Conv2d::init(conv3x3(out_channels, 1), rng)?,
            bn2: BatchNorm2d::new(out_channels),
            downsample,
            skip,
        })
    }
}

fn prefixed<'a>(prefix: &str, module: &'a dyn Module) -> Vec<(String, &'a Tensor)> {
    module
        .named_parameters()
        .into_iter()
        .map(|(name, t)| (format!("{prefix}.{name}"), t))
        .collect()
}

impl Module for BasicBlock {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let out = self.conv1.forward(x)?;
        let out = activations::relu(&self.bn1.forward(&out)?)?;
        let out = self.bn2.forward(&self.conv2.forward(&out)?)?;

        let identity = match &self.downsample {
            Some(ds) => ds.forward(x)?,
            None => x.clone(),
        };
        activations::relu(&self.skip.apply(&out, &identity)?)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = prefixed("conv1", &self.conv1);
        params.extend(prefixed("bn1", &self.bn1));
        params.extend(prefixed("conv2", &self.conv2));
        params.extend(prefixed("bn2", &self.bn2));
        if let Some(ds) = &self.downsample {
            params.extend(prefixed("downsample", ds));
        }
        params
    }

    fn train(&mut self, mode: bool) {
        self.conv1.train(mode);
        self.bn1.train(mode);
        self.conv2.train(mode);
        self.bn2.train(mode);
        if let Some(ds) = &mut self.downsample {
            ds.train(mode);
        }
    }

    fn is_training(&self) -> bool {
        self.bn1.is_training()
    }
}

/// Stem, four stages of two basic blocks, global pool and classifier.
pub struct ResNet18Net {
    stem: Sequential,
    stages: Vec<Vec<BasicBlock>>,
    avgpool: AdaptiveAvgPool2d,
    fc: Linear,
    training: bool,
}

impl Module for ResNet18Net {
    fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let mut x = self.stem.forward(x)?;
        for block in self.stages.iter().flatten() {
            x = block.forward(&x)?;
        }
        let x = self.avgpool.forward(&x)?.flatten(1)?;
        self.fc.forward(&x)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = prefixed("stem", &self.stem);
        for (s, stage) in self.stages.iter().enumerate() {
            for (b, block) in stage.iter().enumerate() {
                params.extend(prefixed(&format!("layer{}.{}", s + 1, b), block));
            }
        }
        params.extend(prefixed("fc", &self.fc));
        params
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
        self.stem.train(mode);
        for block in self.stages.iter_mut().flatten() {
            block.train(mode);
        }
        self.fc.train(mode);
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

impl Problem for ResNet18 {
    fn spec(&self) -> ProblemSpec {
        ProblemSpec {
            name: "resnet18",
            level: 3,
            index: 9,
            op: OpKind::ResNet18,
            description: "ResNet-18 image classifier built from residual basic blocks",
        }
    }

    fn init_args(&self) -> InitArgs {
        InitArgs::new(vec![("num_classes", self.num_classes)])
    }

    fn inputs(&self, rng: &mut StdRng) -> Vec<Tensor> {
        vec![Tensor::randn_with(
            &[self.batch_size, self.in_channels, self.image_size, self.image_size],
            rng,
        )]
    }

    fn output_shape(&self) -> Vec<usize> {
        vec![self.batch_size, self.num_classes]
    }

    fn reference(&self, rng: &mut StdRng) -> Result<Box<dyn Model>> {
        Ok(Box::new(ModuleModel::new(self.build(rng, SkipAdd::Framework)?)))
    }

    fn solution(&self, rng: &mut StdRng, device: Device) -> Result<Option<Box<dyn Model>>> {
        let skip = SkipAdd::Kernel(Backend::new(device)?);
        let model: Box<dyn Model> = Box::new(ModuleModel::new(self.build(rng, skip)?));
        Ok(Some(model))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_parameter_layout() {
        let net = ResNet18::tiny().build(&mut StdRng::seed_from_u64(0), SkipAdd::Framework).unwrap();
        let params = net.named_parameters();
        // stem conv + bn, 8 blocks of 6, 3 downsamples of 3, fc weight + bias
        assert_eq!(params.len(), 3 + 8 * 6 + 3 * 3 + 2);
        let names: Vec<&str> = params.iter().map(|(n, _)| n.as_str()).collect();
        assert!(names.contains(&"stem.0.weight"));
        assert!(names.contains(&"layer2.0.downsample.0.weight"));
        assert!(!names.contains(&"layer1.0.downsample.0.weight"));
        assert!(names.contains(&"fc.bias"));
    }

    #[test]
    fn test_tiny_forward_shape() {
        let problem = ResNet18::tiny();
        let mut rng = StdRng::seed_from_u64(1);
        let model = problem.reference(&mut rng).unwrap();
        let out = model.forward(&problem.inputs(&mut rng)).unwrap();
        assert_eq!(out.shape().dims(), &problem.output_shape()[..]);
    }

    #[test]
    fn test_train_mode_propagates() {
        let mut net = ResNet18::tiny().build(&mut StdRng::seed_from_u64(0), SkipAdd::Framework).unwrap();
        assert!(net.is_training());
        net.train(false);
        assert!(!net.is_training());
        assert!(net.stages.iter().flatten().all(|b| !b.is_training()));
    }
}
