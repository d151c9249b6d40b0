use std::fmt;

use kbook_core::{Device, Result, Tensor};
use rand::rngs::StdRng;
use serde::Serialize;

use crate::model::Model;

/// What a problem computes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpKind {
    Selu,
    Tanh,
    Softplus,
    UpperTriangularMatmul,
    Conv2d,
    ResNet18,
}

impl fmt::Display for OpKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OpKind::Selu => "selu",
            OpKind::Tanh => "tanh",
            OpKind::Softplus => "softplus",
            OpKind::UpperTriangularMatmul => "triu matmul",
            OpKind::Conv2d => "conv2d",
            OpKind::ResNet18 => "resnet18",
        };
        f.write_str(name)
    }
}

/// Identity card of a problem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProblemSpec {
    pub name: &'static str,
    pub level: u8,
    pub index: u16,
    pub op: OpKind,
    pub description: &'static str,
}

/// Ordered, named integer constructor arguments of a model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InitArgs(Vec<(&'static str, usize)>);

impl InitArgs {
    pub fn new(args: Vec<(&'static str, usize)>) -> Self {
        Self(args)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn values(&self) -> Vec<usize> {
        self.0.iter().map(|&(_, v)| v).collect()
    }

    pub fn get(&self, name: &str) -> Option<usize> {
        self.0.iter().find(|(n, _)| *n == name).map(|&(_, v)| v)
    }
}

impl fmt::Display for InitArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.values())
    }
}

/// One example of the corpus.
///
/// `reference` and `solution` must draw their parameters from the RNG in the
/// same order, so that two identically seeded RNGs yield identical weights.
pub trait Problem: Send + Sync {
    fn spec(&self) -> ProblemSpec;

    /// Constructor arguments; empty when the model takes none.
    fn init_args(&self) -> InitArgs {
        InitArgs::default()
    }

    /// Random inputs of the documented shapes.
    fn inputs(&self, rng: &mut StdRng) -> Vec<Tensor>;

    /// Reject sizes the models cannot be built with.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Documented output shape.
    fn output_shape(&self) -> Vec<usize>;

    /// Model built from framework layers.
    fn reference(&self, rng: &mut StdRng) -> Result<Box<dyn Model>>;

    /// Kernel-backed model, when the problem has one.
    fn solution(&self, rng: &mut StdRng, device: Device) -> Result<Option<Box<dyn Model>>>;
}
