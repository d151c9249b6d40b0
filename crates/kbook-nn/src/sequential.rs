use kbook_core::{Tensor, Result};

use crate::module::Module;

/// An ordered container that chains modules sequentially.
///
/// ```ignore
/// let stem = Sequential::new(vec![
///     Box::new(Conv2d::init(cfg, &mut rng)?),
///     Box::new(BatchNorm2d::new(64)),
///     Box::new(ReLU),
/// ]);
/// let features = stem.forward(&images)?;
/// ```
pub struct Sequential {
    layers: Vec<Box<dyn Module>>,
    training: bool,
}

impl Sequential {
    pub fn new(layers: Vec<Box<dyn Module>>) -> Self {
        Self { layers, training: true }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn push(&mut self, module: Box<dyn Module>) {
        self.layers.push(module);
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&dyn Module> {
        self.layers.get(index).map(|m| m.as_ref())
    }
}

impl Module for Sequential {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut x = input.clone();
        for layer in &self.layers {
            x = layer.forward(&x)?;
        }
        Ok(x)
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        let mut params = Vec::new();
        for (i, module) in self.layers.iter().enumerate() {
            for (name, tensor) in module.named_parameters() {
                params.push((format!("{}.{}", i, name), tensor));
            }
        }
        params
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
        for layer in &mut self.layers {
            layer.train(mode);
        }
    }

    fn is_training(&self) -> bool {
        self.training
    }
}
