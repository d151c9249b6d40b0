//! Batch normalisation over NCHW feature maps.

use parking_lot::Mutex;
use rayon::prelude::*;

use kbook_core::{KbookError, Result, Tensor};

use crate::module::Module;
use crate::nchw;

struct RunningStats {
    mean: Vec<f32>,
    var: Vec<f32>,
}

/// `BatchNorm2d` with affine parameters (γ initialised to 1, β to 0).
///
/// In training mode the layer normalises with the biased batch variance and
/// folds the unbiased variance into the running estimates. In eval mode it
/// normalises with the running estimates. New layers start in training mode.
pub struct BatchNorm2d {
    num_features: usize,
    eps: f32,
    momentum: f32,
    weight: Tensor,
    bias: Tensor,
    running: Mutex<RunningStats>,
    training: bool,
}

impl BatchNorm2d {
    /// Framework defaults: `eps = 1e-5`, `momentum = 0.1`.
    pub fn new(num_features: usize) -> Self {
        Self {
            num_features,
            eps: 1e-5,
            momentum: 0.1,
            weight: Tensor::ones(&[num_features]),
            bias: Tensor::zeros(&[num_features]),
            running: Mutex::new(RunningStats {
                mean: vec![0.0; num_features],
                var: vec![1.0; num_features],
            }),
            training: true,
        }
    }

    /// Per-channel (mean, biased variance), accumulated in f64.
    fn batch_stats(x: &[f32], [n, c, h, w]: [usize; 4]) -> Vec<(f32, f32)> {
        let plane = h * w;
        let count = (n * plane) as f64;
        (0..c)
            .into_par_iter()
            .map(|ch| {
                let planes = (0..n).map(|b| &x[(b * c + ch) * plane..(b * c + ch + 1) * plane]);
                let (mut sum, mut sq) = (0.0f64, 0.0f64);
                for p in planes {
                    for &v in p {
                        sum += v as f64;
                        sq += (v as f64) * (v as f64);
                    }
                }
                let mean = sum / count;
                let var = (sq / count - mean * mean).max(0.0);
                (mean as f32, var as f32)
            })
            .collect()
    }
}

impl Module for BatchNorm2d {
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let dims = nchw(input)?;
        let [n, c, h, w] = dims;
        if c != self.num_features {
            return Err(KbookError::ShapeMismatch {
                expected: vec![n, self.num_features, h, w],
                got: dims.to_vec(),
            });
        }
        let data = input.contiguous();
        let x = data.as_f32_slice().ok_or(KbookError::NotContiguous)?;

        let (mean, var): (Vec<f32>, Vec<f32>) = if self.training {
            let count = n * h * w;
            if count < 2 {
                return Err(KbookError::InvalidArgument(format!(
                    "batch_norm needs more than one value per channel in training, got input {dims:?}"
                )));
            }
            let stats = Self::batch_stats(x, dims);
            let correction = count as f32 / (count - 1) as f32;
            let mut running = self.running.lock();
            for (ch, &(m, v)) in stats.iter().enumerate() {
                running.mean[ch] = (1.0 - self.momentum) * running.mean[ch] + self.momentum * m;
                running.var[ch] = (1.0 - self.momentum) * running.var[ch] + self.momentum * v * correction;
            }
            stats.into_iter().unzip()
        } else {
            let running = self.running.lock();
            (running.mean.clone(), running.var.clone())
        };

        let gamma = self.weight.to_vec();
        let beta = self.bias.to_vec();
        let plane = h * w;
        let mut output = x.to_vec();
        if plane > 0 {
            output.par_chunks_mut(plane).enumerate().for_each(|(p, out)| {
                let ch = p % c;
                let scale = gamma[ch] / (var[ch] + self.eps).sqrt();
                let shift = beta[ch] - mean[ch] * scale;
                for v in out.iter_mut() {
                    *v = *v * scale + shift;
                }
            });
        }
        Ok(Tensor::from_f32_vec(output, &dims))
    }

    fn named_parameters(&self) -> Vec<(String, &Tensor)> {
        vec![("weight".into(), &self.weight), ("bias".into(), &self.bias)]
    }

    fn train(&mut self, mode: bool) {
        self.training = mode;
    }

    fn is_training(&self) -> bool {
        self.training
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_normalises_batch() {
        let bn = BatchNorm2d::new(2);
        // channel 0: 1,2,3,4 ; channel 1: all 5
        let input = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 5.0, 5.0, 5.0], &[1, 2, 2, 2]);
        let out = bn.forward(&input).unwrap().to_vec();
        let ch0 = &out[..4];
        let mean: f32 = ch0.iter().sum::<f32>() / 4.0;
        let var: f32 = ch0.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / 4.0;
        assert!(mean.abs() < 1e-6);
        assert!((var - 1.0).abs() < 1e-3);
        assert!(out[4..].iter().all(|v| v.abs() < 1e-6));
    }

    #[test]
    fn test_running_stats_update() {
        let bn = BatchNorm2d::new(1);
        let input = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 1, 1, 2]);
        bn.forward(&input).unwrap();
        // mean 2.5, unbiased var 5/3
        let running = bn.running.lock();
        assert!((running.mean[0] - 0.25).abs() < 1e-6);
        assert!((running.var[0] - (0.9 + 0.1 * 5.0 / 3.0)).abs() < 1e-6);
    }

    #[test]
    fn test_eval_uses_running_stats() {
        let mut bn = BatchNorm2d::new(1);
        bn.train(false);
        assert!(!bn.is_training());
        let input = Tensor::from_f32(&[1.0, 2.0], &[1, 1, 1, 2]);
        let out = bn.forward(&input).unwrap().to_vec();
        let s = (1.0f32 + 1e-5).sqrt();
        assert!((out[0] - 1.0 / s).abs() < 1e-6);
        assert!((out[1] - 2.0 / s).abs() < 1e-6);
        assert_eq!(bn.running.lock().mean, vec![0.0]);
    }

    #[test]
    fn test_single_value_per_channel_rejected_in_training() {
        let bn = BatchNorm2d::new(3);
        assert!(bn.forward(&Tensor::ones(&[1, 3, 1, 1])).is_err());
        assert!(bn.forward(&Tensor::ones(&[2, 4, 1, 1])).is_err());
    }
}
