//! Activation functions, as free functions and as parameterless modules.

use kbook_core::Tensor;

use crate::module::Module;

/// SELU scale `α`.
pub const SELU_ALPHA: f32 = 1.673_263_2;
/// SELU output scale `λ`.
pub const SELU_SCALE: f32 = 1.050_701;

/// Softplus switches to the identity above this input.
pub const SOFTPLUS_THRESHOLD: f32 = 20.0;

/// ReLU activation: max(0, x)
pub fn relu(input: &Tensor) -> kbook_core::Result<Tensor> {
    input.clamp(0.0, f32::INFINITY)
}

/// Tanh activation.
pub fn tanh(input: &Tensor) -> kbook_core::Result<Tensor> {
    input.map(f32::tanh)
}

/// Softplus with β = 1: `ln(1 + eˣ)`, linear above the threshold.
pub fn softplus(input: &Tensor) -> kbook_core::Result<Tensor> {
    input.map(|x| if x > SOFTPLUS_THRESHOLD { x } else { x.exp().ln_1p() })
}

/// SELU: `λ·x` for positive x, `λ·α·(eˣ − 1)` otherwise.
pub fn selu(input: &Tensor) -> kbook_core::Result<Tensor> {
    input.map(|x| {
        if x > 0.0 {
            SELU_SCALE * x
        } else {
            SELU_SCALE * SELU_ALPHA * x.exp_m1()
        }
    })
}

macro_rules! activation_module {
    ($(#[$doc:meta])* $name:ident => $func:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, Default)]
        pub struct $name;

        impl Module for $name {
            fn forward(&self, input: &Tensor) -> kbook_core::Result<Tensor> {
                $func(input)
            }

            fn named_parameters(&self) -> Vec<(String, &Tensor)> {
                vec![]
            }
        }
    };
}

activation_module!(
    /// Module form of [`relu`].
    ReLU => relu
);
activation_module!(Tanh => tanh);
activation_module!(Softplus => softplus);
activation_module!(Selu => selu);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_relu() {
        let t = Tensor::from_f32(&[-1.0, 0.0, 1.0, 2.0], &[4]);
        let r = relu(&t).unwrap();
        assert_eq!(r.as_f32_slice().unwrap(), &[0.0, 0.0, 1.0, 2.0]);
    }

    #[test]
    fn test_tanh() {
        let t = Tensor::from_f32(&[0.0, 1.0, -1.0], &[3]);
        let data = Tanh.forward(&t).unwrap().to_vec();
        assert!((data[0] - 0.0).abs() < 1e-6);
        assert!((data[1] - 1.0f32.tanh()).abs() < 1e-6);
    }

    #[test]
    fn test_softplus() {
        let t = Tensor::from_f32(&[0.0, 1.0, 30.0, -30.0], &[4]);
        let data = softplus(&t).unwrap().to_vec();
        assert!((data[0] - std::f32::consts::LN_2).abs() < 1e-6);
        assert!((data[1] - 1.313_261_7).abs() < 1e-5);
        // above the threshold softplus is the identity
        assert_eq!(data[2], 30.0);
        assert!(data[3] > 0.0 && data[3] < 1e-12);
    }

    #[test]
    fn test_selu() {
        let t = Tensor::from_f32(&[1.0, 0.0, -1.0], &[3]);
        let data = Selu.forward(&t).unwrap().to_vec();
        assert!((data[0] - 1.050_701).abs() < 1e-6);
        assert_eq!(data[1], 0.0);
        assert!((data[2] - (-1.111_330_7)).abs() < 1e-5);
    }

    #[test]
    fn test_modules_have_no_parameters() {
        assert!(ReLU.parameters().is_empty());
        assert!(Softplus.named_parameters().is_empty());
    }
}
