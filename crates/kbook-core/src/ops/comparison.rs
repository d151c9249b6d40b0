//! Numeric comparison of tensors, used to judge solutions against references.

use crate::error::KbookError;
use crate::tensor::Tensor;
use crate::Result;

fn check_same_shape(a: &Tensor, b: &Tensor) -> Result<()> {
    if a.shape() != b.shape() {
        return Err(KbookError::ShapeMismatch {
            expected: a.shape().dims().to_vec(),
            got: b.shape().dims().to_vec(),
        });
    }
    Ok(())
}

impl Tensor {
    /// Largest absolute element-wise difference. NaN in either input yields NaN.
    pub fn max_abs_diff(&self, other: &Tensor) -> Result<f32> {
        check_same_shape(self, other)?;
        let a = self.to_vec();
        let b = other.to_vec();
        let mut worst = 0.0f32;
        for (x, y) in a.iter().zip(&b) {
            if x == y {
                continue;
            }
            let d = (x - y).abs();
            if d.is_nan() {
                return Ok(f32::NAN);
            }
            worst = worst.max(d);
        }
        Ok(worst)
    }

    /// `true` when every element satisfies `|self - other| <= atol + rtol * |other|`.
    ///
    /// `other` is the reference side. Equal values (including equal
    /// infinities) are close; NaN never is.
    pub fn allclose(&self, other: &Tensor, atol: f32, rtol: f32) -> Result<bool> {
        check_same_shape(self, other)?;
        let a = self.to_vec();
        let b = other.to_vec();
        Ok(a
            .iter()
            .zip(&b)
            .all(|(x, y)| x == y || (y.is_finite() && (x - y).abs() <= atol + rtol * y.abs())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_abs_diff() {
        let a = Tensor::from_f32(&[1.0, 2.0, 3.0], &[3]);
        let b = Tensor::from_f32(&[1.0, 2.5, 2.0], &[3]);
        assert_eq!(a.max_abs_diff(&b).unwrap(), 1.0);
        assert_eq!(a.max_abs_diff(&a).unwrap(), 0.0);
    }

    #[test]
    fn test_allclose_tolerances() {
        let r = Tensor::from_f32(&[100.0, 0.0], &[2]);
        let s = Tensor::from_f32(&[100.5, 0.005], &[2]);
        assert!(s.allclose(&r, 1e-2, 1e-2).unwrap());
        assert!(!s.allclose(&r, 1e-3, 1e-3).unwrap());
    }

    #[test]
    fn test_nan_not_close() {
        let r = Tensor::from_f32(&[1.0], &[1]);
        let s = Tensor::from_f32(&[f32::NAN], &[1]);
        assert!(!s.allclose(&r, 1.0, 1.0).unwrap());
        assert!(s.max_abs_diff(&r).unwrap().is_nan());
    }

    #[test]
    fn test_matching_infinities_are_close() {
        let r = Tensor::from_f32(&[f32::INFINITY, f32::NEG_INFINITY, 1.0], &[3]);
        let s = Tensor::from_f32(&[f32::INFINITY, f32::NEG_INFINITY, 1.0], &[3]);
        assert!(s.allclose(&r, 0.0, 0.0).unwrap());
        assert_eq!(s.max_abs_diff(&r).unwrap(), 0.0);

        let flipped = Tensor::from_f32(&[f32::NEG_INFINITY, f32::NEG_INFINITY, 1.0], &[3]);
        assert!(!flipped.allclose(&r, 1.0, 1.0).unwrap());
        assert!(flipped.max_abs_diff(&r).unwrap().is_infinite());
    }

    #[test]
    fn test_shape_mismatch_is_error() {
        let a = Tensor::ones(&[2, 3]);
        let b = Tensor::ones(&[3, 2]);
        assert!(matches!(a.allclose(&b, 1.0, 1.0), Err(KbookError::ShapeMismatch { .. })));
        assert!(a.max_abs_diff(&b).is_err());
    }
}
