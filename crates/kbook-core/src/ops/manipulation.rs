//! Triangular masking.

use crate::error::KbookError;
use crate::tensor::Tensor;
use crate::Result;

impl Tensor {
    /// Keep elements on and above the `diagonal`-th diagonal of the last
    /// two axes; zero the rest.
    pub fn triu(&self, diagonal: i64) -> Result<Tensor> {
        let dims = self.shape().dims();
        if dims.len() < 2 {
            return Err(KbookError::InvalidAxis { axis: 1, ndim: dims.len() });
        }
        let rows = dims[dims.len() - 2];
        let cols = dims[dims.len() - 1];
        let mut data = self.to_vec();
        if rows * cols > 0 {
            for matrix in data.chunks_mut(rows * cols) {
                for (i, v) in matrix.iter_mut().enumerate() {
                    let (row, col) = ((i / cols) as i64, (i % cols) as i64);
                    if col - row < diagonal {
                        *v = 0.0;
                    }
                }
            }
        }
        Ok(Tensor::from_f32_vec(data, dims))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_triu() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 9.0], &[3, 3]);
        assert_eq!(
            t.triu(0).unwrap().as_f32_slice().unwrap(),
            &[1.0, 2.0, 3.0, 0.0, 5.0, 6.0, 0.0, 0.0, 9.0]
        );
        assert_eq!(
            t.triu(1).unwrap().as_f32_slice().unwrap(),
            &[0.0, 2.0, 3.0, 0.0, 0.0, 6.0, 0.0, 0.0, 0.0]
        );
    }

    #[test]
    fn test_negative_diagonal() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
        assert_eq!(t.triu(-1).unwrap().as_f32_slice().unwrap(), &[1.0, 2.0, 3.0, 4.0]);
        assert_eq!(t.triu(2).unwrap().as_f32_slice().unwrap(), &[0.0; 4]);
    }

    #[test]
    fn test_batched_and_rectangular() {
        let t = Tensor::ones(&[2, 2, 3]);
        let u = t.triu(0).unwrap();
        assert_eq!(
            u.as_f32_slice().unwrap(),
            &[1.0, 1.0, 1.0, 0.0, 1.0, 1.0, 1.0, 1.0, 1.0, 0.0, 1.0, 1.0]
        );
    }

    #[test]
    fn test_rank_one_rejected() {
        assert!(Tensor::ones(&[4]).triu(0).is_err());
    }
}
