use std::fmt;

use rand::Rng;
use smallvec::SmallVec;

use crate::error::KbookError;
use crate::shape::Shape;
use crate::storage::Storage;
use crate::Result;

/// A multi-dimensional f32 array, the value every problem consumes and produces.
///
/// Tensors are immutable values: every operation returns a new tensor, and
/// views (reshape, transpose) share the underlying storage.
///
/// # Examples
///
/// ```
/// use kbook_core::Tensor;
///
/// let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0], &[2, 2]);
/// assert_eq!(t.shape().dims(), &[2, 2]);
///
/// let flat = t.reshape(&[4]).unwrap();
/// assert_eq!(flat.shape().dims(), &[4]);
/// ```
#[derive(Clone)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
    strides: SmallVec<[usize; 4]>,
    offset: usize,
}

impl Tensor {
    // =========================================================================
    // Constructors
    // =========================================================================

    /// Create a tensor from f32 data with the given shape.
    ///
    /// # Panics
    /// Panics if `data.len()` does not match the shape's element count.
    pub fn from_f32(data: &[f32], shape: &[usize]) -> Self {
        Self::from_f32_vec(data.to_vec(), shape)
    }

    /// Like [`Tensor::from_f32`], taking ownership of the buffer.
    pub fn from_f32_vec(data: Vec<f32>, shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        assert_eq!(
            s.numel(),
            data.len(),
            "shape {:?} requires {} elements, got {}",
            shape,
            s.numel(),
            data.len()
        );
        Self::from_storage(Storage::from_vec(data), shape)
    }

    pub fn zeros(shape: &[usize]) -> Self {
        Self::from_storage(Storage::zeros(Shape::new(shape).numel()), shape)
    }

    pub fn ones(shape: &[usize]) -> Self {
        Self::from_f32_vec(vec![1.0; Shape::new(shape).numel()], shape)
    }

    /// Standard normal N(0, 1) values drawn from `rng` (Box-Muller).
    ///
    /// Problems use this with a seeded `StdRng` so inputs are reproducible.
    pub fn randn_with<R: Rng + ?Sized>(shape: &[usize], rng: &mut R) -> Self {
        let numel = Shape::new(shape).numel();
        let data: Vec<f32> = (0..numel)
            .map(|_| {
                let u1: f32 = rng.gen_range(1e-7f32..1.0f32);
                let u2: f32 = rng.gen_range(0.0f32..std::f32::consts::TAU);
                (-2.0 * u1.ln()).sqrt() * u2.cos()
            })
            .collect();
        Self::from_f32_vec(data, shape)
    }

    /// Values uniformly distributed in `[low, high)` drawn from `rng`.
    pub fn rand_uniform_with<R: Rng + ?Sized>(shape: &[usize], low: f32, high: f32, rng: &mut R) -> Self {
        let numel = Shape::new(shape).numel();
        let data: Vec<f32> = (0..numel).map(|_| rng.gen_range(low..high)).collect();
        Self::from_f32_vec(data, shape)
    }

    /// Wrap pre-built storage as a contiguous tensor.
    fn from_storage(storage: Storage, shape: &[usize]) -> Self {
        let s = Shape::new(shape);
        let strides = s.contiguous_strides();
        Self { storage, shape: s, strides, offset: 0 }
    }

    // =========================================================================
    // Properties
    // =========================================================================

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.ndim()
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    /// Whether this tensor is row-major contiguous with no offset.
    pub fn is_contiguous(&self) -> bool {
        self.offset == 0 && self.strides == self.shape.contiguous_strides()
    }

    // =========================================================================
    // Data access
    // =========================================================================

    /// f32 data of a contiguous tensor.
    pub fn as_f32_slice(&self) -> Option<&[f32]> {
        if !self.is_contiguous() {
            return None;
        }
        Some(self.storage.as_slice())
    }

    /// Mutable f32 data (contiguous only, copy-on-write).
    pub fn as_f32_slice_mut(&mut self) -> Option<&mut [f32]> {
        if !self.is_contiguous() {
            return None;
        }
        Some(self.storage.make_mut())
    }

    /// Data in logical order, materialising views.
    pub fn to_vec(&self) -> Vec<f32> {
        let src = self.storage.as_slice();
        (0..self.numel()).map(|i| src[self.flat_to_physical(i)]).collect()
    }

    fn flat_to_physical(&self, flat_index: usize) -> usize {
        let mut remaining = flat_index;
        let mut physical = self.offset;
        for (cs, &s) in self.shape.contiguous_strides().iter().zip(self.strides.iter()) {
            physical += (remaining / cs) * s;
            remaining %= cs;
        }
        physical
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Reshape (zero-copy; the tensor must be contiguous).
    pub fn reshape(&self, new_shape: &[isize]) -> Result<Tensor> {
        let resolved = self.shape.resolve_reshape(new_shape).ok_or_else(|| {
            KbookError::InvalidReshape {
                numel: self.numel(),
                shape: new_shape.to_vec(),
            }
        })?;
        if !self.is_contiguous() {
            return Err(KbookError::NotContiguous);
        }
        let strides = resolved.contiguous_strides();
        Ok(Tensor {
            storage: self.storage.clone(),
            shape: resolved,
            strides,
            offset: self.offset,
        })
    }

    /// Collapse every axis from `start_dim` onwards into one.
    ///
    /// `[2, 512, 1, 1].flatten(1)` is `[2, 512]`.
    pub fn flatten(&self, start_dim: usize) -> Result<Tensor> {
        let dims = self.shape.dims();
        if start_dim >= dims.len() {
            return Err(KbookError::InvalidAxis { axis: start_dim, ndim: dims.len() });
        }
        let mut target: Vec<isize> = dims[..start_dim].iter().map(|&d| d as isize).collect();
        target.push(dims[start_dim..].iter().product::<usize>() as isize);
        self.contiguous().reshape(&target)
    }

    /// Swap the last two axes (zero-copy view).
    pub fn transpose(&self) -> Result<Tensor> {
        let shape = self.shape.transpose().ok_or(KbookError::InvalidAxis {
            axis: 1,
            ndim: self.ndim(),
        })?;
        let n = self.ndim();
        let mut strides = self.strides.clone();
        strides.swap(n - 2, n - 1);
        Ok(Tensor {
            storage: self.storage.clone(),
            shape,
            strides,
            offset: self.offset,
        })
    }

    /// Contiguous copy of this tensor (cheap clone if already contiguous).
    pub fn contiguous(&self) -> Tensor {
        if self.is_contiguous() {
            return self.clone();
        }
        Tensor::from_f32_vec(self.to_vec(), self.shape.dims())
    }
}

impl fmt::Debug for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor(shape={}, contiguous={})",
            self.shape,
            self.is_contiguous(),
        )
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.as_f32_slice() {
            Some(data) if data.len() <= 20 => write!(f, "tensor({:?}, shape={})", data, self.shape),
            Some(data) => write!(
                f,
                "tensor([{:.4}, {:.4}, ..., {:.4}], shape={})",
                data[0],
                data[1],
                data[data.len() - 1],
                self.shape
            ),
            None => write!(f, "tensor(shape={}, strided)", self.shape),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_from_f32() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        assert_eq!(t.shape().dims(), &[2, 3]);
        assert_eq!(t.numel(), 6);
        assert!(t.is_contiguous());
    }

    #[test]
    fn test_zeros_ones() {
        assert!(Tensor::zeros(&[3, 4]).as_f32_slice().unwrap().iter().all(|&v| v == 0.0));
        assert_eq!(Tensor::ones(&[2, 2]).as_f32_slice().unwrap(), &[1.0; 4]);
    }

    #[test]
    fn test_randn_seeded_is_reproducible() {
        let a = Tensor::randn_with(&[4, 8], &mut StdRng::seed_from_u64(7));
        let b = Tensor::randn_with(&[4, 8], &mut StdRng::seed_from_u64(7));
        let c = Tensor::randn_with(&[4, 8], &mut StdRng::seed_from_u64(8));
        assert_eq!(a.as_f32_slice(), b.as_f32_slice());
        assert_ne!(a.as_f32_slice(), c.as_f32_slice());
    }

    #[test]
    fn test_randn_moments() {
        let t = Tensor::randn_with(&[20_000], &mut StdRng::seed_from_u64(1));
        let data = t.as_f32_slice().unwrap();
        let mean = data.iter().sum::<f32>() / data.len() as f32;
        let var = data.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / data.len() as f32;
        assert!(mean.abs() < 0.05, "mean {mean}");
        assert!((var - 1.0).abs() < 0.05, "var {var}");
    }

    #[test]
    fn test_rand_uniform_range() {
        let t = Tensor::rand_uniform_with(&[1000], -0.5, 0.5, &mut StdRng::seed_from_u64(3));
        assert!(t.as_f32_slice().unwrap().iter().all(|v| (-0.5..0.5).contains(v)));
    }

    #[test]
    fn test_reshape_and_flatten() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3, 1, 1]);
        let r = t.reshape(&[-1, 2]).unwrap();
        assert_eq!(r.shape().dims(), &[3, 2]);
        let f = t.flatten(1).unwrap();
        assert_eq!(f.shape().dims(), &[2, 3]);
        assert!(t.flatten(4).is_err());
        assert!(t.reshape(&[4, -1]).is_err());
    }

    #[test]
    fn test_transpose_and_contiguous() {
        let t = Tensor::from_f32(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]);
        let tr = t.transpose().unwrap();
        assert_eq!(tr.shape().dims(), &[3, 2]);
        assert!(!tr.is_contiguous());
        assert!(tr.as_f32_slice().is_none());
        assert_eq!(tr.reshape(&[6]).unwrap_err(), KbookError::NotContiguous);

        let c = tr.contiguous();
        assert!(c.is_contiguous());
        assert_eq!(c.as_f32_slice().unwrap(), &[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
        assert_eq!(tr.to_vec(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    }

    #[test]
    fn test_write_through_shared_view_copies() {
        let a = Tensor::from_f32(&[1.0, 2.0], &[2]);
        let mut b = a.reshape(&[1, 2]).unwrap();
        b.as_f32_slice_mut().unwrap()[0] = 7.0;
        assert_eq!(a.as_f32_slice().unwrap(), &[1.0, 2.0]);
        assert_eq!(b.as_f32_slice().unwrap(), &[7.0, 2.0]);
    }

    #[test]
    fn test_debug_display() {
        let t = Tensor::from_f32(&[1.0, 2.0], &[2]);
        assert!(format!("{:?}", t).contains("shape=[2]"));
        assert!(format!("{}", t).starts_with("tensor("));
    }
}
