use smallvec::SmallVec;
use std::fmt;

/// Tensor shape with inline storage for up to four dimensions.
///
/// Every tensor in the corpus is rank 1 to 4 (vectors, matrices, NCHW
/// images), so the common case never touches the heap.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: SmallVec<[usize; 4]>,
}

impl Shape {
    pub fn new(dims: &[usize]) -> Self {
        Self { dims: SmallVec::from_slice(dims) }
    }

    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// Row-major strides, in elements.
    pub fn contiguous_strides(&self) -> SmallVec<[usize; 4]> {
        let mut strides: SmallVec<[usize; 4]> = SmallVec::from_elem(1, self.dims.len());
        let mut acc = 1usize;
        for (stride, &d) in strides.iter_mut().zip(self.dims.iter()).rev() {
            *stride = acc;
            acc *= d;
        }
        strides
    }

    /// Numpy-style broadcast of two shapes, aligned from the trailing axis.
    pub fn broadcast_with(&self, other: &Shape) -> Option<Shape> {
        let ndim = self.ndim().max(other.ndim());
        let pad = |s: &Shape, i: usize| -> usize {
            let offset = ndim - s.ndim();
            if i < offset { 1 } else { s.dims[i - offset] }
        };

        let mut dims = SmallVec::with_capacity(ndim);
        for i in 0..ndim {
            let (a, b) = (pad(self, i), pad(other, i));
            let d = match (a, b) {
                _ if a == b => a,
                (1, _) => b,
                (_, 1) => a,
                _ => return None,
            };
            dims.push(d);
        }
        Some(Shape { dims })
    }

    /// Resolve a reshape target; at most one entry may be `-1`.
    pub fn resolve_reshape(&self, target: &[isize]) -> Option<Shape> {
        let numel = self.numel();
        let mut inferred = None;
        let mut known: usize = 1;

        for (i, &d) in target.iter().enumerate() {
            match d {
                -1 if inferred.is_none() => inferred = Some(i),
                d if d > 0 => known = known.checked_mul(d as usize)?,
                _ => return None,
            }
        }

        let mut dims: SmallVec<[usize; 4]> =
            target.iter().map(|&d| d.max(0) as usize).collect();
        if let Some(i) = inferred {
            if known == 0 || numel % known != 0 {
                return None;
            }
            dims[i] = numel / known;
        }

        let shape = Shape { dims };
        (shape.numel() == numel).then_some(shape)
    }

    /// Shape with the last two axes swapped.
    pub fn transpose(&self) -> Option<Shape> {
        let n = self.ndim();
        if n < 2 {
            return None;
        }
        let mut dims = self.dims.clone();
        dims.swap(n - 2, n - 1);
        Some(Shape { dims })
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape({:?})", self.dims.as_slice())
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.dims.iter().map(|d| d.to_string()).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}
