use std::sync::Arc;

/// Shared, reference-counted f32 buffer behind a tensor.
///
/// Views produced by reshape/transpose clone the `Arc`, so they share the
/// buffer. Mutable access is copy-on-write.
#[derive(Debug, Clone)]
pub struct Storage {
    data: Arc<Vec<f32>>,
}

impl Storage {
    pub fn zeros(numel: usize) -> Self {
        Self::from_vec(vec![0.0; numel])
    }

    pub fn from_vec(data: Vec<f32>) -> Self {
        Self { data: Arc::new(data) }
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Mutable view; clones the buffer first if another tensor shares it.
    pub fn make_mut(&mut self) -> &mut [f32] {
        Arc::<Vec<f32>>::make_mut(&mut self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zeros() {
        let s = Storage::zeros(10);
        assert_eq!(s.as_slice().len(), 10);
        assert!(s.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_copy_on_write() {
        let s1 = Storage::from_vec(vec![1.0, 2.0, 3.0]);
        let mut s2 = s1.clone();

        s2.make_mut()[0] = 99.0;

        assert_eq!(s1.as_slice(), &[1.0, 2.0, 3.0]);
        assert_eq!(s2.as_slice(), &[99.0, 2.0, 3.0]);
    }
}
