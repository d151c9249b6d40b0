//! Property tests for the reference tensor ops.

use kbook_core::Tensor;
use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::SeedableRng;

fn matrix_strategy(max_dim: usize) -> impl Strategy<Value = (usize, usize, Vec<f32>)> {
    (1..=max_dim, 1..=max_dim).prop_flat_map(|(r, c)| {
        (Just(r), Just(c), prop::collection::vec(-100.0f32..100.0f32, r * c))
    })
}

proptest! {
    // triu keeps exactly the cells with col - row >= k
    #[test]
    fn triu_keeps_upper_cells((r, c, data) in matrix_strategy(12), k in -3i64..4) {
        let t = Tensor::from_f32(&data, &[r, c]);
        let u = t.triu(k).unwrap();
        for (i, &v) in u.as_f32_slice().unwrap().iter().enumerate() {
            let (row, col) = ((i / c) as i64, (i % c) as i64);
            let expected = if col - row >= k { data[i] } else { 0.0 };
            prop_assert_eq!(v, expected);
        }
    }

    // (A^T)^T == A, and the view compares exactly against its source
    #[test]
    fn double_transpose_is_identity((r, c, data) in matrix_strategy(10)) {
        let t = Tensor::from_f32(&data, &[r, c]);
        let tt = t.transpose().unwrap().transpose().unwrap();
        prop_assert_eq!(tt.max_abs_diff(&t).unwrap(), 0.0);
    }

    #[test]
    fn allclose_is_reflexive((r, c, data) in matrix_strategy(8)) {
        let t = Tensor::from_f32(&data, &[r, c]);
        prop_assert!(t.allclose(&t, 0.0, 0.0).unwrap());
    }

    #[test]
    fn same_seed_same_tensor(seed in any::<u64>()) {
        let a = Tensor::randn_with(&[3, 5], &mut StdRng::seed_from_u64(seed));
        let b = Tensor::randn_with(&[3, 5], &mut StdRng::seed_from_u64(seed));
        prop_assert_eq!(a.as_f32_slice().unwrap(), b.as_f32_slice().unwrap());
    }
}

#[test]
fn matmul_with_identity() {
    let mut rng = StdRng::seed_from_u64(7);
    let a = Tensor::randn_with(&[5, 4], &mut rng);
    let mut eye = vec![0.0f32; 16];
    for i in 0..4 {
        eye[i * 4 + i] = 1.0;
    }
    let c = a.matmul(&Tensor::from_f32(&eye, &[4, 4])).unwrap();
    assert_eq!(c.max_abs_diff(&a).unwrap(), 0.0);
}

#[test]
fn upper_triangular_product_stays_upper() {
    let mut rng = StdRng::seed_from_u64(42);
    let a = Tensor::randn_with(&[6, 6], &mut rng).triu(0).unwrap();
    let b = Tensor::randn_with(&[6, 6], &mut rng).triu(0).unwrap();
    let c = a.matmul(&b).unwrap();
    let data = c.as_f32_slice().unwrap();
    for row in 0..6 {
        for col in 0..row {
            assert_eq!(data[row * 6 + col], 0.0, "({row}, {col}) below the diagonal");
        }
    }
}
