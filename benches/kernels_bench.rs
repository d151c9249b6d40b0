//! Benchmark: hand-written kernels vs the framework ops they replace.

use kbook_core::Tensor;
use kbook_kernels::ConvParams;
use kbook_nn::{Conv2d, Conv2dConfig, Module};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;

fn time_it(iters: usize, mut f: impl FnMut()) -> f64 {
    f();
    let start = Instant::now();
    for _ in 0..iters {
        f();
    }
    start.elapsed().as_secs_f64() / iters as f64
}

fn row(name: &str, reference: f64, kernel: f64) {
    println!(
        "{:<28} {:>10.3}ms {:>10.3}ms {:>8.2}x",
        name,
        reference * 1000.0,
        kernel * 1000.0,
        reference / kernel,
    );
}

fn main() {
    let mut rng = StdRng::seed_from_u64(42);

    println!("=== kbook kernel benchmark (CPU grid, {} threads) ===\n", rayon::current_num_threads());
    println!("{:<28} {:>12} {:>12} {:>9}", "Op", "Ref (ms)", "Kernel (ms)", "Speedup");
    println!("{}", "-".repeat(64));

    for &n in &[1 << 14, 1 << 18, 1 << 20] {
        let x = Tensor::randn_with(&[n], &mut rng);
        let iters = if n <= 1 << 14 { 200 } else { 20 };
        row(
            &format!("tanh n={}", n),
            time_it(iters, || { let _ = kbook_nn::activations::tanh(&x).unwrap(); }),
            time_it(iters, || { let _ = kbook_kernels::tanh_activation(&x).unwrap(); }),
        );
        row(
            &format!("softplus n={}", n),
            time_it(iters, || { let _ = kbook_nn::activations::softplus(&x).unwrap(); }),
            time_it(iters, || { let _ = kbook_kernels::softplus(&x).unwrap(); }),
        );
        row(
            &format!("selu n={}", n),
            time_it(iters, || { let _ = kbook_nn::activations::selu(&x).unwrap(); }),
            time_it(iters, || { let _ = kbook_kernels::selu(&x).unwrap(); }),
        );
    }

    for &n in &[64, 128, 256] {
        let a = Tensor::randn_with(&[n, n], &mut rng).triu(0).unwrap();
        let b = Tensor::randn_with(&[n, n], &mut rng).triu(0).unwrap();
        let iters = if n <= 128 { 20 } else { 3 };
        row(
            &format!("triu matmul {}x{}", n, n),
            time_it(iters, || { let _ = a.matmul(&b).unwrap().triu(0).unwrap(); }),
            time_it(iters, || { let _ = kbook_kernels::upper_triangular_matmul(&a, &b).unwrap(); }),
        );
    }

    for &hw in &[32, 64] {
        let conv = Conv2d::init(Conv2dConfig::new(3, 16, 3).padding(1), &mut rng).unwrap();
        let x = Tensor::randn_with(&[2, 3, hw, hw], &mut rng);
        let params = ConvParams { padding: 1, ..ConvParams::default() };
        row(
            &format!("conv2d 2x3x{}x{} -> 16", hw, hw),
            time_it(5, || { let _ = conv.forward(&x).unwrap(); }),
            time_it(5, || { let _ = kbook_kernels::conv2d(&x, conv.weight(), conv.bias(), &params).unwrap(); }),
        );
    }
}
