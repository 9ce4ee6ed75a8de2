mod test_layout;

use std::fmt::Debug;

use rand::{rngs::StdRng, thread_rng, Rng};

/// Install a test-scoped tracing subscriber honoring `RUST_LOG`. Safe to call repeatedly.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Ensure two arrays are nearly equal
pub fn assert_close(a_vec: &[f32], b_vec: &[f32]) {
    assert_close_precision(a_vec, b_vec, 3)
}

/// Ensure two arrays are nearly equal to a decimal place
pub fn assert_close_precision(a_vec: &[f32], b_vec: &[f32], precision: u8) {
    assert_eq!(a_vec.len(), b_vec.len(), "Number of elements doesn't match");
    for (a, b) in a_vec.iter().zip(b_vec.iter()) {
        if (a - b).abs() > f32::powf(10., -(precision as f32)) {
            panic!(
                "{a} is not close to {b}, avg distance: {}",
                a_vec
                    .iter()
                    .zip(b_vec.iter())
                    .map(|(a, b)| (a - b).abs())
                    .sum::<f32>()
                    / a_vec.len() as f32
            );
        }
    }
}

/// Ensure two arrays are exactly equal
pub fn assert_exact<T: PartialEq + Debug>(a_vec: &[T], b_vec: &[T]) {
    assert_eq!(a_vec.len(), b_vec.len(), "Number of elements doesn't match");
    for (a, b) in a_vec.iter().zip(b_vec.iter()) {
        if a != b {
            panic!("{a:?} is not equal to {b:?}");
        }
    }
}

pub fn random_vec(n: usize) -> Vec<f32> {
    let mut rng = thread_rng();
    (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect()
}

pub fn random_vec_rng(n: usize, rng: &mut StdRng) -> Vec<f32> {
    (0..n).map(|_| rng.gen_range(-0.5..0.5)).collect()
}
