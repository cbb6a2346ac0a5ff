use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Samples uniform residues in `[0, modulus)`.
///
/// # Panics
///
/// Panics if `modulus == 0`.
pub fn uniform_vec<R: Rng + ?Sized>(
    len: usize,
    modulus: u64,
    rng: &mut R,
) -> Vec<u64> {
    assert!(modulus > 0, "uniform_vec: modulus must be positive");
    (0..len).map(|_| rng.random_range(0..modulus)).collect()
}

/// Samples rounded Gaussian integers and maps them into `[0, modulus)`.
///
/// # Panics
///
/// Panics if `std_dev` is not finite and positive, or if `modulus == 0`.
pub fn gaussian_vec<R: Rng + ?Sized>(
    len: usize,
    std_dev: f64,
    modulus: u64,
    rng: &mut R,
) -> Vec<u64> {
    assert!(
        std_dev.is_finite() && std_dev > 0.0,
        "gaussian_vec: std_dev must be finite and positive"
    );
    assert!(modulus > 0, "gaussian_vec: modulus must be positive");
    let normal = Normal::new(0.0, std_dev)
        .expect("gaussian_vec: failed to create Normal distribution");

    (0..len)
        .map(|_| {
            let noise = normal.sample(rng).round() as i64;
            if noise < 0 {
                let abs = noise.unsigned_abs() % modulus;
                if abs == 0 { 0 } else { modulus - abs }
            } else {
                (noise as u64) % modulus
            }
        })
        .collect()
}

/// Samples a uniform ternary vector with entries in `{-1, 0, 1}`.
pub fn ternary_vec<R: Rng + ?Sized>(len: usize, rng: &mut R) -> Vec<i64> {
    (0..len).map(|_| rng.random_range(0..3i64) - 1).collect()
}
