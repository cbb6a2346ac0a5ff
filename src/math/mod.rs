//! Modular arithmetic, NTT-friendly prime search and coefficient samplers.

pub mod primes;
pub mod sampling;

pub use primes::{
    is_ntt_modulus, is_prime, mod_inverse, mod_mul, mod_pow, previous_ntt_prime,
};
pub use sampling::{gaussian_vec, ternary_vec, uniform_vec};
