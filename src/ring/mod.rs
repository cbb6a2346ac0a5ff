//! Negacyclic polynomial arithmetic over `Z_Q[x]/(x^N + 1)`.
//!
//! Polynomials track their current representation (coefficient or evaluation)
//! and convert in place through a negacyclic NTT. The per-(N, Q) tables live
//! in an [`NttRing`] shared behind an `Arc` by every polynomial and key.

use crate::math::{mod_inverse, mod_mul, mod_pow};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum NttError {
    #[error("invalid ring dimension {degree}: must be a power of two")]
    InvalidDegree { degree: usize },

    #[error("modulus {modulus} is not NTT-friendly for ring dimension {degree}")]
    NotNttFriendly { modulus: u64, degree: usize },

    #[error("no primitive root of order {order} modulo {modulus}")]
    NoPrimitiveRoot { modulus: u64, order: u64 },
}

pub type NttResult<T> = Result<T, NttError>;

/// Current representation of a ring element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Coefficient,
    Evaluation,
}

// ============================================================================
// NTT context
// ============================================================================

/// Precomputed negacyclic NTT tables for one `(N, Q)` pair.
///
/// Powers of a primitive `2N`-th root of unity are stored in bit-reversed
/// order so both transforms walk the tables linearly.
#[derive(Debug)]
pub struct NttRing {
    degree: usize,
    modulus: u64,
    psi_rev: Vec<u64>,
    psi_inv_rev: Vec<u64>,
    degree_inv: u64,
}

impl NttRing {
    /// Builds tables for ring dimension `degree` and modulus `modulus`.
    /// Requires `degree` to be a power of two and `modulus ≡ 1 (mod 2·degree)`.
    pub fn new(degree: usize, modulus: u64) -> NttResult<Self> {
        if !degree.is_power_of_two() || degree < 2 {
            return Err(NttError::InvalidDegree { degree });
        }
        if (modulus - 1) % (2 * degree as u64) != 0 {
            return Err(NttError::NotNttFriendly { modulus, degree });
        }

        let psi = primitive_root_of_unity(modulus, 2 * degree as u64)?;
        let psi_inv = mod_inverse(psi, modulus);
        let log_degree = degree.trailing_zeros();

        let mut psi_rev = vec![0u64; degree];
        let mut psi_inv_rev = vec![0u64; degree];
        let mut power = 1u64;
        let mut power_inv = 1u64;
        for i in 0..degree {
            let rev = bit_reverse(i, log_degree);
            psi_rev[rev] = power;
            psi_inv_rev[rev] = power_inv;
            power = mod_mul(power, psi, modulus);
            power_inv = mod_mul(power_inv, psi_inv, modulus);
        }

        Ok(Self {
            degree,
            modulus,
            psi_rev,
            psi_inv_rev,
            degree_inv: mod_inverse(degree as u64, modulus),
        })
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    /// In-place forward negacyclic NTT (Cooley–Tukey, standard order in,
    /// bit-reversed order out; the psi twist is merged into the butterflies).
    fn forward(&self, values: &mut [u64]) {
        let n = self.degree;
        let q = self.modulus;
        let mut t = n;
        let mut m = 1;
        while m < n {
            t /= 2;
            for i in 0..m {
                let j1 = 2 * i * t;
                let s = self.psi_rev[m + i];
                for j in j1..j1 + t {
                    let u = values[j];
                    let v = mod_mul(values[j + t], s, q);
                    values[j] = add_mod(u, v, q);
                    values[j + t] = sub_mod(u, v, q);
                }
            }
            m *= 2;
        }
    }

    /// In-place inverse negacyclic NTT (Gentleman–Sande, bit-reversed order
    /// in, standard order out).
    fn inverse(&self, values: &mut [u64]) {
        let n = self.degree;
        let q = self.modulus;
        let mut t = 1;
        let mut m = n;
        while m > 1 {
            let h = m / 2;
            let mut j1 = 0;
            for i in 0..h {
                let s = self.psi_inv_rev[h + i];
                for j in j1..j1 + t {
                    let u = values[j];
                    let v = values[j + t];
                    values[j] = add_mod(u, v, q);
                    values[j + t] = mod_mul(sub_mod(u, v, q), s, q);
                }
                j1 += 2 * t;
            }
            t *= 2;
            m = h;
        }
        for value in values.iter_mut() {
            *value = mod_mul(*value, self.degree_inv, q);
        }
    }
}

#[inline]
fn add_mod(a: u64, b: u64, q: u64) -> u64 {
    let s = a + b;
    if s >= q { s - q } else { s }
}

#[inline]
fn sub_mod(a: u64, b: u64, q: u64) -> u64 {
    if a >= b { a - b } else { a + q - b }
}

fn bit_reverse(value: usize, bits: u32) -> usize {
    value.reverse_bits() >> (usize::BITS - bits)
}

/// Finds an element of order exactly `order` modulo `modulus`.
/// `order` must be a power of two dividing `modulus - 1`.
fn primitive_root_of_unity(modulus: u64, order: u64) -> NttResult<u64> {
    let cofactor = (modulus - 1) / order;
    // For a power-of-two order it suffices that root^(order/2) == -1.
    for generator in 2..1024u64 {
        let root = mod_pow(generator, cofactor, modulus);
        if mod_pow(root, order / 2, modulus) == modulus - 1 {
            return Ok(root);
        }
    }
    Err(NttError::NoPrimitiveRoot { modulus, order })
}

// ============================================================================
// Ring elements
// ============================================================================

/// An element of `Z_Q[x]/(x^N + 1)` together with its current format.
#[derive(Debug, Clone)]
pub struct RingPoly {
    coeffs: Vec<u64>,
    ring: Arc<NttRing>,
    format: Format,
}

impl RingPoly {
    pub fn zero(ring: Arc<NttRing>, format: Format) -> Self {
        let coeffs = vec![0; ring.degree()];
        Self {
            coeffs,
            ring,
            format,
        }
    }

    /// Wraps pre-reduced residues as a coefficient-form polynomial.
    ///
    /// # Panics
    ///
    /// Panics if `values` does not have exactly `N` entries.
    pub fn from_values(values: Vec<u64>, ring: Arc<NttRing>) -> Self {
        assert_eq!(
            values.len(),
            ring.degree(),
            "RingPoly: value count must match ring dimension"
        );
        debug_assert!(values.iter().all(|&v| v < ring.modulus()));
        Self {
            coeffs: values,
            ring,
            format: Format::Coefficient,
        }
    }

    /// Builds a coefficient-form polynomial from small signed coefficients.
    pub fn from_signed(values: &[i64], ring: Arc<NttRing>) -> Self {
        let q = ring.modulus() as i64;
        let coeffs = values
            .iter()
            .map(|&v| v.rem_euclid(q) as u64)
            .collect::<Vec<_>>();
        Self::from_values(coeffs, ring)
    }

    pub fn ring(&self) -> &Arc<NttRing> {
        &self.ring
    }

    pub fn format(&self) -> Format {
        self.format
    }

    pub fn coeffs(&self) -> &[u64] {
        &self.coeffs
    }

    pub fn into_coeffs(self) -> Vec<u64> {
        self.coeffs
    }

    /// Converts to the requested format in place (no-op when already there).
    pub fn set_format(&mut self, format: Format) {
        if self.format == format {
            return;
        }
        match format {
            Format::Evaluation => self.ring.clone().forward(&mut self.coeffs),
            Format::Coefficient => self.ring.clone().inverse(&mut self.coeffs),
        }
        self.format = format;
    }

    /// Adds `value` into the coefficient at `index` (coefficient form).
    pub fn add_at(&mut self, index: usize, value: u64) {
        debug_assert_eq!(self.format, Format::Coefficient);
        self.coeffs[index] = add_mod(self.coeffs[index], value, self.ring.modulus());
    }

    /// Subtracts `value` from the coefficient at `index` (coefficient form).
    pub fn sub_at(&mut self, index: usize, value: u64) {
        debug_assert_eq!(self.format, Format::Coefficient);
        self.coeffs[index] = sub_mod(self.coeffs[index], value, self.ring.modulus());
    }

    pub fn add_assign(&mut self, rhs: &RingPoly) {
        assert!(
            Arc::ptr_eq(&self.ring, &rhs.ring),
            "RingPoly: cannot add elements of different rings"
        );
        assert_eq!(
            self.format, rhs.format,
            "RingPoly: both operands must be in the same format for addition"
        );
        let q = self.ring.modulus();
        for (a, &b) in self.coeffs.iter_mut().zip(rhs.coeffs.iter()) {
            *a = add_mod(*a, b, q);
        }
    }

    pub fn sub_assign(&mut self, rhs: &RingPoly) {
        assert!(
            Arc::ptr_eq(&self.ring, &rhs.ring),
            "RingPoly: cannot subtract elements of different rings"
        );
        assert_eq!(
            self.format, rhs.format,
            "RingPoly: both operands must be in the same format for subtraction"
        );
        let q = self.ring.modulus();
        for (a, &b) in self.coeffs.iter_mut().zip(rhs.coeffs.iter()) {
            *a = sub_mod(*a, b, q);
        }
    }

    /// Accumulates the pointwise product `lhs · rhs` into `self`.
    /// All three polynomials must be in evaluation form.
    pub fn add_mul_assign(&mut self, lhs: &RingPoly, rhs: &RingPoly) {
        debug_assert_eq!(self.format, Format::Evaluation);
        debug_assert_eq!(lhs.format, Format::Evaluation);
        debug_assert_eq!(rhs.format, Format::Evaluation);
        let q = self.ring.modulus();
        for i in 0..self.coeffs.len() {
            let prod = mod_mul(lhs.coeffs[i], rhs.coeffs[i], q);
            self.coeffs[i] = add_mod(self.coeffs[i], prod, q);
        }
    }

    /// Pointwise product in evaluation form.
    pub fn mul_assign(&mut self, rhs: &RingPoly) {
        debug_assert_eq!(self.format, Format::Evaluation);
        debug_assert_eq!(rhs.format, Format::Evaluation);
        let q = self.ring.modulus();
        for (a, &b) in self.coeffs.iter_mut().zip(rhs.coeffs.iter()) {
            *a = mod_mul(*a, b, q);
        }
    }

    pub fn negate_assign(&mut self) {
        let q = self.ring.modulus();
        for c in self.coeffs.iter_mut() {
            *c = if *c == 0 { 0 } else { q - *c };
        }
    }

    /// Negacyclic transpose `A'[0] = A[0]`, `A'[i] = -A[N-i]` (the
    /// automorphism `x -> x^{2N-1}`), in coefficient form.
    pub fn transpose(&self) -> RingPoly {
        assert_eq!(
            self.format,
            Format::Coefficient,
            "RingPoly: transpose requires coefficient form"
        );
        let n = self.ring.degree();
        let q = self.ring.modulus();
        let mut out = vec![0u64; n];
        out[0] = self.coeffs[0];
        for i in 1..n {
            let v = self.coeffs[n - i];
            out[i] = if v == 0 { 0 } else { q - v };
        }
        RingPoly {
            coeffs: out,
            ring: self.ring.clone(),
            format: Format::Coefficient,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{previous_ntt_prime, uniform_vec};
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn naive_negacyclic_mul(a: &[u64], b: &[u64], q: u64) -> Vec<u64> {
        let n = a.len();
        let mut out = vec![0u64; n];
        for i in 0..n {
            for j in 0..n {
                let prod = mod_mul(a[i], b[j], q);
                if i + j < n {
                    out[i + j] = add_mod(out[i + j], prod, q);
                } else {
                    out[i + j - n] = sub_mod(out[i + j - n], prod, q);
                }
            }
        }
        out
    }

    #[test]
    fn rejects_bad_dimensions_and_moduli() {
        assert!(matches!(
            NttRing::new(24, 97),
            Err(NttError::InvalidDegree { .. })
        ));
        assert!(matches!(
            NttRing::new(16, 97),
            Err(NttError::NotNttFriendly { .. })
        ));
    }

    #[test]
    fn ntt_round_trips() {
        let q = previous_ntt_prime(28, 256).unwrap();
        let ring = Arc::new(NttRing::new(256, q).unwrap());
        let mut rng = ChaCha20Rng::seed_from_u64(5);
        let values = uniform_vec(256, q, &mut rng);

        let mut poly = RingPoly::from_values(values.clone(), ring);
        poly.set_format(Format::Evaluation);
        poly.set_format(Format::Coefficient);
        assert_eq!(poly.coeffs(), &values[..]);
    }

    #[test]
    fn pointwise_product_matches_schoolbook() {
        let q = previous_ntt_prime(20, 64).unwrap();
        let ring = Arc::new(NttRing::new(64, q).unwrap());
        let mut rng = ChaCha20Rng::seed_from_u64(17);

        let a = uniform_vec(64, q, &mut rng);
        let b = uniform_vec(64, q, &mut rng);
        let expected = naive_negacyclic_mul(&a, &b, q);

        let mut pa = RingPoly::from_values(a, ring.clone());
        let mut pb = RingPoly::from_values(b, ring);
        pa.set_format(Format::Evaluation);
        pb.set_format(Format::Evaluation);
        pa.mul_assign(&pb);
        pa.set_format(Format::Coefficient);

        assert_eq!(pa.coeffs(), &expected[..]);
    }

    #[test]
    fn monomial_multiplication_rotates_negacyclically() {
        let q = previous_ntt_prime(20, 32).unwrap();
        let ring = Arc::new(NttRing::new(32, q).unwrap());
        let mut rng = ChaCha20Rng::seed_from_u64(23);

        let values = uniform_vec(32, q, &mut rng);
        let mut poly = RingPoly::from_values(values.clone(), ring.clone());

        // multiply by x^5
        let mut monomial = RingPoly::zero(ring, Format::Coefficient);
        monomial.add_at(5, 1);
        monomial.set_format(Format::Evaluation);
        poly.set_format(Format::Evaluation);
        poly.mul_assign(&monomial);
        poly.set_format(Format::Coefficient);

        for i in 0..32 {
            let expected = if i >= 5 {
                values[i - 5]
            } else {
                // wrapped coefficients pick up the x^N = -1 sign
                let v = values[32 - 5 + i];
                if v == 0 { 0 } else { q - v }
            };
            assert_eq!(poly.coeffs()[i], expected, "coefficient {i}");
        }
    }

    #[test]
    fn transpose_exposes_the_constant_term_of_products() {
        // <transpose(A), s> must equal the constant coefficient of A·S.
        let q = previous_ntt_prime(20, 16).unwrap();
        let ring = Arc::new(NttRing::new(16, q).unwrap());
        let mut rng = ChaCha20Rng::seed_from_u64(31);

        let a = uniform_vec(16, q, &mut rng);
        let s = uniform_vec(16, q, &mut rng);
        let product = naive_negacyclic_mul(&a, &s, q);

        let poly = RingPoly::from_values(a, ring);
        let transposed = poly.transpose();
        let mut acc = 0u64;
        for (x, y) in transposed.coeffs().iter().zip(s.iter()) {
            acc = add_mod(acc, mod_mul(*x, *y, q), q);
        }
        assert_eq!(acc, product[0]);
    }
}
