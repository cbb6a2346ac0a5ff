//! LWE primitives: ciphertexts, secret keys, additive homomorphisms, modulus
//! switching and key switching.

use crate::error::{FhewError, FhewResult};
use crate::math::{ternary_vec, uniform_vec};
use crate::params::LweParams;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::ops::{AddAssign, SubAssign};

// ============================================================================
// Keys
// ============================================================================

/// LWE secret key with small signed entries.
///
/// Keeping the key out of residue form makes it valid under every modulus the
/// large-precision layer works with.
#[derive(Debug, Clone)]
pub struct LweSecretKey {
    s: Vec<i64>,
}

impl LweSecretKey {
    /// Samples a uniform ternary key of the given dimension.
    pub fn generate<R: Rng + ?Sized>(dimension: usize, rng: &mut R) -> Self {
        Self {
            s: ternary_vec(dimension, rng),
        }
    }

    pub fn from_entries(s: Vec<i64>) -> Self {
        Self { s }
    }

    pub fn len(&self) -> usize {
        self.s.len()
    }

    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    pub fn entries(&self) -> &[i64] {
        &self.s
    }
}

fn dot_mod(a: &[u64], s: &[i64], modulus: u64) -> u64 {
    debug_assert_eq!(a.len(), s.len());
    let mut acc: i128 = 0;
    for (&x, &k) in a.iter().zip(s.iter()) {
        acc += x as i128 * k as i128;
    }
    acc.rem_euclid(modulus as i128) as u64
}

fn sample_noise<R: Rng + ?Sized>(sigma: f64, rng: &mut R) -> i64 {
    let normal =
        Normal::new(0.0, sigma).expect("noise std_dev must be finite and positive");
    normal.sample(rng).round() as i64
}

// ============================================================================
// Ciphertexts
// ============================================================================

/// An LWE ciphertext `(a, b)` carrying its modulus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LweCiphertext {
    a: Vec<u64>,
    b: u64,
    modulus: u64,
}

impl LweCiphertext {
    pub fn from_parts(a: Vec<u64>, b: u64, modulus: u64) -> Self {
        debug_assert!(b < modulus);
        debug_assert!(a.iter().all(|&x| x < modulus));
        Self { a, b, modulus }
    }

    pub fn a(&self) -> &[u64] {
        &self.a
    }

    pub fn b(&self) -> u64 {
        self.b
    }

    pub fn modulus(&self) -> u64 {
        self.modulus
    }

    pub fn dimension(&self) -> usize {
        self.a.len()
    }

    /// Adds a constant to `b` only.
    pub fn add_const_assign(&mut self, value: u64) {
        self.b = (self.b + value % self.modulus) % self.modulus;
    }

    /// Subtracts a constant from `b` only.
    pub fn sub_const_assign(&mut self, value: u64) {
        let v = value % self.modulus;
        self.b = (self.b + self.modulus - v) % self.modulus;
    }

    /// Rescales every component to `new_modulus`, rounding half away from
    /// zero.
    pub fn mod_switch(&self, new_modulus: u64) -> Self {
        let round = |x: u64| -> u64 {
            let scaled = x as u128 * new_modulus as u128;
            (((2 * scaled + self.modulus as u128) / (2 * self.modulus as u128))
                % new_modulus as u128) as u64
        };
        Self {
            a: self.a.iter().map(|&x| round(x)).collect(),
            b: round(self.b),
            modulus: new_modulus,
        }
    }

    /// Reduces every component modulo an exact divisor of the current
    /// modulus. The result is a valid ciphertext of the same phase mod
    /// `new_modulus`.
    pub fn reduce_modulus(&self, new_modulus: u64) -> FhewResult<Self> {
        if new_modulus == 0 || self.modulus % new_modulus != 0 {
            return Err(FhewError::arithmetic(format!(
                "cannot reduce ciphertext modulus {} to non-divisor {new_modulus}",
                self.modulus
            )));
        }
        Ok(Self {
            a: self.a.iter().map(|&x| x % new_modulus).collect(),
            b: self.b % new_modulus,
            modulus: new_modulus,
        })
    }

    /// Reinterprets the components under a larger modulus without changing
    /// them. The phase of the result is the old phase up to an unknown
    /// multiple of the old modulus; callers must evaluate functions that are
    /// periodic in the old modulus for the ambiguity to vanish.
    pub fn lift_modulus(&self, new_modulus: u64) -> FhewResult<Self> {
        if new_modulus < self.modulus || new_modulus % self.modulus != 0 {
            return Err(FhewError::arithmetic(format!(
                "cannot lift ciphertext modulus {} to non-multiple {new_modulus}",
                self.modulus
            )));
        }
        Ok(Self {
            a: self.a.clone(),
            b: self.b,
            modulus: new_modulus,
        })
    }
}

impl AddAssign<&LweCiphertext> for LweCiphertext {
    fn add_assign(&mut self, rhs: &LweCiphertext) {
        assert_eq!(self.modulus, rhs.modulus, "LWE addition: modulus mismatch");
        assert_eq!(
            self.a.len(),
            rhs.a.len(),
            "LWE addition: dimension mismatch"
        );
        for (x, &y) in self.a.iter_mut().zip(rhs.a.iter()) {
            *x = (*x + y) % self.modulus;
        }
        self.b = (self.b + rhs.b) % self.modulus;
    }
}

impl SubAssign<&LweCiphertext> for LweCiphertext {
    fn sub_assign(&mut self, rhs: &LweCiphertext) {
        assert_eq!(
            self.modulus, rhs.modulus,
            "LWE subtraction: modulus mismatch"
        );
        assert_eq!(
            self.a.len(),
            rhs.a.len(),
            "LWE subtraction: dimension mismatch"
        );
        for (x, &y) in self.a.iter_mut().zip(rhs.a.iter()) {
            *x = (*x + self.modulus - y) % self.modulus;
        }
        self.b = (self.b + self.modulus - rhs.b) % self.modulus;
    }
}

// ============================================================================
// Encryption and decryption
// ============================================================================

/// Encrypts `m` in plaintext space `p` under `modulus`:
/// `b = <a, s> + e + m·(modulus/p)`.
pub fn encrypt<R: Rng + ?Sized>(
    sk: &LweSecretKey,
    m: u64,
    p: u64,
    modulus: u64,
    sigma: f64,
    rng: &mut R,
) -> LweCiphertext {
    assert!(p >= 2 && p <= modulus, "encrypt: invalid plaintext space");
    let a = uniform_vec(sk.len(), modulus, rng);
    let noise = sample_noise(sigma, rng);
    let scale = (modulus / p) as i128;
    let b = (dot_mod(&a, sk.entries(), modulus) as i128
        + noise as i128
        + (m % p) as i128 * scale)
        .rem_euclid(modulus as i128) as u64;
    LweCiphertext::from_parts(a, b, modulus)
}

/// The raw phase `b - <a, s> mod modulus`.
pub fn phase(sk: &LweSecretKey, ct: &LweCiphertext) -> u64 {
    let dot = dot_mod(ct.a(), sk.entries(), ct.modulus());
    (ct.b() + ct.modulus() - dot) % ct.modulus()
}

/// Rounds the phase to the nearest plaintext in `Z_p`.
pub fn decrypt(sk: &LweSecretKey, ct: &LweCiphertext, p: u64) -> u64 {
    let ph = phase(sk, ct) as u128;
    let modulus = ct.modulus() as u128;
    (((2 * ph * p as u128 + modulus) / (2 * modulus)) % p as u128) as u64
}

// ============================================================================
// Key switching
// ============================================================================

/// Gadget-decomposed key-switching key over `q_KS`, from a dimension-`N`
/// secret to a dimension-`n` secret.
///
/// Entry `[i][j][v]` encrypts `v · B_ks^j · skN[i]` under the target key.
#[derive(Debug)]
pub struct LweSwitchingKey {
    entries: Vec<Vec<Vec<LweCiphertext>>>,
    base: u64,
    modulus: u64,
}

impl LweSwitchingKey {
    pub fn modulus(&self) -> u64 {
        self.modulus
    }
}

/// Generates the switching key from `sk_from` (dimension `N`) to `sk_to`
/// (dimension `n`).
pub fn key_switch_gen<R: Rng + ?Sized>(
    params: &LweParams,
    sk_from: &[i64],
    sk_to: &LweSecretKey,
    rng: &mut R,
) -> FhewResult<LweSwitchingKey> {
    if sk_from.len() != params.ring_dim || sk_to.len() != params.n {
        return Err(FhewError::config(format!(
            "key switch generation: expected secrets of dimension {} and {}, \
             got {} and {}",
            params.ring_dim,
            params.n,
            sk_from.len(),
            sk_to.len()
        )));
    }
    let q_ks = params.q_ks;
    let base = params.base_ks;

    let entries = sk_from
        .iter()
        .map(|&s_i| {
            let mut power: i128 = 1;
            (0..params.digits_ks)
                .map(|_| {
                    let row = (0..base)
                        .map(|v| {
                            let a = uniform_vec(params.n, q_ks, rng);
                            let noise = sample_noise(params.sigma, rng);
                            let payload = v as i128 * power * s_i as i128;
                            let b = (dot_mod(&a, sk_to.entries(), q_ks) as i128
                                + noise as i128
                                + payload)
                                .rem_euclid(q_ks as i128)
                                as u64;
                            LweCiphertext::from_parts(a, b, q_ks)
                        })
                        .collect();
                    power *= base as i128;
                    row
                })
                .collect()
        })
        .collect();

    Ok(LweSwitchingKey {
        entries,
        base,
        modulus: q_ks,
    })
}

/// Switches a dimension-`N` ciphertext under `sk_from` to a dimension-`n`
/// ciphertext under `sk_to`, both modulo `q_KS`.
pub fn key_switch(
    params: &LweParams,
    ksk: &LweSwitchingKey,
    ct: &LweCiphertext,
) -> FhewResult<LweCiphertext> {
    if ct.modulus() != ksk.modulus {
        return Err(FhewError::config(format!(
            "key switch: ciphertext modulus {} does not match key modulus {}",
            ct.modulus(),
            ksk.modulus
        )));
    }
    if ct.dimension() != params.ring_dim {
        return Err(FhewError::config(format!(
            "key switch: expected dimension {}, got {}",
            params.ring_dim,
            ct.dimension()
        )));
    }

    let q_ks = ksk.modulus;
    let mut a = vec![0u64; params.n];
    let mut b = ct.b();
    for (i, &a_i) in ct.a().iter().enumerate() {
        let mut remaining = a_i;
        for j in 0..params.digits_ks {
            let digit = (remaining % ksk.base) as usize;
            remaining /= ksk.base;
            let entry = &ksk.entries[i][j][digit];
            for (x, &y) in a.iter_mut().zip(entry.a().iter()) {
                *x = (*x + q_ks - y) % q_ks;
            }
            b = (b + q_ks - entry.b()) % q_ks;
        }
    }
    Ok(LweCiphertext::from_parts(a, b, q_ks))
}
