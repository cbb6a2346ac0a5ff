//! RGSW key material and the AP blind-rotation accumulator.
//!
//! The accumulator keeps an RLWE encryption of a rotated test polynomial and
//! multiplies monomials into it through gadget-decomposed external products,
//! as described in <https://eprint.iacr.org/2014/816> and
//! <https://eprint.iacr.org/2020/086>.

use crate::error::{FhewError, FhewResult};
use crate::lwe::LweSecretKey;
use crate::math::{gaussian_vec, uniform_vec};
use crate::params::BinFheParams;
use crate::ring::{Format, RingPoly};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;

/// An RLWE ciphertext `(a, b)` with phase `b - a·s`.
#[derive(Debug, Clone)]
pub struct RlweCiphertext {
    pub a: RingPoly,
    pub b: RingPoly,
}

impl RlweCiphertext {
    /// The accumulator's starting state: a noiseless encryption of the test
    /// polynomial, both halves in evaluation form.
    pub fn trivial(test_poly: RingPoly) -> Self {
        let mut b = test_poly;
        let a = RingPoly::zero(b.ring().clone(), Format::Evaluation);
        b.set_format(Format::Evaluation);
        Self { a, b }
    }
}

/// One RGSW encryption in evaluation form: `digits_g2` rows of
/// `(mask, mask·s + e)` with the gadget vector added on the diagonal blocks.
#[derive(Debug, Clone)]
pub struct RgswEvalKey {
    rows: Vec<[RingPoly; 2]>,
}

/// Blind-rotation key: one RGSW encryption per LWE coordinate, digit value
/// and digit position.
///
/// Entry `(i, j, k)` with `j ∈ [1, B_r)` encrypts
/// `X^{s_i · j · B_r^k · (2N/q_rot)}`.
#[derive(Debug)]
pub struct BlindRotationKey {
    cells: Vec<Vec<Vec<RgswEvalKey>>>,
    base_r: u64,
}

impl BlindRotationKey {
    fn key(&self, i: usize, digit: u64, k: usize) -> &RgswEvalKey {
        debug_assert!(digit >= 1 && digit < self.base_r);
        &self.cells[i][digit as usize - 1][k]
    }
}

// ============================================================================
// Key generation
// ============================================================================

/// RGSW-encrypts the monomial `X^{m · (2N/q_rot)}` under the ring secret
/// (evaluation form), handling the `X^N = -1` wrap-around with a sign flip.
pub fn keygen_ap<R: Rng + ?Sized>(
    params: &BinFheParams,
    sk_ntt: &RingPoly,
    m: i64,
    rng: &mut R,
) -> RgswEvalKey {
    let rgsw = &params.rgsw;
    let ring = &rgsw.ring;
    let n = params.lwe.ring_dim;
    let big_q = params.lwe.big_q;
    let factor = 2 * n as u64 / rgsw.q_rot;

    let mut exponent = m.rem_euclid(rgsw.q_rot as i64) as u64 * factor;
    let mut positive = true;
    if exponent >= n as u64 {
        exponent -= n as u64;
        positive = false;
    }
    let exponent = exponent as usize;

    let mut rows: Vec<[RingPoly; 2]> = (0..rgsw.digits_g2)
        .map(|_| {
            let mask = RingPoly::from_values(
                uniform_vec(n, big_q, rng),
                ring.clone(),
            );
            let body = RingPoly::from_values(
                gaussian_vec(n, params.lwe.sigma, big_q, rng),
                ring.clone(),
            );
            [mask, body]
        })
        .collect();

    for (i, &g) in rgsw.g_power.iter().enumerate() {
        if positive {
            rows[2 * i][0].add_at(exponent, g);
            rows[2 * i + 1][1].add_at(exponent, g);
        } else {
            rows[2 * i][0].sub_at(exponent, g);
            rows[2 * i + 1][1].sub_at(exponent, g);
        }
    }

    // keep coefficient-form copies of the masks so only 3·digits_g2 NTTs run
    let mut masks: Vec<RingPoly> = rows.iter().map(|row| row[0].clone()).collect();
    for row in rows.iter_mut() {
        row[0].set_format(Format::Evaluation);
        row[1].set_format(Format::Evaluation);
    }
    for (row, mask) in rows.iter_mut().zip(masks.iter_mut()) {
        mask.set_format(Format::Evaluation);
        row[1].add_mul_assign(mask, sk_ntt);
    }

    RgswEvalKey { rows }
}

/// Generates the full blind-rotation key. The per-coordinate generations are
/// independent and run on the rayon pool, each on its own forked stream.
pub fn keygen_acc<R: Rng + ?Sized>(
    params: &BinFheParams,
    sk_ntt: &RingPoly,
    sk: &LweSecretKey,
    rng: &mut R,
) -> BlindRotationKey {
    let rgsw = &params.rgsw;
    let seeds: Vec<[u8; 32]> = (0..sk.len())
        .map(|_| {
            let mut seed = [0u8; 32];
            rng.fill_bytes(&mut seed);
            seed
        })
        .collect();

    let cells = sk
        .entries()
        .par_iter()
        .zip(seeds)
        .map(|(&s_i, seed)| {
            let mut rng = ChaCha20Rng::from_seed(seed);
            (1..rgsw.base_r)
                .map(|j| {
                    rgsw.digits_r
                        .iter()
                        .map(|&power| {
                            let m = s_i * j as i64 * power as i64;
                            keygen_ap(params, sk_ntt, m, &mut rng)
                        })
                        .collect()
                })
                .collect()
        })
        .collect();

    BlindRotationKey {
        cells,
        base_r: rgsw.base_r,
    }
}

// ============================================================================
// Accumulation
// ============================================================================

/// Decomposes the accumulator halves into balanced signed base-`B_g` digits
/// in `[-B_g/2, B_g/2)`, interleaved as `dct[2l] =` digit `l` of the mask and
/// `dct[2l+1] =` digit `l` of the body.
fn signed_digit_decompose(
    params: &BinFheParams,
    mask: &RingPoly,
    body: &RingPoly,
) -> Vec<RingPoly> {
    let rgsw = &params.rgsw;
    let ring = &rgsw.ring;
    let n = params.lwe.ring_dim;
    let big_q = params.lwe.big_q;
    let half_q = big_q >> 1;
    let base = rgsw.base_g as i64;
    let half_base = base >> 1;
    let g_bits = rgsw.base_g.trailing_zeros();

    let mut output =
        vec![vec![0u64; n]; rgsw.digits_g2];
    for (j, input) in [mask, body].into_iter().enumerate() {
        debug_assert_eq!(input.format(), Format::Coefficient);
        for (k, &t) in input.coeffs().iter().enumerate() {
            let mut d: i64 = if t < half_q {
                t as i64
            } else {
                t as i64 - big_q as i64
            };
            for l in 0..rgsw.digits_g {
                let mut r = d & (base - 1);
                if r >= half_base {
                    r -= base;
                }
                d = (d - r) >> g_bits;
                output[j + 2 * l][k] = if r < 0 {
                    (r + big_q as i64) as u64
                } else {
                    r as u64
                };
            }
        }
    }

    output
        .into_iter()
        .map(|coeffs| RingPoly::from_values(coeffs, ring.clone()))
        .collect()
}

/// External product: folds one RGSW key into the accumulator.
pub fn add_to_acc_ap(
    params: &BinFheParams,
    ev: &RgswEvalKey,
    acc: &mut RlweCiphertext,
) {
    let ring = &params.rgsw.ring;

    acc.a.set_format(Format::Coefficient);
    acc.b.set_format(Format::Coefficient);
    let mut dct = signed_digit_decompose(params, &acc.a, &acc.b);
    for digit in dct.iter_mut() {
        digit.set_format(Format::Evaluation);
    }

    acc.a = RingPoly::zero(ring.clone(), Format::Evaluation);
    acc.b = RingPoly::zero(ring.clone(), Format::Evaluation);
    for (digit, row) in dct.iter().zip(ev.rows.iter()) {
        acc.a.add_mul_assign(digit, &row[0]);
        acc.b.add_mul_assign(digit, &row[1]);
    }
}

/// Runs the blind rotation: multiplies `X^{-<a,s>}` into the accumulator,
/// one base-`B_r` digit of each (rescaled) coordinate at a time.
///
/// `q_eval` is the modulus the coordinates live under; it must divide the
/// rotation modulus the key was generated for.
pub fn eval_acc(
    params: &BinFheParams,
    bsk: &BlindRotationKey,
    acc: &mut RlweCiphertext,
    a: &[u64],
    q_eval: u64,
) -> FhewResult<()> {
    let rgsw = &params.rgsw;
    if q_eval == 0 || rgsw.q_rot % q_eval != 0 {
        return Err(FhewError::arithmetic(format!(
            "evaluation modulus {q_eval} does not divide the rotation modulus {}",
            rgsw.q_rot
        )));
    }
    let step = rgsw.q_rot / q_eval;

    for (i, &a_i) in a.iter().enumerate() {
        let mut remaining = ((q_eval - a_i % q_eval) % q_eval) * step;
        for k in 0..rgsw.digits_r.len() {
            let digit = remaining % rgsw.base_r;
            remaining /= rgsw.base_r;
            if digit != 0 {
                add_to_acc_ap(params, bsk.key(i, digit, k), acc);
            }
        }
    }
    Ok(())
}
