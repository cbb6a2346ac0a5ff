//! Bootstrapping: the refresh pipeline, the Boolean gate layer and the
//! large-precision operators built on iterated bootstrapping.
//!
//! A bootstrap maps a test polynomial through the blind-rotation accumulator,
//! extracts the constant coefficient as a dimension-`N` LWE ciphertext and
//! switches it back down to the caller's dimension and modulus. Gates encode
//! their truth table in the test polynomial; the large-precision operators
//! (<https://eprint.iacr.org/2021/1337>) chain functional bootstraps with
//! modulus rounding.

use crate::error::{FhewError, FhewResult};
use crate::lwe::{self, LweCiphertext, LweSecretKey, LweSwitchingKey};
use crate::math::ternary_vec;
use crate::params::{BinFheMethod, BinFheOutput, BinFheParams, BinGate};
use crate::rgsw::{self, BlindRotationKey, RlweCiphertext};
use crate::ring::{Format, RingPoly};
use rand::Rng;
use std::collections::BTreeMap;

/// Blind-rotation key plus the matching key-switching key.
#[derive(Debug)]
pub struct BootstrappingKey {
    pub bsk: BlindRotationKey,
    pub ksk: LweSwitchingKey,
}

/// Key map for the large-precision layer, indexed by gadget base. Exactly
/// three entries switch the layer into dynamic base selection.
pub type BootstrappingKeyMap = BTreeMap<u64, BootstrappingKey>;

// ============================================================================
// Bootstrap core
// ============================================================================

fn gate_test_polynomial(
    params: &BinFheParams,
    gate: BinGate,
    ct: &LweCiphertext,
) -> FhewResult<RingPoly> {
    let q = ct.modulus();
    let ring_dim = params.lwe.ring_dim as u64;
    if 2 * ring_dim % q != 0 {
        return Err(FhewError::arithmetic(format!(
            "ciphertext modulus {q} does not divide 2N = {}",
            2 * ring_dim
        )));
    }
    let q_half = q >> 1;
    let q1 = params.gate_const(gate).ok_or_else(|| {
        FhewError::not_implemented(format!(
            "gate {gate:?} has no direct bootstrap; it is composed from other gates"
        ))
    })?;
    let q2 = (q1 + q_half) % q;

    let big_q = params.lwe.big_q;
    let q8 = big_q / 8 + 1;
    let q8_neg = big_q - q8;
    let factor = 2 * ring_dim / q;
    let b = ct.b();

    let mut m = vec![0u64; params.lwe.ring_dim];
    for j in 0..q_half {
        let temp = (b + q - j) % q;
        // membership in the (possibly wrapped) interval [q1, q2) maps to -Q/8
        let in_interval = if q1 < q2 {
            temp >= q1 && temp < q2
        } else {
            temp >= q1 || temp < q2
        };
        m[(j * factor) as usize] = if in_interval { q8_neg } else { q8 };
    }
    Ok(RingPoly::from_values(m, params.rgsw.ring.clone()))
}

fn func_test_polynomial<F>(
    params: &BinFheParams,
    ct: &LweCiphertext,
    f: &F,
    out_modulus: u64,
    q_eval: u64,
) -> FhewResult<RingPoly>
where
    F: Fn(u64, u64, u64) -> u64,
{
    let ring_dim = params.lwe.ring_dim as u64;
    if q_eval == 0 || 2 * ring_dim % q_eval != 0 {
        return Err(FhewError::arithmetic(format!(
            "evaluation modulus {q_eval} does not divide 2N = {}",
            2 * ring_dim
        )));
    }
    let big_q = params.lwe.big_q;
    if out_modulus == 0 || out_modulus > big_q {
        return Err(FhewError::arithmetic(format!(
            "output modulus {out_modulus} exceeds the ring modulus {big_q}"
        )));
    }
    let scale = big_q / out_modulus;
    let factor = 2 * ring_dim / q_eval;
    let b = ct.b();

    let mut m = vec![0u64; params.lwe.ring_dim];
    for j in 0..q_eval / 2 {
        let temp = (b + q_eval - j) % q_eval;
        let value = f(temp, q_eval, out_modulus);
        debug_assert!(value < out_modulus, "function value out of range");
        m[(j * factor) as usize] = scale * value;
    }
    Ok(RingPoly::from_values(m, params.rgsw.ring.clone()))
}

/// Runs the accumulator over a test polynomial and extracts the constant
/// coefficient as a dimension-`N` LWE pair under the transposed ring secret.
fn rotate_and_extract(
    params: &BinFheParams,
    bsk: &BlindRotationKey,
    test: RingPoly,
    ct: &LweCiphertext,
    q_eval: u64,
) -> FhewResult<(Vec<u64>, u64)> {
    let mut acc = RlweCiphertext::trivial(test);
    rgsw::eval_acc(params, bsk, &mut acc, ct.a(), q_eval)?;

    let RlweCiphertext { mut a, mut b } = acc;
    a.set_format(Format::Coefficient);
    let a = a.transpose().into_coeffs();
    b.set_format(Format::Coefficient);
    let b0 = b.coeffs()[0];
    Ok((a, b0))
}

/// Modulus-switch to `q_KS`, key-switch to dimension `n`, modulus-switch to
/// the output modulus.
fn refresh_tail(
    params: &BinFheParams,
    ksk: &LweSwitchingKey,
    a: Vec<u64>,
    b: u64,
    out_modulus: u64,
) -> FhewResult<LweCiphertext> {
    let extracted = LweCiphertext::from_parts(a, b, params.lwe.big_q);
    let narrowed = extracted.mod_switch(params.lwe.q_ks);
    let switched = lwe::key_switch(&params.lwe, ksk, &narrowed)?;
    Ok(switched.mod_switch(out_modulus))
}

fn bootstrap_gate_with(
    params: &BinFheParams,
    ek: &BootstrappingKey,
    gate: BinGate,
    ct: &LweCiphertext,
) -> FhewResult<LweCiphertext> {
    let test = gate_test_polynomial(params, gate, ct)?;
    let (a, b) = rotate_and_extract(params, &ek.bsk, test, ct, ct.modulus())?;
    // shift from ±Q/8 back to {0, Q/4}
    let big_q = params.lwe.big_q;
    let b = (b + big_q / 8 + 1) % big_q;
    refresh_tail(params, &ek.ksk, a, b, ct.modulus())
}

fn bootstrap_func_with<F>(
    params: &BinFheParams,
    ek: &BootstrappingKey,
    ct: &LweCiphertext,
    f: F,
    out_modulus: u64,
    q_eval: u64,
) -> FhewResult<LweCiphertext>
where
    F: Fn(u64, u64, u64) -> u64,
{
    let test = func_test_polynomial(params, ct, &f, out_modulus, q_eval)?;
    let (a, b) = rotate_and_extract(params, &ek.bsk, test, ct, q_eval)?;
    refresh_tail(params, &ek.ksk, a, b, out_modulus)
}

fn bootstrap_with(
    params: &BinFheParams,
    ek: &BootstrappingKey,
    ct: &LweCiphertext,
) -> FhewResult<LweCiphertext> {
    let mut prep = ct.clone();
    prep.add_const_assign(ct.modulus() >> 2);
    bootstrap_gate_with(params, ek, BinGate::And, &prep)
}

// ============================================================================
// LUT classification
// ============================================================================

/// Shape of a look-up table over `Z_q`, which decides how many bootstraps
/// its evaluation needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LutProfile {
    /// `lut[x + q/2] = -lut[x]`: one bootstrap.
    Negacyclic = 0,
    /// `lut[x + q/2] = lut[x]`: two bootstraps.
    Periodic = 1,
    /// Anything else: modulus doubling, then the periodic path.
    Arbitrary = 2,
}

/// Classifies a LUT with values in `Z_bigger_q`.
pub fn check_input_function(lut: &[u64], bigger_q: u64) -> LutProfile {
    let half = lut.len() / 2;
    let negated = |x: u64| (bigger_q - x) % bigger_q;
    if lut[0] == negated(lut[half]) {
        for i in 1..half {
            if lut[i] != negated(lut[half + i]) {
                return LutProfile::Arbitrary;
            }
        }
        LutProfile::Negacyclic
    } else if lut[0] == lut[half] {
        for i in 1..half {
            if lut[i] != lut[half + i] {
                return LutProfile::Arbitrary;
            }
        }
        LutProfile::Periodic
    } else {
        LutProfile::Arbitrary
    }
}

// ============================================================================
// Large-precision operators
// ============================================================================

fn eval_func_with(
    params: &BinFheParams,
    ek: &BootstrappingKey,
    ct: &LweCiphertext,
    lut: &[u64],
    beta: u64,
    bigger_q: u64,
) -> FhewResult<LweCiphertext> {
    let q = ct.modulus();
    if lut.len() as u64 != q {
        return Err(FhewError::config(format!(
            "LUT length {} must equal the ciphertext modulus {q}",
            lut.len()
        )));
    }

    match check_input_function(lut, bigger_q) {
        LutProfile::Negacyclic => {
            let mut ct0 = ct.clone();
            ct0.add_const_assign(beta);
            let f = |x: u64, _q: u64, _bq: u64| lut[x as usize];
            bootstrap_func_with(params, ek, &ct0, f, bigger_q, q)
        }
        LutProfile::Arbitrary => {
            if q > params.lwe.ring_dim as u64 {
                return Err(FhewError::not_implemented(
                    "ciphertext modulus q must be at most the ring dimension \
                     for arbitrary function evaluation"
                        .to_string(),
                ));
            }
            // Reinterpret the ciphertext modulo 2q; its phase is the old one
            // up to a multiple of q, which the periodicized LUT ignores.
            let doubled = ct.lift_modulus(2 * q)?;
            let mut lut2 = lut.to_vec();
            lut2.extend_from_slice(lut);
            let out =
                eval_func_with(params, ek, &doubled, &lut2, beta, 2 * bigger_q)?;
            out.reduce_modulus(bigger_q)
        }
        LutProfile::Periodic => {
            // First bootstrap folds the input into [0, q/2) ...
            let mut ct0 = ct.clone();
            ct0.add_const_assign(beta);
            let f1 = |x: u64, q_eval: u64, out: u64| {
                if x < q_eval / 2 {
                    out - q_eval / 4
                } else {
                    q_eval / 4
                }
            };
            let ct_f1 = bootstrap_func_with(params, ek, &ct0, f1, q, q)?;

            let mut adj = ct.clone();
            adj.add_const_assign(beta);
            adj -= &ct_f1;
            adj.sub_const_assign(q / 4);

            // ... so the second can evaluate the negacyclic extension.
            let f2 = |x: u64, q_eval: u64, bq: u64| {
                if x < q_eval / 2 {
                    lut[x as usize]
                } else {
                    (bq - lut[(x - q_eval / 2) as usize]) % bq
                }
            };
            bootstrap_func_with(params, ek, &adj, f2, bigger_q, q)
        }
    }
}

fn eval_floor_with(
    params: &BinFheParams,
    ek: &BootstrappingKey,
    ct: &LweCiphertext,
    beta: u64,
    bigger_q: u64,
) -> FhewResult<LweCiphertext> {
    let q = params.lwe.q;
    if ct.modulus() != bigger_q {
        return Err(FhewError::config(format!(
            "floor: ciphertext modulus {} does not match bigger_q {bigger_q}",
            ct.modulus()
        )));
    }
    if bigger_q % q != 0 {
        return Err(FhewError::arithmetic(format!(
            "floor: bigger_q {bigger_q} must be a multiple of q {q}"
        )));
    }

    let f1 = |x: u64, q_eval: u64, bq: u64| {
        if x < q_eval / 2 {
            bq - q_eval / 4
        } else {
            q_eval / 4
        }
    };
    let f2 = |x: u64, q_eval: u64, bq: u64| {
        if x < q_eval / 4 {
            bq - q_eval / 2 - x
        } else if x < 3 * q_eval / 4 {
            x
        } else {
            bq + q_eval / 2 - x
        }
    };

    let mut biased = ct.clone();
    biased.add_const_assign(beta);

    let low = biased.reduce_modulus(q)?;
    let coarse = bootstrap_func_with(params, ek, &low, f1, bigger_q, q)?;

    let mut mid = biased;
    mid -= &coarse;
    let mid_low = mid.reduce_modulus(q)?;
    let fine = bootstrap_func_with(params, ek, &mid_low, f2, bigger_q, q)?;

    mid -= &fine;
    Ok(mid)
}

/// Shared loop of EvalSign and EvalDecomp: floor away the low digit, shrink
/// the working modulus to `2β·bigger_q/q`, optionally switching the gadget
/// base, until one bootstrap of the sign function finishes the job.
fn large_precision_reduce(
    params: &BinFheParams,
    eks: &BootstrappingKeyMap,
    ct: &LweCiphertext,
    beta: u64,
    bigger_q: u64,
    collect_digits: bool,
    op_name: &str,
) -> FhewResult<(Vec<LweCiphertext>, LweCiphertext)> {
    let q = params.lwe.q;
    if bigger_q <= q {
        return Err(FhewError::config(format!(
            "{op_name} is only for large precision; for small precision use \
             Bootstrap directly"
        )));
    }
    if beta == 0 || 2 * beta >= q {
        return Err(FhewError::config(format!(
            "{op_name}: 2β = {} must lie in (0, q = {q}) for the modulus \
             chain to shrink",
            2 * beta
        )));
    }
    if ct.modulus() != bigger_q {
        return Err(FhewError::config(format!(
            "{op_name}: ciphertext modulus {} does not match bigger_q {bigger_q}",
            ct.modulus()
        )));
    }

    let dynamic_base = eks.len() == 3;
    let mut cur = params.clone();
    let mut ek = eks
        .get(&cur.rgsw.base_g)
        .ok_or(FhewError::Lookup {
            base: cur.rgsw.base_g,
        })?;

    let mut ct = ct.clone();
    let mut digits = Vec::new();
    let mut working_q = bigger_q;
    while working_q > q {
        if collect_digits {
            digits.push(ct.reduce_modulus(q)?);
        }
        ct = eval_floor_with(&cur, ek, &ct, beta, working_q)?;
        working_q = working_q / q * (2 * beta);

        if dynamic_base {
            let bits = 64 - (working_q - 1).leading_zeros();
            let base = if bits <= 17 {
                1u64 << 27
            } else if bits <= 26 {
                1u64 << 18
            } else {
                0
            };
            if base != 0 && base != cur.rgsw.base_g {
                cur = cur.with_base_g(base)?;
                ek = eks.get(&base).ok_or(FhewError::Lookup { base })?;
            }
        }

        ct = ct.mod_switch(working_q);
    }

    ct.add_const_assign(beta);
    let f3 = |x: u64, q_eval: u64, out: u64| {
        if x < q_eval / 2 { out / 4 } else { out - out / 4 }
    };
    let mut msb = bootstrap_func_with(&cur, ek, &ct, f3, q, working_q)?;
    msb.sub_const_assign(q / 4);
    Ok((digits, msb))
}

// ============================================================================
// Engine
// ============================================================================

/// User-facing facade bundling the parameter set with every evaluation
/// routine. The engine itself is stateless apart from the immutable bundle
/// and may be shared across threads.
pub struct BinFheEngine {
    params: BinFheParams,
}

impl BinFheEngine {
    pub fn new(params: BinFheParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &BinFheParams {
        &self.params
    }

    /// Samples a fresh dimension-`n` LWE secret key.
    pub fn key_gen<R: Rng + ?Sized>(&self, rng: &mut R) -> LweSecretKey {
        LweSecretKey::generate(self.params.lwe.n, rng)
    }

    /// Generates the bootstrapping key pair for `sk`: a blind-rotation key
    /// under a fresh ring secret, and the switching key back from it.
    pub fn bt_key_gen<R: Rng + ?Sized>(
        &self,
        sk: &LweSecretKey,
        rng: &mut R,
    ) -> FhewResult<BootstrappingKey> {
        if self.params.method == BinFheMethod::Ginx {
            return Err(FhewError::not_implemented(
                "GINX blind rotation is not implemented; use the AP accumulator"
                    .to_string(),
            ));
        }
        if sk.len() != self.params.lwe.n {
            return Err(FhewError::config(format!(
                "secret key dimension {} does not match n = {}",
                sk.len(),
                self.params.lwe.n
            )));
        }

        let sk_n = ternary_vec(self.params.lwe.ring_dim, rng);
        let ksk = lwe::key_switch_gen(&self.params.lwe, &sk_n, sk, rng)?;

        let mut sk_ntt =
            RingPoly::from_signed(&sk_n, self.params.rgsw.ring.clone());
        sk_ntt.set_format(Format::Evaluation);
        let bsk = rgsw::keygen_acc(&self.params, &sk_ntt, sk, rng);

        Ok(BootstrappingKey { bsk, ksk })
    }

    /// Encrypts `m` in plaintext space `p` under `modulus`, optionally
    /// refreshing the result right away.
    pub fn encrypt<R: Rng + ?Sized>(
        &self,
        sk: &LweSecretKey,
        m: u64,
        output: BinFheOutput,
        p: u64,
        modulus: u64,
        ek: Option<&BootstrappingKey>,
        rng: &mut R,
    ) -> FhewResult<LweCiphertext> {
        let ct = lwe::encrypt(sk, m, p, modulus, self.params.lwe.sigma, rng);
        match output {
            BinFheOutput::Fresh => Ok(ct),
            BinFheOutput::Bootstrapped => {
                let ek = ek.ok_or_else(|| {
                    FhewError::config(
                        "bootstrapped encryption requires a bootstrapping key"
                            .to_string(),
                    )
                })?;
                self.bootstrap(ek, &ct)
            }
        }
    }

    pub fn decrypt(&self, sk: &LweSecretKey, ct: &LweCiphertext, p: u64) -> u64 {
        lwe::decrypt(sk, ct, p)
    }

    /// NOT needs no key material: negate `a`, reflect `b` around `q/4`.
    pub fn eval_not(&self, ct: &LweCiphertext) -> LweCiphertext {
        let q = ct.modulus();
        let a = ct.a().iter().map(|&x| (q - x) % q).collect();
        let b = ((q >> 2) + q - ct.b()) % q;
        LweCiphertext::from_parts(a, b, q)
    }

    /// Evaluates a binary gate with one bootstrap (or, for XOR/XNOR, a
    /// composition of them).
    ///
    /// The two inputs must be independent ciphertext objects; evaluating a
    /// gate on a ciphertext and itself is rejected because the shared noise
    /// breaks the correctness argument. Callers who need `gate(ct, ct)` must
    /// clone first.
    pub fn eval_bin_gate(
        &self,
        gate: BinGate,
        ek: &BootstrappingKey,
        ct1: &LweCiphertext,
        ct2: &LweCiphertext,
    ) -> FhewResult<LweCiphertext> {
        if std::ptr::eq(ct1, ct2) {
            return Err(FhewError::config(
                "binary gates require independent ciphertexts as inputs"
                    .to_string(),
            ));
        }
        let q = self.params.lwe.q;
        if ct1.modulus() != q || ct2.modulus() != q {
            return Err(FhewError::config(format!(
                "gate inputs must be at the lattice modulus {q}"
            )));
        }

        match gate {
            BinGate::Xor | BinGate::Xnor => {
                let ct1_not = self.eval_not(ct1);
                let ct2_not = self.eval_not(ct2);
                let and1 =
                    self.eval_bin_gate(BinGate::And, ek, ct1, &ct2_not)?;
                let and2 =
                    self.eval_bin_gate(BinGate::And, ek, &ct1_not, ct2)?;
                let or = self.eval_bin_gate(BinGate::Or, ek, &and1, &and2)?;
                if gate == BinGate::Xor {
                    Ok(or)
                } else {
                    Ok(self.eval_not(&or))
                }
            }
            BinGate::XorFast | BinGate::XnorFast => {
                // 2·(ct1 - ct2): maps equal inputs to 0 and unequal to q/2
                let mut prep = ct1.clone();
                prep -= ct2;
                let copy = prep.clone();
                prep += &copy;
                bootstrap_gate_with(&self.params, ek, gate, &prep)
            }
            _ => {
                let mut prep = ct1.clone();
                prep += ct2;
                bootstrap_gate_with(&self.params, ek, gate, &prep)
            }
        }
    }

    /// Identity refresh: decrypt-and-re-encrypt homomorphically, resetting
    /// the noise to the fresh bootstrap level.
    pub fn bootstrap(
        &self,
        ek: &BootstrappingKey,
        ct: &LweCiphertext,
    ) -> FhewResult<LweCiphertext> {
        if ct.modulus() != self.params.lwe.q {
            return Err(FhewError::config(format!(
                "bootstrap expects ciphertexts at the lattice modulus {}",
                self.params.lwe.q
            )));
        }
        bootstrap_with(&self.params, ek, ct)
    }

    /// Evaluates an arbitrary function given as a LUT of length `q` with
    /// values in `Z_bigger_q`.
    pub fn eval_func(
        &self,
        ek: &BootstrappingKey,
        ct: &LweCiphertext,
        lut: &[u64],
        beta: u64,
        bigger_q: u64,
    ) -> FhewResult<LweCiphertext> {
        eval_func_with(&self.params, ek, ct, lut, beta, bigger_q)
    }

    /// Homomorphic flooring: clears the low `log2(q)` bits of the plaintext
    /// (up to the β bias absorbed by the noise margin).
    pub fn eval_floor(
        &self,
        ek: &BootstrappingKey,
        ct: &LweCiphertext,
        beta: u64,
        bigger_q: u64,
    ) -> FhewResult<LweCiphertext> {
        eval_floor_with(&self.params, ek, ct, beta, bigger_q)
    }

    /// Extracts the sign (most significant bit) of a large-precision
    /// plaintext; the result encodes the bit at `q/2` scaling.
    pub fn eval_sign(
        &self,
        eks: &BootstrappingKeyMap,
        ct: &LweCiphertext,
        beta: u64,
        bigger_q: u64,
    ) -> FhewResult<LweCiphertext> {
        let (_, msb) = large_precision_reduce(
            &self.params,
            eks,
            ct,
            beta,
            bigger_q,
            false,
            "EvalSign",
        )?;
        Ok(msb)
    }

    /// Decomposes a large-precision plaintext into digits, least significant
    /// first; the final entry is the sign ciphertext of the residue.
    pub fn eval_decomp(
        &self,
        eks: &BootstrappingKeyMap,
        ct: &LweCiphertext,
        beta: u64,
        bigger_q: u64,
    ) -> FhewResult<Vec<LweCiphertext>> {
        let (mut digits, msb) = large_precision_reduce(
            &self.params,
            eks,
            ct,
            beta,
            bigger_q,
            true,
            "EvalDecomp",
        )?;
        digits.push(msb);
        Ok(digits)
    }
}
