//! Parameter bundles: LWE dimensions and moduli, RGSW gadget data, gate
//! constants and the preset catalog.
//!
//! Bundles are immutable once built. Operations that need a different view
//! (the large-precision layer switching its gadget base) derive a new bundle
//! with [`BinFheParams::with_base_g`] instead of mutating shared state, so a
//! bundle can be shared read-only across threads.

use crate::error::{FhewError, FhewResult};
use crate::math::previous_ntt_prime;
use crate::ring::NttRing;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Bound on the noise of a refreshed ciphertext, used by the large-precision
/// layer to center plaintexts before bootstrapping.
const BETA: u64 = 128;

/// Gadget bases precomputed when a bundle is built for sign evaluation; the
/// large-precision loop switches between them as the working modulus shrinks.
pub const SIGN_EVAL_BASES: [u64; 3] = [1 << 14, 1 << 18, 1 << 27];

// ============================================================================
// Enums of the public surface
// ============================================================================

/// Supported binary gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinGate {
    Or,
    And,
    Nor,
    Nand,
    XorFast,
    XnorFast,
    Xor,
    Xnor,
}

/// Blind-rotation method. Only [`BinFheMethod::Ap`] is implemented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinFheMethod {
    Ap,
    Ginx,
}

/// Output class of an encryption: fresh, or refreshed right away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinFheOutput {
    Fresh,
    Bootstrapped,
}

/// Named parameter presets. Each resolves to a concrete bundle through
/// [`BinFheParams::preset`].
#[allow(non_camel_case_types)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinFheParamSet {
    TOY,
    MEDIUM,
    STD128_AP,
    STD128_APOPT,
    STD128,
    STD128_OPT,
    STD192,
    STD192_OPT,
    STD256,
    STD256_OPT,
    STD128Q,
    STD128Q_OPT,
    STD192Q,
    STD192Q_OPT,
    STD256Q,
    STD256Q_OPT,
    SIGNED_MOD_TEST,
}

// ============================================================================
// Raw parameter specification
// ============================================================================

/// Raw numbers a bundle is built from; the catalog produces these, and tests
/// may construct reduced ones directly.
#[derive(Debug, Clone, Copy)]
pub struct ParamSpec {
    /// LWE dimension `n`.
    pub n: usize,
    /// Ring dimension `N`.
    pub ring_dim: usize,
    /// Lattice (ciphertext) modulus `q`, dividing `2N`.
    pub q: u64,
    /// Bit size of the ring modulus `Q`; the largest NTT-friendly prime below
    /// `2^log_big_q` is used.
    pub log_big_q: u32,
    /// Key-switching modulus `q_KS`.
    pub q_ks: u64,
    /// Key-switching decomposition base.
    pub base_ks: u64,
    /// Gadget base `B_g` (power of two).
    pub base_g: u64,
    /// Blind-rotation digit base `B_r`.
    pub base_r: u64,
    /// Standard deviation of the noise distribution.
    pub sigma: f64,
}

fn catalog(set: BinFheParamSet) -> ParamSpec {
    use BinFheParamSet::*;
    // (n, N, q, log Q, q_KS, B_ks, B_g, B_r)
    let (n, ring_dim, q, log_big_q, q_ks, base_ks, base_g, base_r) = match set {
        TOY => (64, 512, 512, 27, 1 << 14, 1 << 5, 1 << 9, 32),
        MEDIUM => (422, 1024, 1024, 28, 1 << 14, 1 << 7, 1 << 10, 32),
        STD128_AP => (512, 1024, 1024, 27, 1 << 14, 1 << 5, 1 << 9, 32),
        STD128_APOPT => (502, 1024, 1024, 27, 1 << 14, 1 << 5, 1 << 9, 32),
        STD128 => (512, 1024, 1024, 27, 1 << 14, 1 << 7, 1 << 7, 32),
        STD128_OPT => (502, 1024, 1024, 27, 1 << 14, 1 << 7, 1 << 7, 32),
        STD192 => (805, 2048, 1024, 37, 1 << 15, 1 << 5, 1 << 13, 32),
        STD192_OPT => (785, 2048, 1024, 37, 1 << 15, 1 << 5, 1 << 13, 32),
        STD256 => (990, 2048, 2048, 29, 1 << 14, 1 << 7, 1 << 10, 46),
        STD256_OPT => (950, 2048, 2048, 29, 1 << 14, 1 << 7, 1 << 10, 46),
        STD128Q => (585, 2048, 1024, 50, 1 << 15, 1 << 5, 1 << 25, 32),
        STD128Q_OPT => (558, 2048, 1024, 50, 1 << 15, 1 << 5, 1 << 25, 32),
        STD192Q => (875, 2048, 1024, 35, 1 << 15, 1 << 5, 1 << 12, 32),
        STD192Q_OPT => (805, 2048, 1024, 35, 1 << 15, 1 << 5, 1 << 12, 32),
        STD256Q => (1225, 2048, 1024, 27, 1 << 14, 1 << 5, 1 << 7, 32),
        STD256Q_OPT => (1140, 2048, 1024, 27, 1 << 14, 1 << 5, 1 << 7, 32),
        SIGNED_MOD_TEST => (512, 1024, 512, 50, 1 << 35, 1 << 5, 1 << 18, 23),
    };
    ParamSpec {
        n,
        ring_dim,
        q,
        log_big_q,
        q_ks,
        base_ks,
        base_g,
        base_r,
        sigma: 3.19,
    }
}

// ============================================================================
// Parameter bundles
// ============================================================================

/// LWE-side parameters.
#[derive(Debug, Clone)]
pub struct LweParams {
    pub n: usize,
    pub ring_dim: usize,
    pub q: u64,
    pub big_q: u64,
    pub q_ks: u64,
    pub base_ks: u64,
    pub digits_ks: usize,
    pub sigma: f64,
}

/// RGSW-side parameters: gadget data for the external product and digit data
/// for the blind rotation.
#[derive(Debug, Clone)]
pub struct RgswParams {
    pub base_g: u64,
    pub digits_g: usize,
    pub digits_g2: usize,
    /// `g_power[i] = B_g^i mod Q`.
    pub g_power: Vec<u64>,
    /// Gadget vectors for every base the bundle can switch to.
    g_power_map: BTreeMap<u64, Vec<u64>>,
    pub base_r: u64,
    /// `digits_r[k] = B_r^k`; enough digits to cover `[0, q_rot)`.
    pub digits_r: Vec<u64>,
    /// Rotation modulus the blind-rotation keys are generated for: `2q` when
    /// `q | N` so the same keys serve the doubled-modulus evaluation of the
    /// arbitrary-LUT branch, otherwise `q`.
    pub q_rot: u64,
    /// Per-gate thresholds `q1`, indexed by the first six [`BinGate`]s.
    pub gate_const: [u64; 6],
    pub ring: Arc<NttRing>,
}

/// Everything one scheme instance needs.
#[derive(Debug, Clone)]
pub struct BinFheParams {
    pub lwe: LweParams,
    pub rgsw: RgswParams,
    pub method: BinFheMethod,
}

fn digit_count(modulus: u64, base: u64) -> usize {
    let mut digits = 0;
    let mut covered: u128 = 1;
    while covered < modulus as u128 {
        covered *= base as u128;
        digits += 1;
    }
    digits
}

fn gadget_powers(base: u64, modulus: u64) -> Vec<u64> {
    let digits = digit_count(modulus, base);
    let mut powers = Vec::with_capacity(digits);
    let mut value: u64 = 1;
    for _ in 0..digits {
        powers.push(value);
        value = ((value as u128 * base as u128) % modulus as u128) as u64;
    }
    powers
}

impl BinFheParams {
    /// Resolves a named preset.
    pub fn preset(set: BinFheParamSet, method: BinFheMethod) -> FhewResult<Self> {
        let sign_eval = set == BinFheParamSet::SIGNED_MOD_TEST;
        Self::from_spec(catalog(set), method, sign_eval)
    }

    /// Builds a bundle from raw numbers.
    ///
    /// With `sign_eval` set, gadget vectors for all of [`SIGN_EVAL_BASES`]
    /// are precomputed so the large-precision layer can switch bases.
    pub fn from_spec(
        spec: ParamSpec,
        method: BinFheMethod,
        sign_eval: bool,
    ) -> FhewResult<Self> {
        let two_n = 2 * spec.ring_dim as u64;
        if spec.q == 0 || two_n % spec.q != 0 {
            return Err(FhewError::config(format!(
                "lattice modulus {} must divide 2N = {two_n}",
                spec.q
            )));
        }
        if spec.n >= spec.ring_dim {
            return Err(FhewError::config(format!(
                "LWE dimension {} must be smaller than the ring dimension {}",
                spec.n, spec.ring_dim
            )));
        }
        if !spec.base_g.is_power_of_two() || spec.base_g < 2 {
            return Err(FhewError::config(format!(
                "gadget base {} must be a power of two",
                spec.base_g
            )));
        }
        if spec.base_r < 2 || spec.base_ks < 2 {
            return Err(FhewError::config(
                "decomposition bases must be at least 2".to_string(),
            ));
        }

        let big_q = previous_ntt_prime(spec.log_big_q, spec.ring_dim)
            .ok_or_else(|| {
                FhewError::config(format!(
                    "no NTT-friendly prime below 2^{} for ring dimension {}",
                    spec.log_big_q, spec.ring_dim
                ))
            })?;
        if spec.q_ks > big_q {
            return Err(FhewError::config(format!(
                "key-switching modulus {} exceeds the ring modulus {big_q}",
                spec.q_ks
            )));
        }

        let ring = Arc::new(NttRing::new(spec.ring_dim, big_q)?);

        let mut g_power_map = BTreeMap::new();
        g_power_map.insert(spec.base_g, gadget_powers(spec.base_g, big_q));
        if sign_eval {
            for base in SIGN_EVAL_BASES {
                g_power_map
                    .entry(base)
                    .or_insert_with(|| gadget_powers(base, big_q));
            }
        }
        let g_power = g_power_map[&spec.base_g].clone();
        let digits_g = g_power.len();

        // Blind-rotation digits cover the rotation modulus, see q_rot docs.
        let q_rot = if spec.ring_dim as u64 % spec.q == 0 {
            2 * spec.q
        } else {
            spec.q
        };
        let digits_r_count = digit_count(q_rot, spec.base_r);
        let mut digits_r = Vec::with_capacity(digits_r_count);
        let mut value = 1u64;
        for _ in 0..digits_r_count {
            digits_r.push(value);
            value *= spec.base_r;
        }

        let q8 = spec.q >> 3;
        let gate_const = [
            5 * q8, // OR
            7 * q8, // AND
            q8,     // NOR
            3 * q8, // NAND
            5 * q8, // XOR_FAST
            q8,     // XNOR_FAST
        ];

        let lwe = LweParams {
            n: spec.n,
            ring_dim: spec.ring_dim,
            q: spec.q,
            big_q,
            q_ks: spec.q_ks,
            base_ks: spec.base_ks,
            digits_ks: digit_count(spec.q_ks, spec.base_ks),
            sigma: spec.sigma,
        };
        let rgsw = RgswParams {
            base_g: spec.base_g,
            digits_g,
            digits_g2: 2 * digits_g,
            g_power,
            g_power_map,
            base_r: spec.base_r,
            digits_r,
            q_rot,
            gate_const,
            ring,
        };
        Ok(Self { lwe, rgsw, method })
    }

    /// Derives a bundle that uses a different gadget base. The base must have
    /// been precomputed (current base, or [`SIGN_EVAL_BASES`] under
    /// `sign_eval`).
    pub fn with_base_g(&self, base_g: u64) -> FhewResult<Self> {
        let g_power = self
            .rgsw
            .g_power_map
            .get(&base_g)
            .ok_or(FhewError::Lookup { base: base_g })?
            .clone();
        let digits_g = g_power.len();
        let mut out = self.clone();
        out.rgsw.base_g = base_g;
        out.rgsw.g_power = g_power;
        out.rgsw.digits_g = digits_g;
        out.rgsw.digits_g2 = 2 * digits_g;
        Ok(out)
    }

    /// Threshold constant for one of the six directly bootstrappable gates.
    pub fn gate_const(&self, gate: BinGate) -> Option<u64> {
        let index = match gate {
            BinGate::Or => 0,
            BinGate::And => 1,
            BinGate::Nor => 2,
            BinGate::Nand => 3,
            BinGate::XorFast => 4,
            BinGate::XnorFast => 5,
            BinGate::Xor | BinGate::Xnor => return None,
        };
        Some(self.rgsw.gate_const[index])
    }

    /// Noise bound of a refreshed ciphertext.
    pub fn beta(&self) -> u64 {
        BETA
    }

    /// Largest plaintext space usable with functional bootstrapping,
    /// `q / (2β)`.
    pub fn max_plaintext_space(&self) -> u64 {
        self.lwe.q / (2 * BETA)
    }

    /// Builds the look-up table for `f: Z_p -> Z_p` over the full lattice
    /// modulus, one slot of width `q/p` per plaintext value.
    pub fn generate_lut(
        &self,
        f: impl Fn(u64, u64) -> u64,
        p: u64,
    ) -> FhewResult<Vec<u64>> {
        if !p.is_power_of_two() || p < 2 || p > self.lwe.q {
            return Err(FhewError::config(format!(
                "plaintext space {p} must be a power of two in [2, q]"
            )));
        }
        let q = self.lwe.q;
        let interval = q / p;
        Ok((0..q).map(|i| f(i / interval, p) * interval).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::is_ntt_modulus;

    const ALL_SETS: [BinFheParamSet; 17] = [
        BinFheParamSet::TOY,
        BinFheParamSet::MEDIUM,
        BinFheParamSet::STD128_AP,
        BinFheParamSet::STD128_APOPT,
        BinFheParamSet::STD128,
        BinFheParamSet::STD128_OPT,
        BinFheParamSet::STD192,
        BinFheParamSet::STD192_OPT,
        BinFheParamSet::STD256,
        BinFheParamSet::STD256_OPT,
        BinFheParamSet::STD128Q,
        BinFheParamSet::STD128Q_OPT,
        BinFheParamSet::STD192Q,
        BinFheParamSet::STD192Q_OPT,
        BinFheParamSet::STD256Q,
        BinFheParamSet::STD256Q_OPT,
        BinFheParamSet::SIGNED_MOD_TEST,
    ];

    #[test]
    fn every_preset_builds_and_satisfies_invariants() {
        for set in ALL_SETS {
            let params = BinFheParams::preset(set, BinFheMethod::Ap)
                .unwrap_or_else(|e| panic!("{set:?} failed to build: {e}"));
            let lwe = &params.lwe;
            let rgsw = &params.rgsw;

            assert_eq!((2 * lwe.ring_dim as u64) % lwe.q, 0, "{set:?}: q | 2N");
            assert!(lwe.n < lwe.ring_dim, "{set:?}: n < N");
            assert!(
                is_ntt_modulus(lwe.big_q, lwe.ring_dim),
                "{set:?}: Q prime, Q = 1 mod 2N"
            );

            // B_g^{d_g} >= Q
            let coverage = (rgsw.base_g as u128).pow(rgsw.digits_g as u32);
            assert!(coverage >= lwe.big_q as u128, "{set:?}: gadget coverage");
            assert_eq!(rgsw.digits_g2, 2 * rgsw.digits_g);
            assert_eq!(rgsw.g_power.len(), rgsw.digits_g);
            assert_eq!(rgsw.g_power[0], 1);

            // B_r digits cover the rotation modulus
            let r_coverage = (rgsw.base_r as u128).pow(rgsw.digits_r.len() as u32);
            assert!(r_coverage >= rgsw.q_rot as u128, "{set:?}: digit coverage");
            assert!(rgsw.q_rot == lwe.q || rgsw.q_rot == 2 * lwe.q);

            // q_KS digits cover q_KS
            let ks_coverage = (lwe.base_ks as u128).pow(lwe.digits_ks as u32);
            assert!(ks_coverage >= lwe.q_ks as u128, "{set:?}: KS coverage");
        }
    }

    #[test]
    fn gate_constants_follow_the_threshold_table() {
        let params =
            BinFheParams::preset(BinFheParamSet::TOY, BinFheMethod::Ap).unwrap();
        let q = params.lwe.q;
        assert_eq!(params.gate_const(BinGate::Or), Some(5 * q / 8));
        assert_eq!(params.gate_const(BinGate::And), Some(7 * q / 8));
        assert_eq!(params.gate_const(BinGate::Nor), Some(q / 8));
        assert_eq!(params.gate_const(BinGate::Nand), Some(3 * q / 8));
        assert_eq!(params.gate_const(BinGate::XorFast), Some(5 * q / 8));
        assert_eq!(params.gate_const(BinGate::XnorFast), Some(q / 8));
        // composed gates have no direct constant
        assert_eq!(params.gate_const(BinGate::Xor), None);
        assert_eq!(params.gate_const(BinGate::Xnor), None);
    }

    #[test]
    fn base_switching_requires_precomputed_bases() {
        let params =
            BinFheParams::preset(BinFheParamSet::SIGNED_MOD_TEST, BinFheMethod::Ap)
                .unwrap();
        for base in SIGN_EVAL_BASES {
            let switched = params.with_base_g(base).unwrap();
            assert_eq!(switched.rgsw.base_g, base);
            let coverage =
                (base as u128).pow(switched.rgsw.digits_g as u32);
            assert!(coverage >= switched.lwe.big_q as u128);
        }

        let plain =
            BinFheParams::preset(BinFheParamSet::TOY, BinFheMethod::Ap).unwrap();
        assert!(matches!(
            plain.with_base_g(1 << 18),
            Err(FhewError::Lookup { base }) if base == 1 << 18
        ));
    }

    #[test]
    fn lut_generation_scales_slots() {
        let params =
            BinFheParams::preset(BinFheParamSet::TOY, BinFheMethod::Ap).unwrap();
        let q = params.lwe.q;
        let p = 4;
        let lut = params.generate_lut(|m, p| (m + 1) % p, p).unwrap();
        assert_eq!(lut.len(), q as usize);
        let interval = q / p;
        for (i, &v) in lut.iter().enumerate() {
            let slot = i as u64 / interval;
            assert_eq!(v, ((slot + 1) % p) * interval);
        }

        assert!(params.generate_lut(|m, _| m, 3).is_err());
    }

    #[test]
    fn rejects_inconsistent_specs() {
        let mut spec = catalog(BinFheParamSet::TOY);
        spec.q = 1000; // does not divide 2N
        assert!(matches!(
            BinFheParams::from_spec(spec, BinFheMethod::Ap, false),
            Err(FhewError::Config { .. })
        ));

        let mut spec = catalog(BinFheParamSet::TOY);
        spec.n = 4096; // n >= N
        assert!(BinFheParams::from_spec(spec, BinFheMethod::Ap, false).is_err());

        let mut spec = catalog(BinFheParamSet::TOY);
        spec.base_g = 48; // not a power of two
        assert!(BinFheParams::from_spec(spec, BinFheMethod::Ap, false).is_err());
    }
}
