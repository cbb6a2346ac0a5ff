//! End-to-end Boolean gate evaluation on the TOY parameter set.

use fhew::{
    BinFheEngine, BinFheMethod, BinFheOutput, BinFheParamSet, BinFheParams,
    BinGate, BootstrappingKey, LweCiphertext, LweSecretKey, lwe,
};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use std::sync::OnceLock;

struct Fixture {
    engine: BinFheEngine,
    sk: LweSecretKey,
    ek: BootstrappingKey,
}

static FIXTURE: OnceLock<Fixture> = OnceLock::new();

fn fixture() -> &'static Fixture {
    FIXTURE.get_or_init(|| {
        let params =
            BinFheParams::preset(BinFheParamSet::TOY, BinFheMethod::Ap).unwrap();
        let engine = BinFheEngine::new(params);
        let mut rng = ChaCha20Rng::seed_from_u64(0x0F00D);
        let sk = engine.key_gen(&mut rng);
        let ek = engine.bt_key_gen(&sk, &mut rng).unwrap();
        Fixture { engine, sk, ek }
    })
}

fn encrypt_bit(fx: &Fixture, m: u64, rng: &mut ChaCha20Rng) -> LweCiphertext {
    let q = fx.engine.params().lwe.q;
    fx.engine
        .encrypt(&fx.sk, m, BinFheOutput::Fresh, 4, q, None, rng)
        .unwrap()
}

fn check_gate(gate: BinGate, truth: impl Fn(u64, u64) -> u64, seed: u64) {
    let fx = fixture();
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    for m1 in 0..2 {
        for m2 in 0..2 {
            let ct1 = encrypt_bit(fx, m1, &mut rng);
            let ct2 = encrypt_bit(fx, m2, &mut rng);
            let out = fx.engine.eval_bin_gate(gate, &fx.ek, &ct1, &ct2).unwrap();
            assert_eq!(
                fx.engine.decrypt(&fx.sk, &out, 4),
                truth(m1, m2),
                "{gate:?}({m1}, {m2})"
            );
        }
    }
}

#[test]
fn and_gate_truth_table() {
    check_gate(BinGate::And, |a, b| a & b, 1);
}

#[test]
fn or_gate_truth_table() {
    check_gate(BinGate::Or, |a, b| a | b, 2);
}

#[test]
fn nand_gate_truth_table() {
    check_gate(BinGate::Nand, |a, b| 1 - (a & b), 3);
}

#[test]
fn nor_gate_truth_table() {
    check_gate(BinGate::Nor, |a, b| 1 - (a | b), 4);
}

#[test]
fn xor_gate_truth_table() {
    // slow-exact variant composed from AND/OR/NOT
    check_gate(BinGate::Xor, |a, b| a ^ b, 5);
}

#[test]
fn xnor_gate_truth_table() {
    check_gate(BinGate::Xnor, |a, b| 1 - (a ^ b), 6);
}

#[test]
fn xor_fast_gate_truth_table() {
    check_gate(BinGate::XorFast, |a, b| a ^ b, 7);
}

#[test]
fn xnor_fast_gate_truth_table() {
    check_gate(BinGate::XnorFast, |a, b| 1 - (a ^ b), 8);
}

#[test]
fn not_gate_on_fresh_and_bootstrapped_inputs() {
    let fx = fixture();
    let mut rng = ChaCha20Rng::seed_from_u64(9);
    for m in 0..2 {
        let ct = encrypt_bit(fx, m, &mut rng);
        let flipped = fx.engine.eval_not(&ct);
        assert_eq!(fx.engine.decrypt(&fx.sk, &flipped, 4), 1 - m);

        let refreshed = fx.engine.bootstrap(&fx.ek, &flipped).unwrap();
        assert_eq!(fx.engine.decrypt(&fx.sk, &refreshed, 4), 1 - m);
    }
}

#[test]
fn bootstrap_preserves_bits_and_contracts_noise() {
    let fx = fixture();
    let mut rng = ChaCha20Rng::seed_from_u64(10);
    let q = fx.engine.params().lwe.q;
    // refreshed ciphertexts must decrypt with margin q/8, however often
    // they are re-bootstrapped
    let bound = q / 8;
    for m in 0..2 {
        let mut ct = encrypt_bit(fx, m, &mut rng);
        for round in 0..3 {
            ct = fx.engine.bootstrap(&fx.ek, &ct).unwrap();
            assert_eq!(
                fx.engine.decrypt(&fx.sk, &ct, 4),
                m,
                "bit changed in round {round}"
            );

            let ph = lwe::phase(&fx.sk, &ct);
            let err = (ph + q - m * (q / 4)) % q;
            let err = err.min(q - err);
            assert!(
                err < bound,
                "noise {err} above bound {bound} in round {round}"
            );
        }
    }
}

#[test]
fn bootstrapped_encryption_decrypts_correctly() {
    let fx = fixture();
    let mut rng = ChaCha20Rng::seed_from_u64(11);
    let q = fx.engine.params().lwe.q;
    for m in 0..2 {
        let ct = fx
            .engine
            .encrypt(
                &fx.sk,
                m,
                BinFheOutput::Bootstrapped,
                4,
                q,
                Some(&fx.ek),
                &mut rng,
            )
            .unwrap();
        assert_eq!(fx.engine.decrypt(&fx.sk, &ct, 4), m);
    }
}

#[test]
fn gates_compose_into_a_small_circuit() {
    // full adder: sum = a ^ b ^ cin, carry = majority(a, b, cin)
    let fx = fixture();
    let mut rng = ChaCha20Rng::seed_from_u64(12);
    for bits in 0..8u64 {
        let (a, b, cin) = (bits & 1, (bits >> 1) & 1, (bits >> 2) & 1);
        let ct_a = encrypt_bit(fx, a, &mut rng);
        let ct_b = encrypt_bit(fx, b, &mut rng);
        let ct_c = encrypt_bit(fx, cin, &mut rng);

        let ab = fx
            .engine
            .eval_bin_gate(BinGate::XorFast, &fx.ek, &ct_a, &ct_b)
            .unwrap();
        let sum = fx
            .engine
            .eval_bin_gate(BinGate::XorFast, &fx.ek, &ab, &ct_c)
            .unwrap();

        let ab_and = fx
            .engine
            .eval_bin_gate(BinGate::And, &fx.ek, &ct_a, &ct_b)
            .unwrap();
        let abc_and = fx
            .engine
            .eval_bin_gate(BinGate::And, &fx.ek, &ab, &ct_c)
            .unwrap();
        let carry = fx
            .engine
            .eval_bin_gate(BinGate::Or, &fx.ek, &ab_and, &abc_and)
            .unwrap();

        assert_eq!(
            fx.engine.decrypt(&fx.sk, &sum, 4),
            a ^ b ^ cin,
            "sum({a},{b},{cin})"
        );
        assert_eq!(
            fx.engine.decrypt(&fx.sk, &carry, 4),
            (a & b) | (cin & (a ^ b)),
            "carry({a},{b},{cin})"
        );
    }
}
