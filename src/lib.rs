//! FHEW-style Boolean FHE: noise-refreshing bootstrapping over a negacyclic
//! ring, Boolean gate evaluation and large-precision operators (arbitrary
//! functions, flooring, sign, digit decomposition) built on top of it.
//!
//! The blind rotation uses the AP accumulator of
//! <https://eprint.iacr.org/2014/816> / <https://eprint.iacr.org/2020/086>;
//! the large-precision layer follows <https://eprint.iacr.org/2021/1337>.

pub mod boot;
pub mod error;
pub mod lwe;
pub mod math;
pub mod params;
pub mod rgsw;
pub mod ring;

// Re-export only the main types users need
pub use boot::{
    BinFheEngine, BootstrappingKey, BootstrappingKeyMap, LutProfile,
    check_input_function,
};
pub use error::{FhewError, FhewResult};
pub use lwe::{LweCiphertext, LweSecretKey, LweSwitchingKey};
pub use params::{
    BinFheMethod, BinFheOutput, BinFheParamSet, BinFheParams, BinGate, ParamSpec,
};
pub use rgsw::{BlindRotationKey, RgswEvalKey, RlweCiphertext};
pub use ring::{Format, NttRing, RingPoly};
