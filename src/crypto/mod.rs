//! Cryptographic primitives and injected-provider seams: every crypto
//! provider is reached through the config rather than hardcoded here.

pub mod ciphersuite;
pub mod dh;
pub mod prf;
pub mod rng;
pub mod sig;
