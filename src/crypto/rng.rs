//! A trait object-safe RNG, threaded through every function that needs
//! entropy rather than tied to one concrete generator.
//!
//! Keeping this as a narrow trait rather than threading `rand::RngCore`
//! directly lets the driver accept `ring::rand::SystemRandom` (which does
//! not implement `RngCore`) and test doubles equally.

use rand::RngCore;

pub trait CryptoRng {
    fn fill(&mut self, dest: &mut [u8]);
}

/// Adapts any `rand::RngCore` into a `CryptoRng`.
pub struct RandRng<R: RngCore>(pub R);

impl<R: RngCore> CryptoRng for RandRng<R> {
    fn fill(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }
}

/// Adapts `ring`'s system RNG, used by default in `ClientHandshake::new`.
pub struct SystemRng(pub ring::rand::SystemRandom);

impl SystemRng {
    pub fn new() -> SystemRng {
        SystemRng(ring::rand::SystemRandom::new())
    }
}

impl Default for SystemRng {
    fn default() -> Self {
        SystemRng::new()
    }
}

impl CryptoRng for SystemRng {
    fn fill(&mut self, dest: &mut [u8]) {
        use ring::rand::SecureRandom;
        // SystemRandom::fill is documented as infallible outside of
        // catastrophic OS failure; a CryptoRng that can fail isn't a
        // usable entropy source, so we treat failure as unrecoverable.
        self.0.fill(dest).expect("system RNG failed");
    }
}
