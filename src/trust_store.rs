//! The trust-store interface: `verify(chain) -> ok |
//! CertError`. The concrete X.509 validation engine is an external
//! collaborator; this crate only names the seam the driver calls into
//! when processing a `Certificate` message.

use crate::error::Error;

/// One DER-encoded X.509 certificate, leaf first.
pub type CertificateChain = Vec<Vec<u8>>;

pub trait TrustStore: Send + Sync {
    /// Validates `chain` against this store's trust anchors. `Ok(())`
    /// means the chain is trusted; any `Err` is surfaced to the driver as
    /// `Error::CertificateError` and terminates the handshake with a
    /// fatal alert.
    fn verify(&self, chain: &CertificateChain) -> Result<(), Error>;
}

/// A trust store that accepts every chain. Exists purely for tests that
/// need to exercise the X.509 code path without a real CA — production
/// configs must supply a real `TrustStore`.
#[derive(Debug, Clone, Default)]
pub struct AcceptAllTrustStore;

impl TrustStore for AcceptAllTrustStore {
    fn verify(&self, _chain: &CertificateChain) -> Result<(), Error> {
        Ok(())
    }
}
