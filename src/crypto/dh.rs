//! The ECDH primitive interface: `new(curve_params)`
//! creates a key pair; `compute_secret(peer_point)` computes the shared
//! X-coordinate. Backed by `ring::agreement`.

use ring::agreement;

use crate::error::Error;

/// The named curves this client can negotiate for `EC_DIFFIE_HELLMAN`.
/// `ServerKeyExchange` carries the server's choice as a wire code; unknown
/// codes fail `HandshakeFailure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NamedCurve {
    Secp256r1,
    Secp384r1,
    X25519,
}

impl NamedCurve {
    /// RFC 8422 / IANA NamedGroup registry codepoints.
    pub fn from_wire(code: u16) -> Option<NamedCurve> {
        match code {
            23 => Some(NamedCurve::Secp256r1),
            24 => Some(NamedCurve::Secp384r1),
            29 => Some(NamedCurve::X25519),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u16 {
        match self {
            NamedCurve::Secp256r1 => 23,
            NamedCurve::Secp384r1 => 24,
            NamedCurve::X25519 => 29,
        }
    }

    fn agreement_algorithm(self) -> &'static agreement::Algorithm {
        match self {
            NamedCurve::Secp256r1 => &agreement::ECDH_P256,
            NamedCurve::Secp384r1 => &agreement::ECDH_P384,
            NamedCurve::X25519 => &agreement::X25519,
        }
    }
}

/// An ephemeral ECDH key pair bound to one key-exchange attempt. `ring`
/// models `EphemeralPrivateKey` as single-use (consumed by
/// `compute_secret`), which matches the handshake's own one-shot usage
/// of the client's ephemeral key.
pub struct EphemeralKeyPair {
    private_key: agreement::EphemeralPrivateKey,
    pub public_key_bytes: Vec<u8>,
}

impl EphemeralKeyPair {
    /// Generates a new ephemeral key pair on `curve`.
    pub fn new(curve: NamedCurve, rng: &dyn ring::rand::SecureRandom) -> Result<EphemeralKeyPair, Error> {
        let private_key = agreement::EphemeralPrivateKey::generate(curve.agreement_algorithm(), rng)
            .map_err(|_| Error::HandshakeFailure("failed to generate ECDH key pair".to_string()))?;
        let public_key_bytes = private_key
            .compute_public_key()
            .map_err(|_| Error::HandshakeFailure("failed to compute ECDH public key".to_string()))?
            .as_ref()
            .to_vec();
        Ok(EphemeralKeyPair {
            private_key,
            public_key_bytes,
        })
    }

    /// Consumes this key pair to compute the shared secret against the
    /// peer's point. The premaster secret is the raw X-coordinate of the
    /// shared point — for the curves above, `ring`'s
    /// agreed key material already *is* that X-coordinate (`ECDH_P256`/
    /// `ECDH_P384` output the big-endian X-coordinate; `X25519`'s output is
    /// its analogous shared-secret scalar result).
    pub fn compute_secret(self, curve: NamedCurve, peer_point: &[u8]) -> Result<Vec<u8>, Error> {
        let peer_public_key = agreement::UnparsedPublicKey::new(curve.agreement_algorithm(), peer_point);
        agreement::agree_ephemeral(
            self.private_key,
            &peer_public_key,
            ring::error::Unspecified,
            |material| Ok(material.to_vec()),
        )
        .map_err(|_| Error::HandshakeFailure("ECDH agreement failed".to_string()))
    }
}
