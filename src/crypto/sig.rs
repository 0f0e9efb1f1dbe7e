//! ECDSA signing and verification, used for `ServerKeyExchange` signature
//! checks and for `CertificateVerify` (RFC 5246 §7.4.8). A
//! `SignatureScheme` enum selects algorithm, with a `sign`/`verify` pair
//! concretely backed by `ring::signature` rather than `ed25519-dalek`,
//! since the suites this client supports (`TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8`)
//! are P-256 ECDSA, not Ed25519.

use ring::signature::{self, EcdsaKeyPair, KeyPair};

use crate::error::Error;

/// RFC 5246 §7.4.1.4.1 `SignatureAndHashAlgorithm` values this client can
/// both produce (for `CertificateVerify`) and verify (for
/// `ServerKeyExchange`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignatureScheme {
    EcdsaSecp256r1Sha256,
    EcdsaSecp384r1Sha384,
}

impl SignatureScheme {
    /// `(hash, signature)` wire pair, per RFC 5246 §7.4.1.4.1. ECDSA is 3,
    /// SHA-256 is 4, SHA-384 is 5.
    pub fn to_wire(self) -> (u8, u8) {
        match self {
            SignatureScheme::EcdsaSecp256r1Sha256 => (4, 3),
            SignatureScheme::EcdsaSecp384r1Sha384 => (5, 3),
        }
    }

    pub fn from_wire(hash: u8, signature: u8) -> Option<SignatureScheme> {
        match (hash, signature) {
            (4, 3) => Some(SignatureScheme::EcdsaSecp256r1Sha256),
            (5, 3) => Some(SignatureScheme::EcdsaSecp384r1Sha384),
            _ => None,
        }
    }

    fn verification_algorithm(self) -> &'static dyn signature::VerificationAlgorithm {
        match self {
            SignatureScheme::EcdsaSecp256r1Sha256 => &signature::ECDSA_P256_SHA256_FIXED,
            SignatureScheme::EcdsaSecp384r1Sha384 => &signature::ECDSA_P384_SHA384_FIXED,
        }
    }

    fn signing_algorithm(self) -> &'static signature::EcdsaSigningAlgorithm {
        match self {
            SignatureScheme::EcdsaSecp256r1Sha256 => &signature::ECDSA_P256_SHA256_FIXED_SIGNING,
            SignatureScheme::EcdsaSecp384r1Sha384 => &signature::ECDSA_P384_SHA384_FIXED_SIGNING,
        }
    }

    /// Returns the first scheme in `offered` (server's `supported_signature_
    /// algorithms`, in the server's preference order) that this client can
    /// honor. A `CertificateRequest` offering no scheme we support must be
    /// rejected rather than silently defaulted.
    pub fn pick_supported(offered: &[(u8, u8)]) -> Option<SignatureScheme> {
        offered.iter().find_map(|&(h, s)| SignatureScheme::from_wire(h, s))
    }
}

/// Verifies an ECDSA signature over `message` under the peer's raw SEC1
/// public-key bytes. Used both for `ServerKeyExchange` and,
/// indirectly, to validate a raw public key presented as an RPK
/// `Certificate` message.
pub fn verify(scheme: SignatureScheme, public_key_bytes: &[u8], message: &[u8], signature_bytes: &[u8]) -> Result<(), Error> {
    let key = signature::UnparsedPublicKey::new(scheme.verification_algorithm(), public_key_bytes);
    key.verify(message, signature_bytes)
        .map_err(|_| Error::HandshakeFailure("ECDSA signature verification failed".to_string()))
}

/// Signs `message` with a PKCS#8-encoded ECDSA private key, producing the
/// `CertificateVerify.signature` bytes.
pub fn sign(scheme: SignatureScheme, pkcs8_private_key: &[u8], message: &[u8], rng: &dyn ring::rand::SecureRandom) -> Result<Vec<u8>, Error> {
    let key_pair = EcdsaKeyPair::from_pkcs8(scheme.signing_algorithm(), pkcs8_private_key)
        .map_err(|_| Error::HandshakeFailure("invalid ECDSA private key".to_string()))?;
    let sig = key_pair
        .sign(rng, message)
        .map_err(|_| Error::HandshakeFailure("ECDSA signing failed".to_string()))?;
    Ok(sig.as_ref().to_vec())
}

/// Derives the raw SEC1 public key bytes from a PKCS#8-encoded private key,
/// used by `HandshakeConfig::identity` to validate that a configured
/// private key and public key are actually paired — an unvalidated
/// mismatched pair would otherwise fail far later and far less clearly,
/// at the first `CertificateVerify`.
pub fn public_key_from_pkcs8(scheme: SignatureScheme, pkcs8_private_key: &[u8]) -> Result<Vec<u8>, Error> {
    let key_pair = EcdsaKeyPair::from_pkcs8(scheme.signing_algorithm(), pkcs8_private_key)
        .map_err(|_| Error::HandshakeFailure("invalid ECDSA private key".to_string()))?;
    Ok(key_pair.public_key().as_ref().to_vec())
}
