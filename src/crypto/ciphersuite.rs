//! Cipher suite table: exactly two non-null suites
//! (`TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8`, `TLS_PSK_WITH_AES_128_CCM_8`, RFC
//! 7251) plus the `NULL` key-exchange placeholder `handshake::strategy`
//! dispatches on when no credentials are configured at all. Cipher suites
//! are exposed as `&'static CipherSuite` values rather than an enum, so
//! call sites can carry them around cheaply.

use ring::{digest, hmac};

/// Which key-exchange strategy a suite selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyExchangeAlgorithm {
    EcDiffieHellman,
    Psk,
    Null,
}

#[derive(Debug)]
pub struct CipherSuite {
    /// The two-byte wire identifier (RFC 5246 §A.5).
    pub id: u16,
    pub name: &'static str,
    pub key_exchange: KeyExchangeAlgorithm,
    /// The hash algorithm backing this suite's PRF (RFC 5246 §7.4.9: "the
    /// TLS 1.2 PRF with the suite's PRF hash").
    pub prf_hash: hmac::Algorithm,
    /// The hash algorithm backing the transcript/handshake hash (almost
    /// always identical to `prf_hash`'s underlying hash for the suites
    /// this client supports, but named separately since RFC 5246 permits
    /// divergence in principle).
    pub transcript_hash: &'static digest::Algorithm,
    /// AEAD key material lengths for the record-layer cipher state this
    /// driver derives but does not itself operate — the UDP I/O layer and
    /// the record-layer demultiplexer live outside this crate.
    pub enc_key_length: usize,
    pub fixed_iv_length: usize,
}

/// The wire id TLS reserves for "no cipher at all"
/// (`TLS_NULL_WITH_NULL_NULL`). A `HandshakeConfig` whose suite list
/// contains this is rejected by `Builder::supported_cipher_suites`
///.
pub const NULL_CIPHER_SENTINEL: u16 = 0x0000;

pub static TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8: CipherSuite = CipherSuite {
    id: 0xC0AE,
    name: "TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8",
    key_exchange: KeyExchangeAlgorithm::EcDiffieHellman,
    prf_hash: hmac::HMAC_SHA256,
    transcript_hash: &digest::SHA256,
    enc_key_length: 16,
    fixed_iv_length: 4,
};

pub static TLS_PSK_WITH_AES_128_CCM_8: CipherSuite = CipherSuite {
    id: 0xC0A8,
    name: "TLS_PSK_WITH_AES_128_CCM_8",
    key_exchange: KeyExchangeAlgorithm::Psk,
    prf_hash: hmac::HMAC_SHA256,
    transcript_hash: &digest::SHA256,
    enc_key_length: 16,
    fixed_iv_length: 4,
};

/// Looks up one of the two suites this client recognizes by wire id. A
/// `ServerHello` selecting anything else is a protocol violation (the
/// server cannot select a suite the client didn't offer).
pub fn by_id(id: u16) -> Option<&'static CipherSuite> {
    if id == TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8.id {
        Some(&TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8)
    } else if id == TLS_PSK_WITH_AES_128_CCM_8.id {
        Some(&TLS_PSK_WITH_AES_128_CCM_8)
    } else {
        None
    }
}
