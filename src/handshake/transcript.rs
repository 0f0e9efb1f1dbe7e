//! The transcript buffer: an append-only byte
//! sequence of every handshake message in canonical order, consumed to
//! compute the handshake hash and the `CertificateVerify` signature input.

use ring::digest;

/// Append-only record of every handshake message byte exchanged so far,
/// in the exact encoding that crossed the wire (or would have, for
/// locally-generated messages). Grows monotonically during one handshake;
/// discarded at session activation.
#[derive(Debug, Default, Clone)]
pub struct Transcript {
    bytes: Vec<u8>,
}

impl Transcript {
    pub fn new() -> Transcript {
        Transcript { bytes: Vec::new() }
    }

    /// Appends one handshake message's encoded header+body. A message
    /// must be appended exactly once, at the moment it is first accepted
    /// — callers are responsible for not calling this on a retransmission
    /// or duplicate.
    pub fn append(&mut self, encoded_message: &[u8]) {
        self.bytes.extend_from_slice(encoded_message);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The transcript hash under `algorithm`, used for `Finished`
    /// verify_data and to key the finish PRF.
    pub fn hash(&self, algorithm: &'static digest::Algorithm) -> digest::Digest {
        digest::digest(algorithm, &self.bytes)
    }
}
