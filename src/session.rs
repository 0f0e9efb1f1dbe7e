//! The `Session` entity: long-lived, shared, mutated
//! exclusively by the driver during a handshake, then handed to the
//! record layer for read/write of cipher state after activation.

use crate::crypto::ciphersuite::CipherSuite;

/// Who the client believes it is talking to, established either from an
/// X.509 leaf certificate's subject or from a raw public key, established
/// during `Certificate` / `ServerKeyExchange` handling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerIdentity {
    X509 { subject: String },
    Rpk { public_key: Vec<u8> },
}

/// Derived record-layer key material for one direction. This crate derives
/// these bytes but does not itself perform AEAD
/// sealing/opening — that belongs to the record layer, named only as a
/// collaborator.
#[derive(Clone)]
pub struct CipherState {
    pub write_key: Vec<u8>,
    pub write_iv: Vec<u8>,
}

impl std::fmt::Debug for CipherState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherState").field("write_key", &"<redacted>").field("write_iv", &"<redacted>").finish()
    }
}

/// A DTLS session, spanning possibly many epochs. Created before the
/// handshake begins; mutated exclusively by the driver during the
/// handshake; becomes active exactly when both `Finished` messages have
/// been validated under the same master secret.
#[derive(Debug)]
pub struct Session {
    pub negotiated_version: (u8, u8),
    pub session_id: Vec<u8>,
    pub cipher_suite: Option<&'static CipherSuite>,
    pub compression_method: u8,

    read_epoch: u16,
    write_epoch: u16,
    pub read_cipher_state: Option<CipherState>,
    pub write_cipher_state: Option<CipherState>,

    pub peer_identity: Option<PeerIdentity>,
    pub active: bool,

    pub send_raw_public_key: bool,
    pub receive_raw_public_key: bool,

    pub master_secret: Option<[u8; 48]>,
}

impl Session {
    pub fn new() -> Session {
        Session {
            negotiated_version: (0, 0),
            session_id: Vec::new(),
            cipher_suite: None,
            compression_method: 0,
            read_epoch: 0,
            write_epoch: 0,
            read_cipher_state: None,
            write_cipher_state: None,
            peer_identity: None,
            active: false,
            send_raw_public_key: false,
            receive_raw_public_key: false,
            master_secret: None,
        }
    }

    pub fn read_epoch(&self) -> u16 {
        self.read_epoch
    }

    pub fn write_epoch(&self) -> u16 {
        self.write_epoch
    }

    /// Advances the read epoch on `ChangeCipherSpec`. Epochs
    /// only ever increase.
    pub fn advance_read_epoch(&mut self, cipher_state: CipherState) {
        self.read_epoch += 1;
        self.read_cipher_state = Some(cipher_state);
    }

    /// Advances the write epoch when the client emits its own
    /// `ChangeCipherSpec`.
    pub fn advance_write_epoch(&mut self, cipher_state: CipherState) {
        self.write_epoch += 1;
        self.write_cipher_state = Some(cipher_state);
    }
}

impl Default for Session {
    fn default() -> Self {
        Session::new()
    }
}
