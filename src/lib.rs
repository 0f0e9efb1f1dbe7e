//! A DTLS 1.2 client handshake state machine (RFC 6347), scoped to the
//! client side only: building and retransmitting flights, validating the
//! server's messages in order, deriving keying material, and handing off
//! an activated `Session` once both `Finished` messages verify.
//!
//! The UDP transport, record-layer framing (sequence numbers, MACs, AEAD
//! sealing/opening), and X.509/PSK storage are all out of scope and named
//! only as the collaborator seams `trust_store`, `psk_store`, and
//! `handshake::flight`/`record::Record` define.

pub mod config;
pub mod crypto;
pub mod error;
pub mod handshake;
pub mod psk_store;
pub mod record;
pub mod session;
pub mod trust_store;

pub use config::{builder, HandshakeConfig};
pub use error::Error;
pub use handshake::client::ClientHandshake;
pub use session::Session;
