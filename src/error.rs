//! Error kinds for the handshake core, covering the failure taxonomy a
//! DTLS client handshake can surface.
//!
//! This is a hand-rolled enum, not a `thiserror` derive, with its own
//! `Display`/`std::error::Error` impls below.

use std::fmt;

use crate::record::{AlertDescription, AlertLevel};

/// Something went wrong while building a `HandshakeConfig`, processing a
/// handshake record, or deriving keying material.
#[derive(Debug)]
pub enum Error {
    /// A config setter was given a value that can never be valid, independent
    /// of the rest of the config (empty cipher suite list, null credentials).
    InvalidArg(&'static str),
    /// `Builder::build()` was called but the accumulated setters leave no
    /// cipher suite satisfiable by the configured credentials.
    InvalidState(&'static str),
    /// Protocol-level failure: unsupported suite/curve, missing PSK,
    /// unexpected message, unsupported signature algorithm. Always fatal.
    HandshakeFailure(String),
    /// `Finished` verify_data did not match what we computed.
    DecryptError,
    /// The trust store rejected the certificate chain.
    CertificateError(String),
    /// A handshake message failed to decode.
    MalformedMessage(String),
}

impl Error {
    /// Whether this error, once surfaced past record processing, requires
    /// tearing down the handshake and sending a fatal alert.
    pub fn is_fatal(&self) -> bool {
        match self {
            Error::InvalidArg(_) | Error::InvalidState(_) => false,
            Error::HandshakeFailure(_)
            | Error::DecryptError
            | Error::CertificateError(_)
            | Error::MalformedMessage(_) => true,
        }
    }

    /// The alert level/description pair to place on the wire when this
    /// error terminates a handshake in progress. Panics if called on a
    /// config-only (non-fatal) variant — those never reach a live session.
    pub fn to_alert(&self) -> (AlertLevel, AlertDescription) {
        match self {
            Error::HandshakeFailure(_) => (AlertLevel::Fatal, AlertDescription::HandshakeFailure),
            Error::DecryptError => (AlertLevel::Fatal, AlertDescription::DecryptError),
            Error::CertificateError(_) => (AlertLevel::Fatal, AlertDescription::BadCertificate),
            Error::MalformedMessage(_) => (AlertLevel::Fatal, AlertDescription::DecodeError),
            Error::InvalidArg(_) | Error::InvalidState(_) => {
                panic!("to_alert() called on a configuration error")
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidArg(msg) => write!(f, "invalid argument: {}", msg),
            Error::InvalidState(msg) => write!(f, "invalid config state: {}", msg),
            Error::HandshakeFailure(msg) => write!(f, "handshake failure: {}", msg),
            Error::DecryptError => write!(f, "decrypt error: Finished verify_data mismatch"),
            Error::CertificateError(msg) => write!(f, "certificate error: {}", msg),
            Error::MalformedMessage(msg) => write!(f, "malformed message: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

impl From<ring::error::Unspecified> for Error {
    fn from(_: ring::error::Unspecified) -> Error {
        Error::HandshakeFailure("cryptographic operation failed".to_string())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::MalformedMessage(format!("{}", e))
    }
}
