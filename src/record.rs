//! The DTLS record envelope, as delivered to the core by the (out-of-scope)
//! record-layer demultiplexer.
//!
//! This crate does not parse or emit the DTLSPlaintext/DTLSCiphertext
//! record framing itself (sequence numbers, MACs, AEAD sealing) — that
//! lives in the record layer, named here only as the `Record` value the
//! layer hands to `on_record`.

use byteorder::ReadBytesExt;
use std::io;

/// The three content types the client driver knows how to dispatch on.
/// Any other value yields `Error::HandshakeFailure`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    ChangeCipherSpec,
    Alert,
    Handshake,
    ApplicationData,
}

impl ContentType {
    pub fn to_u8(self) -> u8 {
        match self {
            ContentType::ChangeCipherSpec => 20,
            ContentType::Alert => 21,
            ContentType::Handshake => 22,
            ContentType::ApplicationData => 23,
        }
    }

    pub fn from_u8(b: u8) -> Option<ContentType> {
        match b {
            20 => Some(ContentType::ChangeCipherSpec),
            21 => Some(ContentType::Alert),
            22 => Some(ContentType::Handshake),
            23 => Some(ContentType::ApplicationData),
            _ => None,
        }
    }
}

/// A record delivered to the driver by the record layer. The record layer
/// has already stripped off the DTLS record header's own framing and
/// handed us the epoch, sequence number, and the fragment payload.
#[derive(Debug, Clone)]
pub struct Record {
    pub content_type: ContentType,
    pub epoch: u16,
    pub sequence_number: u64,
    pub fragment_bytes: Vec<u8>,
}

impl Record {
    pub fn new(content_type: ContentType, epoch: u16, sequence_number: u64, fragment_bytes: Vec<u8>) -> Record {
        Record {
            content_type,
            epoch,
            sequence_number,
            fragment_bytes,
        }
    }
}

/// RFC 5246 §7.2: AlertLevel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertLevel {
    Warning,
    Fatal,
}

impl AlertLevel {
    pub fn to_u8(self) -> u8 {
        match self {
            AlertLevel::Warning => 1,
            AlertLevel::Fatal => 2,
        }
    }

    pub fn from_u8(b: u8) -> Option<AlertLevel> {
        match b {
            1 => Some(AlertLevel::Warning),
            2 => Some(AlertLevel::Fatal),
            _ => None,
        }
    }
}

/// RFC 5246 §7.2: the subset of AlertDescription values this driver can
/// itself raise or recognize on the wire. Unrecognized codes still decode
/// (as `Unknown`) so that an unrecognized-but-fatal alert still closes the
/// handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertDescription {
    CloseNotify,
    UnexpectedMessage,
    BadRecordMac,
    DecryptionFailed,
    RecordOverflow,
    DecompressionFailure,
    HandshakeFailure,
    BadCertificate,
    UnsupportedCertificate,
    CertificateRevoked,
    CertificateExpired,
    CertificateUnknown,
    IllegalParameter,
    UnknownCa,
    AccessDenied,
    DecodeError,
    DecryptError,
    ProtocolVersion,
    InsufficientSecurity,
    InternalError,
    UserCanceled,
    NoRenegotiation,
    UnsupportedExtension,
    Unknown(u8),
}

impl AlertDescription {
    pub fn to_u8(self) -> u8 {
        match self {
            AlertDescription::CloseNotify => 0,
            AlertDescription::UnexpectedMessage => 10,
            AlertDescription::BadRecordMac => 20,
            AlertDescription::DecryptionFailed => 21,
            AlertDescription::RecordOverflow => 22,
            AlertDescription::DecompressionFailure => 30,
            AlertDescription::HandshakeFailure => 40,
            AlertDescription::BadCertificate => 42,
            AlertDescription::UnsupportedCertificate => 43,
            AlertDescription::CertificateRevoked => 44,
            AlertDescription::CertificateExpired => 45,
            AlertDescription::CertificateUnknown => 46,
            AlertDescription::IllegalParameter => 47,
            AlertDescription::UnknownCa => 48,
            AlertDescription::AccessDenied => 49,
            AlertDescription::DecodeError => 50,
            AlertDescription::DecryptError => 51,
            AlertDescription::ProtocolVersion => 70,
            AlertDescription::InsufficientSecurity => 71,
            AlertDescription::InternalError => 80,
            AlertDescription::UserCanceled => 90,
            AlertDescription::NoRenegotiation => 100,
            AlertDescription::UnsupportedExtension => 110,
            AlertDescription::Unknown(b) => b,
        }
    }

    pub fn from_u8(b: u8) -> AlertDescription {
        match b {
            0 => AlertDescription::CloseNotify,
            10 => AlertDescription::UnexpectedMessage,
            20 => AlertDescription::BadRecordMac,
            21 => AlertDescription::DecryptionFailed,
            22 => AlertDescription::RecordOverflow,
            30 => AlertDescription::DecompressionFailure,
            40 => AlertDescription::HandshakeFailure,
            42 => AlertDescription::BadCertificate,
            43 => AlertDescription::UnsupportedCertificate,
            44 => AlertDescription::CertificateRevoked,
            45 => AlertDescription::CertificateExpired,
            46 => AlertDescription::CertificateUnknown,
            47 => AlertDescription::IllegalParameter,
            48 => AlertDescription::UnknownCa,
            49 => AlertDescription::AccessDenied,
            50 => AlertDescription::DecodeError,
            51 => AlertDescription::DecryptError,
            70 => AlertDescription::ProtocolVersion,
            71 => AlertDescription::InsufficientSecurity,
            80 => AlertDescription::InternalError,
            90 => AlertDescription::UserCanceled,
            100 => AlertDescription::NoRenegotiation,
            110 => AlertDescription::UnsupportedExtension,
            other => AlertDescription::Unknown(other),
        }
    }
}

/// A decoded `Alert` record body (RFC 5246 §7.2). The DTLS core parses
/// inbound alerts far enough to decide whether to close the handshake;
/// beyond that, an alert is not otherwise acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alert {
    pub level: AlertLevel,
    pub description: AlertDescription,
}

impl Alert {
    pub fn decode(mut bytes: &[u8]) -> io::Result<Alert> {
        let level_byte = bytes.read_u8()?;
        let desc_byte = bytes.read_u8()?;
        let level = AlertLevel::from_u8(level_byte)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "bad alert level"))?;
        Ok(Alert {
            level,
            description: AlertDescription::from_u8(desc_byte),
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        vec![self.level.to_u8(), self.description.to_u8()]
    }
}

pub const DTLS_1_2_MAJOR: u8 = 254;
pub const DTLS_1_2_MINOR: u8 = 253;
