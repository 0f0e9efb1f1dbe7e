//! Handshake message bodies (RFC 5246 §7.4, RFC 6347 §4.2.2, RFC 7250 §4.1,
//! RFC 4279 §2). `HandshakeMessage` wraps each body in a tagged variant,
//! dispatched by `match` rather than dynamic dispatch.

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Cursor, Read, Write};

use crate::error::Error;
use crate::handshake::codec::*;

/// RFC 6347 §4.2.2 handshake type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum HandshakeType {
    HelloRequest,
    ClientHello,
    ServerHello,
    HelloVerifyRequest,
    Certificate,
    ServerKeyExchange,
    CertificateRequest,
    ServerHelloDone,
    CertificateVerify,
    ClientKeyExchange,
    Finished,
}

impl HandshakeType {
    pub fn to_u8(self) -> u8 {
        match self {
            HandshakeType::HelloRequest => 0,
            HandshakeType::ClientHello => 1,
            HandshakeType::ServerHello => 2,
            HandshakeType::HelloVerifyRequest => 3,
            HandshakeType::Certificate => 11,
            HandshakeType::ServerKeyExchange => 12,
            HandshakeType::CertificateRequest => 13,
            HandshakeType::ServerHelloDone => 14,
            HandshakeType::CertificateVerify => 15,
            HandshakeType::ClientKeyExchange => 16,
            HandshakeType::Finished => 20,
        }
    }

    pub fn from_u8(b: u8) -> Option<HandshakeType> {
        match b {
            0 => Some(HandshakeType::HelloRequest),
            1 => Some(HandshakeType::ClientHello),
            2 => Some(HandshakeType::ServerHello),
            3 => Some(HandshakeType::HelloVerifyRequest),
            11 => Some(HandshakeType::Certificate),
            12 => Some(HandshakeType::ServerKeyExchange),
            13 => Some(HandshakeType::CertificateRequest),
            14 => Some(HandshakeType::ServerHelloDone),
            15 => Some(HandshakeType::CertificateVerify),
            16 => Some(HandshakeType::ClientKeyExchange),
            20 => Some(HandshakeType::Finished),
            _ => None,
        }
    }
}

/// RFC 7250 §3: certificate type codes carried in the
/// `client_certificate_type` / `server_certificate_type` extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateType {
    X509,
    RawPublicKey,
}

impl CertificateType {
    fn to_u8(self) -> u8 {
        match self {
            CertificateType::X509 => 0,
            CertificateType::RawPublicKey => 2,
        }
    }

    fn from_u8(b: u8) -> Option<CertificateType> {
        match b {
            0 => Some(CertificateType::X509),
            2 => Some(CertificateType::RawPublicKey),
            _ => None,
        }
    }
}

pub const EXT_CLIENT_CERTIFICATE_TYPE: u16 = 19;
pub const EXT_SERVER_CERTIFICATE_TYPE: u16 = 20;

/// A single `Extension` TLV (RFC 5246 §7.4.1.4). Bodies this client does
/// not understand are kept as opaque bytes and round-trip unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extension_type: u16,
    pub data: Vec<u8>,
}

impl Extension {
    /// Builds the RFC 7250 `{client,server}_certificate_type` extension
    /// offering/selecting `RawPublicKey` first.
    pub fn certificate_type(extension_type: u16, types: &[CertificateType]) -> Extension {
        let mut data = vec![types.len() as u8];
        data.extend(types.iter().map(|t| t.to_u8()));
        Extension { extension_type, data }
    }

    /// Returns `true` if this is a `{client,server}_certificate_type`
    /// extension whose first offered/selected entry is `RawPublicKey`.
    pub fn selects_raw_public_key(&self) -> bool {
        self.data.first().copied() == Some(CertificateType::RawPublicKey.to_u8())
    }
}

fn read_extensions<R: Read>(r: &mut R) -> std::io::Result<Vec<Extension>> {
    let bytes = read_vec_u16(r)?;
    let mut cursor = Cursor::new(bytes);
    let mut out = Vec::new();
    loop {
        let extension_type = match cursor.read_u16::<BigEndian>() {
            Ok(v) => v,
            Err(_) => break,
        };
        let data = read_vec_u16(&mut cursor)?;
        out.push(Extension { extension_type, data });
    }
    Ok(out)
}

fn write_extensions<W: Write>(w: &mut W, extensions: &[Extension]) -> Result<(), Error> {
    let mut body = Vec::new();
    for ext in extensions {
        body.write_u16::<BigEndian>(ext.extension_type)?;
        write_vec_u16(&mut body, &ext.data)?;
    }
    write_vec_u16(w, &body)
}

/// RFC 5246 §7.4.1.2.
#[derive(Debug, Clone)]
pub struct ClientHello {
    pub client_version: (u8, u8),
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    /// DTLS-only field, absent from the TLS wire format (RFC 6347 §4.2.1).
    pub cookie: Vec<u8>,
    pub cipher_suites: Vec<u16>,
    pub compression_methods: Vec<u8>,
    pub extensions: Vec<Extension>,
}

impl ClientHello {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        out.write_u8(self.client_version.0)?;
        out.write_u8(self.client_version.1)?;
        out.write_all(&self.random)?;
        write_vec_u8(&mut out, &self.session_id)?;
        write_vec_u8(&mut out, &self.cookie)?;
        write_u16_list_u16(&mut out, &self.cipher_suites)?;
        write_vec_u8(&mut out, &self.compression_methods)?;
        write_extensions(&mut out, &self.extensions)?;
        Ok(out)
    }

    pub fn decode(bytes: &[u8]) -> Result<ClientHello, Error> {
        let mut r = Cursor::new(bytes);
        let client_version = (r.read_u8()?, r.read_u8()?);
        let mut random = [0u8; 32];
        r.read_exact(&mut random)?;
        let session_id = read_vec_u8(&mut r)?;
        let cookie = read_vec_u8(&mut r)?;
        let cipher_suites = read_u16_list_u16(&mut r)?;
        let compression_methods = read_vec_u8(&mut r)?;
        let extensions = read_extensions(&mut r)?;
        Ok(ClientHello {
            client_version,
            random,
            session_id,
            cookie,
            cipher_suites,
            compression_methods,
            extensions,
        })
    }
}

/// RFC 6347 §4.2.1.
#[derive(Debug, Clone)]
pub struct HelloVerifyRequest {
    pub server_version: (u8, u8),
    pub cookie: Vec<u8>,
}

impl HelloVerifyRequest {
    pub fn decode(bytes: &[u8]) -> Result<HelloVerifyRequest, Error> {
        let mut r = Cursor::new(bytes);
        let server_version = (r.read_u8()?, r.read_u8()?);
        let cookie = read_vec_u8(&mut r)?;
        Ok(HelloVerifyRequest { server_version, cookie })
    }
}

/// RFC 5246 §7.4.1.3.
#[derive(Debug, Clone)]
pub struct ServerHello {
    pub server_version: (u8, u8),
    pub random: [u8; 32],
    pub session_id: Vec<u8>,
    pub cipher_suite: u16,
    pub compression_method: u8,
    pub extensions: Vec<Extension>,
}

impl ServerHello {
    pub fn decode(bytes: &[u8]) -> Result<ServerHello, Error> {
        let mut r = Cursor::new(bytes);
        let server_version = (r.read_u8()?, r.read_u8()?);
        let mut random = [0u8; 32];
        r.read_exact(&mut random)?;
        let session_id = read_vec_u8(&mut r)?;
        let cipher_suite = r.read_u16::<BigEndian>()?;
        let compression_method = r.read_u8()?;
        // The extensions block is optional (RFC 5246 §7.4.1.3); a plain
        // PSK server commonly omits it entirely rather than sending an
        // empty `<0..2^16-1>` vector.
        let extensions = if r.position() < bytes.len() as u64 {
            read_extensions(&mut r)?
        } else {
            Vec::new()
        };
        Ok(ServerHello {
            server_version,
            random,
            session_id,
            cipher_suite,
            compression_method,
            extensions,
        })
    }

    /// True if either certificate-type extension's first entry selects
    /// RPK — this client treats the two extensions as ORed rather than
    /// independent.
    pub fn selects_raw_public_key(&self) -> bool {
        self.extensions
            .iter()
            .filter(|e| e.extension_type == EXT_CLIENT_CERTIFICATE_TYPE || e.extension_type == EXT_SERVER_CERTIFICATE_TYPE)
            .any(|e| e.selects_raw_public_key())
    }
}

/// RFC 5246 §7.4.2 / RFC 7250 §3: either a full X.509 chain or, when RPK
/// is negotiated, a bare `SubjectPublicKeyInfo`.
#[derive(Debug, Clone)]
pub enum Certificate {
    X509Chain(Vec<Vec<u8>>),
    RawPublicKey(Vec<u8>),
}

impl Certificate {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        match self {
            Certificate::X509Chain(chain) => {
                let mut list_bytes = Vec::new();
                for cert in chain {
                    write_vec_u24(&mut list_bytes, cert)?;
                }
                write_vec_u24(&mut out, &list_bytes)?;
            }
            Certificate::RawPublicKey(spki) => {
                out.extend_from_slice(spki);
            }
        }
        Ok(out)
    }

    pub fn decode_x509(bytes: &[u8]) -> Result<Certificate, Error> {
        let mut r = Cursor::new(bytes);
        let list_bytes = read_vec_u24(&mut r)?;
        let mut cursor = Cursor::new(list_bytes);
        let mut chain = Vec::new();
        while cursor.position() < cursor.get_ref().len() as u64 {
            chain.push(read_vec_u24(&mut cursor)?);
        }
        Ok(Certificate::X509Chain(chain))
    }

    pub fn decode_raw_public_key(bytes: &[u8]) -> Certificate {
        Certificate::RawPublicKey(bytes.to_vec())
    }
}

/// RFC 8422 §5.4: the signed server ECDH parameters.
#[derive(Debug, Clone)]
pub struct ServerEcdhParams {
    pub named_curve: u16,
    pub public: Vec<u8>,
}

/// RFC 5246 §7.4.3 / RFC 4279 §2. ECDHE carries signed params; PSK carries
/// only an identity hint.
#[derive(Debug, Clone)]
pub enum ServerKeyExchange {
    EcDiffieHellman {
        params: ServerEcdhParams,
        signature_scheme: (u8, u8),
        signature: Vec<u8>,
    },
    Psk { identity_hint: Vec<u8> },
}

impl ServerKeyExchange {
    /// The exact bytes of `params` as they appeared on the wire, used to
    /// reconstruct the `client_random || server_random || server_ecdh_params`
    /// signature input. Must be computed from the original
    /// encoding, not a re-encode, since re-encoding is only guaranteed
    /// bit-identical if this type's `Eq` round-trip law holds.
    pub fn decode_ecdhe(bytes: &[u8]) -> Result<(ServerKeyExchange, Vec<u8>), Error> {
        let mut r = Cursor::new(bytes);
        let curve_type = r.read_u8()?;
        if curve_type != 3 {
            return Err(Error::HandshakeFailure("only named_curve ECParameters are supported".to_string()));
        }
        let named_curve = r.read_u16::<BigEndian>()?;
        let public = read_vec_u8(&mut r)?;

        let params_end = r.position() as usize;
        let params_bytes = bytes[..params_end].to_vec();

        let hash = r.read_u8()?;
        let sig_alg = r.read_u8()?;
        let signature = read_vec_u16(&mut r)?;

        Ok((
            ServerKeyExchange::EcDiffieHellman {
                params: ServerEcdhParams { named_curve, public },
                signature_scheme: (hash, sig_alg),
                signature,
            },
            params_bytes,
        ))
    }

    pub fn decode_psk(bytes: &[u8]) -> Result<ServerKeyExchange, Error> {
        let mut r = Cursor::new(bytes);
        let identity_hint = read_vec_u16(&mut r)?;
        Ok(ServerKeyExchange::Psk { identity_hint })
    }
}

/// RFC 5246 §7.4.4.
#[derive(Debug, Clone)]
pub struct CertificateRequest {
    pub certificate_types: Vec<u8>,
    pub supported_signature_algorithms: Vec<(u8, u8)>,
    pub certificate_authorities: Vec<Vec<u8>>,
}

impl CertificateRequest {
    pub fn decode(bytes: &[u8]) -> Result<CertificateRequest, Error> {
        let mut r = Cursor::new(bytes);
        let certificate_types = read_vec_u8(&mut r)?;

        let sig_alg_bytes = read_vec_u16(&mut r)?;
        let mut sig_cursor = Cursor::new(sig_alg_bytes);
        let mut supported_signature_algorithms = Vec::new();
        while sig_cursor.position() < sig_cursor.get_ref().len() as u64 {
            let hash = sig_cursor.read_u8()?;
            let sig = sig_cursor.read_u8()?;
            supported_signature_algorithms.push((hash, sig));
        }

        let ca_bytes = read_vec_u16(&mut r)?;
        let mut ca_cursor = Cursor::new(ca_bytes);
        let mut certificate_authorities = Vec::new();
        while ca_cursor.position() < ca_cursor.get_ref().len() as u64 {
            certificate_authorities.push(read_vec_u16(&mut ca_cursor)?);
        }

        Ok(CertificateRequest {
            certificate_types,
            supported_signature_algorithms,
            certificate_authorities,
        })
    }
}

/// RFC 5246 §7.4.3 (client side) / RFC 4279 §2.
#[derive(Debug, Clone)]
pub enum ClientKeyExchange {
    EcDiffieHellman { public: Vec<u8> },
    Psk { identity: Vec<u8> },
    Null,
}

impl ClientKeyExchange {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        match self {
            ClientKeyExchange::EcDiffieHellman { public } => write_vec_u8(&mut out, public)?,
            ClientKeyExchange::Psk { identity } => write_vec_u16(&mut out, identity)?,
            ClientKeyExchange::Null => {}
        }
        Ok(out)
    }
}

/// RFC 5246 §7.4.8.
#[derive(Debug, Clone)]
pub struct CertificateVerify {
    pub signature_scheme: (u8, u8),
    pub signature: Vec<u8>,
}

impl CertificateVerify {
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        out.write_u8(self.signature_scheme.0)?;
        out.write_u8(self.signature_scheme.1)?;
        write_vec_u16(&mut out, &self.signature)?;
        Ok(out)
    }
}

/// RFC 5246 §7.4.9.
#[derive(Debug, Clone)]
pub struct Finished {
    pub verify_data: [u8; 12],
}

impl Finished {
    pub fn encode(&self) -> Vec<u8> {
        self.verify_data.to_vec()
    }

    pub fn decode(bytes: &[u8]) -> Result<Finished, Error> {
        if bytes.len() != 12 {
            return Err(Error::MalformedMessage("Finished.verify_data must be 12 bytes".to_string()));
        }
        let mut verify_data = [0u8; 12];
        verify_data.copy_from_slice(bytes);
        Ok(Finished { verify_data })
    }
}

/// The tagged union over every handshake message this driver sends or
/// receives, dispatched by `match` on variant rather than dynamic
/// dispatch.
#[derive(Debug, Clone)]
pub enum HandshakeBody {
    HelloRequest,
    ClientHello(ClientHello),
    ServerHello(ServerHello),
    HelloVerifyRequest(HelloVerifyRequest),
    Certificate(Certificate),
    ServerKeyExchange(ServerKeyExchange),
    CertificateRequest(CertificateRequest),
    ServerHelloDone,
    CertificateVerify(CertificateVerify),
    ClientKeyExchange(ClientKeyExchange),
    Finished(Finished),
}

impl HandshakeBody {
    /// Encodes the body bytes of messages this client actually sends.
    /// Bodies this client only ever receives (`ServerHello`, `Certificate`
    /// when presented by the server, etc.) have no encode path here —
    /// they're re-encoded only implicitly, via the `raw_body` captured at
    /// decode time (see `HandshakeMessage::raw_body`).
    pub fn encode(&self) -> Result<Vec<u8>, Error> {
        match self {
            HandshakeBody::ClientHello(m) => m.encode(),
            HandshakeBody::Certificate(m) => m.encode(),
            HandshakeBody::ClientKeyExchange(m) => m.encode(),
            HandshakeBody::CertificateVerify(m) => m.encode(),
            HandshakeBody::Finished(m) => Ok(m.encode()),
            HandshakeBody::ServerHelloDone | HandshakeBody::HelloRequest => Ok(Vec::new()),
            HandshakeBody::ServerHello(_)
            | HandshakeBody::HelloVerifyRequest(_)
            | HandshakeBody::ServerKeyExchange(_)
            | HandshakeBody::CertificateRequest(_) => {
                Err(Error::HandshakeFailure("client does not encode server-originated messages".to_string()))
            }
        }
    }

    pub fn handshake_type(&self) -> HandshakeType {
        match self {
            HandshakeBody::HelloRequest => HandshakeType::HelloRequest,
            HandshakeBody::ClientHello(_) => HandshakeType::ClientHello,
            HandshakeBody::ServerHello(_) => HandshakeType::ServerHello,
            HandshakeBody::HelloVerifyRequest(_) => HandshakeType::HelloVerifyRequest,
            HandshakeBody::Certificate(_) => HandshakeType::Certificate,
            HandshakeBody::ServerKeyExchange(_) => HandshakeType::ServerKeyExchange,
            HandshakeBody::CertificateRequest(_) => HandshakeType::CertificateRequest,
            HandshakeBody::ServerHelloDone => HandshakeType::ServerHelloDone,
            HandshakeBody::CertificateVerify(_) => HandshakeType::CertificateVerify,
            HandshakeBody::ClientKeyExchange(_) => HandshakeType::ClientKeyExchange,
            HandshakeBody::Finished(_) => HandshakeType::Finished,
        }
    }
}

/// A full handshake message: the RFC 6347 §4.2.2 header plus body, as it
/// appears once fragments are reassembled (or, for an unfragmented
/// message, exactly as received).
#[derive(Debug, Clone)]
pub struct HandshakeMessage {
    pub message_seq: u16,
    pub body: HandshakeBody,
    /// The exact encoded body bytes, kept alongside the parsed `body` so
    /// the transcript can append precisely what was sent/received
    /// without depending on a re-encode round-trip.
    pub raw_body: Vec<u8>,
}

impl HandshakeMessage {
    /// Encodes the RFC 6347 handshake header + body as one unfragmented
    /// record fragment (`fragment_offset = 0`, `fragment_length = length`).
    pub fn encode_unfragmented(&self) -> Result<Vec<u8>, Error> {
        let mut out = Vec::new();
        out.write_u8(self.body.handshake_type().to_u8())?;
        write_u24(&mut out, self.raw_body.len() as u32)?;
        out.write_u16::<BigEndian>(self.message_seq)?;
        write_u24(&mut out, 0)?;
        write_u24(&mut out, self.raw_body.len() as u32)?;
        out.write_all(&self.raw_body)?;
        Ok(out)
    }
}

/// Re-wraps a received (or reassembled) message body in its RFC 6347
/// handshake header, exactly as it crossed the wire, for transcript
/// inclusion. Unlike `HandshakeMessage::encode_unfragmented`, this never
/// re-encodes the body — it trusts `raw_body` byte-for-byte, since a
/// parse-then-re-encode round trip is only guaranteed faithful for types
/// this client actually encodes (see `HandshakeBody::encode`).
pub fn encode_received(msg_type: HandshakeType, message_seq: u16, raw_body: &[u8]) -> Vec<u8> {
    let len = raw_body.len() as u32;
    let mut out = Vec::with_capacity(12 + raw_body.len());
    out.push(msg_type.to_u8());
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
    out.extend_from_slice(&message_seq.to_be_bytes());
    out.extend_from_slice(&[0, 0, 0]);
    out.push((len >> 16) as u8);
    out.push((len >> 8) as u8);
    out.push(len as u8);
    out.extend_from_slice(raw_body);
    out
}

/// The parsed RFC 6347 §4.2.2 header of one (possibly fragmented)
/// handshake message as it appears in a single record fragment.
#[derive(Debug, Clone, Copy)]
pub struct FragmentHeader {
    pub msg_type: HandshakeType,
    pub length: u32,
    pub message_seq: u16,
    pub fragment_offset: u32,
    pub fragment_length: u32,
}

/// Splits one record fragment into its handshake header and body bytes.
/// Returns an error for record payloads carrying an unrecognized handshake
/// type, or any other malformed envelope.
pub fn read_fragment(bytes: &[u8]) -> Result<(FragmentHeader, &[u8]), Error> {
    let mut r = Cursor::new(bytes);
    let msg_type_byte = r.read_u8()?;
    let msg_type = HandshakeType::from_u8(msg_type_byte)
        .ok_or_else(|| Error::MalformedMessage(format!("unrecognized handshake type {}", msg_type_byte)))?;
    let length = read_u24(&mut r)?;
    let message_seq = r.read_u16::<BigEndian>()?;
    let fragment_offset = read_u24(&mut r)?;
    let fragment_length = read_u24(&mut r)?;

    let header = FragmentHeader {
        msg_type,
        length,
        message_seq,
        fragment_offset,
        fragment_length,
    };

    let body_start = r.position() as usize;
    let body_end = body_start
        .checked_add(fragment_length as usize)
        .ok_or_else(|| Error::MalformedMessage("fragment_length overflow".to_string()))?;
    let body = bytes
        .get(body_start..body_end)
        .ok_or_else(|| Error::MalformedMessage("fragment body shorter than fragment_length".to_string()))?;

    Ok((header, body))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_client_hello(cookie: Vec<u8>) -> ClientHello {
        ClientHello {
            client_version: (254, 253),
            random: [9u8; 32],
            session_id: vec![1, 2, 3],
            cookie,
            cipher_suites: vec![0xC0AE, 0xC0A8],
            compression_methods: vec![0],
            extensions: vec![Extension::certificate_type(EXT_CLIENT_CERTIFICATE_TYPE, &[CertificateType::RawPublicKey])],
        }
    }

    #[test]
    fn client_hello_round_trips() {
        let hello = sample_client_hello(Vec::new());
        let encoded = hello.encode().unwrap();
        let decoded = ClientHello::decode(&encoded).unwrap();

        assert_eq!(decoded.client_version, hello.client_version);
        assert_eq!(decoded.random, hello.random);
        assert_eq!(decoded.session_id, hello.session_id);
        assert_eq!(decoded.cookie, hello.cookie);
        assert_eq!(decoded.cipher_suites, hello.cipher_suites);
        assert_eq!(decoded.compression_methods, hello.compression_methods);
        assert_eq!(decoded.extensions, hello.extensions);
    }

    #[test]
    fn cookie_insertion_only_changes_the_cookie_and_fragment_length() {
        let without_cookie = sample_client_hello(Vec::new());
        let with_cookie = ClientHello {
            cookie: vec![0xA1, 0xB2, 0xC3],
            ..without_cookie.clone()
        };

        let msg = HandshakeMessage {
            message_seq: 1,
            raw_body: with_cookie.encode().unwrap(),
            body: HandshakeBody::ClientHello(with_cookie.clone()),
        };
        let encoded = msg.encode_unfragmented().unwrap();
        let (header, fragment) = read_fragment(&encoded).unwrap();

        assert_eq!(header.fragment_length, header.length, "post-cookie message is sent unfragmented");
        let decoded = ClientHello::decode(fragment).unwrap();
        assert_eq!(decoded.cookie, vec![0xA1, 0xB2, 0xC3]);
        assert_eq!(decoded.random, without_cookie.random);
        assert_eq!(decoded.session_id, without_cookie.session_id);
        assert_eq!(decoded.cipher_suites, without_cookie.cipher_suites);
    }

    #[test]
    fn server_hello_round_trips_through_decode() {
        let mut body = Vec::new();
        body.push(254);
        body.push(253);
        body.extend_from_slice(&[7u8; 32]);
        body.push(0);
        body.extend_from_slice(&0xC0A8u16.to_be_bytes());
        body.push(0);
        body.extend_from_slice(&[0, 0]);

        let hello = ServerHello::decode(&body).unwrap();
        assert_eq!(hello.server_version, (254, 253));
        assert_eq!(hello.random, [7u8; 32]);
        assert_eq!(hello.cipher_suite, 0xC0A8);
        assert!(!hello.selects_raw_public_key());
    }

    #[test]
    fn server_hello_decodes_with_extensions_block_omitted_entirely() {
        let mut body = Vec::new();
        body.push(254);
        body.push(253);
        body.extend_from_slice(&[7u8; 32]);
        body.push(0);
        body.extend_from_slice(&0xC0A8u16.to_be_bytes());
        body.push(0);
        // No trailing extensions bytes at all, as a plain PSK server sends.

        let hello = ServerHello::decode(&body).unwrap();
        assert_eq!(hello.cipher_suite, 0xC0A8);
        assert!(hello.extensions.is_empty());
        assert!(!hello.selects_raw_public_key());
    }

    #[test]
    fn fragment_header_rejects_unrecognized_handshake_type() {
        let bytes = [255, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0];
        assert!(read_fragment(&bytes).is_err());
    }
}
