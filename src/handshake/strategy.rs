//! Key-exchange strategies: three variants sharing a
//! common output — a premaster secret and a `ClientKeyExchange` payload.
//!
//! These are free functions over an owned `KeyExchangeState` value rather
//! than a trait object with a driver handle, so a strategy can never hold
//! a back-pointer into the driver that's calling it.

use std::net::SocketAddr;

use byteorder::{BigEndian, WriteBytesExt};

use crate::crypto::dh::{EphemeralKeyPair, NamedCurve};
use crate::error::Error;
use crate::handshake::message::ClientKeyExchange;
use crate::psk_store::PskStore;

/// The key-exchange-specific state accumulated between `ServerKeyExchange`
/// and `ServerHelloDone`.
pub enum KeyExchangeState {
    EcDiffieHellman {
        curve: NamedCurve,
        client_key_pair: EphemeralKeyPair,
        server_public_point: Vec<u8>,
    },
    Psk {
        identity_hint: Vec<u8>,
    },
    Null,
}

pub fn init_ecdhe(
    curve: NamedCurve,
    server_public_point: Vec<u8>,
    rng: &dyn ring::rand::SecureRandom,
) -> Result<KeyExchangeState, Error> {
    let client_key_pair = EphemeralKeyPair::new(curve, rng)?;
    Ok(KeyExchangeState::EcDiffieHellman {
        curve,
        client_key_pair,
        server_public_point,
    })
}

pub fn init_psk(identity_hint: Vec<u8>) -> KeyExchangeState {
    KeyExchangeState::Psk { identity_hint }
}

pub struct ClientKeyExchangeOutput {
    pub message: ClientKeyExchange,
    pub premaster_secret: Vec<u8>,
}

/// Produces the client's `ClientKeyExchange` payload and premaster
/// secret, dispatched on the negotiated algorithm.
pub fn produce_client_key_exchange(
    state: KeyExchangeState,
    psk_store: Option<&dyn PskStore>,
    peer: SocketAddr,
) -> Result<ClientKeyExchangeOutput, Error> {
    match state {
        KeyExchangeState::EcDiffieHellman {
            curve,
            client_key_pair,
            server_public_point,
        } => {
            let public = client_key_pair.public_key_bytes.clone();
            let premaster_secret = client_key_pair.compute_secret(curve, &server_public_point)?;
            Ok(ClientKeyExchangeOutput {
                message: ClientKeyExchange::EcDiffieHellman { public },
                premaster_secret,
            })
        }
        KeyExchangeState::Psk { .. } => {
            let store = psk_store.ok_or_else(|| Error::HandshakeFailure("PSK key exchange requires a PSK store".to_string()))?;
            let identity = store
                .get_identity(peer)
                .ok_or_else(|| Error::HandshakeFailure("PSK store has no identity for this peer".to_string()))?;
            let key = store
                .get_key(&identity)
                .ok_or_else(|| Error::HandshakeFailure("PSK store has no key for this identity".to_string()))?;

            // RFC 4279 §2: premaster_secret = uint16(len(Z)) || Z ||
            // uint16(len(psk)) || psk, where Z is all-zero of length |psk|.
            let z = vec![0u8; key.len()];
            let mut premaster_secret = Vec::with_capacity(4 + z.len() + key.len());
            premaster_secret.write_u16::<BigEndian>(z.len() as u16)?;
            premaster_secret.extend_from_slice(&z);
            premaster_secret.write_u16::<BigEndian>(key.len() as u16)?;
            premaster_secret.extend_from_slice(&key);

            Ok(ClientKeyExchangeOutput {
                message: ClientKeyExchange::Psk { identity: identity.into_bytes() },
                premaster_secret,
            })
        }
        KeyExchangeState::Null => Ok(ClientKeyExchangeOutput {
            message: ClientKeyExchange::Null,
            premaster_secret: Vec::new(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::psk_store::StaticPsk;

    fn peer() -> SocketAddr {
        "127.0.0.1:4433".parse().unwrap()
    }

    #[test]
    fn psk_premaster_secret_matches_rfc_4279() {
        let store = StaticPsk::new("client-identity", b"shared-secret".to_vec());
        let state = init_psk(b"hint".to_vec());

        let output = produce_client_key_exchange(state, Some(&store), peer()).unwrap();

        let key_len = b"shared-secret".len();
        let mut expected = Vec::new();
        expected.write_u16::<BigEndian>(key_len as u16).unwrap();
        expected.extend(std::iter::repeat(0u8).take(key_len));
        expected.write_u16::<BigEndian>(key_len as u16).unwrap();
        expected.extend_from_slice(b"shared-secret");

        assert_eq!(output.premaster_secret, expected);
        match output.message {
            ClientKeyExchange::Psk { identity } => assert_eq!(identity, b"client-identity"),
            _ => panic!("expected a PSK ClientKeyExchange"),
        }
    }

    #[test]
    fn psk_without_store_fails() {
        let state = init_psk(b"hint".to_vec());
        let result = produce_client_key_exchange(state, None, peer());
        assert!(matches!(result, Err(Error::HandshakeFailure(_))));
    }

    #[test]
    fn psk_identity_not_recognized_by_store_fails() {
        struct EmptyStore;
        impl crate::psk_store::PskStore for EmptyStore {
            fn get_identity(&self, _peer: SocketAddr) -> Option<String> {
                Some("unknown".to_string())
            }
            fn get_key(&self, _identity: &str) -> Option<Vec<u8>> {
                None
            }
        }

        let state = init_psk(b"hint".to_vec());
        let result = produce_client_key_exchange(state, Some(&EmptyStore), peer());
        assert!(matches!(result, Err(Error::HandshakeFailure(_))));
    }

    #[test]
    fn null_key_exchange_produces_empty_premaster_secret() {
        let output = produce_client_key_exchange(KeyExchangeState::Null, None, peer()).unwrap();
        assert!(output.premaster_secret.is_empty());
        assert!(matches!(output.message, ClientKeyExchange::Null));
    }
}
