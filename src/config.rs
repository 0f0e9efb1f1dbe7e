//! The configuration contract: an immutable, validated
//! bundle built once via a builder that enforces invariants and is
//! thereafter shared read-only across handshakes.
//!
//! Plain structs with `pub(crate)` fields mutated through `&mut self`
//! setters rather than a generated builder macro, in the same
//! setter-then-validate shape `webrtc-rs`'s `dtls::config::Config` /
//! `validate_config` uses.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::crypto::ciphersuite::{self, CipherSuite, KeyExchangeAlgorithm, NULL_CIPHER_SENTINEL};
use crate::crypto::sig::SignatureScheme;
use crate::error::Error;
use crate::psk_store::PskStore;
use crate::trust_store::TrustStore;

pub const DEFAULT_MAX_FRAGMENT_LENGTH: usize = 1200;

/// This client's own long-term credential, used for the ECDHE_ECDSA
/// family and for RPK. `private_key` is a PKCS#8 document; `public_key` is
/// derived raw SEC1 bytes.
#[derive(Clone)]
pub struct Identity {
    pub(crate) private_key_pkcs8: Vec<u8>,
    pub(crate) public_key: Vec<u8>,
    pub(crate) cert_chain: Vec<Vec<u8>>,
    pub(crate) send_raw_key: bool,
    pub(crate) signature_scheme: SignatureScheme,
}

/// Immutable, validated handshake configuration.
/// Built once via `Builder::build`; shared and read-only thereafter.
#[derive(Clone)]
pub struct HandshakeConfig {
    pub(crate) endpoint: SocketAddr,
    pub(crate) supported_cipher_suites: Vec<&'static CipherSuite>,
    pub(crate) identity: Option<Identity>,
    pub(crate) psk_store: Option<Arc<dyn PskStore>>,
    pub(crate) trust_store: Option<Arc<dyn TrustStore>>,
    pub(crate) max_fragment_length: usize,
    pub(crate) send_raw_public_key: bool,
}

impl HandshakeConfig {
    pub fn endpoint(&self) -> SocketAddr {
        self.endpoint
    }

    pub fn supported_cipher_suites(&self) -> &[&'static CipherSuite] {
        &self.supported_cipher_suites
    }

    pub fn max_fragment_length(&self) -> usize {
        self.max_fragment_length
    }
}

/// Builds a `HandshakeConfig`, enforcing the credential/suite invariants:
/// at least one cipher suite must be satisfiable by the configured
/// credentials before `build()` succeeds.
pub struct Builder {
    endpoint: SocketAddr,
    explicit_cipher_suites: Option<Vec<&'static CipherSuite>>,
    identity: Option<Identity>,
    psk_store: Option<Arc<dyn PskStore>>,
    trust_store: Option<Arc<dyn TrustStore>>,
    max_fragment_length: usize,
}

/// Begins building a `HandshakeConfig` for a handshake with `endpoint`.
pub fn builder(endpoint: SocketAddr) -> Builder {
    Builder {
        endpoint,
        explicit_cipher_suites: None,
        identity: None,
        psk_store: None,
        trust_store: None,
        max_fragment_length: DEFAULT_MAX_FRAGMENT_LENGTH,
    }
}

impl Builder {
    /// Overrides the derived default cipher-suite list. Fails `InvalidArg`
    /// if `suites` is empty or contains the null-cipher sentinel
    ///.
    pub fn supported_cipher_suites(mut self, suites: Vec<u16>) -> Result<Self, Error> {
        if suites.is_empty() {
            return Err(Error::InvalidArg("cipher suite list must not be empty"));
        }
        if suites.contains(&NULL_CIPHER_SENTINEL) {
            return Err(Error::InvalidArg("cipher suite list must not contain the null cipher"));
        }

        let mut resolved = Vec::with_capacity(suites.len());
        for id in suites {
            match ciphersuite::by_id(id) {
                Some(cs) => resolved.push(cs),
                None => return Err(Error::InvalidArg("unrecognized cipher suite id")),
            }
        }

        self.explicit_cipher_suites = Some(resolved);
        Ok(self)
    }

    /// Sets the client's ECDSA identity for the ECDHE_ECDSA family,
    /// presenting it as a full X.509 chain. `private_key` and `public_key`
    /// must both be non-empty.
    pub fn identity(
        mut self,
        private_key_pkcs8: Vec<u8>,
        public_key: Vec<u8>,
        signature_scheme: SignatureScheme,
    ) -> Result<Self, Error> {
        if private_key_pkcs8.is_empty() || public_key.is_empty() {
            return Err(Error::InvalidArg("identity requires a non-empty private and public key"));
        }

        self.identity = Some(Identity {
            private_key_pkcs8,
            public_key,
            cert_chain: Vec::new(),
            send_raw_key: true,
            signature_scheme,
        });
        Ok(self)
    }

    /// Sets the client's ECDSA identity along with an X.509 certificate
    /// chain. `send_raw_key` selects whether the wire representation sent
    /// in a requested `Certificate` message is the RPK encoding or the
    /// chain itself.
    pub fn identity_with_chain(
        mut self,
        private_key_pkcs8: Vec<u8>,
        cert_chain: Vec<Vec<u8>>,
        send_raw_key: bool,
        signature_scheme: SignatureScheme,
    ) -> Result<Self, Error> {
        if private_key_pkcs8.is_empty() {
            return Err(Error::InvalidArg("identity requires a non-empty private key"));
        }

        let public_key = crate::crypto::sig::public_key_from_pkcs8(signature_scheme, &private_key_pkcs8)?;

        self.identity = Some(Identity {
            private_key_pkcs8,
            public_key,
            cert_chain,
            send_raw_key,
            signature_scheme,
        });
        Ok(self)
    }

    /// Enables PSK-family suites by installing a PSK lookup store.
    pub fn psk_store(mut self, store: Arc<dyn PskStore>) -> Self {
        self.psk_store = Some(store);
        self
    }

    /// Installs the trust anchors used to validate X.509 chains presented
    /// by the server.
    pub fn trust_store(mut self, store: Arc<dyn TrustStore>) -> Self {
        self.trust_store = Some(store);
        self
    }

    /// Caps the size of outbound handshake fragments.
    pub fn max_fragment_length(mut self, n: usize) -> Self {
        self.max_fragment_length = n;
        self
    }

    /// Finalizes the configuration. Fails `InvalidState` if no enabled
    /// cipher suite has matching credentials.
    pub fn build(self) -> Result<HandshakeConfig, Error> {
        let has_psk = self.psk_store.is_some();
        let has_identity = self.identity.is_some();

        let supported_cipher_suites = match self.explicit_cipher_suites {
            Some(suites) => {
                for suite in &suites {
                    let satisfiable = match suite.key_exchange {
                        KeyExchangeAlgorithm::EcDiffieHellman => has_identity,
                        KeyExchangeAlgorithm::Psk => has_psk,
                        KeyExchangeAlgorithm::Null => true,
                    };
                    if !satisfiable {
                        return Err(Error::InvalidState(
                            "an explicitly configured cipher suite has no matching credentials",
                        ));
                    }
                }
                suites
            }
            None => {
                // ECDHE preferred, then PSK.
                let mut derived = Vec::new();
                if has_identity {
                    derived.push(&ciphersuite::TLS_ECDHE_ECDSA_WITH_AES_128_CCM_8);
                }
                if has_psk {
                    derived.push(&ciphersuite::TLS_PSK_WITH_AES_128_CCM_8);
                }
                derived
            }
        };

        if supported_cipher_suites.is_empty() {
            return Err(Error::InvalidState("no enabled cipher suite has matching credentials"));
        }

        let send_raw_public_key = self.identity.as_ref().map(|id| id.send_raw_key).unwrap_or(false);

        Ok(HandshakeConfig {
            endpoint: self.endpoint,
            supported_cipher_suites,
            identity: self.identity,
            psk_store: self.psk_store,
            trust_store: self.trust_store,
            max_fragment_length: self.max_fragment_length,
            send_raw_public_key,
        })
    }
}
