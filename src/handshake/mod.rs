//! The handshake core: message codecs, transcript, reassembly, key
//! exchange strategies, flight assembly, and the client driver proper.

pub mod client;
pub mod codec;
pub mod flight;
pub mod message;
pub mod reassembly;
pub mod strategy;
pub mod transcript;
