//! Relay Node
//!
//! A relay owns one keypair, one listening socket, and no routing state.
//! It peels exactly one layer off each inbound envelope and either
//! forwards the remainder to the next hop or hands the plaintext to its
//! destination. No relay ever sees more than its own layer.

mod node;

pub use node::{Relay, RelayConfig, RelayError};
