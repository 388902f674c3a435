// Shallot Core — onion-routed message relaying
//
// "Can a reader trace one message through every layer by hand?"
//
// If the answer is no, it doesn't belong here. The cipher is textbook
// RSA applied per character, the wire forms are printable ASCII, and
// every node fits in one screen of state. Demonstration-grade anonymity,
// not protection.

pub mod config;
pub mod crypto;
pub mod directory;
pub mod onion;
pub mod originator;
pub mod relay;
pub mod terminal;
pub mod wire;

pub use config::NetConfig;
pub use crypto::{KeyError, KeyPair, PrivateKey, PublicKey};
pub use directory::{
    Directory, DirectoryClient, DirectoryError, DirectoryServer, RouterDescriptor, RouterRegistry,
};
pub use onion::{BuildError, DecodeError, Envelope, Peeled};
pub use originator::{Originator, SendError};
pub use relay::{Relay, RelayConfig, RelayError};
pub use terminal::{Terminal, TerminalConfig, DELIVERY_ACK};
pub use wire::{Frame, FrameError, FrameType};
