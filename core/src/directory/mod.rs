//! Router Directory
//!
//! A single well-known service maps router names to their address and
//! public key. Relays and terminal listeners register at startup;
//! senders fetch the full list before building a chain. Registration is
//! unauthenticated by design — any caller may claim any name, and the
//! newest claim wins.

pub mod client;
pub mod protocol;
pub mod registry;
pub mod server;

pub use client::DirectoryClient;
pub use protocol::{DirectoryRequest, GET_ROUTERS, REGISTER_OK, REGISTER_ROUTER};
pub use registry::RouterRegistry;
pub use server::DirectoryServer;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crypto::PublicKey;

/// One registered router: name, reachable address, and public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouterDescriptor {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub public_key: PublicKey,
}

impl RouterDescriptor {
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.ip, self.port)
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("directory connection failed: {0}")]
    Connection(String),
    #[error("directory exchange timed out")]
    Timeout,
    #[error("malformed directory message: {0}")]
    Protocol(String),
    #[error("registration rejected: {0}")]
    Rejected(String),
}

/// The directory contract. Every component that needs name resolution
/// takes this trait, so tests run against the in-memory
/// [`RouterRegistry`] and deployments against the TCP
/// [`DirectoryClient`].
#[async_trait]
pub trait Directory: Send + Sync {
    /// Idempotent upsert keyed by name; the newest registration wins.
    async fn register(&self, descriptor: RouterDescriptor) -> Result<(), DirectoryError>;

    /// The current descriptor set, in unspecified order.
    async fn list(&self) -> Result<Vec<RouterDescriptor>, DirectoryError>;

    /// Resolve one name through a fresh list.
    async fn lookup(&self, name: &str) -> Result<Option<RouterDescriptor>, DirectoryError> {
        Ok(self.list().await?.into_iter().find(|d| d.name == name))
    }
}
