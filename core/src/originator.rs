// Originator — picks a chain, seals the envelope, hands it to hop one

use std::collections::HashMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::info;

use crate::config::NetConfig;
use crate::crypto::PublicKey;
use crate::directory::{Directory, DirectoryError, RouterDescriptor};
use crate::onion::{self, BuildError};
use crate::wire::{write_frame, Frame, FrameError, FrameType};

#[derive(Debug, Error)]
pub enum SendError {
    /// Fewer registered routers than the requested chain length. Never
    /// silently shortened.
    #[error("insufficient routers: {available} registered, {required} required")]
    InsufficientRouters { available: usize, required: usize },
    #[error("directory failure: {0}")]
    Directory(#[from] DirectoryError),
    #[error("envelope construction failed: {0}")]
    Build(#[from] BuildError),
    #[error("first hop '{0}' unreachable: {1}")]
    FirstHopUnreachable(String, String),
    #[error("first hop timed out")]
    Timeout,
    #[error("frame exchange failed: {0}")]
    Frame(#[from] FrameError),
}

/// Builds and launches onion envelopes. Stateless between sends: every
/// message gets a fresh router list and a fresh chain.
pub struct Originator {
    directory: Arc<dyn Directory>,
    net: NetConfig,
}

impl Originator {
    pub fn new(directory: Arc<dyn Directory>, net: NetConfig) -> Self {
        Self { directory, net }
    }

    /// Seal `message` for `destination` and write it to the first hop.
    ///
    /// Success means exactly that the first hop accepted the frame.
    /// There is no end-to-end delivery confirmation; any relayed reply
    /// is ignored.
    pub async fn send(&self, message: &str, destination: &str) -> Result<(), SendError> {
        // Terminals register under their own names, so the destination
        // shows up in the listing. It must never be picked as a hop:
        // terminals only speak Delivery frames.
        let candidates: Vec<RouterDescriptor> = self
            .directory
            .list()
            .await?
            .into_iter()
            .filter(|d| d.name != destination)
            .collect();
        let selected = self.select_chain(candidates)?;

        let chain: Vec<String> = selected.iter().map(|d| d.name.clone()).collect();
        let keys: HashMap<String, PublicKey> = selected
            .iter()
            .map(|d| (d.name.clone(), d.public_key.clone()))
            .collect();
        let envelope = onion::build(message, destination, &chain, &keys)?;

        let first = &selected[0];
        info!(first_hop = %first.name, hops = chain.len(), "launching onion envelope");

        let io_timeout = self.net.io_timeout();
        let mut stream = timeout(io_timeout, TcpStream::connect(first.endpoint()))
            .await
            .map_err(|_| SendError::Timeout)?
            .map_err(|e| SendError::FirstHopUnreachable(first.name.clone(), e.to_string()))?;

        let frame = Frame::new(FrameType::Envelope, envelope.to_wire());
        timeout(io_timeout, write_frame(&mut stream, &frame))
            .await
            .map_err(|_| SendError::Timeout)??;
        Ok(())
    }

    /// Uniform sample without replacement. The shuffled prefix is the
    /// chain, in hop order.
    fn select_chain(
        &self,
        mut routers: Vec<RouterDescriptor>,
    ) -> Result<Vec<RouterDescriptor>, SendError> {
        let required = self.net.hops;
        if routers.len() < required {
            return Err(SendError::InsufficientRouters {
                available: routers.len(),
                required,
            });
        }
        routers.shuffle(&mut rand::thread_rng());
        routers.truncate(required);
        Ok(routers)
    }
}

// ============================================================================
// TESTS
// ============================================================================
