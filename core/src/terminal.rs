// Terminal endpoint — a named destination outside the relay chain

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::config::NetConfig;
use crate::crypto::{KeyError, KeyPair};
use crate::directory::{Directory, RouterDescriptor};
use crate::wire::{read_frame, write_frame, Frame, FrameError, FrameType};

/// Fixed acknowledgement returned for every accepted delivery. Senders
/// and relays never inspect its content.
pub const DELIVERY_ACK: &str = "RECEIVED";

#[derive(Debug, Clone)]
pub struct TerminalConfig {
    /// Name senders address messages to — the directory upsert key.
    pub name: String,
    /// Advertised address for inbound deliveries.
    pub ip: String,
    pub port: u16,
    pub net: NetConfig,
}

/// Listens for terminal plaintext from the last relay in a chain.
///
/// A terminal registers in the directory exactly like a relay, so the
/// last hop resolves it with the same lookup it uses for forwarding.
/// It generates a keypair at startup like every other node, which also
/// lets the same name serve as a relay target in future chains.
pub struct Terminal {
    config: TerminalConfig,
    keys: KeyPair,
    directory: Arc<dyn Directory>,
    delivered: mpsc::UnboundedSender<String>,
}

impl Terminal {
    /// Returns the terminal and the receiving end of its delivery
    /// stream: one `String` per accepted message, in arrival order.
    pub fn new(
        config: TerminalConfig,
        directory: Arc<dyn Directory>,
    ) -> Result<(Self, mpsc::UnboundedReceiver<String>), KeyError> {
        let keys = KeyPair::generate(config.net.prime_bits)?;
        let (tx, rx) = mpsc::unbounded_channel();
        let terminal = Self {
            config,
            keys,
            directory,
            delivered: tx,
        };
        Ok((terminal, rx))
    }

    pub fn descriptor(&self) -> RouterDescriptor {
        RouterDescriptor {
            name: self.config.name.clone(),
            ip: self.config.ip.clone(),
            port: self.config.port,
            public_key: self.keys.public.clone(),
        }
    }

    /// Announce this name to the directory. An unregistered terminal is
    /// unreachable, but the listener still runs; registration can win on
    /// a later upsert from a retry or restart.
    pub async fn register(&self) {
        match self.directory.register(self.descriptor()).await {
            Ok(()) => info!(terminal = %self.config.name, "registered with directory"),
            Err(e) => {
                warn!(terminal = %self.config.name, error = %e, "directory registration failed; unreachable until re-registered")
            }
        }
    }

    /// Accept loop over an already-bound listener.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        info!(terminal = %self.config.name, addr = %listener.local_addr()?, "terminal listening");
        let terminal = Arc::new(self);
        loop {
            let (stream, peer) = listener.accept().await?;
            let terminal = Arc::clone(&terminal);
            tokio::spawn(async move {
                if let Err(e) = terminal.handle_connection(stream).await {
                    warn!(terminal = %terminal.config.name, %peer, error = %e, "delivery failed");
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<(), FrameError> {
        let io_timeout = self.config.net.io_timeout();
        let frame = match timeout(io_timeout, read_frame(&mut stream)).await {
            Ok(result) => result?,
            Err(_) => return Ok(()),
        };

        if frame.frame_type != FrameType::Delivery {
            let reply = Frame::new(FrameType::Error, "expected a delivery frame");
            return write_frame(&mut stream, &reply).await;
        }

        let message = frame.payload_str().into_owned();
        info!(terminal = %self.config.name, bytes = message.len(), "message delivered");
        // Receiver gone means the owner stopped consuming; the ack still
        // goes out so the relay chain unwinds cleanly.
        let _ = self.delivered.send(message);

        write_frame(&mut stream, &Frame::new(FrameType::Ack, DELIVERY_ACK)).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
