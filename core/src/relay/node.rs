// Relay state machine: accept, peel, forward or deliver

use std::sync::Arc;

use thiserror::Error;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::config::NetConfig;
use crate::crypto::{KeyError, KeyPair};
use crate::directory::{Directory, DirectoryError, RouterDescriptor};
use crate::onion::{self, DecodeError, Envelope, Peeled};
use crate::wire::{read_frame, write_frame, Frame, FrameError, FrameType};

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Advertised name — the directory upsert key.
    pub name: String,
    /// Advertised address for inbound envelopes.
    pub ip: String,
    pub port: u16,
    pub net: NetConfig,
}

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("envelope rejected: {0}")]
    Decode(#[from] DecodeError),
    #[error("next hop '{0}' is not in the directory")]
    UnknownHop(String),
    #[error("hop '{0}' unreachable: {1}")]
    Unreachable(String, String),
    #[error("directory failure: {0}")]
    Directory(#[from] DirectoryError),
    #[error("terminal plaintext has no destination prefix")]
    MissingDestination,
    #[error("frame exchange failed: {0}")]
    Frame(#[from] FrameError),
    #[error("peer timed out")]
    Timeout,
    #[error("expected an envelope frame")]
    UnexpectedFrame,
}

/// One relay node. Keys are generated at construction and live only in
/// memory; a restarted relay is a new cryptographic identity that must
/// re-register.
pub struct Relay {
    config: RelayConfig,
    keys: KeyPair,
    directory: Arc<dyn Directory>,
}

impl Relay {
    pub fn new(config: RelayConfig, directory: Arc<dyn Directory>) -> Result<Self, KeyError> {
        let keys = KeyPair::generate(config.net.prime_bits)?;
        Ok(Self {
            config,
            keys,
            directory,
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn descriptor(&self) -> RouterDescriptor {
        RouterDescriptor {
            name: self.config.name.clone(),
            ip: self.config.ip.clone(),
            port: self.config.port,
            public_key: self.keys.public.clone(),
        }
    }

    /// Announce this relay to the directory. Failure is logged, not
    /// fatal: an unregistered relay is invisible to new chains but keeps
    /// serving traffic already in flight.
    pub async fn register(&self) {
        match self.directory.register(self.descriptor()).await {
            Ok(()) => info!(relay = %self.config.name, "registered with directory"),
            Err(e) => {
                warn!(relay = %self.config.name, error = %e, "directory registration failed; serving unregistered")
            }
        }
    }

    /// Accept loop over an already-bound listener. Every connection is
    /// handled on its own task; a malformed or hostile message kills
    /// that task only.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        info!(relay = %self.config.name, addr = %listener.local_addr()?, "relay listening");
        let relay = Arc::new(self);
        loop {
            let (stream, peer) = listener.accept().await?;
            let relay = Arc::clone(&relay);
            tokio::spawn(async move {
                if let Err(e) = relay.handle_connection(stream).await {
                    warn!(relay = %relay.config.name, %peer, error = %e, "message handling failed");
                }
            });
        }
    }

    async fn handle_connection(&self, mut stream: TcpStream) -> Result<(), RelayError> {
        let io_timeout = self.config.net.io_timeout();
        let frame = timeout(io_timeout, read_frame(&mut stream))
            .await
            .map_err(|_| RelayError::Timeout)??;

        if frame.frame_type != FrameType::Envelope {
            let reply = Frame::new(FrameType::Error, "expected an envelope frame");
            let _ = write_frame(&mut stream, &reply).await;
            return Err(RelayError::UnexpectedFrame);
        }

        let reply = match self.process_envelope(&frame.payload_str()).await {
            Ok(reply) => reply,
            Err(e) => {
                let _ = write_frame(&mut stream, &Frame::new(FrameType::Error, e.to_string())).await;
                return Err(e);
            }
        };

        // The upstream reply is best-effort; the sender may be gone.
        if let Err(e) = write_frame(&mut stream, &reply).await {
            debug!(relay = %self.config.name, error = %e, "upstream reply dropped");
        }
        Ok(())
    }

    async fn process_envelope(&self, wire: &str) -> Result<Frame, RelayError> {
        let envelope = Envelope::from_wire(wire)?;
        match onion::peel(&envelope, &self.keys.private)? {
            Peeled::Forward { next_hop, payload } => self.forward(&next_hop, &payload).await,
            Peeled::Terminal { plaintext } => self.deliver(&plaintext).await,
        }
    }

    /// Send the peeled remainder one hop on and relay the reply back.
    async fn forward(&self, next_hop: &str, payload: &Envelope) -> Result<Frame, RelayError> {
        let descriptor = self
            .directory
            .lookup(next_hop)
            .await?
            .ok_or_else(|| RelayError::UnknownHop(next_hop.to_string()))?;

        debug!(relay = %self.config.name, %next_hop, "forwarding peeled envelope");
        let frame = Frame::new(FrameType::Envelope, payload.to_wire());
        self.exchange(&descriptor, &frame).await
    }

    /// Innermost layer: resolve the destination and hand it the message.
    async fn deliver(&self, plaintext: &str) -> Result<Frame, RelayError> {
        let (destination, message) =
            onion::split_delivery(plaintext).ok_or(RelayError::MissingDestination)?;

        let descriptor = self
            .directory
            .lookup(destination)
            .await?
            .ok_or_else(|| RelayError::UnknownHop(destination.to_string()))?;

        info!(relay = %self.config.name, %destination, "delivering terminal plaintext");
        let frame = Frame::new(FrameType::Delivery, message);
        self.exchange(&descriptor, &frame).await
    }

    async fn exchange(
        &self,
        descriptor: &RouterDescriptor,
        frame: &Frame,
    ) -> Result<Frame, RelayError> {
        let io_timeout = self.config.net.io_timeout();

        let mut stream = timeout(io_timeout, TcpStream::connect(descriptor.endpoint()))
            .await
            .map_err(|_| RelayError::Timeout)?
            .map_err(|e| RelayError::Unreachable(descriptor.name.clone(), e.to_string()))?;

        timeout(io_timeout, write_frame(&mut stream, frame))
            .await
            .map_err(|_| RelayError::Timeout)??;

        let reply = timeout(io_timeout, read_frame(&mut stream))
            .await
            .map_err(|_| RelayError::Timeout)??;
        Ok(reply)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::RouterRegistry;
    use crate::terminal::DELIVERY_ACK;
    use std::collections::HashMap;

    const TEST_PRIME_BITS: u64 = 32;

    fn test_net() -> NetConfig {
        NetConfig {
            hops: 3,
            prime_bits: TEST_PRIME_BITS,
            io_timeout_secs: 5,
        }
    }

    async fn spawn_relay(name: &str, registry: &Arc<RouterRegistry>) -> Relay {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let relay = Relay::new(
            RelayConfig {
                name: name.to_string(),
                ip: "127.0.0.1".to_string(),
                port,
                net: test_net(),
            },
            Arc::clone(registry) as Arc<dyn Directory>,
        )
        .unwrap();
        relay.register().await;

        // A second relay handle serves while the first drives the test.
        let server = Relay {
            config: relay.config.clone(),
            keys: relay.keys.clone(),
            directory: Arc::clone(&relay.directory),
        };
        tokio::spawn(server.serve(listener));
        relay
    }

    /// Minimal destination endpoint: accepts one Delivery, acks it.
    async fn spawn_sink(name: &str, registry: &Arc<RouterRegistry>) -> tokio::sync::mpsc::UnboundedReceiver<String> {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let pair = KeyPair::generate(TEST_PRIME_BITS).unwrap();
        registry.upsert(RouterDescriptor {
            name: name.to_string(),
            ip: addr.ip().to_string(),
            port: addr.port(),
            public_key: pair.public,
        });
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        tokio::spawn(async move {
            loop {
                let (mut stream, _) = listener.accept().await.unwrap();
                let frame = read_frame(&mut stream).await.unwrap();
                assert_eq!(frame.frame_type, FrameType::Delivery);
                tx.send(frame.payload_str().into_owned()).unwrap();
                write_frame(&mut stream, &Frame::new(FrameType::Ack, DELIVERY_ACK))
                    .await
                    .unwrap();
            }
        });
        rx
    }

    #[tokio::test]
    async fn test_single_hop_delivery() {
        let registry = Arc::new(RouterRegistry::new());
        let relay = spawn_relay("r1", &registry).await;
        let mut delivered = spawn_sink("bob", &registry).await;

        let keys: HashMap<_, _> = registry
            .routers()
            .into_iter()
            .map(|d| (d.name.clone(), d.public_key))
            .collect();
        let envelope =
            onion::build("hi bob", "bob", &["r1".to_string()], &keys).unwrap();

        let mut stream = TcpStream::connect(relay.descriptor().endpoint())
            .await
            .unwrap();
        write_frame(
            &mut stream,
            &Frame::new(FrameType::Envelope, envelope.to_wire()),
        )
        .await
        .unwrap();

        let reply = read_frame(&mut stream).await.unwrap();
        assert_eq!(reply.frame_type, FrameType::Ack);
        assert_eq!(reply.payload_str(), DELIVERY_ACK);
        assert_eq!(delivered.recv().await.unwrap(), "hi bob");
    }

    #[tokio::test]
    async fn test_malformed_envelope_keeps_relay_serving() {
        let registry = Arc::new(RouterRegistry::new());
        let relay = spawn_relay("r1", &registry).await;
        let endpoint = relay.descriptor().endpoint();

        // First connection: garbage wire form, expect a typed rejection.
        let mut stream = TcpStream::connect(&endpoint).await.unwrap();
        write_frame(
            &mut stream,
            &Frame::new(FrameType::Envelope, "12,banana,7"),
        )
        .await
        .unwrap();
        let reply = read_frame(&mut stream).await.unwrap();
        assert_eq!(reply.frame_type, FrameType::Error);

        // Second connection: the accept loop is still alive.
        let mut stream = TcpStream::connect(&endpoint).await.unwrap();
        write_frame(&mut stream, &Frame::new(FrameType::Envelope, "nonsense"))
            .await
            .unwrap();
        let reply = read_frame(&mut stream).await.unwrap();
        assert_eq!(reply.frame_type, FrameType::Error);
    }

    #[tokio::test]
    async fn test_unknown_next_hop_reports_error() {
        let registry = Arc::new(RouterRegistry::new());
        let relay = spawn_relay("r1", &registry).await;

        // Envelope whose peeled layer names a hop nobody registered.
        let keys: HashMap<_, _> = [("r1".to_string(), relay.descriptor().public_key)]
            .into_iter()
            .collect();
        let envelope = onion::build("A", "ghost", &["r1".to_string()], &keys).unwrap();

        let mut stream = TcpStream::connect(relay.descriptor().endpoint())
            .await
            .unwrap();
        write_frame(
            &mut stream,
            &Frame::new(FrameType::Envelope, envelope.to_wire()),
        )
        .await
        .unwrap();
        let reply = read_frame(&mut stream).await.unwrap();
        assert_eq!(reply.frame_type, FrameType::Error);
        assert!(reply.payload_str().contains("ghost"));
    }

    #[tokio::test]
    async fn test_non_envelope_frame_rejected() {
        let registry = Arc::new(RouterRegistry::new());
        let relay = spawn_relay("r1", &registry).await;

        let mut stream = TcpStream::connect(relay.descriptor().endpoint())
            .await
            .unwrap();
        write_frame(&mut stream, &Frame::new(FrameType::Ack, "RECEIVED"))
            .await
            .unwrap();
        let reply = read_frame(&mut stream).await.unwrap();
        assert_eq!(reply.frame_type, FrameType::Error);
    }
}
