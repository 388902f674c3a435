// Directory TCP service — one framed request per connection

use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, info};

use super::protocol::{encode_router_list, DirectoryRequest, REGISTER_OK};
use super::registry::RouterRegistry;
use crate::config::NetConfig;
use crate::wire::{read_frame, write_frame, Frame, FrameError, FrameType};

/// Serves the router directory over framed TCP. Each connection carries
/// exactly one request and one response; a connection that fails never
/// touches the accept loop.
pub struct DirectoryServer {
    registry: Arc<RouterRegistry>,
    config: NetConfig,
}

impl DirectoryServer {
    pub fn new(config: NetConfig) -> Self {
        Self::with_registry(Arc::new(RouterRegistry::new()), config)
    }

    pub fn with_registry(registry: Arc<RouterRegistry>, config: NetConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> Arc<RouterRegistry> {
        Arc::clone(&self.registry)
    }

    /// Accept loop over an already-bound listener. Runs until the
    /// listener itself fails.
    pub async fn run(self, listener: TcpListener) -> std::io::Result<()> {
        info!(addr = %listener.local_addr()?, "directory service listening");
        loop {
            let (stream, peer) = listener.accept().await?;
            let registry = Arc::clone(&self.registry);
            let io_timeout = self.config.io_timeout();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, &registry, io_timeout).await {
                    debug!(%peer, error = %e, "directory connection failed");
                }
            });
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    registry: &RouterRegistry,
    io_timeout: Duration,
) -> Result<(), FrameError> {
    let frame = match timeout(io_timeout, read_frame(&mut stream)).await {
        Ok(result) => result?,
        // Slow or silent peer; drop without a response.
        Err(_) => return Ok(()),
    };

    if frame.frame_type != FrameType::DirectoryRequest {
        let reply = Frame::new(FrameType::Error, "expected a directory request");
        return write_frame(&mut stream, &reply).await;
    }

    let response = process_request(&frame.payload_str(), registry);
    let reply = Frame::new(FrameType::DirectoryResponse, response);
    match timeout(io_timeout, write_frame(&mut stream, &reply)).await {
        Ok(result) => result,
        Err(_) => Ok(()),
    }
}

/// Map one command string to one response string. Parse failures become
/// error strings, never dropped connections.
fn process_request(text: &str, registry: &RouterRegistry) -> String {
    match DirectoryRequest::parse(text) {
        Ok(DirectoryRequest::ListRouters) => match encode_router_list(&registry.routers()) {
            Ok(json) => json,
            Err(e) => format!("ERROR: {e}"),
        },
        Ok(DirectoryRequest::Register(descriptor)) => {
            info!(router = %descriptor.name, endpoint = %descriptor.endpoint(), "router registered");
            registry.upsert(descriptor);
            REGISTER_OK.to_string()
        }
        Err(e) => format!("ERROR: {e}"),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::directory::protocol::parse_router_list;
    use crate::directory::RouterDescriptor;

    fn descriptor(name: &str, port: u16) -> RouterDescriptor {
        let pair = KeyPair::generate(32).unwrap();
        RouterDescriptor {
            name: name.to_string(),
            ip: "127.0.0.1".to_string(),
            port,
            public_key: pair.public,
        }
    }

    #[test]
    fn test_process_get_routers_empty() {
        let registry = RouterRegistry::new();
        assert_eq!(process_request("GET_ROUTERS", &registry), "[]");
    }

    #[test]
    fn test_process_register_then_get() {
        let registry = RouterRegistry::new();
        let request = DirectoryRequest::Register(descriptor("r1", 4000))
            .encode()
            .unwrap();
        assert_eq!(process_request(&request, &registry), "OK");

        let listed = parse_router_list(&process_request("GET_ROUTERS", &registry)).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "r1");
    }

    #[test]
    fn test_process_unknown_command_is_error_string() {
        let registry = RouterRegistry::new();
        let response = process_request("FORMAT_DISK", &registry);
        assert!(response.starts_with("ERROR:"));
        // The registry is untouched.
        assert!(registry.is_empty());
    }
}
