// TCP directory client — the deployed Directory implementation

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::protocol::{parse_router_list, DirectoryRequest, REGISTER_OK};
use super::{Directory, DirectoryError, RouterDescriptor};
use crate::config::NetConfig;
use crate::wire::{read_frame, write_frame, Frame, FrameType};

/// Talks to a [`super::DirectoryServer`] with one framed exchange per
/// call. Every connect, write, and read is bounded by the configured
/// timeout.
#[derive(Debug, Clone)]
pub struct DirectoryClient {
    address: String,
    io_timeout: Duration,
}

impl DirectoryClient {
    pub fn new(address: impl Into<String>, config: &NetConfig) -> Self {
        Self {
            address: address.into(),
            io_timeout: config.io_timeout(),
        }
    }

    async fn exchange(&self, request: DirectoryRequest) -> Result<String, DirectoryError> {
        let command = request.encode()?;

        let mut stream = timeout(self.io_timeout, TcpStream::connect(&self.address))
            .await
            .map_err(|_| DirectoryError::Timeout)?
            .map_err(|e| DirectoryError::Connection(e.to_string()))?;

        let frame = Frame::new(FrameType::DirectoryRequest, command);
        timeout(self.io_timeout, write_frame(&mut stream, &frame))
            .await
            .map_err(|_| DirectoryError::Timeout)?
            .map_err(|e| DirectoryError::Connection(e.to_string()))?;

        let reply = timeout(self.io_timeout, read_frame(&mut stream))
            .await
            .map_err(|_| DirectoryError::Timeout)?
            .map_err(|e| DirectoryError::Connection(e.to_string()))?;

        match reply.frame_type {
            FrameType::DirectoryResponse => Ok(reply.payload_str().into_owned()),
            other => Err(DirectoryError::Protocol(format!(
                "unexpected reply frame: {other:?}"
            ))),
        }
    }
}

#[async_trait]
impl Directory for DirectoryClient {
    async fn register(&self, descriptor: RouterDescriptor) -> Result<(), DirectoryError> {
        let response = self.exchange(DirectoryRequest::Register(descriptor)).await?;
        if response == REGISTER_OK {
            Ok(())
        } else {
            Err(DirectoryError::Rejected(response))
        }
    }

    async fn list(&self) -> Result<Vec<RouterDescriptor>, DirectoryError> {
        let response = self.exchange(DirectoryRequest::ListRouters).await?;
        parse_router_list(&response)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;
    use crate::directory::DirectoryServer;
    use tokio::net::TcpListener;

    fn descriptor(name: &str, port: u16) -> RouterDescriptor {
        let pair = KeyPair::generate(32).unwrap();
        RouterDescriptor {
            name: name.to_string(),
            ip: "127.0.0.1".to_string(),
            port,
            public_key: pair.public,
        }
    }

    async fn spawn_server() -> DirectoryClient {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let config = NetConfig::default();
        let server = DirectoryServer::new(config.clone());
        tokio::spawn(server.run(listener));
        DirectoryClient::new(address, &config)
    }

    #[tokio::test]
    async fn test_register_and_list_over_tcp() {
        let client = spawn_server().await;

        assert!(client.list().await.unwrap().is_empty());

        client.register(descriptor("r1", 1000)).await.unwrap();
        client.register(descriptor("r2", 2000)).await.unwrap();

        let mut names: Vec<_> = client
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        names.sort();
        assert_eq!(names, vec!["r1", "r2"]);
    }

    #[tokio::test]
    async fn test_reregistration_over_tcp_is_idempotent() {
        let client = spawn_server().await;

        client.register(descriptor("r1", 1000)).await.unwrap();
        client.register(descriptor("r1", 2000)).await.unwrap();

        let routers = client.list().await.unwrap();
        assert_eq!(routers.len(), 1);
        assert_eq!(routers[0].port, 2000);
    }

    #[tokio::test]
    async fn test_lookup_over_tcp() {
        let client = spawn_server().await;
        client.register(descriptor("r1", 1000)).await.unwrap();

        let found = client.lookup("r1").await.unwrap();
        assert_eq!(found.unwrap().name, "r1");
        assert!(client.lookup("ghost").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unreachable_directory_is_typed_error() {
        // Port 1 on localhost refuses connections.
        let config = NetConfig {
            io_timeout_secs: 2,
            ..NetConfig::default()
        };
        let client = DirectoryClient::new("127.0.0.1:1", &config);
        let result = client.list().await;
        assert!(matches!(
            result,
            Err(DirectoryError::Connection(_)) | Err(DirectoryError::Timeout)
        ));
    }
}
