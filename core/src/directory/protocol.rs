// Directory wire protocol
//
// Plaintext commands inside DirectoryRequest frames:
//   "GET_ROUTERS"              -> JSON array of descriptors
//   "REGISTER_ROUTER <json>"   -> "OK" or an error string
//
// The command itself is not a secret; only onion payloads are encrypted.

use super::{DirectoryError, RouterDescriptor};

pub const GET_ROUTERS: &str = "GET_ROUTERS";
pub const REGISTER_ROUTER: &str = "REGISTER_ROUTER";
pub const REGISTER_OK: &str = "OK";

/// Parsed directory command.
#[derive(Debug, Clone, PartialEq)]
pub enum DirectoryRequest {
    ListRouters,
    Register(RouterDescriptor),
}

impl DirectoryRequest {
    pub fn encode(&self) -> Result<String, DirectoryError> {
        match self {
            DirectoryRequest::ListRouters => Ok(GET_ROUTERS.to_string()),
            DirectoryRequest::Register(descriptor) => {
                let json = serde_json::to_string(descriptor)
                    .map_err(|e| DirectoryError::Protocol(e.to_string()))?;
                Ok(format!("{REGISTER_ROUTER} {json}"))
            }
        }
    }

    pub fn parse(text: &str) -> Result<Self, DirectoryError> {
        if text == GET_ROUTERS {
            return Ok(DirectoryRequest::ListRouters);
        }
        if let Some(json) = text.strip_prefix(REGISTER_ROUTER) {
            let descriptor = serde_json::from_str(json.trim_start())
                .map_err(|e| DirectoryError::Protocol(e.to_string()))?;
            return Ok(DirectoryRequest::Register(descriptor));
        }
        Err(DirectoryError::Protocol(format!(
            "unknown command: {text:?}"
        )))
    }
}

pub fn encode_router_list(routers: &[RouterDescriptor]) -> Result<String, DirectoryError> {
    serde_json::to_string(routers).map_err(|e| DirectoryError::Protocol(e.to_string()))
}

pub fn parse_router_list(text: &str) -> Result<Vec<RouterDescriptor>, DirectoryError> {
    serde_json::from_str(text).map_err(|e| DirectoryError::Protocol(e.to_string()))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::KeyPair;

    fn descriptor(name: &str) -> RouterDescriptor {
        let pair = KeyPair::generate(32).unwrap();
        RouterDescriptor {
            name: name.to_string(),
            ip: "127.0.0.1".to_string(),
            port: 4321,
            public_key: pair.public,
        }
    }

    #[test]
    fn test_list_command_roundtrip() {
        let encoded = DirectoryRequest::ListRouters.encode().unwrap();
        assert_eq!(encoded, "GET_ROUTERS");
        assert_eq!(
            DirectoryRequest::parse(&encoded).unwrap(),
            DirectoryRequest::ListRouters
        );
    }

    #[test]
    fn test_register_command_roundtrip() {
        let original = DirectoryRequest::Register(descriptor("r1"));
        let encoded = original.encode().unwrap();
        assert!(encoded.starts_with("REGISTER_ROUTER {"));
        assert_eq!(DirectoryRequest::parse(&encoded).unwrap(), original);
    }

    #[test]
    fn test_unknown_command_rejected() {
        let result = DirectoryRequest::parse("DELETE_EVERYTHING");
        assert!(matches!(result, Err(DirectoryError::Protocol(_))));
    }

    #[test]
    fn test_register_with_broken_json_rejected() {
        let result = DirectoryRequest::parse("REGISTER_ROUTER {not json");
        assert!(matches!(result, Err(DirectoryError::Protocol(_))));
    }

    #[test]
    fn test_router_list_roundtrip_preserves_keys() {
        let routers = vec![descriptor("r1"), descriptor("r2")];
        let json = encode_router_list(&routers).unwrap();
        let restored = parse_router_list(&json).unwrap();
        assert_eq!(restored, routers);
    }

    #[test]
    fn test_empty_router_list() {
        let json = encode_router_list(&[]).unwrap();
        assert_eq!(json, "[]");
        assert!(parse_router_list(&json).unwrap().is_empty());
    }
}
