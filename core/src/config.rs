// Runtime knobs shared by every node type

use std::time::Duration;

use crate::crypto::DEFAULT_PRIME_BITS;

/// Network-wide settings for relays, terminals, and senders.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// Relay chain length for outbound messages
    pub hops: usize,
    /// Prime size in bits for generated keypairs; the modulus is twice this
    pub prime_bits: u64,
    /// Timeout in seconds applied to every connect, read, and directory
    /// exchange. No network wait is ever unbounded.
    pub io_timeout_secs: u64,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            hops: 3,
            prime_bits: DEFAULT_PRIME_BITS,
            io_timeout_secs: 10,
        }
    }
}

impl NetConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_secs(self.io_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetConfig::default();
        assert_eq!(config.hops, 3);
        assert_eq!(config.io_timeout(), Duration::from_secs(10));
    }
}
