//! # Network Configuration
//!
//! Runtime knobs for the login and realm listeners.
//!
//! # Example
//!
//! ```rust
//! use nexus_network::NetworkConfig;
//!
//! let config = NetworkConfig {
//!     sts_address: "127.0.0.1:6600".parse().unwrap(),
//!     max_connections: 200,
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use nexus_config::ServerConfig;
use nexus_crypto::DEFAULT_BUILD_KEY;
use nexus_protocol::framing::{DEFAULT_MAX_FRAME_LEN, MIN_FRAME_LEN};
use nexus_protocol::sts::DEFAULT_MAX_REQUEST_LEN;
use std::net::SocketAddr;

/// Networking options shared by every connection task
///
/// # Default Values
///
/// - Login (STS) listener on port 6600, realm listener on port 23115
/// - 1000 max connections across both listeners
/// - 8 KiB read buffer, 128 KiB frames, 64 KiB text requests
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Address the text handshake listener binds to
    pub sts_address: SocketAddr,

    /// Address the binary realm listener binds to
    pub realm_address: SocketAddr,

    /// Maximum number of concurrent connections allowed
    ///
    /// # Purpose
    /// Prevents resource exhaustion. Connections beyond the limit are closed
    /// right after accept.
    pub max_connections: usize,

    /// Size of the per-read buffer for each connection
    pub read_buffer_size: usize,

    /// Largest binary frame accepted or sent, length prefix included
    pub max_frame_size: usize,

    /// Largest text request (head plus body)
    pub max_request_size: usize,

    /// Pre-login cipher constant for the realm tier
    pub build_key: u64,

    /// Client build the realm accepts
    pub client_build: u32,

    /// Realm name sent in the realm accept message
    pub realm_name: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            sts_address: SocketAddr::from(([0, 0, 0, 0], 6600)),
            realm_address: SocketAddr::from(([0, 0, 0, 0], 23115)),
            max_connections: 1000,
            read_buffer_size: 8192,
            max_frame_size: DEFAULT_MAX_FRAME_LEN,
            max_request_size: DEFAULT_MAX_REQUEST_LEN,
            build_key: DEFAULT_BUILD_KEY,
            client_build: 16042,
            realm_name: "Nexus".to_string(),
        }
    }
}

impl NetworkConfig {
    /// Derive networking options from `serveroptions.txt`
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            sts_address: config.sts_address(),
            realm_address: config.realm_address(),
            max_connections: config.max_players,
            max_frame_size: config.max_frame_size,
            build_key: config.build_key.unwrap_or(DEFAULT_BUILD_KEY),
            client_build: config.build,
            realm_name: config.realm_name.clone(),
            ..Self::default()
        }
    }

    /// Validate the configuration
    ///
    /// # Returns
    /// `Ok(())` if configuration is valid, `Err(String)` otherwise
    ///
    /// # Checks
    /// - `max_connections` must be > 0
    /// - `read_buffer_size` must be >= 1024
    /// - `max_frame_size` must hold at least an empty packet and fit the u32 prefix
    /// - `max_request_size` must be >= 1024
    /// - `build_key` must not be zero
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections == 0 {
            return Err("max_connections must be > 0".to_string());
        }

        if self.read_buffer_size < 1024 {
            return Err("read_buffer_size must be >= 1024".to_string());
        }

        if self.max_frame_size < MIN_FRAME_LEN || self.max_frame_size > u32::MAX as usize {
            return Err(format!(
                "max_frame_size must be between {} and {}",
                MIN_FRAME_LEN,
                u32::MAX
            ));
        }

        if self.max_request_size < 1024 {
            return Err("max_request_size must be >= 1024".to_string());
        }

        if self.build_key == 0 {
            return Err("build_key must not be zero".to_string());
        }

        if self.sts_address.port() != 0 && self.sts_address == self.realm_address {
            return Err("sts_address and realm_address must differ".to_string());
        }

        if !self.read_buffer_size.is_power_of_two() {
            tracing::warn!("read_buffer_size is not a power of 2, this may reduce performance");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NetworkConfig::default();
        assert_eq!(config.sts_address.port(), 6600);
        assert_eq!(config.realm_address.port(), 23115);
        assert_eq!(config.max_connections, 1000);
        assert_eq!(config.build_key, DEFAULT_BUILD_KEY);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_max_connections() {
        let config = NetworkConfig {
            max_connections: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_frame_size() {
        let config = NetworkConfig {
            max_frame_size: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_address_twice() {
        let config = NetworkConfig {
            realm_address: SocketAddr::from(([0, 0, 0, 0], 6600)),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_server_config() {
        let server = ServerConfig::parse("stsport = 7000\nbuildkey = 1234\nrealmname = Olyssia\n");
        let config = NetworkConfig::from_server_config(&server);
        assert_eq!(config.sts_address.port(), 7000);
        assert_eq!(config.build_key, 0x1234);
        assert_eq!(config.realm_name, "Olyssia");
        assert_eq!(config.client_build, 16042);
    }
}
