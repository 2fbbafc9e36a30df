//! Nexus Configuration Management
//!
//! Loads `serveroptions.txt` for the login and realm listeners.

use nexus_core::{NexusError, Result};
use std::fs;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default location of the options file, relative to the working directory
pub const DEFAULT_CONFIG_PATH: &str = "servers/default/config/serveroptions.txt";

/// Server configuration from `serveroptions.txt`
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    /// Server name (from "name" option)
    pub name: String,
    /// Interface both listeners bind to (from "bindip" option, default: AUTO)
    pub bind_ip: String,
    /// Login (STS) port (from "stsport" option, default: 6600)
    pub sts_port: u16,
    /// Realm port (from "realmport" option, default: 23115)
    pub realm_port: u16,
    /// Maximum simultaneous connections per listener (from "maxplayers" option)
    pub max_players: usize,
    /// Client build accepted by the realm (from "build" option, default: 16042)
    pub build: u32,
    /// Pre-login cipher constant (from "buildkey" option, hex)
    ///
    /// `None` keeps the built-in constant.
    pub build_key: Option<u64>,
    /// Realm name shown to clients (from "realmname" option)
    pub realm_name: String,
    /// Account file directory (from "accountsdir" option)
    pub accounts_dir: PathBuf,
    /// Largest binary frame accepted (from "maxframesize" option)
    pub max_frame_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: "Nexus".into(),
            bind_ip: "AUTO".into(),
            sts_port: 6600,
            realm_port: 23115,
            max_players: 1000,
            build: 16042,
            build_key: None,
            realm_name: "Nexus".into(),
            accounts_dir: PathBuf::from("servers/default/accounts"),
            max_frame_size: 0x20000,
        }
    }
}

impl ServerConfig {
    /// Load configuration from an options file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| NexusError::Config(format!("cannot read {:?}: {}", path, e)))?;
        Ok(Self::parse(&content))
    }

    /// Load configuration from the default server path
    ///
    /// Directory structure:
    /// - ./nexus (executable)
    /// - ./servers/default/config/serveroptions.txt
    /// - ./servers/default/accounts/ (account files)
    pub fn load_default() -> Result<Self> {
        Self::load_from_file(DEFAULT_CONFIG_PATH)
    }

    /// Parse serveroptions.txt content
    pub fn parse(content: &str) -> Self {
        let mut config = Self::default();

        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            if let Some((key, value)) = line.split_once('=') {
                config.parse_option(&key.trim().to_lowercase(), value.trim());
            }
        }

        config
    }

    fn parse_option(&mut self, key: &str, value: &str) {
        match key {
            "name" => self.name = value.into(),
            "bindip" => self.bind_ip = value.into(),
            "stsport" => self.sts_port = parse_or(key, value, 6600),
            "realmport" => self.realm_port = parse_or(key, value, 23115),
            "maxplayers" => self.max_players = parse_or(key, value, 1000),
            "build" => self.build = parse_or(key, value, 16042),
            "buildkey" => {
                let digits = value.trim_start_matches("0x").trim_start_matches("0X");
                self.build_key = match u64::from_str_radix(digits, 16) {
                    Ok(0) | Err(_) => {
                        warn!("Ignoring invalid buildkey {:?}", value);
                        None
                    }
                    Ok(key) => Some(key),
                };
            }
            "realmname" => self.realm_name = value.into(),
            "accountsdir" => self.accounts_dir = PathBuf::from(value),
            "maxframesize" => {
                self.max_frame_size = parse_size(value).unwrap_or_else(|| {
                    warn!("Ignoring invalid maxframesize {:?}", value);
                    0x20000
                })
            }
            _ => debug!("Ignoring unknown option {}", key),
        }
    }

    /// Address the login listener binds to
    pub fn sts_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip_addr(), self.sts_port)
    }

    /// Address the realm listener binds to
    pub fn realm_address(&self) -> SocketAddr {
        SocketAddr::new(self.bind_ip_addr(), self.realm_port)
    }

    fn bind_ip_addr(&self) -> IpAddr {
        if self.bind_ip.eq_ignore_ascii_case("AUTO") {
            return IpAddr::V4(Ipv4Addr::UNSPECIFIED);
        }
        self.bind_ip.parse().unwrap_or_else(|_| {
            warn!("Invalid bindip {:?}, binding all interfaces", self.bind_ip);
            IpAddr::V4(Ipv4Addr::UNSPECIFIED)
        })
    }

    /// Display configuration summary
    pub fn display(&self) {
        tracing::info!("Server configuration:");
        tracing::info!("  Name: {}", self.name);
        tracing::info!("  Login: {}", self.sts_address());
        tracing::info!("  Realm: {} ({})", self.realm_address(), self.realm_name);
        tracing::info!("  Max Players: {}", self.max_players);
        tracing::info!("  Client Build: {}", self.build);
        tracing::info!(
            "  Build Key: {}",
            if self.build_key.is_some() { "custom" } else { "default" }
        );
        tracing::info!("  Accounts: {:?}", self.accounts_dir);
        tracing::info!("  Max Frame Size: {:#x}", self.max_frame_size);
    }
}

fn parse_or<T: std::str::FromStr>(key: &str, value: &str, default: T) -> T {
    value.parse().unwrap_or_else(|_| {
        warn!("Ignoring invalid {} {:?}", key, value);
        default
    })
}

/// Decimal or `0x` hex
fn parse_size(value: &str) -> Option<usize> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => usize::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.sts_port, 6600);
        assert_eq!(config.realm_port, 23115);
        assert_eq!(config.max_players, 1000);
        assert_eq!(config.build, 16042);
        assert_eq!(config.build_key, None);
        assert_eq!(config.max_frame_size, 0x20000);
    }

    #[test]
    fn test_parse_simple_config() {
        let config_text = r#"
# login tier
name = Test Server
stsport = 7600
realmport=24000
MaxPlayers = 50
buildkey = 0x1122334455667788
realmname = Testing Grounds
maxframesize = 4096
"#;
        let config = ServerConfig::parse(config_text);
        assert_eq!(config.name, "Test Server");
        assert_eq!(config.sts_port, 7600);
        assert_eq!(config.realm_port, 24000);
        assert_eq!(config.max_players, 50);
        assert_eq!(config.build_key, Some(0x1122_3344_5566_7788));
        assert_eq!(config.realm_name, "Testing Grounds");
        assert_eq!(config.max_frame_size, 4096);
    }

    #[test]
    fn test_bad_values_fall_back() {
        let config = ServerConfig::parse("stsport = lots\nbuildkey = 0\nmaxframesize = 0xZZ\nfoo = bar\n");
        assert_eq!(config, ServerConfig::default());
    }

    #[test]
    fn test_bind_addresses() {
        let mut config = ServerConfig::default();
        assert_eq!(config.sts_address(), "0.0.0.0:6600".parse().unwrap());

        config.bind_ip = "127.0.0.1".into();
        assert_eq!(config.realm_address(), "127.0.0.1:23115".parse().unwrap());

        config.bind_ip = "not an ip".into();
        assert_eq!(config.sts_address(), "0.0.0.0:6600".parse().unwrap());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = From Disk\naccountsdir = /tmp/accounts").unwrap();

        let config = ServerConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.name, "From Disk");
        assert_eq!(config.accounts_dir, PathBuf::from("/tmp/accounts"));
    }

    #[test]
    fn test_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = ServerConfig::load_from_file(temp_dir.path().join("absent.txt"));
        assert!(matches!(result, Err(NexusError::Config(_))));
    }
}
