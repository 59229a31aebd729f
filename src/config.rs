//! Tunnel configuration
//!
//! A flat `serde` struct with per-field `Default` values and a `validate`
//! step, loadable from a TOML file via `from_file`. Field defaults match
//! the reference protocol's own constants, not arbitrary choices.

use std::net::IpAddr;
use std::path::Path;
use std::time::Duration;

use data_encoding::HEXLOWER_PERMISSIVE;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_domain() -> String {
    "tunnel.example.com".to_string()
}

fn default_chunk_size() -> usize {
    50
}

fn default_shared_key_hex() -> String {
    // 32 zero bytes, hex-encoded. Never used as-is in a real deployment;
    // `validate()` does not reject it, since a throwaway lab key is a
    // legitimate use case, but operators are expected to override it.
    "00".repeat(32)
}

fn default_listen_address() -> IpAddr {
    "127.0.0.1".parse().unwrap()
}

fn default_udp_port() -> u16 {
    5353
}

fn default_tcp_port() -> u16 {
    5354
}

fn default_timeout() -> Duration {
    Duration::from_secs(4)
}

fn default_cwnd_initial() -> u32 {
    2
}

fn default_ssthresh_initial() -> u32 {
    8
}

fn default_max_retransmit_per_chunk() -> u32 {
    5
}

fn default_dup_ack_threshold() -> u32 {
    3
}

fn default_dup_ack_drop_threshold() -> u32 {
    15
}

/// Which socket type carries DNS queries. Both the reset handshake and the
/// data-chunk stream use whichever single transport is configured here;
/// there is no per-message transport selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    Udp,
    Tcp,
}

impl Default for TransportKind {
    fn default() -> Self {
        TransportKind::Udp
    }
}

/// Top-level tunnel configuration, shared by both the agent and server
/// binaries (each only reads the fields relevant to its role).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunnelConfig {
    /// DNS domain suffix every QNAME is rooted under.
    #[serde(default = "default_domain")]
    pub domain: String,

    /// Pre-shared AES-256 key, hex-encoded (64 hex characters).
    #[serde(default = "default_shared_key_hex")]
    pub shared_key_hex: String,

    /// Plaintext bytes per chunk before base32 expansion.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Which socket type carries queries.
    #[serde(default)]
    pub transport: TransportKind,

    /// Address the server binds to / the agent resolves against.
    #[serde(default = "default_listen_address")]
    pub listen_address: IpAddr,

    /// Server port when `transport = "udp"`.
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,

    /// Server port when `transport = "tcp"`.
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,

    /// Per-chunk ACK wait before it is considered lost.
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Duration,

    /// Initial congestion window, in chunks.
    #[serde(default = "default_cwnd_initial")]
    pub cwnd_initial: u32,

    /// Initial slow-start threshold, in chunks.
    #[serde(default = "default_ssthresh_initial")]
    pub ssthresh_initial: u32,

    /// Per-chunk retransmit cap before the chunk is given up on.
    #[serde(default = "default_max_retransmit_per_chunk")]
    pub max_retransmit_per_chunk: u32,

    /// Duplicate-ACK count that triggers fast retransmit.
    #[serde(default = "default_dup_ack_threshold")]
    pub dup_ack_threshold: u32,

    /// Duplicate-ACK count that gives up on the base chunk entirely.
    #[serde(default = "default_dup_ack_drop_threshold")]
    pub dup_ack_drop_threshold: u32,
}

impl Default for TunnelConfig {
    fn default() -> Self {
        Self {
            domain: default_domain(),
            shared_key_hex: default_shared_key_hex(),
            chunk_size: default_chunk_size(),
            transport: TransportKind::default(),
            listen_address: default_listen_address(),
            udp_port: default_udp_port(),
            tcp_port: default_tcp_port(),
            timeout: default_timeout(),
            cwnd_initial: default_cwnd_initial(),
            ssthresh_initial: default_ssthresh_initial(),
            max_retransmit_per_chunk: default_max_retransmit_per_chunk(),
            dup_ack_threshold: default_dup_ack_threshold(),
            dup_ack_drop_threshold: default_dup_ack_drop_threshold(),
        }
    }
}

impl TunnelConfig {
    /// Load configuration from a TOML file, falling back to defaults for
    /// any field the file omits.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Decode `shared_key_hex` into the raw 32-byte AES-256 key.
    pub fn key_bytes(&self) -> Result<[u8; 32], ConfigError> {
        let decoded = HEXLOWER_PERMISSIVE.decode(self.shared_key_hex.as_bytes())?;
        decoded
            .try_into()
            .map_err(|v: Vec<u8>| ConfigError::KeyLength(v.len()))
    }

    /// The port implied by `transport`.
    pub fn resolved_port(&self) -> u16 {
        match self.transport {
            TransportKind::Udp => self.udp_port,
            TransportKind::Tcp => self.tcp_port,
        }
    }

    /// Validate field-level invariants. Does not attempt to bind sockets
    /// or resolve the domain; that happens lazily at connection time.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.key_bytes()?;
        if self.domain.is_empty() {
            return Err(ConfigError::EmptyDomain);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = TunnelConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 50);
        assert_eq!(config.resolved_port(), 5353);
    }

    #[test]
    fn rejects_short_key() {
        let mut config = TunnelConfig::default();
        config.shared_key_hex = "00".repeat(16);
        assert!(matches!(config.validate(), Err(ConfigError::KeyLength(16))));
    }

    #[test]
    fn rejects_empty_domain() {
        let mut config = TunnelConfig::default();
        config.domain = String::new();
        assert!(matches!(config.validate(), Err(ConfigError::EmptyDomain)));
    }

    #[test]
    fn tcp_transport_resolves_tcp_port() {
        let mut config = TunnelConfig::default();
        config.transport = TransportKind::Tcp;
        assert_eq!(config.resolved_port(), 5354);
    }

    #[test]
    fn round_trips_through_toml() {
        let config = TunnelConfig::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: TunnelConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed.domain, config.domain);
        assert_eq!(parsed.key_bytes().unwrap(), config.key_bytes().unwrap());
    }
}
