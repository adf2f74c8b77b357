use std::net::SocketAddr;
use std::time::Duration;

use serde::{Serialize, Deserialize};

use super::{Error, Result};

/// Identifies a client on the wire; chosen by the client itself
pub type ClientId = u8;

/// Per-client sequence number, wraps at 256
pub type SequenceNumber = u8;

/// Ten-digit subscriber (phone) number
pub type SubscriberNumber = u64;

/// Technology the subscriber requests access to
pub type TechType = u8;

/// Configuration for a requesting client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Local address to bind to
    pub bind_addr: SocketAddr,
    /// How long to wait for a reply on each try
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub timeout: Duration,
    /// Number of sends before giving up on a request
    pub max_tries: u32,
    /// Pause between receive polls; zero busy-polls
    #[serde(serialize_with = "super::serde::serialize_duration")]
    #[serde(deserialize_with = "super::serde::deserialize_duration")]
    pub poll_interval: Duration,
}

impl ClientConfig {
    /// Checks the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_tries == 0 {
            return Err(Error::config("max_tries must be at least 1"));
        }
        if !self.bind_addr.is_ipv4() {
            return Err(Error::config(format!("IPv4 bind address required, got {}", self.bind_addr)));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            timeout: Duration::from_secs(1),
            max_tries: super::MAX_TRIES,
            poll_interval: Duration::from_millis(1),
        }
    }
}

/// Configuration for the authorization server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Local address to bind to
    pub bind_addr: SocketAddr,
    /// Upper bound on subscriber records loaded at startup
    pub max_records: usize,
    /// Requested kernel receive buffer (SO_RCVBUF), if any
    pub recv_buffer_size: Option<usize>,
    /// Largest datagram the server will read in one go
    pub datagram_capacity: usize,
}

impl ServerConfig {
    /// Checks the configuration for values the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_records == 0 {
            return Err(Error::config("max_records must be at least 1"));
        }
        if self.datagram_capacity == 0 {
            return Err(Error::config("datagram_capacity must be at least 1"));
        }
        if !self.bind_addr.is_ipv4() {
            return Err(Error::config(format!("IPv4 bind address required, got {}", self.bind_addr)));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], super::DEFAULT_PORT)),
            max_records: super::MAX_RECORDS,
            recv_buffer_size: None,
            datagram_capacity: super::DATAGRAM_CAPACITY,
        }
    }
}
