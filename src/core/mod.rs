//! Core types and traits for the access-authorization protocol
//!
//! This module contains the fundamental building blocks used throughout the library.

pub mod error;
pub mod types;
pub mod serde;

pub use self::error::{Error, Result};
pub use self::types::{
    ClientConfig,
    ClientId,
    SequenceNumber,
    ServerConfig,
    SubscriberNumber,
    TechType,
};

/// Default port the server listens on
pub const DEFAULT_PORT: u16 = 4321;

/// Maximum times a client sends one request before giving up
pub const MAX_TRIES: u32 = 3;

/// Maximum number of records a subscriber store may hold
pub const MAX_RECORDS: usize = 4096;

/// Receive buffer size for a single datagram
pub const DATAGRAM_CAPACITY: usize = 4096;
