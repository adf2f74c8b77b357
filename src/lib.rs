//! subauth: subscriber access authorization over UDP
//!
//! A client asks a server whether a subscriber may use a technology. Requests
//! travel over a small stop-and-wait ARQ protocol: the client resends on
//! timeout, the server rejects duplicate or out-of-order packets by sequence
//! number and answers accepted requests from an in-memory subscriber store.
pub mod core;

pub mod network;
pub mod protocol;
pub mod store;
pub mod util;

// Re-export commonly used items
pub use crate::core::{ClientConfig, Error, Result, ServerConfig};
pub use crate::network::{Client, Outcome, Server, ServerState};
pub use crate::protocol::{AccessRequest, Packet, PacketCodec, RejectCode, Verdict};
pub use crate::store::{SubscriberRecord, SubscriberStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Installs a `tracing` subscriber that prints to stderr, filtered by
/// `RUST_LOG` (default `info`). Intended for binaries and demos; calling it
/// twice is harmless.
pub fn init_tracing() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
