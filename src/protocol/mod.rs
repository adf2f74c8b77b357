//! Protocol implementation module
//!
//! This module defines the packet layout, encoding/decoding, and the
//! access-request payload exchanged between client and server.
//!
//! Wire format (multi-byte fields big-endian):
//!
//! ```text
//! [start:u16][client_id:u8][type:u16] <body> [end:u16]
//!
//! data family: [seq:u8][len:u8][payload:len]
//! ack:         [received_seq:u8]
//! reject:      [code:u16][received_seq:u8]
//! ```

pub mod codec;
pub mod packet;
pub mod request;

pub use self::codec::PacketCodec;
pub use self::packet::{
    Body, DataKind, DecodeError, Packet, PacketType, PartialPacket, RejectCode, DATA_OVERHEAD,
    MARKER,
};
pub use self::request::{AccessRequest, Verdict};
