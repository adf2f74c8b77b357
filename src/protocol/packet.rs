use std::fmt;

use bytes::Bytes;
use num_enum::{IntoPrimitive, TryFromPrimitive};
use thiserror::Error;

use crate::core::{ClientId, SequenceNumber};

/// Sentinel written before and after every packet
pub const MARKER: u16 = 0xFFFF;

/// start marker + client id + type
pub const HEADER_LEN: usize = 5;

/// end marker
pub const TRAILER_LEN: usize = 2;

/// sequence number + payload length
pub const DATA_PREFIX_LEN: usize = 2;

/// Encoded size of a data-family packet minus its payload
pub const DATA_OVERHEAD: usize = HEADER_LEN + DATA_PREFIX_LEN + TRAILER_LEN;

/// Largest payload the one-byte length field can describe
pub const MAX_PAYLOAD_LEN: usize = u8::MAX as usize;

/// Type code carried in every packet header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum PacketType {
    Data = 0xFFF1,
    Ack = 0xFFF2,
    Reject = 0xFFF3,
    AccessRequest = 0xFFF8,
    SubscriberNotPaid = 0xFFF9,
    SubscriberNotFound = 0xFFFA,
    AccessGranted = 0xFFFB,
}

/// Why an inbound packet was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoPrimitive, TryFromPrimitive)]
#[repr(u16)]
pub enum RejectCode {
    OutOfSequence = 0xFFF4,
    LengthMismatch = 0xFFF5,
    /// Also used for a bad start marker
    MissingTerminator = 0xFFF6,
    /// The expected sequence number is already past the received one
    DuplicatePacket = 0xFFF7,
    BadType = 0xFFF8,
}

impl fmt::Display for RejectCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            RejectCode::OutOfSequence => "received out of sequence",
            RejectCode::LengthMismatch => "length field does not match payload",
            RejectCode::MissingTerminator => "missing packet terminator",
            RejectCode::DuplicatePacket => "duplicate packet",
            RejectCode::BadType => "bad type field",
        };
        f.write_str(text)
    }
}

/// The packet types that carry a sequence number and a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Data,
    AccessRequest,
    SubscriberNotPaid,
    SubscriberNotFound,
    AccessGranted,
}

impl DataKind {
    /// Wire type code for this kind
    pub fn packet_type(self) -> PacketType {
        match self {
            DataKind::Data => PacketType::Data,
            DataKind::AccessRequest => PacketType::AccessRequest,
            DataKind::SubscriberNotPaid => PacketType::SubscriberNotPaid,
            DataKind::SubscriberNotFound => PacketType::SubscriberNotFound,
            DataKind::AccessGranted => PacketType::AccessGranted,
        }
    }

    /// Maps a type code onto a data kind; `None` for Ack and Reject
    pub fn from_packet_type(packet_type: PacketType) -> Option<Self> {
        match packet_type {
            PacketType::Data => Some(DataKind::Data),
            PacketType::AccessRequest => Some(DataKind::AccessRequest),
            PacketType::SubscriberNotPaid => Some(DataKind::SubscriberNotPaid),
            PacketType::SubscriberNotFound => Some(DataKind::SubscriberNotFound),
            PacketType::AccessGranted => Some(DataKind::AccessGranted),
            PacketType::Ack | PacketType::Reject => None,
        }
    }
}

/// Variant-specific part of a packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    Data {
        kind: DataKind,
        sequence_number: SequenceNumber,
        /// After decoding, a view into the received datagram
        payload: Bytes,
    },
    Ack {
        received_sequence_number: SequenceNumber,
    },
    Reject {
        code: RejectCode,
        received_sequence_number: SequenceNumber,
    },
}

/// A protocol packet. The wire type is derived from `body`, so the two can
/// never disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub client_id: ClientId,
    pub body: Body,
}

impl Packet {
    /// Creates a data-family packet
    pub fn data(
        client_id: ClientId,
        kind: DataKind,
        sequence_number: SequenceNumber,
        payload: impl Into<Bytes>,
    ) -> Self {
        Packet {
            client_id,
            body: Body::Data {
                kind,
                sequence_number,
                payload: payload.into(),
            },
        }
    }

    /// Creates an acknowledgement
    pub fn ack(client_id: ClientId, received_sequence_number: SequenceNumber) -> Self {
        Packet {
            client_id,
            body: Body::Ack { received_sequence_number },
        }
    }

    /// Creates a rejection
    pub fn reject(client_id: ClientId, code: RejectCode, received_sequence_number: SequenceNumber) -> Self {
        Packet {
            client_id,
            body: Body::Reject {
                code,
                received_sequence_number,
            },
        }
    }

    /// Wire type code of this packet
    pub fn packet_type(&self) -> PacketType {
        match &self.body {
            Body::Data { kind, .. } => kind.packet_type(),
            Body::Ack { .. } => PacketType::Ack,
            Body::Reject { .. } => PacketType::Reject,
        }
    }

    /// The sequence number this packet carries or refers to
    pub fn sequence_number(&self) -> SequenceNumber {
        match &self.body {
            Body::Data { sequence_number, .. } => *sequence_number,
            Body::Ack { received_sequence_number } => *received_sequence_number,
            Body::Reject { received_sequence_number, .. } => *received_sequence_number,
        }
    }

    /// Payload bytes of a data-family packet
    pub fn payload(&self) -> Option<&Bytes> {
        match &self.body {
            Body::Data { payload, .. } => Some(payload),
            _ => None,
        }
    }

    /// Exact number of bytes `encode` produces for this packet
    pub fn encoded_len(&self) -> usize {
        let body = match &self.body {
            Body::Data { payload, .. } => DATA_PREFIX_LEN + payload.len(),
            Body::Ack { .. } => 1,
            Body::Reject { .. } => 3,
        };
        HEADER_LEN + body + TRAILER_LEN
    }
}

/// Header fields recovered from a packet that failed to decode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PartialPacket {
    pub client_id: Option<ClientId>,
    pub packet_type: Option<u16>,
    pub sequence_number: Option<SequenceNumber>,
}

/// A datagram that could not be decoded, with whatever was read before the
/// failure
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("{code}")]
pub struct DecodeError {
    pub code: RejectCode,
    pub partial: PartialPacket,
}

impl DecodeError {
    /// Creates a new decode error
    pub fn new(code: RejectCode, partial: PartialPacket) -> Self {
        DecodeError { code, partial }
    }
}
