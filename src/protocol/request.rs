use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::core::{ClientId, Error, Result, SequenceNumber, SubscriberNumber, TechType};
use super::packet::{DataKind, Packet};

/// Payload of an `AccessRequest`: tech type, then the subscriber number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessRequest {
    pub tech_type: TechType,
    pub subscriber_number: SubscriberNumber,
}

impl AccessRequest {
    /// Encoded payload size in bytes
    pub const PAYLOAD_LEN: usize = 1 + 8;

    pub fn new(subscriber_number: SubscriberNumber, tech_type: TechType) -> Self {
        AccessRequest {
            tech_type,
            subscriber_number,
        }
    }

    /// Serializes the request into packet payload bytes
    pub fn to_payload(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(Self::PAYLOAD_LEN);
        buf.put_u8(self.tech_type);
        buf.put_u64(self.subscriber_number);
        buf.freeze()
    }

    /// Reads the request from the start of a payload
    pub fn from_payload(payload: &[u8]) -> Result<Self> {
        if payload.len() < Self::PAYLOAD_LEN {
            return Err(Error::protocol(format!(
                "access request payload too short: {} bytes",
                payload.len()
            )));
        }
        let mut buf = payload;
        let tech_type = buf.get_u8();
        let subscriber_number = buf.get_u64();
        Ok(AccessRequest {
            tech_type,
            subscriber_number,
        })
    }

    /// Wraps the request in an `AccessRequest` packet
    pub fn into_packet(self, client_id: ClientId, sequence_number: SequenceNumber) -> Packet {
        Packet::data(client_id, DataKind::AccessRequest, sequence_number, self.to_payload())
    }
}

/// The server's answer to an access request, carried in the reply type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verdict {
    Granted,
    NotPaid,
    NotFound,
}

impl Verdict {
    /// Data kind the verdict is sent as
    pub fn kind(self) -> DataKind {
        match self {
            Verdict::Granted => DataKind::AccessGranted,
            Verdict::NotPaid => DataKind::SubscriberNotPaid,
            Verdict::NotFound => DataKind::SubscriberNotFound,
        }
    }

    /// Reads a verdict from a reply kind; `None` for non-verdict kinds
    pub fn from_kind(kind: DataKind) -> Option<Self> {
        match kind {
            DataKind::AccessGranted => Some(Verdict::Granted),
            DataKind::SubscriberNotPaid => Some(Verdict::NotPaid),
            DataKind::SubscriberNotFound => Some(Verdict::NotFound),
            DataKind::Data | DataKind::AccessRequest => None,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Verdict::Granted => "access granted",
            Verdict::NotPaid => "subscriber has not paid",
            Verdict::NotFound => "subscriber or technology not found",
        };
        f.write_str(text)
    }
}
