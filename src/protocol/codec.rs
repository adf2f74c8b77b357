use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::core::{Error, Result};
use super::packet::{
    Body, DataKind, DecodeError, Packet, PacketType, PartialPacket, RejectCode, MARKER,
    MAX_PAYLOAD_LEN, TRAILER_LEN,
};

impl Packet {
    /// Encodes the packet into a newly allocated buffer
    pub fn encode(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.encode_to(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Encodes the packet into a caller-supplied buffer, returning the number
    /// of bytes written
    pub fn encode_into(&self, buf: &mut [u8]) -> Result<usize> {
        let needed = self.encoded_len();
        if buf.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }
        let mut dst = &mut buf[..needed];
        self.encode_to(&mut dst)?;
        Ok(needed)
    }

    /// Writes the wire form of the packet; all multi-byte fields big-endian
    pub fn encode_to<B: BufMut>(&self, dst: &mut B) -> Result<()> {
        if let Body::Data { payload, .. } = &self.body {
            if payload.len() > MAX_PAYLOAD_LEN {
                return Err(Error::PayloadTooLarge(payload.len()));
            }
        }
        if dst.remaining_mut() < self.encoded_len() {
            return Err(Error::BufferTooSmall {
                needed: self.encoded_len(),
                available: dst.remaining_mut(),
            });
        }

        dst.put_u16(MARKER);
        dst.put_u8(self.client_id);
        dst.put_u16(self.packet_type().into());

        match &self.body {
            Body::Data { sequence_number, payload, .. } => {
                dst.put_u8(*sequence_number);
                dst.put_u8(payload.len() as u8);
                dst.put_slice(payload);
            }
            Body::Ack { received_sequence_number } => {
                dst.put_u8(*received_sequence_number);
            }
            Body::Reject { code, received_sequence_number } => {
                dst.put_u16((*code).into());
                dst.put_u8(*received_sequence_number);
            }
        }

        dst.put_u16(MARKER);
        Ok(())
    }

    /// Decodes exactly one datagram.
    ///
    /// On failure the error carries every header field read before the
    /// problem was found. A data-family payload is a slice of `datagram`, not
    /// a copy.
    pub fn decode(datagram: &Bytes) -> std::result::Result<Packet, DecodeError> {
        fn fail(code: RejectCode, partial: PartialPacket) -> std::result::Result<Packet, DecodeError> {
            Err(DecodeError::new(code, partial))
        }

        let mut partial = PartialPacket::default();
        let mut buf = &datagram[..];

        if buf.remaining() < 2 || buf.get_u16() != MARKER {
            return fail(RejectCode::MissingTerminator, partial);
        }
        if !buf.has_remaining() {
            return fail(RejectCode::MissingTerminator, partial);
        }
        let client_id = buf.get_u8();
        partial.client_id = Some(client_id);

        if buf.remaining() < 2 {
            return fail(RejectCode::MissingTerminator, partial);
        }
        let raw_type = buf.get_u16();
        partial.packet_type = Some(raw_type);

        let packet_type = match PacketType::try_from(raw_type) {
            Ok(packet_type) => packet_type,
            Err(_) => return fail(RejectCode::BadType, partial),
        };

        let body = match packet_type {
            PacketType::Ack => {
                if buf.remaining() < 1 {
                    return fail(RejectCode::MissingTerminator, partial);
                }
                let received_sequence_number = buf.get_u8();
                partial.sequence_number = Some(received_sequence_number);
                Body::Ack { received_sequence_number }
            }
            PacketType::Reject => {
                if buf.remaining() < 3 {
                    return fail(RejectCode::MissingTerminator, partial);
                }
                let raw_code = buf.get_u16();
                let received_sequence_number = buf.get_u8();
                partial.sequence_number = Some(received_sequence_number);
                let code = match RejectCode::try_from(raw_code) {
                    Ok(code) => code,
                    Err(_) => return fail(RejectCode::BadType, partial),
                };
                Body::Reject { code, received_sequence_number }
            }
            _ => {
                let Some(kind) = DataKind::from_packet_type(packet_type) else {
                    return fail(RejectCode::BadType, partial);
                };
                if buf.remaining() < 2 {
                    return fail(RejectCode::MissingTerminator, partial);
                }
                let sequence_number = buf.get_u8();
                partial.sequence_number = Some(sequence_number);
                let len = usize::from(buf.get_u8());
                if buf.remaining() != len + TRAILER_LEN {
                    return fail(RejectCode::LengthMismatch, partial);
                }
                let start = datagram.len() - buf.remaining();
                let payload = datagram.slice(start..start + len);
                buf.advance(len);
                Body::Data { kind, sequence_number, payload }
            }
        };

        if buf.remaining() < TRAILER_LEN || buf.get_u16() != MARKER {
            return fail(RejectCode::MissingTerminator, partial);
        }
        if buf.has_remaining() {
            return fail(RejectCode::LengthMismatch, partial);
        }

        Ok(Packet { client_id, body })
    }
}

/// Datagram codec: every `decode` call consumes the whole source buffer as
/// one packet
#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec;

impl PacketCodec {
    /// Creates a new packet codec
    pub fn new() -> Self {
        PacketCodec
    }
}

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.is_empty() {
            return Ok(None);
        }
        let datagram = src.split().freeze();
        Ok(Some(Packet::decode(&datagram)?))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = Error;

    fn encode(&mut self, item: Packet, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.encoded_len());
        item.encode_to(dst)
    }
}
