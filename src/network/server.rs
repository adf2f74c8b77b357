use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio_util::codec::Encoder;
use tracing::{debug, error, info, trace, warn};

use crate::core::{ClientId, Error, Result, SequenceNumber, ServerConfig};
use crate::protocol::{
    AccessRequest, Body, DataKind, Packet, PacketCodec, RejectCode, Verdict, DATA_OVERHEAD,
};
use crate::store::SubscriberStore;

/// Pause after a failed receive before the next one
pub const RECV_RETRY_DELAY: Duration = Duration::from_millis(10);

/// Compares a received sequence number with the expected one, modulo 256.
///
/// Numbers up to 127 ahead of `expected` are out of sequence; everything
/// behind it (including `expected - 1`) is a duplicate.
pub fn check_sequence(expected: SequenceNumber, received: SequenceNumber) -> std::result::Result<(), RejectCode> {
    match received.wrapping_sub(expected) {
        0 => Ok(()),
        1..=127 => Err(RejectCode::OutOfSequence),
        _ => Err(RejectCode::DuplicatePacket),
    }
}

async fn recv_failed(e: &Error) {
    warn!(error = %e, "receive failed");
    tokio::time::sleep(RECV_RETRY_DELAY).await;
}

/// Socket-free half of the server: per-client cursors and the subscriber
/// store
#[derive(Debug)]
pub struct ServerState {
    /// Next expected sequence number, indexed by client id
    expected: [SequenceNumber; 256],
    store: SubscriberStore,
}

impl ServerState {
    pub fn new(store: SubscriberStore) -> Self {
        ServerState {
            expected: [0; 256],
            store,
        }
    }

    /// Next sequence number the server will accept from `client_id`
    pub fn expected(&self, client_id: ClientId) -> SequenceNumber {
        self.expected[usize::from(client_id)]
    }

    pub fn store(&self) -> &SubscriberStore {
        &self.store
    }

    /// Processes one inbound datagram and returns the replies to send, in
    /// order. An accepted request yields an Ack followed by the verdict;
    /// anything else yields a single Reject, or nothing when not even the
    /// client id could be read.
    pub fn handle_datagram(&mut self, datagram: &Bytes) -> Vec<Packet> {
        let packet = match Packet::decode(datagram) {
            Ok(packet) => packet,
            Err(e) => {
                let Some(client_id) = e.partial.client_id else {
                    warn!(code = %e.code, bytes = datagram.len(), "dropping datagram without a readable header");
                    return Vec::new();
                };
                warn!(client_id, code = %e.code, "rejecting malformed packet");
                let sequence_number = e.partial.sequence_number.unwrap_or(0);
                return vec![Packet::reject(client_id, e.code, sequence_number)];
            }
        };

        let client_id = packet.client_id;
        let sequence_number = packet.sequence_number();
        if let Err(code) = self.validate(&packet, datagram.len()) {
            warn!(client_id, seq = sequence_number, %code, "rejecting packet");
            return vec![Packet::reject(client_id, code, sequence_number)];
        }

        debug!(client_id, seq = sequence_number, "accepted access request");
        self.expected[usize::from(client_id)] = sequence_number.wrapping_add(1);

        vec![Packet::ack(client_id, sequence_number), self.answer(&packet)]
    }

    /// Checks type, length and sequence number of a decoded packet
    fn validate(&self, packet: &Packet, datagram_len: usize) -> std::result::Result<(), RejectCode> {
        let Body::Data {
            kind: DataKind::AccessRequest,
            sequence_number,
            payload,
        } = &packet.body
        else {
            return Err(RejectCode::BadType);
        };

        if DATA_OVERHEAD + payload.len() != datagram_len {
            return Err(RejectCode::LengthMismatch);
        }

        check_sequence(self.expected(packet.client_id), *sequence_number)
    }

    /// Looks the requested subscriber up and decides the answer
    pub fn verdict(&self, request: &AccessRequest) -> Verdict {
        match self.store.lookup(request.subscriber_number) {
            None => Verdict::NotFound,
            Some(record) if record.tech_type != request.tech_type => Verdict::NotFound,
            Some(record) if !record.paid => Verdict::NotPaid,
            Some(_) => Verdict::Granted,
        }
    }

    /// Builds the reply to an accepted request: the request echoed back with
    /// the verdict as its type
    pub fn answer(&self, request: &Packet) -> Packet {
        let payload = request.payload().cloned().unwrap_or_default();

        let verdict = match AccessRequest::from_payload(&payload) {
            Ok(access) => {
                let verdict = self.verdict(&access);
                debug!(
                    client_id = request.client_id,
                    subscriber = access.subscriber_number,
                    tech_type = access.tech_type,
                    %verdict,
                    "looked up subscriber"
                );
                verdict
            }
            Err(e) => {
                warn!(client_id = request.client_id, error = %e, "unreadable access request");
                Verdict::NotFound
            }
        };

        Packet::data(request.client_id, verdict.kind(), request.sequence_number(), payload)
    }
}

/// Authorization server: receives one datagram at a time, validates it and
/// replies
#[derive(Debug)]
pub struct Server {
    socket: UdpSocket,
    state: ServerState,
    codec: PacketCodec,
    datagram_capacity: usize,
    recv_buf: BytesMut,
    send_buf: BytesMut,
}

impl Server {
    /// Binds the server socket and takes ownership of the store
    pub async fn bind(config: ServerConfig, store: SubscriberStore) -> Result<Self> {
        config.validate()?;
        if store.len() > config.max_records {
            return Err(Error::Capacity {
                limit: config.max_records,
            });
        }

        let socket = super::bind_udp(config.bind_addr, config.recv_buffer_size)?;
        info!(addr = %socket.local_addr()?, subscribers = store.len(), "server bound");
        for record in store.iter() {
            trace!(number = record.number, tech_type = record.tech_type, paid = record.paid, "subscriber");
        }

        Ok(Server {
            socket,
            state: ServerState::new(store),
            codec: PacketCodec::new(),
            datagram_capacity: config.datagram_capacity,
            recv_buf: BytesMut::new(),
            send_buf: BytesMut::new(),
        })
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::network(format!("Failed to get local address: {}", e)))
    }

    pub fn state(&self) -> &ServerState {
        &self.state
    }

    /// Receives and fully processes one datagram.
    ///
    /// Only a receive failure is returned as an error; a failed reply send is
    /// logged and ends processing of that datagram.
    pub async fn serve_one(&mut self) -> Result<()> {
        self.recv_buf.resize(self.datagram_capacity, 0);
        let (len, from) = self.socket.recv_from(&mut self.recv_buf[..]).await?;
        self.recv_buf.truncate(len);
        let datagram = self.recv_buf.split().freeze();
        debug!(%from, bytes = len, "got a packet");

        for reply in self.state.handle_datagram(&datagram) {
            if let Err(e) = self.send(reply, from).await {
                error!(%from, error = %e, "failed to send reply");
                break;
            }
        }

        Ok(())
    }

    /// Serves datagrams until the task is dropped
    pub async fn run(&mut self) -> Result<()> {
        info!("waiting for messages");
        loop {
            if let Err(e) = self.serve_one().await {
                recv_failed(&e).await;
            }
        }
    }

    async fn send(&mut self, packet: Packet, dest: SocketAddr) -> Result<()> {
        trace!(%dest, packet_type = ?packet.packet_type(), seq = packet.sequence_number(), "sending");
        self.send_buf.clear();
        self.codec.encode(packet, &mut self.send_buf)?;
        self.socket.send_to(&self.send_buf, dest).await?;
        Ok(())
    }
}
