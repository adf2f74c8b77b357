use std::io;
use std::net::SocketAddr;

use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio_util::codec::Encoder;
use tracing::{debug, error, info, warn};

use crate::core::{ClientConfig, ClientId, Error, Result, SequenceNumber, DATAGRAM_CAPACITY};
use crate::protocol::{AccessRequest, Body, Packet, PacketCodec, RejectCode, Verdict};
use crate::util::wait_until;

/// How a single request exchange ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// The server answered the request
    Verdict {
        verdict: Verdict,
        /// Whether an Ack arrived before the answer
        acknowledged: bool,
        reply: Packet,
    },
    /// The request was acknowledged but no answer followed within the timeout
    Acknowledged { sequence_number: SequenceNumber },
    /// The server refused the request
    Rejected {
        code: RejectCode,
        sequence_number: SequenceNumber,
    },
    /// Every try timed out
    GaveUp { attempts: u32 },
}

impl Outcome {
    /// Returns whether the request reached the server and was accepted
    pub fn is_delivered(&self) -> bool {
        matches!(self, Outcome::Verdict { .. } | Outcome::Acknowledged { .. })
    }
}

/// What to do with one received datagram
enum Step {
    Finish(Outcome),
    Acked,
    KeepWaiting,
}

/// Requesting side of the protocol: sends one request at a time and retries
/// it until the server answers or the try budget runs out
#[derive(Debug)]
pub struct Client {
    id: ClientId,
    socket: UdpSocket,
    config: ClientConfig,
    /// Timeouts seen so far, indexed by sequence number
    tries: [u32; 256],
    codec: PacketCodec,
    send_buf: BytesMut,
    recv_buf: BytesMut,
}

impl Client {
    /// Binds a client socket according to `config`
    pub async fn bind(id: ClientId, config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let socket = super::bind_udp(config.bind_addr, None)?;
        info!(client_id = id, addr = %socket.local_addr()?, "client bound");

        Ok(Client {
            id,
            socket,
            config,
            tries: [0; 256],
            codec: PacketCodec::new(),
            send_buf: BytesMut::new(),
            recv_buf: BytesMut::new(),
        })
    }

    pub fn client_id(&self) -> ClientId {
        self.id
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Returns the local socket address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket
            .local_addr()
            .map_err(|e| Error::network(format!("Failed to get local address: {}", e)))
    }

    /// Timeouts recorded so far for the exchange using `sequence_number`
    pub fn retry_count(&self, sequence_number: SequenceNumber) -> u32 {
        self.tries[usize::from(sequence_number)]
    }

    /// Asks `dest` whether a subscriber may use a technology
    pub async fn request_access(
        &mut self,
        dest: SocketAddr,
        sequence_number: SequenceNumber,
        request: AccessRequest,
    ) -> Result<Outcome> {
        let packet = request.into_packet(self.id, sequence_number);
        self.send_packet(&packet, dest).await
    }

    /// Sends a data-family packet and drives its exchange to completion.
    ///
    /// A timeout resends the packet until `max_tries` sends have gone
    /// unanswered. A garbled or unexpected reply only restarts the wait.
    pub async fn send_packet(&mut self, packet: &Packet, dest: SocketAddr) -> Result<Outcome> {
        let sequence_number = match &packet.body {
            Body::Data { sequence_number, .. } => *sequence_number,
            _ => return Err(Error::protocol("only data packets can be sent as requests")),
        };
        let slot = usize::from(sequence_number);

        self.send_buf.clear();
        self.codec.encode(packet.clone(), &mut self.send_buf)?;
        let datagram = self.send_buf.split().freeze();

        let mut acknowledged = false;
        loop {
            if let Err(e) = self.socket.send_to(&datagram, dest).await {
                error!(seq = sequence_number, %dest, error = %e, "failed to send request");
                self.tries[slot] = 0;
                return Err(e.into());
            }
            debug!(seq = sequence_number, %dest, bytes = datagram.len(), "request sent");

            // Wait for replies until one ends the exchange or the timeout fires
            while let Some(reply) = self.receive().await {
                match self.classify(sequence_number, acknowledged, &reply) {
                    Step::Finish(outcome) => {
                        self.tries[slot] = 0;
                        return Ok(outcome);
                    }
                    Step::Acked => {
                        acknowledged = true;
                        self.tries[slot] = 0;
                    }
                    Step::KeepWaiting => {}
                }
            }

            if acknowledged {
                debug!(seq = sequence_number, "acknowledged, no answer before timeout");
                return Ok(Outcome::Acknowledged { sequence_number });
            }

            self.tries[slot] += 1;
            let attempts = self.tries[slot];
            if attempts >= self.config.max_tries {
                warn!(seq = sequence_number, attempts, "maximum tries reached, giving up");
                self.tries[slot] = 0;
                return Ok(Outcome::GaveUp { attempts });
            }
            warn!(seq = sequence_number, attempts, "timed out waiting for reply, resending");
        }
    }

    /// Decides what a received datagram means for the exchange in flight
    fn classify(&self, sequence_number: SequenceNumber, acknowledged: bool, datagram: &Bytes) -> Step {
        let reply = match Packet::decode(datagram) {
            Ok(reply) => reply,
            Err(e) => {
                warn!(seq = sequence_number, code = %e.code, "received invalid reply, waiting again");
                return Step::KeepWaiting;
            }
        };

        match &reply.body {
            Body::Ack { received_sequence_number } if *received_sequence_number == sequence_number => {
                debug!(seq = sequence_number, "got ACK");
                Step::Acked
            }
            Body::Reject { code, received_sequence_number } if *received_sequence_number == sequence_number => {
                warn!(seq = sequence_number, code = %code, "request rejected");
                Step::Finish(Outcome::Rejected {
                    code: *code,
                    sequence_number: *received_sequence_number,
                })
            }
            Body::Reject { code, received_sequence_number } => {
                warn!(seq = sequence_number, stale = *received_sequence_number, code = %code, "stale reject ignored");
                Step::KeepWaiting
            }
            &Body::Data { sequence_number: replied, .. } if replied != sequence_number => {
                warn!(seq = sequence_number, stale = replied, "stale reply ignored");
                Step::KeepWaiting
            }
            &Body::Data { kind, .. } => match Verdict::from_kind(kind) {
                Some(verdict) => {
                    info!(seq = sequence_number, %verdict, "reply received");
                    Step::Finish(Outcome::Verdict {
                        verdict,
                        acknowledged,
                        reply,
                    })
                }
                None => {
                    warn!(seq = sequence_number, packet_type = ?kind, "unexpected reply type");
                    Step::KeepWaiting
                }
            },
            Body::Ack { received_sequence_number } => {
                warn!(seq = sequence_number, acked = *received_sequence_number, "ACK for another request");
                Step::KeepWaiting
            }
        }
    }

    /// Polls the socket for one datagram until the configured timeout
    async fn receive(&mut self) -> Option<Bytes> {
        let socket = &self.socket;
        let recv_buf = &mut self.recv_buf;

        wait_until(self.config.timeout, self.config.poll_interval, || {
            recv_buf.resize(DATAGRAM_CAPACITY, 0);
            match socket.try_recv_from(&mut recv_buf[..]) {
                Ok((len, from)) => {
                    debug!(%from, bytes = len, "datagram received");
                    recv_buf.truncate(len);
                    Some(recv_buf.split().freeze())
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => None,
                Err(e) => {
                    debug!(error = %e, "receive attempt failed");
                    None
                }
            }
        })
        .await
    }
}
