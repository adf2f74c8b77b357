//! End-to-end request/reply exchanges over loopback UDP.
//!
//! Each test binds a real server on an OS-chosen port, runs it in a
//! background task and drives it with a `Client` or a raw socket.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_test::{assert_err, assert_ok};

use subauth::protocol::{DataKind, PacketType};
use subauth::{
    AccessRequest, Client, ClientConfig, Outcome, Packet, RejectCode, Server, ServerConfig,
    SubscriberRecord, SubscriberStore, Verdict,
};

const PAID: u64 = 1_112_223_333;
const UNPAID: u64 = 4_445_556_666;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn loopback() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn client_config(timeout: Duration) -> ClientConfig {
    ClientConfig {
        bind_addr: loopback(),
        timeout,
        max_tries: 3,
        poll_interval: Duration::from_millis(1),
    }
}

/// Starts a server holding the two sample subscribers and returns its address
async fn spawn_server() -> (SocketAddr, JoinHandle<()>) {
    let store = SubscriberStore::build(vec![
        SubscriberRecord::new(PAID, 7, true),
        SubscriberRecord::new(UNPAID, 2, false),
    ])
    .unwrap();
    let config = ServerConfig {
        bind_addr: loopback(),
        ..ServerConfig::default()
    };

    let mut server = assert_ok!(Server::bind(config, store).await);
    let addr = server.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let _ = server.run().await;
    });
    (addr, handle)
}

async fn client(id: u8, timeout: Duration) -> Client {
    assert_ok!(Client::bind(id, client_config(timeout)).await)
}

/// Receives one datagram or fails the test after a second
async fn recv_packet(socket: &UdpSocket) -> Packet {
    let mut buf = vec![0u8; 1024];
    let (len, _) = tokio::time::timeout(Duration::from_secs(1), socket.recv_from(&mut buf))
        .await
        .expect("timed out waiting for reply")
        .unwrap();
    Packet::decode(&Bytes::copy_from_slice(&buf[..len])).expect("reply decodes")
}

// ---------------------------------------------------------------------------
// Scenarios
// ---------------------------------------------------------------------------

#[tokio::test]
async fn paid_subscriber_is_granted_access() {
    let (server_addr, server) = spawn_server().await;
    let mut client = client(1, Duration::from_millis(500)).await;

    let request = AccessRequest::new(PAID, 7);
    let outcome = client.request_access(server_addr, 0, request).await.unwrap();

    match outcome {
        Outcome::Verdict {
            verdict,
            acknowledged,
            reply,
        } => {
            assert_eq!(verdict, Verdict::Granted);
            assert!(acknowledged, "Ack should precede the verdict");
            assert_eq!(reply.packet_type(), PacketType::AccessGranted);
            assert_eq!(reply.client_id, 1);
            assert_eq!(reply.sequence_number(), 0);
            assert_eq!(reply.payload().unwrap(), &request.to_payload());
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
    assert_eq!(client.retry_count(0), 0);

    server.abort();
}

#[tokio::test]
async fn raw_exchange_sees_ack_then_verdict() {
    let (server_addr, server) = spawn_server().await;
    let socket = UdpSocket::bind(loopback()).await.unwrap();

    let request = AccessRequest::new(PAID, 7).into_packet(5, 0);
    socket.send_to(&request.encode().unwrap(), server_addr).await.unwrap();

    assert_eq!(recv_packet(&socket).await, Packet::ack(5, 0));
    let verdict = recv_packet(&socket).await;
    assert_eq!(verdict.packet_type(), PacketType::AccessGranted);
    assert_eq!(verdict.payload(), request.payload());

    server.abort();
}

#[tokio::test]
async fn unpaid_subscriber_is_refused() {
    let (server_addr, server) = spawn_server().await;
    let mut client = client(2, Duration::from_millis(500)).await;

    let outcome = client
        .request_access(server_addr, 0, AccessRequest::new(UNPAID, 2))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        Outcome::Verdict { verdict: Verdict::NotPaid, .. }
    ));

    server.abort();
}

#[tokio::test]
async fn unknown_subscriber_is_not_found() {
    let (server_addr, server) = spawn_server().await;
    let mut client = client(3, Duration::from_millis(500)).await;

    let outcome = client
        .request_access(server_addr, 0, AccessRequest::new(9_999_999_999, 7))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        Outcome::Verdict { verdict: Verdict::NotFound, .. }
    ));

    // A known subscriber asking for the wrong technology is not found either
    let outcome = client
        .request_access(server_addr, 1, AccessRequest::new(PAID, 3))
        .await
        .unwrap();
    assert!(matches!(
        outcome,
        Outcome::Verdict { verdict: Verdict::NotFound, .. }
    ));

    server.abort();
}

#[tokio::test]
async fn silent_server_exhausts_tries() {
    let silent = UdpSocket::bind(loopback()).await.unwrap();
    let silent_addr = silent.local_addr().unwrap();
    let mut client = client(4, Duration::from_millis(50)).await;

    let outcome = client
        .request_access(silent_addr, 9, AccessRequest::new(PAID, 7))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::GaveUp { attempts: 3 });
    assert!(!outcome.is_delivered());
    assert_eq!(client.retry_count(9), 0);

    // One physical send per try
    let mut buf = [0u8; 64];
    let mut sends = 0;
    while silent.try_recv_from(&mut buf).is_ok() {
        sends += 1;
    }
    assert_eq!(sends, 3);
}

#[tokio::test]
async fn declared_length_mismatch_is_rejected() {
    let (server_addr, server) = spawn_server().await;
    let socket = UdpSocket::bind(loopback()).await.unwrap();

    let mut raw = BytesMut::from(&AccessRequest::new(PAID, 7).into_packet(6, 0).encode().unwrap()[..]);
    raw[6] = 4;
    socket.send_to(&raw, server_addr).await.unwrap();

    assert_eq!(
        recv_packet(&socket).await,
        Packet::reject(6, RejectCode::LengthMismatch, 0)
    );

    server.abort();
}

#[tokio::test]
async fn repeated_sequence_number_is_duplicate() {
    let (server_addr, server) = spawn_server().await;
    let mut client = client(7, Duration::from_millis(500)).await;
    let request = AccessRequest::new(PAID, 7);

    let first = client.request_access(server_addr, 0, request).await.unwrap();
    assert!(first.is_delivered());

    let again = client.request_access(server_addr, 0, request).await.unwrap();
    assert_eq!(
        again,
        Outcome::Rejected {
            code: RejectCode::DuplicatePacket,
            sequence_number: 0,
        }
    );

    let skipped = client.request_access(server_addr, 5, request).await.unwrap();
    assert_eq!(
        skipped,
        Outcome::Rejected {
            code: RejectCode::OutOfSequence,
            sequence_number: 5,
        }
    );

    server.abort();
}

#[tokio::test]
async fn wrong_request_type_is_rejected() {
    let (server_addr, server) = spawn_server().await;
    let mut client = client(8, Duration::from_millis(500)).await;

    let packet = Packet::data(8, DataKind::Data, 0, Bytes::from_static(b"hello"));
    let outcome = client.send_packet(&packet, server_addr).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Rejected {
            code: RejectCode::BadType,
            sequence_number: 0,
        }
    );

    server.abort();
}

#[tokio::test]
async fn ack_only_packets_cannot_be_sent_as_requests() {
    let mut client = client(9, Duration::from_millis(50)).await;
    let result = client.send_packet(&Packet::ack(9, 0), loopback()).await;
    assert!(matches!(result, Err(subauth::Error::Protocol(_))));
}

#[tokio::test]
async fn oversized_store_refuses_to_start() {
    let store = assert_ok!(SubscriberStore::build(vec![
        SubscriberRecord::new(PAID, 7, true),
        SubscriberRecord::new(UNPAID, 2, false),
    ]));
    let config = ServerConfig {
        bind_addr: loopback(),
        max_records: 1,
        ..ServerConfig::default()
    };

    let err = assert_err!(Server::bind(config, store).await);
    assert!(matches!(err, subauth::Error::Capacity { limit: 1 }));
}

/// Forwards datagrams between one client and the server, dropping the
/// client's first datagram.
async fn spawn_lossy_relay(server_addr: SocketAddr) -> (SocketAddr, JoinHandle<()>) {
    let relay = UdpSocket::bind(loopback()).await.unwrap();
    let relay_addr = relay.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut buf = vec![0u8; 1024];
        let mut client_addr = None;
        let mut from_client = 0;
        loop {
            let Ok((len, from)) = relay.recv_from(&mut buf).await else {
                return;
            };
            if from == server_addr {
                if let Some(client_addr) = client_addr {
                    let _ = relay.send_to(&buf[..len], client_addr).await;
                }
            } else {
                client_addr = Some(from);
                from_client += 1;
                if from_client > 1 {
                    let _ = relay.send_to(&buf[..len], server_addr).await;
                }
            }
        }
    });
    (relay_addr, handle)
}

#[tokio::test]
async fn lost_request_is_resent() {
    let (server_addr, server) = spawn_server().await;
    let (relay_addr, relay) = spawn_lossy_relay(server_addr).await;
    let mut client = client(10, Duration::from_millis(100)).await;

    let outcome = client
        .request_access(relay_addr, 0, AccessRequest::new(PAID, 7))
        .await
        .unwrap();

    assert!(matches!(
        outcome,
        Outcome::Verdict { verdict: Verdict::Granted, acknowledged: true, .. }
    ));
    assert_eq!(client.retry_count(0), 0);

    relay.abort();
    server.abort();
}

/// Answers the first datagram it receives with `replies`, verbatim
async fn spawn_scripted_peer(replies: Vec<Bytes>) -> (SocketAddr, JoinHandle<()>) {
    let peer = UdpSocket::bind(loopback()).await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let mut buf = vec![0u8; 1024];
        let Ok((_, from)) = peer.recv_from(&mut buf).await else {
            return;
        };
        for reply in replies {
            let _ = peer.send_to(&reply, from).await;
        }
    });
    (peer_addr, handle)
}

#[tokio::test]
async fn ack_without_verdict_ends_acknowledged() {
    let (peer_addr, peer) = spawn_scripted_peer(vec![Packet::ack(11, 4).encode().unwrap()]).await;
    let mut client = client(11, Duration::from_millis(100)).await;

    let outcome = client
        .request_access(peer_addr, 4, AccessRequest::new(PAID, 7))
        .await
        .unwrap();

    assert_eq!(outcome, Outcome::Acknowledged { sequence_number: 4 });
    assert!(outcome.is_delivered());
    assert_eq!(client.retry_count(4), 0);

    peer.abort();
}

#[tokio::test]
async fn garbled_and_stray_replies_are_ignored() {
    let request = AccessRequest::new(PAID, 7);
    let verdict = Packet::data(12, DataKind::AccessGranted, 0, request.to_payload());
    let replies = vec![
        Bytes::from_static(b"garbage"),
        Packet::ack(12, 200).encode().unwrap(),
        Packet::ack(12, 0).encode().unwrap(),
        verdict.encode().unwrap(),
    ];
    let (peer_addr, peer) = spawn_scripted_peer(replies).await;
    let mut client = client(12, Duration::from_millis(500)).await;

    let outcome = client.request_access(peer_addr, 0, request).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Verdict {
            verdict: Verdict::Granted,
            acknowledged: true,
            reply: verdict,
        }
    );

    peer.abort();
}

#[tokio::test]
async fn replies_for_an_earlier_sequence_are_ignored() {
    let request = AccessRequest::new(PAID, 7);
    let stale_verdict = Packet::data(13, DataKind::SubscriberNotPaid, 0, request.to_payload());
    let verdict = Packet::data(13, DataKind::AccessGranted, 1, request.to_payload());
    let replies = vec![
        stale_verdict.encode().unwrap(),
        Packet::reject(13, RejectCode::DuplicatePacket, 0).encode().unwrap(),
        verdict.encode().unwrap(),
    ];
    let (peer_addr, peer) = spawn_scripted_peer(replies).await;
    let mut client = client(13, Duration::from_millis(500)).await;

    let outcome = client.request_access(peer_addr, 1, request).await.unwrap();
    assert_eq!(
        outcome,
        Outcome::Verdict {
            verdict: Verdict::Granted,
            acknowledged: false,
            reply: verdict,
        }
    );

    peer.abort();
}
