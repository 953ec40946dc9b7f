//! End-to-end tests over real UDP sockets on the loopback interface.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::sync::mpsc;
use udp_endpoint::{Endpoint, EndpointConfig, EndpointError, Envelope, SendMode, UdpTransport};

/// Bind an endpoint to an OS-assigned port on loopback.
async fn ephemeral() -> (Endpoint<UdpTransport>, SocketAddr) {
    let endpoint = Endpoint::bind("127.0.0.1:0".parse().unwrap(), EndpointConfig::local_network())
        .await
        .expect("bind failed");
    let addr = endpoint.local_addr().expect("started endpoint has an address");
    (endpoint, addr)
}

#[tokio::test]
async fn acknowledged_round_trip() {
    let (client, client_addr) = ephemeral().await;
    let (server, server_addr) = ephemeral().await;

    let (tx, mut rx) = mpsc::unbounded_channel();
    server.register_receive_handler(move |envelope, from| {
        let _ = tx.send((envelope.payload().to_vec(), from));
    });

    assert!(client.register(server_addr, true).await.unwrap());
    assert!(server.acknowledges(client_addr));

    let envelope = Envelope::data(b"Ping!".to_vec());
    assert!(client
        .send(&envelope, server_addr, SendMode::AckBlocking)
        .await
        .unwrap());

    let (registration, _) = rx.recv().await.unwrap();
    assert!(registration.is_empty());
    let (payload, from) = rx.recv().await.unwrap();
    assert_eq!(payload, b"Ping!");
    assert_eq!(from, client_addr);
    assert!(!client.has_pending_acknowledgements());

    client.shutdown();
    server.shutdown();
}

#[tokio::test]
async fn unanswered_send_reports_failure() {
    let (client, _) = ephemeral().await;
    // Bound but never read from.
    let silent = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
    let dest = silent.local_addr().unwrap();

    let acknowledged = tokio::time::timeout(
        Duration::from_secs(5),
        client.send(&Envelope::data(b"hello?".to_vec()), dest, SendMode::AckBlocking),
    )
    .await
    .expect("fail timeout should resolve the send")
    .unwrap();

    assert!(!acknowledged);
    assert_eq!(client.stats().dropped, 1);
    assert_eq!(client.waiting_count(), 0);
}

#[tokio::test]
async fn send_after_shutdown_is_closed() {
    let (client, _) = ephemeral().await;
    client.shutdown();

    let result = client
        .send(
            &Envelope::data(b"late".to_vec()),
            "127.0.0.1:9".parse().unwrap(),
            SendMode::FireAndForget,
        )
        .await;
    assert!(matches!(result, Err(EndpointError::Closed)));
}

#[tokio::test]
async fn oversized_datagram_rolls_back_tracking() {
    let (client, _) = ephemeral().await;
    let (_server, server_addr) = ephemeral().await;

    // Larger than any IPv4 datagram, so the socket write fails.  The second
    // mode reuses the envelope and would be refused if tracking leaked.
    let envelope = Envelope::data(vec![0u8; 70_000]);
    for mode in [SendMode::AckBlocking, SendMode::AckNonBlocking] {
        let result = client.send(&envelope, server_addr, mode).await;
        assert!(
            matches!(result, Err(EndpointError::Transport(_))),
            "{mode:?}: {result:?}"
        );
        assert_eq!(client.pending_count(), 0, "{mode:?}");
        assert_eq!(client.waiting_count(), 0, "{mode:?}");
        assert!(!client.is_pending(&envelope.checksum()), "{mode:?}");
    }
}
