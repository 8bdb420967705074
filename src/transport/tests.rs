//! Transport Module Tests
//!
//! ## Test Scopes
//! - **Memory**: fault rules (drop, delay, disconnect) and frame counters.
//! - **UDP**: loopback datagrams and the datagram size limit.
//! - **HTTP**: the frame endpoint and a full POST over loopback.
//! - **Hybrid**: routing by encoded size.

#[cfg(test)]
mod tests {
    use crate::error::TransportError;
    use crate::membership::directory::NodeDirectory;
    use crate::membership::types::{Node, NodeId};
    use crate::protocol::types::{Envelope, Frame, FrameKind, Reply};
    use crate::transport::http::{HttpTransport, frame_routes, handle_frame};
    use crate::transport::hybrid::HybridTransport;
    use crate::transport::memory::MemoryNetwork;
    use crate::transport::types::{Reliability, Transport};
    use crate::transport::udp::UdpTransport;

    use axum::body::Bytes;
    use axum::extract::Extension;
    use axum::http::StatusCode;
    use std::net::SocketAddr;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn ack_ack(from: &str, task_num: u64) -> Envelope {
        Envelope {
            from: NodeId::from(from),
            frame: Frame::AckAck { task_num },
        }
    }

    fn big_ack(from: &str, size: usize) -> Envelope {
        Envelope {
            from: NodeId::from(from),
            frame: Frame::Ack {
                task_num: 1,
                reply: Reply::Done(vec![7u8; size]),
            },
        }
    }

    fn loopback() -> SocketAddr {
        "127.0.0.1:0".parse().unwrap()
    }

    // ============================================================
    // MEMORY NETWORK TESTS
    // ============================================================

    #[tokio::test]
    async fn test_memory_delivers_and_reports_reliability() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = network.attach(NodeId::from("a"), Reliability::Unreliable);
        let (_b, mut b_rx) = network.attach(NodeId::from("b"), Reliability::ReliableStream);

        let reliability = a.send(&NodeId::from("b"), &ack_ack("a", 1)).await.unwrap();

        assert_eq!(reliability, Reliability::Unreliable);
        assert_eq!(b_rx.recv().await.unwrap(), ack_ack("a", 1));
        assert_eq!(network.sent_count(FrameKind::AckAck), 1);
        assert_eq!(a.local(), &NodeId::from("a"));
    }

    #[tokio::test]
    async fn test_memory_drops_only_the_requested_count() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = network.attach(NodeId::from("a"), Reliability::Unreliable);
        let (_b, mut b_rx) = network.attach(NodeId::from("b"), Reliability::Unreliable);
        network.drop_frames(FrameKind::AckAck, Some(2));

        for task_num in 1..=3 {
            a.send(&NodeId::from("b"), &ack_ack("a", task_num)).await.unwrap();
        }

        assert_eq!(b_rx.recv().await.unwrap(), ack_ack("a", 3));
        assert!(b_rx.try_recv().is_err());
        assert_eq!(network.sent_count(FrameKind::AckAck), 3);
        assert_eq!(network.dropped_count(FrameKind::AckAck), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_memory_delay_holds_frames_back() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = network.attach(NodeId::from("a"), Reliability::ReliableStream);
        let (_b, mut b_rx) = network.attach(NodeId::from("b"), Reliability::ReliableStream);
        network.delay_frames(FrameKind::AckAck, Duration::from_millis(300), None);

        a.send(&NodeId::from("b"), &ack_ack("a", 1)).await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(b_rx.try_recv().is_err(), "frame arrived before its delay");
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(b_rx.try_recv().unwrap(), ack_ack("a", 1));

        network.clear_faults();
        a.send(&NodeId::from("b"), &ack_ack("a", 2)).await.unwrap();
        assert_eq!(b_rx.try_recv().unwrap(), ack_ack("a", 2));
    }

    #[tokio::test]
    async fn test_memory_disconnected_node_is_link_down() {
        let network = MemoryNetwork::new();
        let (a, _a_rx) = network.attach(NodeId::from("a"), Reliability::Unreliable);
        let (_b, _b_rx) = network.attach(NodeId::from("b"), Reliability::Unreliable);
        network.disconnect(&NodeId::from("b"));

        let err = a.send(&NodeId::from("b"), &ack_ack("a", 1)).await.unwrap_err();

        assert!(matches!(err, TransportError::LinkDown(id) if id == NodeId::from("b")));
    }

    // ============================================================
    // UDP TESTS
    // ============================================================

    async fn udp_pair() -> (Arc<UdpTransport>, Arc<UdpTransport>, mpsc::UnboundedReceiver<Envelope>) {
        let directory = NodeDirectory::new(Node::from_bind(NodeId::from("a"), loopback()), vec![]);
        let a = UdpTransport::bind(loopback(), directory.clone()).await.unwrap();
        let b = UdpTransport::bind(loopback(), directory.clone()).await.unwrap();
        directory.upsert(Node::from_bind(NodeId::from("b"), b.local_addr().unwrap()));

        let (tx, rx) = mpsc::unbounded_channel();
        b.spawn_receiver(tx);
        (a, b, rx)
    }

    #[tokio::test]
    async fn test_udp_loopback_round_trip() {
        let (a, _b, mut rx) = udp_pair().await;

        let reliability = a.send(&NodeId::from("b"), &ack_ack("a", 42)).await.unwrap();
        let received = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();

        assert_eq!(reliability, Reliability::Unreliable);
        assert_eq!(received, ack_ack("a", 42));
    }

    #[tokio::test]
    async fn test_udp_rejects_oversized_frames() {
        let (a, _b, _rx) = udp_pair().await;

        let err = a.send(&NodeId::from("b"), &big_ack("a", 70_000)).await.unwrap_err();

        assert!(matches!(err, TransportError::FrameTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_udp_unknown_target() {
        let (a, _b, _rx) = udp_pair().await;

        let err = a.send(&NodeId::from("nobody"), &ack_ack("a", 1)).await.unwrap_err();

        assert!(matches!(err, TransportError::UnknownNode(_)));
    }

    // ============================================================
    // HTTP TESTS
    // ============================================================

    #[tokio::test]
    async fn test_frame_endpoint_accepts_valid_envelope() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let body = Bytes::from(bincode::serialize(&ack_ack("a", 5)).unwrap());

        let status = handle_frame(Extension(tx), body).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(rx.recv().await.unwrap(), ack_ack("a", 5));
    }

    #[tokio::test]
    async fn test_frame_endpoint_rejects_garbage() {
        let (tx, _rx) = mpsc::unbounded_channel();

        let status = handle_frame(Extension(tx), Bytes::from_static(&[0xff, 0x01])).await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_frame_endpoint_with_closed_inbox() {
        let (tx, rx) = mpsc::unbounded_channel();
        drop(rx);
        let body = Bytes::from(bincode::serialize(&ack_ack("a", 5)).unwrap());

        let status = handle_frame(Extension(tx), body).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    /// Serves the frame endpoint on loopback and returns its address.
    async fn serve_frames() -> (SocketAddr, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let listener = tokio::net::TcpListener::bind(loopback()).await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, frame_routes(tx)).await.unwrap();
        });
        (addr, rx)
    }

    #[tokio::test]
    async fn test_http_post_reaches_inbox() {
        let (http_addr, mut rx) = serve_frames().await;
        let directory = NodeDirectory::new(Node::from_bind(NodeId::from("a"), loopback()), vec![]);
        directory.upsert(Node::new(NodeId::from("b"), loopback(), http_addr));
        let transport = HttpTransport::new(directory, Duration::from_secs(2));

        let reliability = transport
            .send(&NodeId::from("b"), &big_ack("a", 10_000))
            .await
            .unwrap();

        assert_eq!(reliability, Reliability::ReliableStream);
        assert_eq!(rx.recv().await.unwrap(), big_ack("a", 10_000));
    }

    // ============================================================
    // HYBRID TESTS
    // ============================================================

    #[tokio::test]
    async fn test_hybrid_routes_by_size() {
        // ARRANGE: node b receives datagrams and stream frames on separate inboxes.
        let (http_addr, mut http_rx) = serve_frames().await;
        let directory = NodeDirectory::new(Node::from_bind(NodeId::from("a"), loopback()), vec![]);
        let udp_a = UdpTransport::bind(loopback(), directory.clone()).await.unwrap();
        let udp_b = UdpTransport::bind(loopback(), directory.clone()).await.unwrap();
        directory.upsert(Node::new(NodeId::from("b"), udp_b.local_addr().unwrap(), http_addr));
        let (udp_tx, mut udp_rx) = mpsc::unbounded_channel();
        udp_b.spawn_receiver(udp_tx);

        let http = HttpTransport::new(directory.clone(), Duration::from_secs(2));
        let hybrid = HybridTransport::new(udp_a, http, 1400);

        // ACT
        let small = hybrid.send(&NodeId::from("b"), &ack_ack("a", 1)).await.unwrap();
        let large = hybrid.send(&NodeId::from("b"), &big_ack("a", 4000)).await.unwrap();

        // ASSERT
        assert_eq!(small, Reliability::Unreliable);
        assert_eq!(large, Reliability::ReliableStream);
        let datagram = tokio::time::timeout(Duration::from_secs(2), udp_rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(datagram, ack_ack("a", 1));
        assert_eq!(http_rx.recv().await.unwrap(), big_ack("a", 4000));
        assert!(hybrid.fits_datagram(1400));
        assert!(!hybrid.fits_datagram(1401));
    }
}
