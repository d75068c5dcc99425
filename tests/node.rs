//! Integration tests for a single node.
//!
//! Node 0 is real; its only peer, node 1, is played by the test through a
//! plain loopback listener and stream.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use lamport_sim::config::{Endpoints, NodeConfig};
use lamport_sim::{message, EventKind, LogEvent, Node, NodeError};
use tempfile::TempDir;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;

fn node_config(dir: &TempDir) -> NodeConfig {
    NodeConfig {
        id: 0,
        ticks_per_second: 50.0,
        event_max: 10,
        connect_retry: Duration::from_millis(20),
        startup_grace: Duration::ZERO,
        log_path: dir.path().join("process0LOG.txt"),
        seed: Some(3),
    }
}

/// Bind node 0 and a stand-in for node 1; returns the node, its address and node 1's listener.
async fn pair(config: NodeConfig) -> (Node, SocketAddr, TcpListener) {
    let peer = TcpListener::bind("127.0.0.1:0").await.expect("bind peer");
    let reserved = TcpListener::bind("127.0.0.1:0").await.expect("reserve");
    let own_addr = reserved.local_addr().unwrap();
    drop(reserved);

    let endpoints = Endpoints::from_addrs([own_addr, peer.local_addr().unwrap()]);
    let node = Node::bind(config, endpoints).await.expect("bind node");
    let addr = node.local_addr().unwrap();
    (node, addr, peer)
}

fn logged_events(path: &Path) -> Vec<LogEvent> {
    std::fs::read_to_string(path)
        .unwrap_or_default()
        .lines()
        .skip(1)
        .filter_map(|l| l.parse().ok())
        .collect()
}

// ---------------------------------------------------------------------------
// Test 1: node sends increasing stamps and folds in a received clock
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_node_exchanges_clocks_with_peer() {
    let dir = TempDir::new().unwrap();
    let config = node_config(&dir);
    let log_path = config.log_path.clone();
    let (node, addr, peer) = pair(config).await;
    let task = tokio::spawn(node.run());

    let (mut inbound, _) = timeout(Duration::from_secs(5), peer.accept())
        .await
        .expect("node never connected")
        .unwrap();

    // Outgoing stamps are pre-increment clocks, so consecutive ones strictly increase.
    let mut buf = [0u8; message::MESSAGE_LEN];
    timeout(Duration::from_secs(5), inbound.read_exact(&mut buf))
        .await
        .expect("no message from node")
        .unwrap();
    let first = message::decode(buf);
    timeout(Duration::from_secs(5), inbound.read_exact(&mut buf))
        .await
        .expect("no second message from node")
        .unwrap();
    assert!(message::decode(buf) > first);

    let mut outbound = TcpStream::connect(addr).await.expect("connect to node");
    outbound.write_all(&message::encode(10_000)).await.unwrap();

    let received = timeout(Duration::from_secs(5), async {
        loop {
            let hit = logged_events(&log_path)
                .into_iter()
                .find(|e| matches!(e.kind, EventKind::Received { .. }));
            if let Some(event) = hit {
                return event;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("receipt never logged");

    assert_eq!(received.kind, EventKind::Received { queue_len: 0 });
    assert_eq!(received.clock, 10_001);
    assert!(!task.is_finished());

    task.abort();
}

// ---------------------------------------------------------------------------
// Test 2: losing the inbound link from a peer stops the node
// ---------------------------------------------------------------------------

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_node_stops_when_peer_disconnects() {
    let dir = TempDir::new().unwrap();
    let config = node_config(&dir);
    let (node, addr, peer) = pair(config).await;
    let task = tokio::spawn(node.run());

    let (_inbound, _) = peer.accept().await.expect("accept");
    let outbound = TcpStream::connect(addr).await.expect("connect to node");
    tokio::time::sleep(Duration::from_millis(100)).await;
    drop(outbound);

    let result = timeout(Duration::from_secs(5), task)
        .await
        .expect("node kept running")
        .expect("node panicked");
    assert!(matches!(result, Err(NodeError::PeerDisconnected(_))));
}

// ---------------------------------------------------------------------------
// Test 3: a node whose id is missing from the table cannot bind
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_node_without_endpoint_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut config = node_config(&dir);
    config.id = 4;
    let endpoints = Endpoints::from_addrs(["127.0.0.1:0".parse().unwrap()]);
    assert!(matches!(
        Node::bind(config, endpoints).await,
        Err(NodeError::NoEndpoint(4))
    ));
}
