//! Outbound peer links.
//!
//! During bring-up a node opens one long-lived TCP stream to every other
//! node, in ascending id order, retrying each connect at a fixed interval
//! until the peer's listener is up.  After bring-up the streams are only
//! ever written to, by the event engine, through the [`PeerSink`] trait.
//!
//! ```text
//!   Engine ──send(peer, clock)──▶ PeerLinks ──4 bytes──▶ peer's Listener
//! ```

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

use crate::config::{Endpoints, NodeId};
use crate::message;
use crate::node::NodeError;

/// Destination for the engine's outgoing clock messages.
#[async_trait]
pub trait PeerSink: Send {
    /// Deliver `clock` to `peer`.  Any error is fatal for the run.
    async fn send(&mut self, peer: NodeId, clock: u32) -> Result<(), NodeError>;
}

/// One connected outbound stream per peer.
#[derive(Debug)]
pub struct PeerLinks {
    own: NodeId,
    links: BTreeMap<NodeId, TcpStream>,
}

impl PeerLinks {
    /// Connect to every node in `endpoints` other than `own`.
    ///
    /// Never gives up: a refused connect means the peer is not listening
    /// yet, so the attempt is repeated every `retry` until it succeeds.
    pub async fn connect_all(own: NodeId, endpoints: &Endpoints, retry: Duration) -> Self {
        let mut links = BTreeMap::new();
        for peer in endpoints.peers_of(own) {
            let Some(addr) = endpoints.get(peer) else {
                continue;
            };
            let stream = loop {
                match TcpStream::connect(addr).await {
                    Ok(stream) => break stream,
                    Err(e) => {
                        log::info!(
                            "[node {own}] can't connect to {peer} at {addr} ({e}) - retrying"
                        );
                        tokio::time::sleep(retry).await;
                    }
                }
            };
            if let Err(e) = stream.set_nodelay(true) {
                log::debug!("[node {own}] could not set TCP_NODELAY towards {peer}: {e}");
            }
            log::info!("[node {own}] connected to {peer}");
            links.insert(peer, stream);
        }
        Self { own, links }
    }

    /// Ids of the connected peers, ascending.
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.links.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

#[async_trait]
impl PeerSink for PeerLinks {
    async fn send(&mut self, peer: NodeId, clock: u32) -> Result<(), NodeError> {
        let stream = self
            .links
            .get_mut(&peer)
            .ok_or(NodeError::UnknownPeer(peer))?;
        stream
            .write_all(&message::encode(clock))
            .await
            .map_err(|source| NodeError::Send { peer, source })?;
        log::debug!("[node {}] → {peer} clock={clock}", self.own);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    async fn loopback_listener() -> (TcpListener, SocketAddr) {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().unwrap();
        (listener, addr)
    }

    #[tokio::test]
    async fn connects_to_every_peer_but_self() {
        let (l0, a0) = loopback_listener().await;
        let (_l1, a1) = loopback_listener().await; // own endpoint, never dialled
        let (l2, a2) = loopback_listener().await;
        let endpoints = Endpoints::from_addrs([a0, a1, a2]);

        let links = timeout(
            Duration::from_secs(5),
            PeerLinks::connect_all(1, &endpoints, Duration::from_millis(20)),
        )
        .await
        .expect("bring-up timed out");

        assert_eq!(links.peers().collect::<Vec<_>>(), vec![0, 2]);
        l0.accept().await.expect("peer 0 accept");
        l2.accept().await.expect("peer 2 accept");
    }

    #[tokio::test]
    async fn send_writes_big_endian_clock() {
        let (l0, a0) = loopback_listener().await;
        let (_l1, a1) = loopback_listener().await;
        let endpoints = Endpoints::from_addrs([a0, a1]);

        let mut links = PeerLinks::connect_all(1, &endpoints, Duration::from_millis(20)).await;
        let (mut inbound, _) = l0.accept().await.unwrap();

        links.send(0, 0x0102_0304).await.expect("send");
        links.send(0, 7).await.expect("send");

        let mut buf = [0u8; 8];
        timeout(Duration::from_secs(5), inbound.read_exact(&mut buf))
            .await
            .expect("read timed out")
            .unwrap();
        assert_eq!(buf, [1, 2, 3, 4, 0, 0, 0, 7]);
    }

    #[tokio::test]
    async fn send_to_unknown_peer_is_an_error() {
        let (_l0, a0) = loopback_listener().await;
        let endpoints = Endpoints::from_addrs([a0]);
        let mut links = PeerLinks::connect_all(0, &endpoints, Duration::from_millis(20)).await;
        assert!(links.is_empty());
        assert!(matches!(
            links.send(5, 1).await,
            Err(NodeError::UnknownPeer(5))
        ));
    }

    #[tokio::test]
    async fn retries_until_peer_starts_listening() {
        // Reserve a port, then release it so the first attempts are refused.
        let (reserved, addr) = loopback_listener().await;
        drop(reserved);
        let (_own, own_addr) = loopback_listener().await;
        let endpoints = Endpoints::from_addrs([addr, own_addr]);

        let bring_up = tokio::spawn(async move {
            PeerLinks::connect_all(1, &endpoints, Duration::from_millis(25)).await
        });

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(!bring_up.is_finished(), "connected before the peer was listening");

        let late = TcpListener::bind(addr).await.expect("rebind reserved port");
        let links = timeout(Duration::from_secs(5), bring_up)
            .await
            .expect("bring-up timed out")
            .unwrap();
        assert_eq!(links.len(), 1);
        late.accept().await.unwrap();
    }
}
