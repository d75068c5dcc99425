//! Inbound listener.
//!
//! Accepts connections on the node's endpoint forever and hands each one to
//! a dedicated [`crate::reader`] task.  The reader tasks live in a
//! [`JoinSet`] owned by the listener, so:
//! - the first reader failure becomes the listener's own fatal error, and
//! - dropping the listener (or its `run` future) aborts every reader.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio::task::JoinSet;

use crate::config::NodeId;
use crate::node::NodeError;
use crate::queue::MessageQueue;
use crate::reader::read_messages;

/// A bound TCP listener feeding one node's message queue.
#[derive(Debug)]
pub struct Listener {
    own: NodeId,
    inner: TcpListener,
    queue: MessageQueue,
}

impl Listener {
    /// Bind `addr` for node `own`.
    ///
    /// Port 0 picks an ephemeral port; read it back with [`Listener::local_addr`].
    pub async fn bind(
        own: NodeId,
        addr: SocketAddr,
        queue: MessageQueue,
    ) -> Result<Self, NodeError> {
        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| NodeError::Bind { addr, source })?;
        Ok(Self::from_listener(own, inner, queue))
    }

    /// Wrap an already-bound listener.
    pub fn from_listener(own: NodeId, inner: TcpListener, queue: MessageQueue) -> Self {
        Self { own, inner, queue }
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NodeError> {
        self.inner.local_addr().map_err(NodeError::Accept)
    }

    /// Accept peers until an accept or a reader fails.
    pub async fn run(self) -> Result<(), NodeError> {
        let own = self.own;
        log::info!("[node {own}] listening on {}", self.local_addr()?);

        let mut readers = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.inner.accept() => {
                    let (stream, peer) = accepted.map_err(|e| {
                        log::error!("[node {own}] accept failed: {e}");
                        NodeError::Accept(e)
                    })?;
                    log::info!("[node {own}] accepted connection from {peer}");
                    readers.spawn(read_messages(own, stream, peer, self.queue.clone()));
                }
                Some(finished) = readers.join_next() => {
                    // Readers only stop on failure.
                    finished??;
                }
            }
        }
    }
}
