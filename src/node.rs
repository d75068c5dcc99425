//! One simulated node: listener + peer links + event engine.
//!
//! # Lifecycle
//!
//! ```text
//!  Node::bind ──▶ listening ──grace──▶ bringing-up ──all peers──▶ running
//!                    │                 (connect_all)              (Engine::run)
//!                    └──────────── accept / read loop ──────────────────┘
//! ```
//!
//! The listener and the engine run as two tasks in a [`JoinSet`]; whichever
//! stops first (always with an error) ends the node, and dropping the set
//! aborts the other.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::{Endpoints, NodeConfig, NodeId};
use crate::engine::Engine;
use crate::eventlog::EventLog;
use crate::listener::Listener;
use crate::peers::PeerLinks;
use crate::queue::MessageQueue;

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

/// Everything that can stop a node.  All variants are fatal.
#[derive(Error, Debug)]
pub enum NodeError {
    #[error("could not bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },
    #[error("accept failed: {0}")]
    Accept(io::Error),
    #[error("send to node {peer} failed: {source}")]
    Send { peer: NodeId, source: io::Error },
    #[error("no outbound link to node {0}")]
    UnknownPeer(NodeId),
    #[error("read from {peer} failed: {source}")]
    Read { peer: SocketAddr, source: io::Error },
    #[error("peer {0} disconnected")]
    PeerDisconnected(SocketAddr),
    #[error("event log write failed: {0}")]
    Log(io::Error),
    #[error("node {0} has no entry in the endpoint table")]
    NoEndpoint(NodeId),
    #[error("node task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

// ---------------------------------------------------------------------------
// Node
// ---------------------------------------------------------------------------

/// A node whose listener is already bound, ready to [`run`](Node::run).
#[derive(Debug)]
pub struct Node {
    config: NodeConfig,
    endpoints: Endpoints,
    listener: Listener,
    queue: MessageQueue,
}

impl Node {
    /// Bind the listener at this node's entry in `endpoints`.
    pub async fn bind(config: NodeConfig, endpoints: Endpoints) -> Result<Self, NodeError> {
        let addr = endpoints
            .get(config.id)
            .ok_or(NodeError::NoEndpoint(config.id))?;
        let queue = MessageQueue::new();
        let listener = Listener::bind(config.id, addr, queue.clone()).await?;
        Ok(Self::from_listener(config, endpoints, listener, queue))
    }

    /// Build a node around a listener that was bound elsewhere.
    ///
    /// `queue` must be the queue the listener feeds.
    pub fn from_listener(
        config: NodeConfig,
        endpoints: Endpoints,
        listener: Listener,
        queue: MessageQueue,
    ) -> Self {
        Self {
            config,
            endpoints,
            listener,
            queue,
        }
    }

    pub fn id(&self) -> NodeId {
        self.config.id
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn local_addr(&self) -> Result<SocketAddr, NodeError> {
        self.listener.local_addr()
    }

    /// Run until the first fatal error.
    pub async fn run(self) -> Result<(), NodeError> {
        let Node {
            config,
            endpoints,
            listener,
            queue,
        } = self;
        let own = config.id;
        log::info!(
            "[node {own}] starting at {} ticks/s, logging to {}",
            config.ticks_per_second,
            config.log_path.display()
        );

        let mut tasks = JoinSet::new();
        tasks.spawn(listener.run());
        tasks.spawn(async move {
            tokio::time::sleep(config.startup_grace).await;
            let links = PeerLinks::connect_all(own, &endpoints, config.connect_retry).await;
            let peers: Vec<NodeId> = links.peers().collect();
            log::info!("[node {own}] bring-up complete, peers {peers:?}");

            let log = EventLog::create(&config.log_path, config.ticks_per_second)
                .map_err(NodeError::Log)?;
            Engine::new(&config, peers, queue, links, log).run().await
        });

        let result = match tasks.join_next().await {
            Some(joined) => joined.unwrap_or_else(|e| Err(NodeError::Task(e))),
            None => Ok(()),
        };
        if let Err(e) = &result {
            log::error!("[node {own}] stopping: {e}");
        }
        result
    }
}
