//! In-process orchestrator.
//!
//! Binds every node's listener up front, then runs all nodes as tasks in one
//! [`JoinSet`].  The run is all-or-nothing: the first node to fail aborts
//! every other node and the failure is returned to the caller, because a
//! broken link leaves the remaining clocks meaningless.
//!
//! Binding before running means a `base_port` of 0 works: each listener gets
//! an ephemeral port and every node is handed the resolved endpoint table.

use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinSet;

use crate::config::{ConfigError, Endpoints, NodeId, SimConfig};
use crate::listener::Listener;
use crate::node::{Node, NodeError};
use crate::queue::MessageQueue;

#[derive(Error, Debug)]
pub enum SimulationError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("node {node} failed: {source}")]
    NodeFailed {
        node: NodeId,
        #[source]
        source: NodeError,
    },
    #[error("node task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

/// A set of bound nodes that share one fate.
#[derive(Debug)]
pub struct Simulation {
    nodes: Vec<Node>,
    endpoints: Endpoints,
}

impl Simulation {
    /// Bind every node described by `config` in this process.
    pub async fn bind(config: &SimConfig) -> Result<Self, SimulationError> {
        config.validate()?;
        let table = config.endpoints()?;

        let mut bound = Vec::with_capacity(config.nodes);
        for id in table.ids() {
            let addr = table.get(id).ok_or(ConfigError::UnknownNode(id))?;
            let queue = MessageQueue::new();
            let listener = Listener::bind(id, addr, queue.clone())
                .await
                .map_err(|source| SimulationError::NodeFailed { node: id, source })?;
            bound.push((id, listener, queue));
        }

        // Publish the real ports, which differ from the table when it asked for port 0.
        let mut addrs = Vec::with_capacity(bound.len());
        for (id, listener, _) in &bound {
            let addr = listener
                .local_addr()
                .map_err(|source| SimulationError::NodeFailed { node: *id, source })?;
            addrs.push(addr);
        }
        let endpoints = Endpoints::from_addrs(addrs);

        let mut nodes = Vec::with_capacity(bound.len());
        for (id, listener, queue) in bound {
            let node_config = config.node_config(id)?;
            nodes.push(Node::from_listener(node_config, endpoints.clone(), listener, queue));
        }
        Ok(Self { nodes, endpoints })
    }

    /// Bind only node `id`, for deployments that run one node per process.
    pub async fn bind_one(config: &SimConfig, id: NodeId) -> Result<Self, SimulationError> {
        config.validate()?;
        let endpoints = config.endpoints()?;
        if endpoints.is_ephemeral() {
            return Err(ConfigError::EphemeralSingleNode.into());
        }
        let node = Node::bind(config.node_config(id)?, endpoints.clone())
            .await
            .map_err(|source| SimulationError::NodeFailed { node: id, source })?;
        Ok(Self {
            nodes: vec![node],
            endpoints,
        })
    }

    /// Run an explicit set of nodes that all use `endpoints`.
    pub fn from_nodes(nodes: Vec<Node>, endpoints: Endpoints) -> Self {
        Self { nodes, endpoints }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// The resolved endpoint table every node was given.
    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    /// Run all nodes until one fails or `limit` elapses.
    ///
    /// `Ok(())` means the time limit was reached (or there were no nodes);
    /// without a limit the only way out is a node failure.
    pub async fn run(self, limit: Option<Duration>) -> Result<(), SimulationError> {
        let mut tasks = JoinSet::new();
        for node in self.nodes {
            let id = node.id();
            tasks.spawn(async move { (id, node.run().await) });
        }
        log::info!("[sim] running {} node(s)", tasks.len());

        let deadline = async {
            match limit {
                Some(d) => tokio::time::sleep(d).await,
                None => std::future::pending::<()>().await,
            }
        };
        tokio::pin!(deadline);

        let result = loop {
            tokio::select! {
                joined = tasks.join_next() => match joined {
                    None => break Ok(()),
                    Some(Ok((_, Ok(())))) => continue,
                    Some(Ok((node, Err(source)))) => {
                        log::error!("[sim] node {node} failed, terminating the run: {source}");
                        break Err(SimulationError::NodeFailed { node, source });
                    }
                    Some(Err(e)) => break Err(SimulationError::Task(e)),
                },
                _ = &mut deadline => {
                    log::info!("[sim] time limit reached; stopping all nodes");
                    break Ok(());
                }
            }
        };

        tasks.shutdown().await;
        result
    }
}
