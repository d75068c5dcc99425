//! Simulation configuration.
//!
//! [`SimConfig`] is the whole-run configuration (how many nodes, where they
//! listen, how fast they tick, where they log).  [`NodeConfig`] is the
//! resolved, per-node slice of it that a single [`crate::node::Node`]
//! needs.  Defaults mirror the classic three-machine setup: nodes on
//! `127.0.0.1:21522..=21524`, tick rates drawn from `1..=6`, event draws
//! from `1..=10`.

use std::collections::BTreeMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use thiserror::Error;

/// Identity of a node: an index in `0..N`.
pub type NodeId = usize;

pub const DEFAULT_NODES: usize = 3;
pub const DEFAULT_BASE_PORT: u16 = 21522;
pub const DEFAULT_EVENT_MAX: u32 = 10;
pub const DEFAULT_MIN_TICKS: u32 = 1;
pub const DEFAULT_MAX_TICKS: u32 = 6;
pub const DEFAULT_CONNECT_RETRY: Duration = Duration::from_secs(1);
pub const DEFAULT_STARTUP_GRACE: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("a simulation needs at least one node")]
    NoNodes,
    #[error("tick range {min}..={max} is empty or starts at zero")]
    BadTickRange { min: u32, max: u32 },
    #[error("{given} fixed tick rates given for {nodes} nodes")]
    TickCountMismatch { given: usize, nodes: usize },
    #[error("tick rate must be positive and finite, got {0}")]
    BadTickRate(String),
    #[error("event range upper bound must be at least 1")]
    BadEventRange,
    #[error("base port {base} leaves no room for {nodes} nodes")]
    PortOverflow { base: u16, nodes: usize },
    #[error("node {0} is not part of the endpoint table")]
    UnknownNode(NodeId),
    #[error("a node started on its own needs fixed ports; base port 0 is in-process only")]
    EphemeralSingleNode,
}

// ---------------------------------------------------------------------------
// Endpoint table
// ---------------------------------------------------------------------------

/// Static mapping from node id to listening address, shared by every node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    addrs: BTreeMap<NodeId, SocketAddr>,
}

impl Endpoints {
    /// Node `i` listens on `host:(base_port + i)`.
    ///
    /// A `base_port` of 0 assigns port 0 to every node, which asks the
    /// in-process orchestrator to pick ephemeral ports.
    pub fn sequential(host: IpAddr, base_port: u16, nodes: usize) -> Result<Self, ConfigError> {
        let mut addrs = BTreeMap::new();
        for id in 0..nodes {
            let port = if base_port == 0 {
                0
            } else {
                u16::try_from(id)
                    .ok()
                    .and_then(|offset| base_port.checked_add(offset))
                    .ok_or(ConfigError::PortOverflow {
                        base: base_port,
                        nodes,
                    })?
            };
            addrs.insert(id, SocketAddr::new(host, port));
        }
        Ok(Self { addrs })
    }

    /// Node `i` listens on `addrs[i]`.
    pub fn from_addrs(addrs: impl IntoIterator<Item = SocketAddr>) -> Self {
        Self {
            addrs: addrs.into_iter().enumerate().collect(),
        }
    }

    pub fn get(&self, id: NodeId) -> Option<SocketAddr> {
        self.addrs.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.addrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.addrs.is_empty()
    }

    /// All node ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.addrs.keys().copied()
    }

    /// Every node except `own`, ascending.
    pub fn peers_of(&self, own: NodeId) -> Vec<NodeId> {
        self.ids().filter(|&id| id != own).collect()
    }

    /// True when any node has port 0 and must be bound before the table is usable.
    pub fn is_ephemeral(&self) -> bool {
        self.addrs.values().any(|a| a.port() == 0)
    }
}

// ---------------------------------------------------------------------------
// Tick rates
// ---------------------------------------------------------------------------

/// How each node's ticks-per-second is chosen at start-up.
#[derive(Debug, Clone, PartialEq)]
pub enum TickRate {
    /// Draw a whole number uniformly from `min..=max`.
    Random { min: u32, max: u32 },
    /// Node `i` ticks at `rates[i]`.
    Fixed(Vec<f64>),
}

impl Default for TickRate {
    fn default() -> Self {
        TickRate::Random {
            min: DEFAULT_MIN_TICKS,
            max: DEFAULT_MAX_TICKS,
        }
    }
}

// ---------------------------------------------------------------------------
// SimConfig
// ---------------------------------------------------------------------------

/// Configuration for an entire simulation run.
#[derive(Debug, Clone)]
pub struct SimConfig {
    pub nodes: usize,
    pub host: IpAddr,
    /// Node `i` listens on `base_port + i`; 0 means ephemeral ports.
    pub base_port: u16,
    pub tick_rate: TickRate,
    /// Event draws are uniform over `1..=event_max`.
    pub event_max: u32,
    /// Pause between connection attempts during bring-up.
    pub connect_retry: Duration,
    /// Delay before bring-up so every node can bind its listener first.
    pub startup_grace: Duration,
    pub log_dir: PathBuf,
    /// Log file name is `process<id><log_suffix>.txt`.
    pub log_suffix: String,
    /// Seed for tick-rate and event draws; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            nodes: DEFAULT_NODES,
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: DEFAULT_BASE_PORT,
            tick_rate: TickRate::default(),
            event_max: DEFAULT_EVENT_MAX,
            connect_retry: DEFAULT_CONNECT_RETRY,
            startup_grace: DEFAULT_STARTUP_GRACE,
            log_dir: PathBuf::from("logs"),
            log_suffix: "LOG".to_string(),
            seed: None,
        }
    }
}

impl SimConfig {
    /// Check internal consistency before anything is bound.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.nodes == 0 {
            return Err(ConfigError::NoNodes);
        }
        if self.event_max == 0 {
            return Err(ConfigError::BadEventRange);
        }
        match &self.tick_rate {
            TickRate::Random { min, max } if *min == 0 || min > max => {
                return Err(ConfigError::BadTickRange {
                    min: *min,
                    max: *max,
                });
            }
            TickRate::Fixed(rates) => {
                if rates.len() != self.nodes {
                    return Err(ConfigError::TickCountMismatch {
                        given: rates.len(),
                        nodes: self.nodes,
                    });
                }
                if let Some(bad) = rates.iter().find(|r| !r.is_finite() || **r <= 0.0) {
                    return Err(ConfigError::BadTickRate(bad.to_string()));
                }
            }
            TickRate::Random { .. } => {}
        }
        self.endpoints().map(|_| ())
    }

    pub fn endpoints(&self) -> Result<Endpoints, ConfigError> {
        Endpoints::sequential(self.host, self.base_port, self.nodes)
    }

    /// Log file location for node `id`.
    pub fn log_path(&self, id: NodeId) -> PathBuf {
        self.log_dir.join(format!("process{id}{}.txt", self.log_suffix))
    }

    /// Resolve the per-node configuration, drawing its tick rate if needed.
    pub fn node_config(&self, id: NodeId) -> Result<NodeConfig, ConfigError> {
        if id >= self.nodes {
            return Err(ConfigError::UnknownNode(id));
        }
        let mut rng = self.rng_for(id);
        let ticks_per_second = match &self.tick_rate {
            TickRate::Random { min, max } => f64::from(rng.random_range(*min..=*max)),
            TickRate::Fixed(rates) => rates[id],
        };
        Ok(NodeConfig {
            id,
            ticks_per_second,
            event_max: self.event_max,
            connect_retry: self.connect_retry,
            startup_grace: self.startup_grace,
            log_path: self.log_path(id),
            seed: self.seed.map(|s| s.wrapping_add(id as u64)),
        })
    }

    fn rng_for(&self, id: NodeId) -> StdRng {
        match self.seed {
            // Offset so the tick-rate draw does not replay the engine's stream.
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id as u64).rotate_left(17)),
            None => StdRng::from_os_rng(),
        }
    }
}

// ---------------------------------------------------------------------------
// NodeConfig
// ---------------------------------------------------------------------------

/// Everything one node needs, fixed for the life of the run.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub id: NodeId,
    pub ticks_per_second: f64,
    pub event_max: u32,
    pub connect_retry: Duration,
    pub startup_grace: Duration,
    pub log_path: PathBuf,
    pub seed: Option<u64>,
}

impl NodeConfig {
    /// Sleep between two ticks: `1 / ticks_per_second`.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.ticks_per_second)
    }

    /// RNG for this node's event draws.
    pub fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        }
    }
}
