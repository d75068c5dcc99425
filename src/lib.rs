//! `lamport-sim` — independently clocked nodes exchanging Lamport timestamps.
//!
//! # Architecture
//!
//! ```text
//!        peer nodes                         one node
//!  ┌─────────────────┐   4-byte clock   ┌──────────────────────────────────┐
//!  │  PeerLinks ─────┼─────────────────▶│ Listener ──▶ reader task (×N-1)  │
//!  └─────────────────┘                  │                 │ push           │
//!                                       │                 ▼                │
//!                                       │           MessageQueue           │
//!                                       │                 │ pop            │
//!                                       │                 ▼                │
//!  ┌─────────────────┐   4-byte clock   │  Engine (tick loop, clock, log)  │
//!  │ peer Listener ◀─┼──────────────────┼── PeerLinks                      │
//!  └─────────────────┘                  └──────────────────────────────────┘
//! ```
//!
//! Each module has a single responsibility:
//! - [`message`]    — wire format (4-byte big-endian clock)
//! - [`clock`]      — Lamport clock update rules
//! - [`queue`]      — mutex-guarded inbound FIFO shared by readers and engine
//! - [`reader`]     — per-connection read loop
//! - [`listener`]   — accept loop owning the reader tasks
//! - [`peers`]      — outbound links with connect-retry bring-up
//! - [`engine`]     — tick loop: receive, or draw and send/internal
//! - [`eventlog`]   — append-only text log and its line format
//! - [`node`]       — wires one of each together; node error type
//! - [`simulation`] — runs N nodes with shared fate
//! - [`config`]     — endpoint table, tick rates, log naming
//! - [`analysis`]   — parses logs back into clock/queue time series

pub mod analysis;
pub mod clock;
pub mod config;
pub mod engine;
pub mod eventlog;
pub mod listener;
pub mod message;
pub mod node;
pub mod peers;
pub mod queue;
pub mod reader;
pub mod simulation;

pub use clock::LogicalClock;
pub use config::{Endpoints, NodeConfig, NodeId, SimConfig, TickRate};
pub use engine::{recipients_for, Engine};
pub use eventlog::{EventKind, EventLog, LogEvent};
pub use node::{Node, NodeError};
pub use queue::MessageQueue;
pub use simulation::{Simulation, SimulationError};
