//! Event engine: the per-node tick loop.
//!
//! # Tick
//!
//! ```text
//!            sleep(1 / ticks_per_second)
//!                       │
//!                       ▼
//!              queue non-empty? ──yes──▶ pop v; clock = max(v, clock) + 1
//!                       │                  log [MESSAGE RECEIVED]
//!                       no
//!                       ▼
//!          draw d uniformly in 1..=event_max
//!          recipients = recipients_for(d)
//!          send clock to each recipient (in order)
//!          clock += 1
//!          log [MESSAGE(S) SENT] or [INTERNAL]
//! ```
//!
//! Receiving always wins over generating: a node never starts new work while
//! messages are waiting.  Exactly one log line is written per tick and it is
//! flushed before the next sleep begins.
//!
//! The engine owns the clock, the RNG and the log writer outright; the only
//! shared state it touches is the [`MessageQueue`].

use std::io::Write;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::Rng;

use crate::clock::LogicalClock;
use crate::config::{NodeConfig, NodeId};
use crate::eventlog::{EventLog, LogEvent};
use crate::node::NodeError;
use crate::peers::PeerSink;
use crate::queue::MessageQueue;

/// Map an event draw to indices into the node's sorted peer list.
///
/// `1` targets the first peer, `2` the second, `3` both; every other value
/// is an internal event.  With a `1..=10` draw that makes sends rare (30%)
/// and internal events common.
pub fn recipients_for(draw: i64) -> &'static [usize] {
    match draw {
        1 => &[0],
        2 => &[1],
        3 => &[0, 1],
        _ => &[],
    }
}

/// The tick loop for one node.
pub struct Engine<S, W>
where
    S: PeerSink,
    W: Write,
{
    own: NodeId,
    clock: LogicalClock,
    /// Other nodes, ascending; `recipients_for` indexes into this.
    peers: Vec<NodeId>,
    queue: MessageQueue,
    sink: S,
    log: EventLog<W>,
    rng: StdRng,
    event_max: u32,
    tick_interval: Duration,
}

impl<S, W> Engine<S, W>
where
    S: PeerSink,
    W: Write + Send,
{
    /// Build the engine for `config.id`; tick rate, event range and RNG
    /// seed come from `config`.
    pub fn new(
        config: &NodeConfig,
        peers: Vec<NodeId>,
        queue: MessageQueue,
        sink: S,
        log: EventLog<W>,
    ) -> Self {
        Self {
            own: config.id,
            clock: LogicalClock::default(),
            peers,
            queue,
            sink,
            log,
            rng: config.rng(),
            event_max: config.event_max,
            tick_interval: config.tick_interval(),
        }
    }

    #[cfg(test)]
    fn with_clock(mut self, clock: u32) -> Self {
        self.clock = LogicalClock::new(clock);
        self
    }

    #[cfg(test)]
    fn clock(&self) -> u32 {
        self.clock.value()
    }

    #[cfg(test)]
    fn log(&self) -> &EventLog<W> {
        &self.log
    }

    #[cfg(test)]
    fn sink(&self) -> &S {
        &self.sink
    }

    /// Tick forever.  Returns only when a send or log write fails.
    pub async fn run(mut self) -> Result<(), NodeError> {
        log::info!(
            "[node {}] ticking every {:?} with peers {:?}",
            self.own,
            self.tick_interval,
            self.peers
        );
        loop {
            tokio::time::sleep(self.tick_interval).await;
            self.tick().await?;
        }
    }

    /// Run exactly one tick and return the event it logged.
    pub async fn tick(&mut self) -> Result<LogEvent, NodeError> {
        let event = match self.queue.pop() {
            Some((received, remaining)) => self.handle_receipt(received, remaining),
            None => {
                let draw = i64::from(self.rng.random_range(1..=self.event_max));
                self.generate(draw).await?
            }
        };
        self.log.append(&event).map_err(NodeError::Log)?;
        log::debug!("[node {}] {event}", self.own);
        Ok(event)
    }

    /// Message-received branch: merge the head of the queue into the clock.
    fn handle_receipt(&mut self, received: u32, remaining: usize) -> LogEvent {
        let clock = self.clock.observe(received);
        LogEvent::received(remaining, clock)
    }

    /// Event-generation branch for a given draw.
    ///
    /// Every recipient receives the pre-increment clock; the clock then
    /// advances once regardless of how many messages went out.
    pub async fn generate(&mut self, draw: i64) -> Result<LogEvent, NodeError> {
        let receivers: Vec<NodeId> = recipients_for(draw)
            .iter()
            .filter_map(|&i| self.peers.get(i).copied())
            .collect();

        let stamp = self.clock.value();
        for &peer in &receivers {
            if let Err(e) = self.sink.send(peer, stamp).await {
                log::error!("[node {}] send to {peer} failed: {e}", self.own);
                return Err(e);
            }
        }

        let clock = self.clock.tick();
        Ok(LogEvent::sent(receivers, clock))
    }
}
