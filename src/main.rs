//! Entry point for `lamport-sim`.
//!
//! Parses CLI arguments and dispatches into either **run** or **analyze**
//! mode.  All simulation work is delegated to library modules; `main.rs`
//! owns only process setup (logging, signal handling, argument parsing).

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use lamport_sim::analysis::{self, NodeLog};
use lamport_sim::config::{self, SimConfig, TickRate};
use lamport_sim::{NodeId, Simulation};

/// Simulate nodes with independent clock rates exchanging Lamport timestamps.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Run the simulation (all nodes in this process, or one with --only).
    Run {
        /// Number of nodes.
        #[arg(short, long, default_value_t = config::DEFAULT_NODES)]
        nodes: usize,
        /// Address every node listens on.
        #[arg(long, default_value = "127.0.0.1")]
        host: IpAddr,
        /// Node i listens on base-port + i; 0 picks ephemeral ports.
        #[arg(short = 'p', long, default_value_t = config::DEFAULT_BASE_PORT)]
        base_port: u16,
        /// Smallest randomly drawn ticks per second.
        #[arg(long, default_value_t = config::DEFAULT_MIN_TICKS)]
        min_ticks: u32,
        /// Largest randomly drawn ticks per second.
        #[arg(long, default_value_t = config::DEFAULT_MAX_TICKS)]
        max_ticks: u32,
        /// Fixed ticks per second, one per node (overrides the random range).
        #[arg(long = "ticks", num_args = 1.., value_delimiter = ',')]
        ticks: Vec<f64>,
        /// Events are drawn uniformly from 1..=event-max.
        #[arg(long, default_value_t = config::DEFAULT_EVENT_MAX)]
        event_max: u32,
        /// Milliseconds between connection attempts during bring-up.
        #[arg(long, default_value_t = 1000)]
        connect_retry_ms: u64,
        /// Milliseconds to wait before bring-up.
        #[arg(long, default_value_t = 1000)]
        grace_ms: u64,
        /// Directory for the per-node logs.
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,
        /// Log files are named process<id><suffix>.txt.
        #[arg(long, default_value = "LOG")]
        log_suffix: String,
        /// Stop after this many seconds (default: run until Ctrl-C or failure).
        #[arg(short, long)]
        duration_secs: Option<u64>,
        /// Seed for reproducible tick rates and event draws.
        #[arg(long)]
        seed: Option<u64>,
        /// Run only this node; the others must be started separately.
        #[arg(long)]
        only: Option<NodeId>,
    },
    /// Parse the logs of a finished run and print clock and queue series.
    Analyze {
        /// Number of nodes whose logs to read.
        #[arg(short, long, default_value_t = config::DEFAULT_NODES)]
        nodes: usize,
        /// Directory holding the per-node logs.
        #[arg(long, default_value = "logs")]
        log_dir: PathBuf,
        /// Log files are named process<id><suffix>.txt.
        #[arg(long, default_value = "LOG")]
        log_suffix: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialise env_logger; set RUST_LOG to control verbosity.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let cli = Cli::parse();

    let result = match cli.mode {
        Mode::Run {
            nodes,
            host,
            base_port,
            min_ticks,
            max_ticks,
            ticks,
            event_max,
            connect_retry_ms,
            grace_ms,
            log_dir,
            log_suffix,
            duration_secs,
            seed,
            only,
        } => {
            let tick_rate = if ticks.is_empty() {
                TickRate::Random {
                    min: min_ticks,
                    max: max_ticks,
                }
            } else {
                TickRate::Fixed(ticks)
            };
            let config = SimConfig {
                nodes,
                host,
                base_port,
                tick_rate,
                event_max,
                connect_retry: Duration::from_millis(connect_retry_ms),
                startup_grace: Duration::from_millis(grace_ms),
                log_dir,
                log_suffix,
                seed,
            };
            run(config, only, duration_secs.map(Duration::from_secs)).await
        }
        Mode::Analyze {
            nodes,
            log_dir,
            log_suffix,
        } => analyze(&log_dir, &log_suffix, nodes),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: SimConfig, only: Option<NodeId>, limit: Option<Duration>) -> Result<()> {
    let sim = match only {
        Some(id) => Simulation::bind_one(&config, id).await,
        None => Simulation::bind(&config).await,
    }
    .context("failed to start simulation")?;

    for node in sim.nodes() {
        log::info!(
            "node {} at {} ticking {} times per second",
            node.id(),
            sim.endpoints()
                .get(node.id())
                .map_or_else(|| "?".to_string(), |a| a.to_string()),
            node.config().ticks_per_second
        );
    }

    tokio::select! {
        result = sim.run(limit) => result.context("simulation aborted"),
        signal = tokio::signal::ctrl_c() => {
            signal.context("failed to listen for Ctrl-C")?;
            log::info!("Ctrl-C received; shutting down");
            Ok(())
        }
    }
}

fn analyze(log_dir: &Path, suffix: &str, nodes: usize) -> Result<()> {
    let mut logs = Vec::with_capacity(nodes);
    for id in 0..nodes {
        let path = log_dir.join(format!("process{id}{suffix}.txt"));
        let log = NodeLog::open(&path).with_context(|| format!("node {id}"))?;
        logs.push(log);
    }

    let start = analysis::global_start(&logs).context("no events recorded in any log")?;
    println!("global start time: {}", start.format(lamport_sim::eventlog::TIME_FORMAT));

    for (id, log) in logs.iter().enumerate() {
        println!();
        println!("# machine {id}, {} ticks/s", log.ticks_per_second);
        println!("seconds,clock");
        for (t, clock) in log.clock_updates(start) {
            println!("{t:.6},{clock}");
        }
        println!("seconds,queue_length");
        for (t, len) in log.queue_lengths(start) {
            println!("{t:.6},{len}");
        }
    }
    Ok(())
}
