//! Offline log analysis.
//!
//! Reads the per-node logs written by [`crate::eventlog`] and turns them into
//! time series relative to a common start time:
//! - logical clock value after every event, and
//! - remaining queue length after every message receipt.
//!
//! Times of day only: a run that crosses midnight produces negative offsets.

use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

use chrono::NaiveTime;
use thiserror::Error;

use crate::eventlog::{self, EventKind, LogEvent, ParseEventError};

pub use crate::eventlog::parse_time;

/// Alternate rendering used for compact labels: `HH-MM-SS:ffffff`.
pub const COMPACT_TIME_FORMAT: &str = "%H-%M-%S:%6f";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("could not read {path}: {source}")]
    Io { path: PathBuf, source: io::Error },
    #[error("missing or malformed 'ticks per second' header")]
    MissingHeader,
    #[error("line {line}: {source}")]
    BadLine {
        line: usize,
        #[source]
        source: ParseEventError,
    },
}

/// Render a time of day as `HH-MM-SS:ffffff`.
pub fn format_compact(t: NaiveTime) -> String {
    t.format(COMPACT_TIME_FORMAT).to_string()
}

/// Seconds from `earlier` to `later` (negative if `later` is before).
pub fn elapsed_seconds(later: NaiveTime, earlier: NaiveTime) -> f64 {
    let delta = later - earlier;
    match delta.num_microseconds() {
        Some(us) => us as f64 / 1_000_000.0,
        None => delta.num_milliseconds() as f64 / 1_000.0,
    }
}

/// One node's parsed log.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeLog {
    pub ticks_per_second: f64,
    pub events: Vec<LogEvent>,
}

impl NodeLog {
    /// Parse a full log: header line followed by one event per line.
    ///
    /// Blank lines are skipped; anything else that does not parse is an error.
    pub fn parse<R: BufRead>(reader: R) -> Result<Self, AnalysisError> {
        let mut lines = reader.lines();
        let header = lines
            .next()
            .transpose()
            .map_err(|source| AnalysisError::Io {
                path: PathBuf::new(),
                source,
            })?
            .ok_or(AnalysisError::MissingHeader)?;
        let ticks_per_second =
            eventlog::parse_ticks_header(&header).ok_or(AnalysisError::MissingHeader)?;

        let mut events = Vec::new();
        for (i, line) in lines.enumerate() {
            let line = line.map_err(|source| AnalysisError::Io {
                path: PathBuf::new(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let event = line.parse().map_err(|source| AnalysisError::BadLine {
                line: i + 2,
                source,
            })?;
            events.push(event);
        }
        Ok(Self {
            ticks_per_second,
            events,
        })
    }

    /// Open and parse the log at `path`.
    pub fn open(path: &Path) -> Result<Self, AnalysisError> {
        let file = File::open(path).map_err(|source| AnalysisError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(BufReader::new(file)).map_err(|e| match e {
            AnalysisError::Io { source, .. } => AnalysisError::Io {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    /// Time of the first recorded event.
    pub fn start_time(&self) -> Option<NaiveTime> {
        self.events.first().map(|e| e.at)
    }

    /// `(seconds since start, clock)` for every event.
    pub fn clock_updates(&self, start: NaiveTime) -> Vec<(f64, u32)> {
        self.events
            .iter()
            .map(|e| (elapsed_seconds(e.at, start), e.clock))
            .collect()
    }

    /// `(seconds since start, remaining queue length)` for every receipt.
    pub fn queue_lengths(&self, start: NaiveTime) -> Vec<(f64, usize)> {
        self.events
            .iter()
            .filter_map(|e| match e.kind {
                EventKind::Received { queue_len } => {
                    Some((elapsed_seconds(e.at, start), queue_len))
                }
                _ => None,
            })
            .collect()
    }
}

/// Earliest first-event time across all logs: the run's global start.
pub fn global_start(logs: &[NodeLog]) -> Option<NaiveTime> {
    logs.iter().filter_map(NodeLog::start_time).min()
}
