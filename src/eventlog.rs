//! Append-only per-node event log.
//!
//! Every tick of the event engine produces exactly one [`LogEvent`], which
//! [`EventLog`] renders as a single text line and flushes before the next
//! tick starts.  The line format is consumed by [`crate::analysis`], so
//! labels, field order and the `" - "` separators are fixed:
//!
//! ```text
//! ticks per second: 3.0
//! [MESSAGE RECEIVED] | Global Time - 14:02:11.532001 | Queue Length - 0 | Clock Time - 6
//! [MESSAGE(S) SENT] | Global Time - 14:02:11.865320 | Receiver(s) - [0, 2] | Clock Time - 7
//! [INTERNAL] | Global Time - 14:02:12.198711 | No Messages Sent | Clock Time - 8
//! ```

use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;

use chrono::{Local, NaiveTime};
use thiserror::Error;

use crate::config::NodeId;

/// `strftime` pattern for the "Global Time" field.
pub const TIME_FORMAT: &str = "%H:%M:%S%.6f";

const RECEIVED_TAG: &str = "[MESSAGE RECEIVED]";
const SENT_TAG: &str = "[MESSAGE(S) SENT]";
const INTERNAL_TAG: &str = "[INTERNAL]";
const NO_MESSAGES: &str = "No Messages Sent";
const TICKS_PREFIX: &str = "ticks per second:";

// ---------------------------------------------------------------------------
// LogEvent
// ---------------------------------------------------------------------------

/// What happened on one tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// A queued message was consumed; `queue_len` is what remained.
    Received { queue_len: usize },
    /// The clock was sent to every node in `receivers`.
    Sent { receivers: Vec<NodeId> },
    /// No message was processed and none was sent.
    Internal,
}

/// One immutable log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEvent {
    /// Wall-clock time of day at which the event was recorded.
    pub at: NaiveTime,
    pub kind: EventKind,
    /// Logical clock value after the event.
    pub clock: u32,
}

impl LogEvent {
    /// A message-received event stamped with the current local time.
    pub fn received(queue_len: usize, clock: u32) -> Self {
        Self::now(EventKind::Received { queue_len }, clock)
    }

    /// A send event, or an internal event when `receivers` is empty.
    pub fn sent(receivers: Vec<NodeId>, clock: u32) -> Self {
        if receivers.is_empty() {
            Self::internal(clock)
        } else {
            Self::now(EventKind::Sent { receivers }, clock)
        }
    }

    pub fn internal(clock: u32) -> Self {
        Self::now(EventKind::Internal, clock)
    }

    fn now(kind: EventKind, clock: u32) -> Self {
        Self {
            at: Local::now().time(),
            kind,
            clock,
        }
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let at = self.at.format(TIME_FORMAT);
        match &self.kind {
            EventKind::Received { queue_len } => write!(
                f,
                "{RECEIVED_TAG} | Global Time - {at} | Queue Length - {queue_len} | Clock Time - {}",
                self.clock
            ),
            EventKind::Sent { receivers } => write!(
                f,
                "{SENT_TAG} | Global Time - {at} | Receiver(s) - {receivers:?} | Clock Time - {}",
                self.clock
            ),
            EventKind::Internal => write!(
                f,
                "{INTERNAL_TAG} | Global Time - {at} | {NO_MESSAGES} | Clock Time - {}",
                self.clock
            ),
        }
    }
}

/// Errors that can arise when parsing a log line back into a [`LogEvent`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseEventError {
    #[error("expected 4 '|'-separated fields, found {0}")]
    FieldCount(usize),
    #[error("unknown event tag: {0}")]
    UnknownTag(String),
    #[error("field has no ' - ' separator: {0}")]
    MissingValue(String),
    #[error("invalid timestamp: {0}")]
    Timestamp(String),
    #[error("invalid number in field: {0}")]
    Number(String),
}

impl FromStr for LogEvent {
    type Err = ParseEventError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let fields: Vec<&str> = line.trim().split('|').map(str::trim).collect();
        if fields.len() != 4 {
            return Err(ParseEventError::FieldCount(fields.len()));
        }

        let at = parse_time(field_value(fields[1])?)?;
        let clock = field_value(fields[3])?
            .parse()
            .map_err(|_| ParseEventError::Number(fields[3].to_string()))?;

        let kind = match fields[0] {
            RECEIVED_TAG => {
                let queue_len = field_value(fields[2])?
                    .parse()
                    .map_err(|_| ParseEventError::Number(fields[2].to_string()))?;
                EventKind::Received { queue_len }
            }
            SENT_TAG => EventKind::Sent {
                receivers: parse_receivers(field_value(fields[2])?)?,
            },
            INTERNAL_TAG => EventKind::Internal,
            other => return Err(ParseEventError::UnknownTag(other.to_string())),
        };

        Ok(Self { at, kind, clock })
    }
}

/// Parse a "Global Time" value such as `00:00:00.001000`.
pub fn parse_time(s: &str) -> Result<NaiveTime, ParseEventError> {
    NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")
        .map_err(|_| ParseEventError::Timestamp(s.to_string()))
}

/// Everything after the first `" - "` in a field.
fn field_value(field: &str) -> Result<&str, ParseEventError> {
    field
        .split_once(" - ")
        .map(|(_, v)| v.trim())
        .ok_or_else(|| ParseEventError::MissingValue(field.to_string()))
}

/// Parse `[1, 2]` into node ids.
fn parse_receivers(s: &str) -> Result<Vec<NodeId>, ParseEventError> {
    let inner = s
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| ParseEventError::Number(s.to_string()))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(|p| p.parse().map_err(|_| ParseEventError::Number(s.to_string())))
        .collect()
}

/// Render the header line recording the node's tick rate.
pub fn ticks_header(ticks_per_second: f64) -> String {
    // `{:?}` keeps a fractional digit for whole numbers ("3.0").
    format!("{TICKS_PREFIX} {ticks_per_second:?}")
}

/// Parse the header line written by [`ticks_header`].
pub fn parse_ticks_header(line: &str) -> Option<f64> {
    line.trim()
        .strip_prefix(TICKS_PREFIX)?
        .trim()
        .parse()
        .ok()
}

// ---------------------------------------------------------------------------
// EventLog
// ---------------------------------------------------------------------------

/// Line-oriented writer that flushes after every record.
///
/// Generic over the sink so the engine can log into memory in tests.
pub struct EventLog<W: Write> {
    out: W,
    written: u64,
}

impl EventLog<BufWriter<File>> {
    /// Create (or truncate) the log file at `path` and write the header.
    ///
    /// Missing parent directories are created.
    pub fn create(path: &Path, ticks_per_second: f64) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), ticks_per_second)
    }
}

impl<W: Write> EventLog<W> {
    /// Wrap `out` and write the tick-rate header line.
    pub fn new(mut out: W, ticks_per_second: f64) -> io::Result<Self> {
        writeln!(out, "{}", ticks_header(ticks_per_second))?;
        out.flush()?;
        Ok(Self { out, written: 0 })
    }

    /// Append one event and flush it.
    pub fn append(&mut self, event: &LogEvent) -> io::Result<()> {
        writeln!(self.out, "{event}")?;
        self.out.flush()?;
        self.written += 1;
        Ok(())
    }

    /// Number of events appended so far (the header is not counted).
    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn get_ref(&self) -> &W {
        &self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> NaiveTime {
        parse_time(s).unwrap()
    }

    fn event(kind: EventKind, clock: u32) -> LogEvent {
        LogEvent {
            at: at("13:05:09.000250"),
            kind,
            clock,
        }
    }

    #[test]
    fn sent_line_shape() {
        let line = event(EventKind::Sent { receivers: vec![0] }, 3).to_string();
        assert!(line.contains("[MESSAGE(S) SENT]"));
        assert!(line.contains("Receiver(s) - [0]"));
        assert!(line.contains("Clock Time - 3"));
    }

    #[test]
    fn sent_line_lists_all_receivers() {
        let line = event(EventKind::Sent { receivers: vec![1, 2] }, 3).to_string();
        assert_eq!(
            line,
            "[MESSAGE(S) SENT] | Global Time - 13:05:09.000250 | Receiver(s) - [1, 2] | Clock Time - 3"
        );
    }

    #[test]
    fn internal_line_shape() {
        let line = event(EventKind::Internal, 5).to_string();
        assert!(line.contains("[INTERNAL]"));
        assert!(line.contains("No Messages Sent"));
        assert!(line.contains("Clock Time - 5"));
    }

    #[test]
    fn received_line_is_exact() {
        let line = event(EventKind::Received { queue_len: 2 }, 5).to_string();
        assert_eq!(
            line,
            "[MESSAGE RECEIVED] | Global Time - 13:05:09.000250 | Queue Length - 2 | Clock Time - 5"
        );
    }

    #[test]
    fn sent_with_no_receivers_becomes_internal() {
        let e = LogEvent::sent(vec![], 4);
        assert_eq!(e.kind, EventKind::Internal);
        assert_eq!(e.clock, 4);
    }

    #[test]
    fn parse_recovers_every_variant() {
        for e in [
            event(EventKind::Received { queue_len: 3 }, 12),
            event(EventKind::Sent { receivers: vec![0, 2] }, 40),
            event(EventKind::Internal, 1),
        ] {
            assert_eq!(e.to_string().parse::<LogEvent>(), Ok(e));
        }
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!(
            "no pipes here".parse::<LogEvent>(),
            Err(ParseEventError::FieldCount(1))
        );
        assert!(matches!(
            "[BOGUS] | Global Time - 00:00:00.000000 | x - 1 | Clock Time - 1".parse::<LogEvent>(),
            Err(ParseEventError::UnknownTag(_))
        ));
        assert!(matches!(
            "[INTERNAL] | Global Time - 25:99:00.0 | No Messages Sent | Clock Time - 1"
                .parse::<LogEvent>(),
            Err(ParseEventError::Timestamp(_))
        ));
    }

    #[test]
    fn header_keeps_fractional_digit() {
        assert_eq!(ticks_header(3.0), "ticks per second: 3.0");
        assert_eq!(ticks_header(2.5), "ticks per second: 2.5");
        assert_eq!(parse_ticks_header("ticks per second: 3.0"), Some(3.0));
        assert_eq!(parse_ticks_header("[INTERNAL] | ..."), None);
    }

    #[test]
    fn event_log_writes_header_then_lines() {
        let mut log = EventLog::new(Vec::new(), 4.0).unwrap();
        log.append(&event(EventKind::Internal, 2)).unwrap();
        log.append(&event(EventKind::Received { queue_len: 0 }, 9)).unwrap();
        assert_eq!(log.written(), 2);

        let text = String::from_utf8(log.get_ref().clone()).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], "ticks per second: 4.0");
        assert!(lines[1].starts_with("[INTERNAL]"));
        assert!(lines[2].ends_with("Clock Time - 9"));
    }
}
