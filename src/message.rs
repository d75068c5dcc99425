//! Wire format for clock messages.
//!
//! Every message exchanged between peers carries exactly one value: the
//! sender's logical clock at the moment of sending.  There is no header, no
//! sender identity and no sequence number; the fixed width is the only
//! framing.
//!
//! No I/O happens here.
//!
//! # Wire format
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                 Logical Clock (big-endian u32)                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

/// Byte length of one message on the wire.
pub const MESSAGE_LEN: usize = 4;

/// Serialise a clock value into its on-wire representation.
pub fn encode(clock: u32) -> [u8; MESSAGE_LEN] {
    clock.to_be_bytes()
}

/// Parse a clock value from exactly [`MESSAGE_LEN`] bytes.
pub fn decode(bytes: [u8; MESSAGE_LEN]) -> u32 {
    u32::from_be_bytes(bytes)
}
