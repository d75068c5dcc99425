//! Connection reader: one task per accepted peer connection.
//!
//! Reads fixed-width clock messages sequentially and appends each one to the
//! node's [`MessageQueue`].  Because a single task owns the connection,
//! messages from one peer enter the queue in the order the peer sent them.
//!
//! A closed connection (including one closed mid-message) or any read error
//! ends the reader with a fatal [`NodeError`].

use std::io::ErrorKind;
use std::net::SocketAddr;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::config::NodeId;
use crate::message::{self, MESSAGE_LEN};
use crate::node::NodeError;
use crate::queue::MessageQueue;

/// Pump messages from `stream` into `queue` until the connection fails.
///
/// Only returns on error; the `Ok` variant exists so callers can use `?`.
pub async fn read_messages<R>(
    own: NodeId,
    mut stream: R,
    peer: SocketAddr,
    queue: MessageQueue,
) -> Result<(), NodeError>
where
    R: AsyncRead + Unpin,
{
    let mut buf = [0u8; MESSAGE_LEN];
    loop {
        match stream.read_exact(&mut buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                log::warn!("[node {own}] peer {peer} disconnected");
                return Err(NodeError::PeerDisconnected(peer));
            }
            Err(source) => {
                log::warn!("[node {own}] read from {peer} failed: {source}");
                return Err(NodeError::Read { peer, source });
            }
        }
        let clock = message::decode(buf);
        queue.push(clock);
        log::debug!("[node {own}] ← {peer} clock={clock} queued={}", queue.len());
    }
}
