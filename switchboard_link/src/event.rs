use std::net::SocketAddr;

use crate::{Connection, ConnectionError, ConnectionId};

/// An inbound connection freshly accepted by the listener.
///
/// These arrive on their own channel so the event loop can service the
/// listener ahead of already-established connections.
#[derive(Debug)]
pub struct NewConnection {
    pub conn: Connection,
    pub addr: SocketAddr,
}

/// Events emitted by connection tasks and the outbound connector.
#[derive(Debug)]
pub enum ConnectionEvent {
    /// A complete line was read from the connection.
    Line { id: ConnectionId, line: String },
    /// The connection is gone: EOF, I/O error, framing error, or an
    /// explicit close. The socket is closed by the time this is observed.
    Closed {
        id: ConnectionId,
        error: ConnectionError,
    },
    /// An outbound connect finished; the socket task is already running.
    ConnectSucceeded { id: ConnectionId, conn: Connection },
    /// An outbound connect failed before a socket existed.
    ConnectFailed {
        id: ConnectionId,
        error: ConnectionError,
    },
}
