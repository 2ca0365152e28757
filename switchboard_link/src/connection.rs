use tokio::{net::TcpStream, sync::mpsc};

use crate::{internal::ConnectionTask, ConnectionEvent, ConnectionId, LineBuffer};

/// Control messages accepted by a connection's socket task.
#[derive(Debug)]
pub(crate) enum ConnectionControl {
    Send(String),
    Close,
}

/// Handle to a connection being driven by a socket task.
///
/// Dropping the handle closes the task's control channel, which shuts the
/// socket down; the task still emits a final [`ConnectionEvent::Closed`].
#[derive(Debug)]
pub struct Connection {
    id: ConnectionId,
    control: mpsc::UnboundedSender<ConnectionControl>,
}

impl Connection {
    /// Spawn a socket task for `stream` and return the handle to it.
    pub(crate) fn start(
        id: ConnectionId,
        stream: TcpStream,
        max_line: usize,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        let (control_send, control_recv) = mpsc::unbounded_channel();

        let task = ConnectionTask::new(id, stream, LineBuffer::new(max_line), control_recv, events);
        tokio::spawn(task.run());

        Self {
            id,
            control: control_send,
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.id
    }

    fn send_control(&self, msg: ConnectionControl) {
        if self.control.send(msg).is_err() {
            tracing::debug!(id = ?self.id, "Control message to closed connection dropped");
        }
    }

    /// Queue a line for writing. The task appends the delimiter.
    pub fn send(&self, line: impl Into<String>) {
        self.send_control(ConnectionControl::Send(line.into()));
    }

    /// Ask the socket task to shut down.
    pub fn close(&self) {
        self.send_control(ConnectionControl::Close);
    }
}
