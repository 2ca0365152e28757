use tokio::{net::TcpStream, sync::mpsc};

use crate::{Connection, ConnectionEvent, ConnectionId};

/// Start an outbound connect without blocking the caller.
///
/// The attempt runs in its own task and reports back through the event
/// channel: [`ConnectionEvent::ConnectSucceeded`] with a running
/// [`Connection`], or [`ConnectionEvent::ConnectFailed`]. The caller is
/// expected to hold the connection in a connecting state until one of the
/// two arrives.
pub fn connect(
    id: ConnectionId,
    host: String,
    port: u16,
    max_line: usize,
    events: mpsc::Sender<ConnectionEvent>,
) {
    tokio::spawn(async move {
        let event = match TcpStream::connect((host.as_str(), port)).await {
            Ok(stream) => {
                let conn = Connection::start(id, stream, max_line, events.clone());
                ConnectionEvent::ConnectSucceeded { id, conn }
            }
            Err(e) => {
                tracing::debug!(%host, port, "Outbound connect failed: {}", e);
                ConnectionEvent::ConnectFailed {
                    id,
                    error: e.into(),
                }
            }
        };
        if events.send(event).await.is_err() {
            tracing::debug!(?id, "Event channel gone while reporting connect result");
        }
    });
}
