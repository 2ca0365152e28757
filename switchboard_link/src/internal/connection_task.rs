use tokio::{
    io::{AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::TcpStream,
    select,
    sync::mpsc,
};

use crate::{
    connection::ConnectionControl, ConnectionError, ConnectionEvent, ConnectionId, LineBuffer,
};

const READ_CHUNK: usize = 4096;

/// Drives one socket: reads are framed through the line buffer and emitted
/// as [`ConnectionEvent::Line`]; queued control messages are written out.
/// The task exits on EOF, I/O error, framing error, or an explicit close,
/// and always emits a final [`ConnectionEvent::Closed`].
pub(crate) struct ConnectionTask {
    id: ConnectionId,
    stream: TcpStream,
    line_buf: LineBuffer,
    control: mpsc::UnboundedReceiver<ConnectionControl>,
    events: mpsc::Sender<ConnectionEvent>,
}

impl ConnectionTask {
    pub fn new(
        id: ConnectionId,
        stream: TcpStream,
        line_buf: LineBuffer,
        control: mpsc::UnboundedReceiver<ConnectionControl>,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Self {
        Self {
            id,
            stream,
            line_buf,
            control,
            events,
        }
    }

    pub async fn run(mut self) {
        let (mut reader, mut writer) = self.stream.split();
        let mut read_buf = [0u8; READ_CHUNK];

        let error = 'conn: loop {
            select! {
                control = self.control.recv() => match control {
                    None | Some(ConnectionControl::Close) => {
                        break 'conn ConnectionError::Closed;
                    }
                    Some(ConnectionControl::Send(line)) => {
                        if let Err(e) = Self::write_line(&mut writer, &line).await {
                            break 'conn e.into();
                        }
                    }
                },
                read = reader.read(&mut read_buf) => match read {
                    Ok(0) => {
                        break 'conn ConnectionError::Closed;
                    }
                    Ok(n) => {
                        self.line_buf.feed(&read_buf[..n]);
                        loop {
                            match self.line_buf.next_line() {
                                Ok(Some(line)) => {
                                    let event = ConnectionEvent::Line { id: self.id, line };
                                    if self.events.send(event).await.is_err() {
                                        // Nobody is listening any more.
                                        return;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => break 'conn e.into(),
                            }
                        }
                    }
                    Err(e) => {
                        break 'conn e.into();
                    }
                },
            }
        };

        tracing::debug!(id = ?self.id, %error, "Closing connection");
        let closed = ConnectionEvent::Closed {
            id: self.id,
            error,
        };
        if self.events.send(closed).await.is_err() {
            tracing::debug!(id = ?self.id, "Event channel gone while reporting close");
        }
    }

    async fn write_line(
        writer: &mut (impl AsyncWrite + Unpin),
        line: &str,
    ) -> std::io::Result<()> {
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\r\n").await
    }
}
