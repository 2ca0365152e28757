use std::net::SocketAddr;

use socket2::{Domain, Protocol, Socket, Type};
use tokio::{net::TcpListener, select, sync::mpsc};

use crate::{
    Connection, ConnectionEvent, ConnectionIdGenerator, ListenerError, NewConnection,
};

#[derive(Debug)]
enum ListenerControl {
    Close,
}

/// The bouncer's listening socket.
///
/// Accepting runs in its own task; each accepted socket gets a connection
/// task, and the resulting [`NewConnection`] is delivered on the dedicated
/// new-connection channel. A failed accept is logged and accepting
/// continues. Dropping the handle stops the task.
pub struct Listener {
    local_addr: SocketAddr,
    control: mpsc::UnboundedSender<ListenerControl>,
}

impl Listener {
    /// Bind and listen on `address` with the given accept backlog, then
    /// start the accept task.
    pub fn bind(
        address: SocketAddr,
        backlog: i32,
        max_line: usize,
        id_gen: ConnectionIdGenerator,
        new_conns: mpsc::Sender<NewConnection>,
        events: mpsc::Sender<ConnectionEvent>,
    ) -> Result<Self, ListenerError> {
        let socket = Socket::new(Domain::for_address(address), Type::STREAM, Some(Protocol::TCP))?;
        socket.set_reuse_address(true)?;
        socket.set_nonblocking(true)?;
        socket.bind(&address.into())?;
        socket.listen(backlog)?;

        let listener = TcpListener::from_std(socket.into())?;
        let local_addr = listener.local_addr()?;

        let (control_send, control_recv) = mpsc::unbounded_channel();
        tokio::spawn(Self::accept_loop(
            listener,
            control_recv,
            max_line,
            id_gen,
            new_conns,
            events,
        ));

        Ok(Self {
            local_addr,
            control: control_send,
        })
    }

    /// The address actually bound, which differs from the configured one
    /// when port 0 was requested.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn accept_loop(
        listener: TcpListener,
        mut control: mpsc::UnboundedReceiver<ListenerControl>,
        max_line: usize,
        id_gen: ConnectionIdGenerator,
        new_conns: mpsc::Sender<NewConnection>,
        events: mpsc::Sender<ConnectionEvent>,
    ) {
        loop {
            select! {
                res = listener.accept() => match res {
                    Ok((stream, addr)) => {
                        let id = id_gen.next();
                        let conn = Connection::start(id, stream, max_line, events.clone());
                        if new_conns.send(NewConnection { conn, addr }).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        // Transient resource exhaustion must not kill the
                        // accept loop.
                        tracing::error!("Error accepting connection: {}", e);
                    }
                },
                msg = control.recv() => match msg {
                    None | Some(ListenerControl::Close) => break,
                },
            }
        }
        tracing::debug!("Listener task exiting");
    }
}

impl Drop for Listener {
    fn drop(&mut self) {
        let _ = self.control.send(ListenerControl::Close);
    }
}
