//! The event loop.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::{select, sync::mpsc, time};

use switchboard_link::{
    ConnectionError, ConnectionEvent, ConnectionId, ConnectionIdGenerator, Listener,
    ListenerError, NewConnection,
};

use crate::command::{CommandDispatcher, DispatchOutcome};
use crate::config::Config;
use crate::registry::{ClientConnection, ConnectionState, Registry, RegistryEntry, RegistryError};

const EVENT_QUEUE_LEN: usize = 128;

/// The single thread of control.
///
/// Owns the registry outright; everything that mutates connection state
/// happens on this task, fed by the channels the link layer writes into.
/// New client connections arrive on their own channel and are polled ahead
/// of established-connection events, so an accept can never be starved by
/// a chatty connection.
pub struct Bouncer {
    config: Config,
    registry: Registry,
    dispatcher: CommandDispatcher,
    local_addr: SocketAddr,
    new_conns: mpsc::Receiver<NewConnection>,
    events: mpsc::Receiver<ConnectionEvent>,
    _listener: Listener,
}

impl Bouncer {
    /// Bind the listening socket and assemble the loop. Must be called
    /// from within a tokio runtime. A bind/listen failure here is fatal;
    /// there is no bouncer without its control port.
    pub fn new(config: Config) -> Result<Self, ListenerError> {
        let id_gen = ConnectionIdGenerator::new(1);
        let (new_send, new_recv) = mpsc::channel(EVENT_QUEUE_LEN);
        let (event_send, event_recv) = mpsc::channel(EVENT_QUEUE_LEN);

        let listener = Listener::bind(
            config.listen,
            config.accept_backlog,
            config.max_line_length,
            id_gen.clone(),
            new_send,
            event_send.clone(),
        )?;
        let local_addr = listener.local_addr();

        let registry = Registry::new(config.max_channel_name);
        let dispatcher = CommandDispatcher::new(
            id_gen,
            event_send,
            config.max_line_length,
            config.quit_message.clone(),
        );

        Ok(Self {
            config,
            registry,
            dispatcher,
            local_addr,
            new_conns: new_recv,
            events: event_recv,
            _listener: listener,
        })
    }

    /// The address the control port is actually bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Run until a QUIT command arrives, then close every connection.
    pub async fn run(mut self) {
        tracing::info!("Listening on {}", self.local_addr);

        loop {
            let timeout = time::sleep(Duration::from_secs(self.config.ping_timeout_secs));
            tokio::pin!(timeout);

            let outcome = select! {
                // Service the listener ahead of established connections.
                biased;

                new_conn = self.new_conns.recv() => match new_conn {
                    Some(nc) => {
                        self.accept_client(nc);
                        DispatchOutcome::Continue
                    }
                    None => break,
                },
                event = self.events.recv() => match event {
                    Some(ev) => self.handle_event(ev),
                    None => break,
                },
                _ = &mut timeout => {
                    // Liveness tick; an idle interval is not an error.
                    tracing::trace!("Poll interval elapsed with no events");
                    DispatchOutcome::Continue
                }
            };

            if outcome == DispatchOutcome::Quit {
                break;
            }
        }

        self.shutdown();
    }

    fn accept_client(&mut self, nc: NewConnection) {
        let id = nc.conn.id();
        tracing::info!(addr = %nc.addr, ?id, "New client connection");
        self.registry.register_client(ClientConnection {
            id,
            addr: nc.addr,
            state: ConnectionState::Connected,
            link: nc.conn,
        });
    }

    fn handle_event(&mut self, event: ConnectionEvent) -> DispatchOutcome {
        match event {
            ConnectionEvent::Line { id, line } => match self.registry.get(id) {
                Some(RegistryEntry::Client(_)) => {
                    return self.dispatcher.dispatch(&mut self.registry, id, &line);
                }
                Some(RegistryEntry::Server(_)) => self.server_line(id, &line),
                None => {
                    tracing::trace!(?id, "Line from an unregistered connection dropped");
                }
            },
            ConnectionEvent::Closed { id, error } => self.connection_closed(id, error),
            ConnectionEvent::ConnectSucceeded { id, conn } => {
                self.dispatcher
                    .connect_succeeded(&mut self.registry, id, conn);
            }
            ConnectionEvent::ConnectFailed { id, error } => {
                self.dispatcher.connect_failed(&mut self.registry, id, error);
            }
        }
        DispatchOutcome::Continue
    }

    /// A framed line from an upstream network. Protocol handling above
    /// framing lives outside the core; all we do is surface the traffic
    /// when chat logging is switched on.
    fn server_line(&self, id: ConnectionId, line: &str) {
        if let Some(RegistryEntry::Server(server)) = self.registry.get(id) {
            if server.log_chat {
                tracing::info!(target: "chat", host = %server.host, "{}", line);
            }
        }
    }

    fn connection_closed(&mut self, id: ConnectionId, error: ConnectionError) {
        match self.registry.unregister(id) {
            Ok(()) => tracing::info!(?id, %error, "Connection closed"),
            // Expected when we initiated the close; the task's final event
            // arrives after the entry is gone.
            Err(RegistryError::AlreadyClosed) => {
                tracing::trace!(?id, "Close event for an already-closed connection");
            }
            Err(e) => tracing::trace!(?id, %e, "Close event for an unknown connection"),
        }
    }

    fn shutdown(&mut self) {
        tracing::info!("Shutting down; closing all connections");
        for id in self.registry.all_ids() {
            if let Err(e) = self.registry.unregister(id) {
                tracing::debug!(?id, %e, "Error closing connection at shutdown");
            }
        }
    }
}
