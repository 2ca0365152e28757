//! Ownership of every active connection.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;

use thiserror::Error;

use switchboard_link::{Connection, ConnectionId};

use crate::channel_set::ChannelSet;
use crate::conn_list::{ConnArena, ListId, SlotId};

/// Connection lifecycle.
///
/// `Connecting` only occurs for upstream connections, while the outbound
/// connect is in flight. Once `Closing` is entered the connection is torn
/// down and unregistered before the event loop looks at it again; the
/// socket is closed exactly once.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Closing,
    Closed,
}

/// An outbound connection to an IRC network.
#[derive(Debug)]
pub struct ServerConnection {
    pub id: ConnectionId,
    pub host: String,
    pub port: u16,
    pub nick: String,
    pub realname: String,
    pub channels: ChannelSet,
    pub log_chat: bool,
    pub state: ConnectionState,
    /// Absent while the connect is in flight.
    pub link: Option<Connection>,
    /// Control client to answer once the connect resolves.
    pub requested_by: Option<ConnectionId>,
}

/// An inbound connection from a controller.
#[derive(Debug)]
pub struct ClientConnection {
    pub id: ConnectionId,
    pub addr: SocketAddr,
    pub state: ConnectionState,
    pub link: Connection,
}

#[derive(Debug)]
pub enum RegistryEntry {
    Server(ServerConnection),
    Client(ClientConnection),
}

impl RegistryEntry {
    fn set_state(&mut self, state: ConnectionState) {
        match self {
            Self::Server(s) => s.state = state,
            Self::Client(c) => c.state = state,
        }
    }

    fn link(&self) -> Option<&Connection> {
        match self {
            Self::Server(s) => s.link.as_ref(),
            Self::Client(c) => Some(&c.link),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("No such connection")]
    NotFound,
    #[error("Connection is already closed")]
    AlreadyClosed,
    #[error("Connection is not an upstream connection")]
    NotAServer,
}

/// The top-level aggregate: one arena of connections threaded onto the
/// server list and the client list, plus an id index. Exclusively owned by
/// the event loop; nothing here is shared or locked.
pub struct Registry {
    arena: ConnArena<RegistryEntry>,
    servers: ListId,
    clients: ListId,
    by_id: HashMap<ConnectionId, SlotId>,
    closed: HashSet<ConnectionId>,
    max_channel_name: usize,
}

impl Registry {
    pub fn new(max_channel_name: usize) -> Self {
        let mut arena = ConnArena::new();
        let servers = arena.new_list();
        let clients = arena.new_list();
        Self {
            arena,
            servers,
            clients,
            by_id: HashMap::new(),
            closed: HashSet::new(),
            max_channel_name,
        }
    }

    /// Channel-name length bound handed to every new [`ChannelSet`].
    pub fn new_channel_set(&self) -> ChannelSet {
        ChannelSet::new(self.max_channel_name)
    }

    /// Insert an upstream connection. The entry keeps whatever state the
    /// caller set: `Connecting` for an in-flight connect, `Connected`
    /// otherwise.
    pub fn register_server(&mut self, conn: ServerConnection) {
        let id = conn.id;
        let slot = self.arena.insert(self.servers, RegistryEntry::Server(conn));
        self.by_id.insert(id, slot);
        tracing::debug!(?id, "Registered server connection");
    }

    /// Insert a controller connection and mark it connected.
    pub fn register_client(&mut self, mut conn: ClientConnection) {
        let id = conn.id;
        conn.state = ConnectionState::Connected;
        let slot = self.arena.insert(self.clients, RegistryEntry::Client(conn));
        self.by_id.insert(id, slot);
        tracing::debug!(?id, "Registered client connection");
    }

    /// Tear a connection down: mark it closing, close its socket task,
    /// unlink it from its list, and drop it (taking its line buffer and
    /// channel set with it). A second call for the same id fails with
    /// [`RegistryError::AlreadyClosed`].
    pub fn unregister(&mut self, id: ConnectionId) -> Result<(), RegistryError> {
        let Some(slot) = self.by_id.remove(&id) else {
            if self.closed.contains(&id) {
                return Err(RegistryError::AlreadyClosed);
            }
            return Err(RegistryError::NotFound);
        };

        let entry = self
            .arena
            .get_mut(slot)
            .expect("id index points at a live slot");
        entry.set_state(ConnectionState::Closing);
        if let Some(link) = entry.link() {
            link.close();
        }

        let mut entry = self.arena.remove(slot);
        entry.set_state(ConnectionState::Closed);
        self.closed.insert(id);
        tracing::debug!(?id, "Unregistered connection");
        Ok(())
    }

    /// Finish an in-flight outbound connect. If the entry was removed
    /// while the connect was in flight (e.g. an intervening DISCONNECT),
    /// the link is handed back so the caller can close it.
    pub fn complete_connect(
        &mut self,
        id: ConnectionId,
        link: Connection,
    ) -> Result<&mut ServerConnection, Connection> {
        match self.server_mut(id) {
            Ok(server) => {
                server.link = Some(link);
                server.state = ConnectionState::Connected;
                Ok(server)
            }
            Err(_) => Err(link),
        }
    }

    pub fn get(&self, id: ConnectionId) -> Option<&RegistryEntry> {
        let slot = self.by_id.get(&id)?;
        self.arena.get(*slot)
    }

    pub fn get_mut(&mut self, id: ConnectionId) -> Option<&mut RegistryEntry> {
        let slot = self.by_id.get(&id)?;
        self.arena.get_mut(*slot)
    }

    fn server_mut(&mut self, id: ConnectionId) -> Result<&mut ServerConnection, RegistryError> {
        match self.get_mut(id) {
            Some(RegistryEntry::Server(s)) => Ok(s),
            Some(RegistryEntry::Client(_)) => Err(RegistryError::NotAServer),
            None => Err(RegistryError::NotFound),
        }
    }

    /// Linear scan of the server list; the number of simultaneous networks
    /// is expected to stay small enough that no index is worth keeping.
    pub fn find_server_by_host(&self, host: &str) -> Option<&ServerConnection> {
        self.servers().find(|s| s.host == host)
    }

    pub fn find_server_by_host_mut(&mut self, host: &str) -> Option<&mut ServerConnection> {
        let id = self.find_server_by_host(host)?.id;
        match self.server_mut(id) {
            Ok(s) => Some(s),
            Err(_) => None,
        }
    }

    /// Upstream connections, in registration order.
    pub fn servers(&self) -> impl Iterator<Item = &ServerConnection> {
        self.arena.iter(self.servers).map(|(_, entry)| match entry {
            RegistryEntry::Server(s) => s,
            RegistryEntry::Client(_) => unreachable!("client entry on the server list"),
        })
    }

    /// Controller connections, in registration order.
    pub fn clients(&self) -> impl Iterator<Item = &ClientConnection> {
        self.arena.iter(self.clients).map(|(_, entry)| match entry {
            RegistryEntry::Client(c) => c,
            RegistryEntry::Server(_) => unreachable!("server entry on the client list"),
        })
    }

    pub fn server_count(&self) -> usize {
        self.arena.list_len(self.servers)
    }

    pub fn client_count(&self) -> usize {
        self.arena.list_len(self.clients)
    }

    /// Ids of every registered connection, servers first.
    pub fn all_ids(&self) -> Vec<ConnectionId> {
        self.servers()
            .map(|s| s.id)
            .chain(self.clients().map(|c| c.id))
            .collect()
    }
}
