use thiserror::Error;
use tokio::sync::mpsc;

use switchboard_link::{
    connector, Connection, ConnectionError, ConnectionEvent, ConnectionId, ConnectionIdGenerator,
};

use crate::channel_set::InvalidChannelName;
use crate::command::{parse, ControlCommand, ParseError};
use crate::registry::{ConnectionState, Registry, RegistryEntry, ServerConnection};

/// What the event loop should do after a command has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Continue,
    Quit,
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Not connected: {0}")]
    NotConnected(String),
    #[error("Already connected: {0}")]
    AlreadyConnected(String),
    #[error("Connect failed: {0}")]
    ConnectFailed(String),
    #[error(transparent)]
    InvalidChannelName(#[from] InvalidChannelName),
    #[error(transparent)]
    Parse(#[from] ParseError),
}

type CommandResult = Result<String, CommandError>;

/// Interprets control lines against the registry.
///
/// Commands run to completion on the event-loop task before the loop polls
/// again, so every mutation is atomic with respect to other commands and
/// to connection teardown. The only deferred piece is CONNECT, whose
/// reply waits for the connector's completion event.
pub struct CommandDispatcher {
    id_gen: ConnectionIdGenerator,
    events: mpsc::Sender<ConnectionEvent>,
    max_line_length: usize,
    quit_message: String,
}

impl CommandDispatcher {
    pub fn new(
        id_gen: ConnectionIdGenerator,
        events: mpsc::Sender<ConnectionEvent>,
        max_line_length: usize,
        quit_message: String,
    ) -> Self {
        Self {
            id_gen,
            events,
            max_line_length,
            quit_message,
        }
    }

    /// Handle one control line from client `source`.
    pub fn dispatch(
        &self,
        registry: &mut Registry,
        source: ConnectionId,
        line: &str,
    ) -> DispatchOutcome {
        let cmd = match parse(line) {
            Ok(Some(cmd)) => cmd,
            Ok(None) => return DispatchOutcome::Continue,
            Err(e) => {
                self.reply_err(registry, source, &CommandError::from(e));
                return DispatchOutcome::Continue;
            }
        };

        tracing::debug!(?source, ?cmd, "Control command");

        let result = match cmd {
            ControlCommand::Connect {
                host,
                port,
                nick,
                realname,
            } => {
                match self.handle_connect(registry, source, host, port, nick, realname) {
                    // Reply comes with the connect completion event.
                    Ok(()) => return DispatchOutcome::Continue,
                    Err(e) => Err(e),
                }
            }
            ControlCommand::Disconnect { host } => self.handle_disconnect(registry, &host),
            ControlCommand::Quit => {
                self.reply(registry, source, "ok quit".to_string());
                return DispatchOutcome::Quit;
            }
            ControlCommand::Write {
                host,
                channel,
                text,
            } => Self::handle_write(registry, &host, &channel, &text),
            ControlCommand::Join { host, channel } => Self::handle_join(registry, &host, &channel),
            ControlCommand::Part { host, channel } => Self::handle_part(registry, &host, &channel),
            ControlCommand::Log { host, enable } => Self::handle_log(registry, &host, enable),
            ControlCommand::List => {
                self.handle_list(registry, source);
                return DispatchOutcome::Continue;
            }
            ControlCommand::Nick { host, nick } => Self::handle_nick(registry, &host, &nick),
            ControlCommand::Raw { host, line } => Self::handle_raw(registry, &host, &line),
        };

        match result {
            Ok(detail) => self.reply(registry, source, format!("ok {}", detail)),
            Err(e) => self.reply_err(registry, source, &e),
        }
        DispatchOutcome::Continue
    }

    fn handle_connect(
        &self,
        registry: &mut Registry,
        source: ConnectionId,
        host: String,
        port: u16,
        nick: String,
        realname: String,
    ) -> Result<(), CommandError> {
        if registry.find_server_by_host(&host).is_some() {
            return Err(CommandError::AlreadyConnected(host));
        }

        let id = self.id_gen.next();
        tracing::info!(%host, port, ?id, "Connecting to server");
        registry.register_server(ServerConnection {
            id,
            host: host.clone(),
            port,
            nick,
            realname,
            channels: registry.new_channel_set(),
            log_chat: false,
            state: ConnectionState::Connecting,
            link: None,
            requested_by: Some(source),
        });
        connector::connect(id, host, port, self.max_line_length, self.events.clone());
        Ok(())
    }

    /// Called by the event loop when an outbound connect completes.
    pub fn connect_succeeded(
        &self,
        registry: &mut Registry,
        id: ConnectionId,
        conn: Connection,
    ) {
        let (host, requested_by) = match registry.complete_connect(id, conn) {
            Ok(server) => {
                // Upstream registration, as the controller supplied it.
                if let Some(link) = &server.link {
                    link.send(format!("NICK {}", server.nick));
                    link.send(format!("USER {} 8 * :{}", server.nick, server.realname));
                }
                tracing::info!(host = %server.host, ?id, "Server connection established");
                (server.host.clone(), server.requested_by.take())
            }
            Err(conn) => {
                // The entry was torn down while the connect was in flight.
                tracing::debug!(?id, "Connect completed for an unregistered connection");
                conn.close();
                return;
            }
        };

        if let Some(client) = requested_by {
            self.reply(registry, client, format!("ok connect {}", host));
        }
    }

    /// Called by the event loop when an outbound connect fails.
    pub fn connect_failed(
        &self,
        registry: &mut Registry,
        id: ConnectionId,
        error: ConnectionError,
    ) {
        let requested_by = match registry.get_mut(id) {
            Some(RegistryEntry::Server(server)) => {
                let host = server.host.clone();
                let client = server.requested_by.take();
                tracing::info!(%host, ?id, %error, "Server connection failed");
                client.map(|c| (c, host))
            }
            _ => None,
        };

        if let Err(e) = registry.unregister(id) {
            tracing::debug!(?id, %e, "Error unregistering failed connect");
        }
        if let Some((client, host)) = requested_by {
            let err = CommandError::ConnectFailed(format!("{}: {}", host, error));
            self.reply_err(registry, client, &err);
        }
    }

    fn handle_disconnect(&self, registry: &mut Registry, host: &str) -> CommandResult {
        let server = registry
            .find_server_by_host(host)
            .ok_or_else(|| CommandError::NotFound(host.to_string()))?;
        let id = server.id;
        if let Some(link) = &server.link {
            link.send(format!("QUIT :{}", self.quit_message));
        }
        if let Err(e) = registry.unregister(id) {
            tracing::debug!(?id, %e, "Error unregistering server");
        }
        Ok(format!("disconnect {}", host))
    }

    fn handle_write(
        registry: &mut Registry,
        host: &str,
        channel: &str,
        text: &str,
    ) -> CommandResult {
        let server = Self::connected_server(registry, host)?;
        if !server.channels.contains(channel) {
            return Err(CommandError::NotFound(channel.to_string()));
        }
        if let Some(link) = &server.link {
            link.send(format!("PRIVMSG {} :{}", channel, text));
        }
        Ok(format!("write {}", channel))
    }

    fn handle_join(registry: &mut Registry, host: &str, channel: &str) -> CommandResult {
        let server = Self::connected_server(registry, host)?;
        server.channels.add(channel)?;
        if let Some(link) = &server.link {
            link.send(format!("JOIN {}", channel));
        }
        Ok(format!("join {}", channel))
    }

    fn handle_part(registry: &mut Registry, host: &str, channel: &str) -> CommandResult {
        let server = Self::connected_server(registry, host)?;
        if !server.channels.remove(channel) {
            return Err(CommandError::NotFound(channel.to_string()));
        }
        if let Some(link) = &server.link {
            link.send(format!("PART {}", channel));
        }
        Ok(format!("part {}", channel))
    }

    fn handle_log(registry: &mut Registry, host: &str, enable: bool) -> CommandResult {
        let server = registry
            .find_server_by_host_mut(host)
            .ok_or_else(|| CommandError::NotFound(host.to_string()))?;
        server.log_chat = enable;
        Ok(format!("log {} {}", host, if enable { "on" } else { "off" }))
    }

    fn handle_list(&self, registry: &Registry, source: ConnectionId) {
        let mut lines = Vec::with_capacity(registry.server_count() + 1);
        for server in registry.servers() {
            let channels: Vec<&str> = server.channels.iter().collect();
            lines.push(format!(
                "server {} {} {} :{}",
                server.host,
                server.port,
                server.nick,
                channels.join(" ")
            ));
        }
        lines.push("ok list end".to_string());
        for line in lines {
            self.reply(registry, source, line);
        }
    }

    fn handle_nick(registry: &mut Registry, host: &str, nick: &str) -> CommandResult {
        let server = Self::connected_server(registry, host)?;
        if let Some(link) = &server.link {
            link.send(format!("NICK {}", nick));
        }
        server.nick = nick.to_string();
        Ok(format!("nick {}", nick))
    }

    fn handle_raw(registry: &mut Registry, host: &str, line: &str) -> CommandResult {
        let server = Self::connected_server(registry, host)?;
        if let Some(link) = &server.link {
            link.send(line.to_string());
        }
        Ok("raw".to_string())
    }

    /// Look up a server that is past the connecting stage.
    fn connected_server<'a>(
        registry: &'a mut Registry,
        host: &str,
    ) -> Result<&'a mut ServerConnection, CommandError> {
        let server = registry
            .find_server_by_host_mut(host)
            .ok_or_else(|| CommandError::NotFound(host.to_string()))?;
        if server.state != ConnectionState::Connected {
            return Err(CommandError::NotConnected(host.to_string()));
        }
        Ok(server)
    }

    fn reply(&self, registry: &Registry, client: ConnectionId, text: String) {
        match registry.get(client) {
            Some(RegistryEntry::Client(c)) => c.link.send(text),
            _ => tracing::debug!(?client, "Reply to a vanished control connection dropped"),
        }
    }

    fn reply_err(&self, registry: &Registry, client: ConnectionId, error: &CommandError) {
        self.reply(registry, client, format!("err {}", error));
    }
}
