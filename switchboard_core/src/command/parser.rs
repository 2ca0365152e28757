use thiserror::Error;

/// A parsed control command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlCommand {
    Connect {
        host: String,
        port: u16,
        nick: String,
        realname: String,
    },
    Disconnect {
        host: String,
    },
    Quit,
    Write {
        host: String,
        channel: String,
        text: String,
    },
    Join {
        host: String,
        channel: String,
    },
    Part {
        host: String,
        channel: String,
    },
    Log {
        host: String,
        enable: bool,
    },
    List,
    Nick {
        host: String,
        nick: String,
    },
    Raw {
        host: String,
        line: String,
    },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("Unknown command code: {0:?}")]
    UnknownCommand(char),
    #[error("Missing argument: {0}")]
    MissingArgument(&'static str),
    #[error("Invalid port: {0}")]
    InvalidPort(String),
    #[error("Invalid log switch (expected on or off): {0}")]
    InvalidLogSwitch(String),
}

/// Argument tokenizer: space-separated, runs of spaces collapsed, with the
/// option of taking the rest of the line verbatim for trailing free text.
struct Args<'a> {
    rest: &'a str,
}

impl<'a> Args<'a> {
    fn new(rest: &'a str) -> Self {
        Self { rest }
    }

    fn next(&mut self, name: &'static str) -> Result<&'a str, ParseError> {
        let rest = self.rest.trim_start_matches(' ');
        if rest.is_empty() {
            return Err(ParseError::MissingArgument(name));
        }
        match rest.find(' ') {
            Some(pos) => {
                self.rest = &rest[pos + 1..];
                Ok(&rest[..pos])
            }
            None => {
                self.rest = "";
                Ok(rest)
            }
        }
    }

    fn trailing(&mut self, name: &'static str) -> Result<&'a str, ParseError> {
        let rest = self.rest.trim_start_matches(' ');
        self.rest = "";
        if rest.is_empty() {
            return Err(ParseError::MissingArgument(name));
        }
        Ok(rest)
    }
}

/// Parse one control line. Returns `Ok(None)` for a blank line.
pub fn parse(raw: &str) -> Result<Option<ControlCommand>, ParseError> {
    let raw = raw.trim_start_matches(' ');
    let mut chars = raw.chars();
    let Some(code) = chars.next() else {
        return Ok(None);
    };
    let mut args = Args::new(chars.as_str());

    let cmd = match code {
        'c' => {
            let host = args.next("host")?.to_string();
            let port_arg = args.next("port")?;
            let port = port_arg
                .parse()
                .map_err(|_| ParseError::InvalidPort(port_arg.to_string()))?;
            let nick = args.next("nick")?.to_string();
            let realname = args.trailing("realname")?.to_string();
            ControlCommand::Connect {
                host,
                port,
                nick,
                realname,
            }
        }
        'd' => ControlCommand::Disconnect {
            host: args.next("host")?.to_string(),
        },
        'Q' => ControlCommand::Quit,
        'w' => {
            let host = args.next("host")?.to_string();
            let channel = args.next("channel")?.to_string();
            let text = args.trailing("text")?.to_string();
            ControlCommand::Write {
                host,
                channel,
                text,
            }
        }
        'j' => ControlCommand::Join {
            host: args.next("host")?.to_string(),
            channel: args.next("channel")?.to_string(),
        },
        'p' => ControlCommand::Part {
            host: args.next("host")?.to_string(),
            channel: args.next("channel")?.to_string(),
        },
        'l' => {
            let host = args.next("host")?.to_string();
            let switch = args.next("switch")?;
            let enable = match switch {
                "on" => true,
                "off" => false,
                other => return Err(ParseError::InvalidLogSwitch(other.to_string())),
            };
            ControlCommand::Log { host, enable }
        }
        'L' => ControlCommand::List,
        'n' => ControlCommand::Nick {
            host: args.next("host")?.to_string(),
            nick: args.next("newnick")?.to_string(),
        },
        'R' => ControlCommand::Raw {
            host: args.next("host")?.to_string(),
            line: args.trailing("text")?.to_string(),
        },
        other => return Err(ParseError::UnknownCommand(other)),
    };

    Ok(Some(cmd))
}
