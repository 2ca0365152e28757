use std::{
    fs::File,
    io::Read,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use tracing::level_filters::LevelFilter;

/// Bouncer configuration, loaded once at startup and immutable afterwards.
#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// Address of the control port.
    pub listen: SocketAddr,
    /// Readiness-wait timeout; doubles as the liveness-check interval.
    pub ping_timeout_secs: u64,
    /// Longest unterminated line a peer may buffer on us.
    pub max_line_length: usize,
    /// Longest accepted channel name.
    pub max_channel_name: usize,
    /// Accept backlog for the control port.
    pub accept_backlog: i32,
    /// Sent upstream in the QUIT line on disconnect.
    pub quit_message: String,
    pub log: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([127, 0, 0, 1], 6800)),
            ping_timeout_secs: 60,
            max_line_length: 1024,
            max_channel_name: 128,
            accept_backlog: 4,
            quit_message: "switchboard signing off".to_string(),
            log: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn load_file<P: AsRef<Path>>(filename: P) -> Result<Self, anyhow::Error> {
        let mut file = File::open(filename)?;
        let mut config = String::new();
        file.read_to_string(&mut config)?;
        Ok(serde_json::from_str(&config)?)
    }
}

#[derive(Clone, Debug, serde::Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    /// Directory for the rolling log file; no file logging when unset.
    pub dir: Option<PathBuf>,
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            dir: None,
            file: None,
        }
    }
}

#[derive(Clone, Copy, Debug, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Off,
}

impl From<LogLevel> for LevelFilter {
    fn from(arg: LogLevel) -> LevelFilter {
        match arg {
            LogLevel::Trace => LevelFilter::TRACE,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Off => LevelFilter::OFF,
        }
    }
}
