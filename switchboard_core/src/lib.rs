//! Bouncer state and control logic.
//!
//! The pieces assemble bottom-up: connections live in an arena threaded
//! with intrusive lists ([`conn_list`]), upstream connections carry channel
//! sets ([`channel_set`]), the [`registry`] owns both kinds of connection,
//! the [`command`] module parses and applies control commands against the
//! registry, and the [`bouncer`] event loop drives the whole thing from the
//! channels fed by `switchboard_link`.

pub mod conn_list;
pub mod channel_set;
pub mod registry;
pub mod command;
pub mod bouncer;
pub mod config;
pub mod tracing_config;
pub mod run;
