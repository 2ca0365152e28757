use std::path::Path;

use anyhow::Context;
use tracing_subscriber::util::SubscriberInitExt;

use crate::{bouncer::Bouncer, config::Config, tracing_config};

/// Entry point for the `switchboardd` binary.
///
/// Loads the configuration (or runs on defaults), installs the tracing
/// subscriber, binds the control port, and drives the event loop until a
/// QUIT command shuts it down. A bind failure surfaces as an error return,
/// which the binary turns into a non-zero exit before the loop ever runs.
pub fn run_bouncer(config_path: Option<&Path>) -> Result<(), anyhow::Error> {
    let config = match config_path {
        Some(path) => Config::load_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?,
        None => Config::default(),
    };

    tracing_config::build_subscriber(config.log.clone())?.init();

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let bouncer = Bouncer::new(config).context("Failed to bind listening socket")?;
        bouncer.run().await;
        Ok(())
    })
}
