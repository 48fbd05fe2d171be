//! # Pitlink
//!
//! Host-side protocol stack for sim-racing peripherals that share one
//! serial link per hub: wheelbase, pedals, shifters, handbrake and the
//! wheel itself.
//!
//! ## Architecture
//!
//! Pitlink is organized as a workspace with multiple crates:
//!
//! 1. **pitlink-core** - Error types, shared-state aliases, event bus
//! 2. **pitlink-protocol** - Command registry and the wire codec
//! 3. **pitlink-communication** - Serial links, discovery, connection manager
//! 4. **pitlink** - The `pitlink` command line tool
//!
//! ## Data flow
//!
//! A registry YAML file describes every device address and setting. The
//! [`ConnectionManager`] registers one event channel per setting, discovery
//! attaches a [`DeviceLink`] per serial endpoint, and inbound frames are
//! decoded and dispatched to subscribers of the matching channel.

pub use pitlink_core::{
    BlockingValue, ConnectionError, Error, EventBus, Observable, Result, SettingError,
    SubscriptionId,
};

pub use pitlink_protocol::{
    CommandRegistry, CommandSpec, Direction, FrameReader, PayloadKind, RegistryError,
    SettingValue,
};

pub use pitlink_communication::{
    default_config_dir, list_ports, ConnectionManager, DeviceLink, LinkManager, LinkSettings,
    SerialPortInfo, DEVICE_CONNECTED, DEVICE_DISCONNECTED,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Build date (set at compile time)
pub const BUILD_DATE: &str = env!("BUILD_DATE");

/// Default log directive for a `-v` count
///
/// `RUST_LOG` overrides this when set.
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Initialize logging
///
/// Sets up structured logging with:
/// - Console output on stderr
/// - RUST_LOG environment variable support
/// - Thread names, so link and discovery threads are told apart
pub fn init_logging(verbosity: u8) -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::EnvFilter;

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directive(verbosity)))?;

    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_level(true)
        .with_thread_ids(verbosity > 1)
        .with_thread_names(true)
        .with_line_number(verbosity > 0);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive(0), "info");
        assert_eq!(default_directive(1), "debug");
        assert_eq!(default_directive(5), "trace");
    }
}
