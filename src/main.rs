use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};

use pitlink::{
    default_config_dir, init_logging, list_ports, ConnectionManager, LinkSettings, BUILD_DATE,
    VERSION,
};

#[derive(Parser, Debug)]
#[command(name = "pitlink", version, about = "Talk to sim-racing peripherals over serial")]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Command registry YAML
    #[arg(long, env = "PITLINK_REGISTRY", global = true)]
    registry: Option<PathBuf>,

    /// Link settings TOML
    #[arg(long, env = "PITLINK_SETTINGS", global = true)]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports and the device type each would be assigned
    Ports,
    /// Print every setting channel in the registry
    Channels,
    /// Print the effective link settings as TOML
    Settings,
    /// Print every decoded setting value as it arrives
    Monitor {
        /// Stop after this many seconds
        #[arg(long, default_value_t = 10)]
        seconds: u64,
    },
    /// Read one setting from its device
    Get {
        name: String,
        #[arg(long, default_value_t = 500)]
        timeout_ms: u64,
    },
    /// Write one setting to its device
    Set { name: String, value: String },
}

fn config_file(explicit: Option<PathBuf>, file_name: &str) -> anyhow::Result<PathBuf> {
    explicit
        .or_else(|| default_config_dir().map(|dir| dir.join(file_name)))
        .with_context(|| format!("No config directory found, pass the {} path explicitly", file_name))
}

fn load_settings(path: Option<PathBuf>) -> anyhow::Result<LinkSettings> {
    let path = config_file(path, "link.toml")?;
    LinkSettings::load_or_default(&path)
        .with_context(|| format!("Failed to load link settings from {}", path.display()))
}

fn open_manager(cli_registry: Option<PathBuf>, settings: LinkSettings) -> anyhow::Result<ConnectionManager> {
    let path = config_file(cli_registry, "serial.yml")?;
    Ok(ConnectionManager::open(&path, settings)?)
}

/// Open the manager and connect whatever is plugged in right now
fn connect(cli_registry: Option<PathBuf>, settings: LinkSettings) -> anyhow::Result<ConnectionManager> {
    let manager = open_manager(cli_registry, settings)?;
    manager.link_manager().scan_once();
    Ok(manager)
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    tracing::debug!("pitlink {} built {}", VERSION, BUILD_DATE);

    let settings = load_settings(cli.settings)?;

    match cli.command {
        Command::Ports => {
            for port in list_ports()? {
                let description = format!(
                    "{} {}",
                    port.description,
                    port.product.as_deref().unwrap_or_default()
                );
                let device = settings
                    .match_port(&port.port_name, &description)
                    .unwrap_or("-");
                println!("{:<24} {:<12} {}", port.port_name, device, description.trim());
            }
        }
        Command::Channels => {
            let path = config_file(cli.registry, "serial.yml")?;
            let registry = pitlink::CommandRegistry::load(&path)
                .with_context(|| format!("Failed to load registry {}", path.display()))?;
            for channel in registry.setting_channels() {
                println!("{}", channel);
            }
        }
        Command::Settings => {
            print!("{}", toml::to_string_pretty(&settings)?);
        }
        Command::Monitor { seconds } => {
            // Subscribe before the first scan so already attached devices are reported
            let manager = open_manager(cli.registry, settings)?;
            manager.subscribe_device_connected(|device| println!("+ {}", device));
            manager.subscribe_device_disconnected(|device| println!("- {}", device));
            let mut values = manager.setting_receiver();
            manager.start()?;

            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_time()
                .build()?;
            runtime.block_on(async move {
                let deadline = tokio::time::sleep(Duration::from_secs(seconds));
                tokio::pin!(deadline);
                loop {
                    tokio::select! {
                        _ = &mut deadline => break,
                        received = values.recv() => match received {
                            Ok((name, value)) => println!("{} = {}", name, value),
                            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                                tracing::warn!("Monitor fell behind, skipped {} values", skipped);
                            }
                            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                        },
                    }
                }
            });
            manager.shutdown();
        }
        Command::Get { name, timeout_ms } => {
            let manager = connect(cli.registry, settings)?;
            let value = manager.read_blocking(&name, Duration::from_millis(timeout_ms))?;
            println!("{}", value);
        }
        Command::Set { name, value } => {
            let manager = connect(cli.registry, settings)?;
            manager.set_from_str(&name, &value)?;
            // Stopping the links flushes their write queues
            manager.shutdown();
        }
    }

    Ok(())
}
