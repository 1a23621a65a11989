//! Buzzer host console.
//!
//! Accepts buzzers on TCP, logs what they do and sends mode commands typed
//! on stdin:
//!
//! ```text
//! list                     connected buzzers
//! mode <id> <led> <audio>  set one buzzer, e.g. `mode 33 1 1`
//! off                      turn every buzzer off
//! ```

use std::io::BufRead;
use std::net::SocketAddr;
use std::thread;

use anyhow::{anyhow, Context};
use buzzer_host::{BuzzerServer, DeviceRegistry, HostEvent, Mode, ModuleId, ServerConfig};
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// A parsed console line.
#[derive(Debug, PartialEq)]
enum Command {
    List,
    Mode(ModuleId, Mode),
    Off,
}

fn parse_flag(word: Option<&str>) -> anyhow::Result<bool> {
    match word {
        Some("1") | Some("on") => Ok(true),
        Some("0") | Some("off") => Ok(false),
        Some(other) => Err(anyhow!("expected 0 or 1, got \"{}\"", other)),
        None => Err(anyhow!("missing flag")),
    }
}

fn parse_command(line: &str) -> anyhow::Result<Command> {
    let mut words = line.split_whitespace();
    match words.next() {
        Some("list") => Ok(Command::List),
        Some("off") => Ok(Command::Off),
        Some("mode") => {
            let raw = words.next().ok_or_else(|| anyhow!("missing module id"))?;
            let value: u8 = raw
                .parse()
                .with_context(|| format!("invalid module id \"{}\"", raw))?;
            let id = ModuleId::try_from(value)?;
            let led = parse_flag(words.next())?;
            let audio = parse_flag(words.next())?;
            Ok(Command::Mode(id, Mode::new(led, audio)))
        }
        Some(other) => Err(anyhow!("unknown command \"{}\"", other)),
        None => Err(anyhow!("empty command")),
    }
}

async fn execute(registry: &DeviceRegistry, command: Command) -> anyhow::Result<()> {
    match command {
        Command::List => {
            let ids = registry.ids().await;
            tracing::info!("{} buzzer(s) connected", ids.len());
            for id in ids {
                if let Some(device) = registry.get(id).await {
                    tracing::info!(
                        "   {} ({}) at {}, protocol {:#04x}",
                        id.get(),
                        id,
                        device.addr(),
                        device.version()
                    );
                }
            }
        }
        Command::Mode(id, mode) => {
            registry.set_mode(id, mode).await?;
            tracing::info!("Sent {:?} to buzzer {}", mode, id.get());
        }
        Command::Off => {
            let sent = registry.set_mode_all(Mode::OFF).await;
            tracing::info!("Turned off {} buzzer(s)", sent);
        }
    }
    Ok(())
}

/// Read commands from stdin until it closes.
///
/// Runs on a plain thread so a pending read never holds up shutdown.
fn spawn_console(registry: DeviceRegistry) -> std::io::Result<thread::JoinHandle<()>> {
    let runtime = Handle::current();
    thread::Builder::new()
        .name("console".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines().map_while(Result::ok) {
                if line.trim().is_empty() {
                    continue;
                }
                let result = match parse_command(&line) {
                    Ok(command) => runtime.block_on(execute(&registry, command)),
                    Err(e) => Err(e),
                };
                if let Err(e) = result {
                    tracing::warn!("{}", e);
                }
            }
            tracing::info!("Console closed");
        })
}

async fn log_events(mut events: broadcast::Receiver<HostEvent>) {
    loop {
        match events.recv().await {
            Ok(HostEvent::Joined { id, version, addr }) => {
                tracing::info!("Buzzer {} joined from {} (protocol {:#04x})", id.get(), addr, version)
            }
            Ok(HostEvent::Press { id }) => tracing::info!("BUZZ! buzzer {} ({})", id.get(), id),
            Ok(HostEvent::Heartbeat { id }) => tracing::debug!("Heartbeat from {}", id.get()),
            Ok(HostEvent::ErrorReport { id }) => {
                tracing::warn!("Buzzer {} rejected a command", id.get())
            }
            Ok(HostEvent::Unknown { id, byte }) => {
                tracing::warn!("Buzzer {} sent unknown byte {:#04x}", id.get(), byte)
            }
            Ok(HostEvent::Left { id }) => tracing::info!("Buzzer {} left", id.get()),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                tracing::warn!("Event log lagged, {} events dropped", n)
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,buzzer_host=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Buzzer host starting...");

    let mut config = ServerConfig::default();
    if let Ok(addr) = std::env::var("BUZZER_BIND_ADDR") {
        config.bind_addr = addr
            .parse::<SocketAddr>()
            .with_context(|| format!("invalid bind address \"{}\"", addr))?;
    }
    let bind_addr = config.bind_addr;

    let server = BuzzerServer::new(config);
    let events = server.subscribe();
    let registry = server.registry();

    let server_handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!("Buzzer server error: {}", e);
        }
    });
    let log_handle = tokio::spawn(log_events(events));
    // Stdin closing leaves the server running.
    spawn_console(registry)?;

    tracing::info!("Listening for buzzers on {}", bind_addr);
    tracing::info!("Commands: list | mode <id> <led 0|1> <audio 0|1> | off");

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = server_handle => {
            tracing::warn!("Buzzer server stopped");
        }
        _ = log_handle => {
            tracing::warn!("Event log stopped");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
