//! Buzzer device simulator.
//!
//! Runs the real device core against a host over TCP with simulated pins:
//! - Each line on stdin presses the button
//! - Output changes are reported through tracing
//!
//! Environment:
//! - `BUZZER_CONFIG`: optional JSON config file
//! - `BUZZER_HOST_ADDR`: host address, overrides the config
//! - `BUZZER_MODULE_ID`: module id (0-127), or pass it as the first argument

use std::io::BufRead;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use buzzer_core::hal::{LevelCell, OutputLine};
use buzzer_core::tasks::{spawn_button_poll, spawn_heartbeat, spawn_soft_tick};
use buzzer_core::{
    ButtonMonitor, ConnectionManager, DeviceConfig, DeviceController, DeviceSignals, HostClient,
    Orchestrator, Shutdown, StaticLink, TcpConnector, TickHandler,
};
use buzzer_protocol::ModuleId;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// How long a simulated press holds the button down.
const PRESS_HOLD: Duration = Duration::from_millis(50);

/// How often tick-driven outputs are sampled for reporting.
const REPORT_PERIOD: Duration = Duration::from_millis(100);

/// Button LED that logs whenever it changes.
#[derive(Default)]
struct ReportedLed {
    lit: bool,
}

impl OutputLine for ReportedLed {
    fn set_level(&mut self, high: bool) {
        if high != self.lit {
            self.lit = high;
            tracing::info!("Button LED {}", if high { "on" } else { "off" });
        }
    }
}

fn load_config() -> anyhow::Result<DeviceConfig> {
    let mut config = match std::env::var("BUZZER_CONFIG") {
        Ok(path) => DeviceConfig::load(&path).with_context(|| format!("loading {}", path))?,
        Err(_) => DeviceConfig::default(),
    };
    if let Ok(addr) = std::env::var("BUZZER_HOST_ADDR") {
        config.host.address = addr
            .parse()
            .with_context(|| format!("invalid host address \"{}\"", addr))?;
    }
    config.validate()?;
    Ok(config)
}

fn module_id() -> anyhow::Result<ModuleId> {
    let raw = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("BUZZER_MODULE_ID").ok())
        .unwrap_or_else(|| "0".to_string());
    let value: u8 = raw
        .trim()
        .parse()
        .with_context(|| format!("invalid module id \"{}\"", raw))?;
    Ok(ModuleId::try_from(value)?)
}

/// Log transitions of the outputs driven from the tick.
async fn report_outputs(signals: Arc<DeviceSignals>, shutdown: Shutdown) {
    let mut interval = tokio::time::interval(REPORT_PERIOD);
    let mut playing = false;
    let mut flashing = signals.tick.status.is_flashing();

    while !shutdown.is_triggered() {
        interval.tick().await;

        let now_playing = signals.tick.playback.is_playing();
        if now_playing != playing {
            playing = now_playing;
            tracing::info!("Audio {}", if playing { "playing" } else { "stopped" });
        }

        let now_flashing = signals.tick.status.is_flashing();
        if now_flashing != flashing {
            flashing = now_flashing;
            tracing::info!(
                "Status LED {}",
                if flashing { "flashing" } else { "solid" }
            );
        }
    }
}

/// Press the button once per line of stdin.
///
/// Runs on a plain thread so a pending read never holds up shutdown.
fn press_on_enter(button: LevelCell) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("stdin".into())
        .spawn(move || {
            for _line in std::io::stdin().lock().lines().map_while(Result::ok) {
                tracing::debug!("Simulated press");
                button.set(false);
                thread::sleep(PRESS_HOLD);
                button.set(true);
            }
        })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,buzzer_core=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = load_config()?;
    let id = module_id()?;
    tracing::info!(
        "Buzzer {} ({}) starting, host {}",
        id.get(),
        id,
        config.host.address
    );

    let signals = Arc::new(DeviceSignals::new(config.timing.audio_duration_ticks));
    let shutdown = Shutdown::new();

    let tick = TickHandler::new(
        signals.tick.clone(),
        LevelCell::default(),
        LevelCell::default(),
        config.timing.status_divider,
    );
    spawn_soft_tick(tick, config.timing.tick_hz, shutdown.clone())?;

    let client = Arc::new(HostClient::new());

    // Pulled up: high means released.
    let button = LevelCell::new(true);
    let monitor = ButtonMonitor::new(signals.clone(), client.clone(), LevelCell::default());
    spawn_button_poll(
        button.clone(),
        monitor,
        config.timing.button_poll(),
        shutdown.clone(),
    )?;
    spawn_heartbeat(client.clone(), config.timing.heartbeat(), shutdown.clone())?;
    press_on_enter(button)?;

    let mut orchestrator = Orchestrator::new(
        ConnectionManager::new(
            StaticLink::new(Ipv4Addr::LOCALHOST),
            config.wifi.max_retries,
        ),
        TcpConnector::new(config.host.address),
        client.clone(),
        DeviceController::new(signals.clone(), ReportedLed::default()),
        id,
    )
    .with_reconnect_delay(config.timing.reconnect_delay());

    let core_shutdown = shutdown.clone();
    let mut core = tokio::task::spawn_blocking(move || orchestrator.run(&core_shutdown));
    tokio::spawn(report_outputs(signals, shutdown.clone()));

    tracing::info!("Press Enter to buzz, Ctrl+C to quit");

    let finished = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
            false
        }
        _ = &mut core => {
            tracing::warn!("Device core stopped");
            true
        }
    };

    shutdown.trigger();
    // Wakes the receive loop if it is blocked on a read.
    client.close();
    if !finished {
        core.await?;
    }

    Ok(())
}
