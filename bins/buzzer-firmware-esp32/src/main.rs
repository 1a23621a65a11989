//! Quiz buzzer firmware for ESP32.
//!
//! This binary requires the ESP32 Rust toolchain.
//!
//! Execution contexts:
//! - Timer ISR at 1 kHz: transducer and status LED
//! - `button-poll` thread: button edges, press reports
//! - `heartbeat` thread: liveness beacon
//! - Main task: WiFi, host connection and the receive loop

use std::sync::Arc;

use anyhow::Result;
use buzzer_core::tasks::{spawn_button_poll, spawn_heartbeat};
use buzzer_core::{
    ButtonMonitor, ConnectionManager, DeviceConfig, DeviceController, DeviceSignals, HostClient,
    Orchestrator, Shutdown, TcpConnector, TickHandler,
};
use buzzer_esp32::gpio::BoardPins;
use buzzer_esp32::timer::start_tick;
use buzzer_esp32::wifi::EspAssociation;
use esp_idf_svc::eventloop::EspSystemEventLoop;
use esp_idf_svc::hal::peripherals::Peripherals;
use esp_idf_svc::log::EspLogger;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use log::info;

/// Build-time overrides of the defaults.
const WIFI_SSID: Option<&str> = option_env!("BUZZER_WIFI_SSID");
const WIFI_PASSWORD: Option<&str> = option_env!("BUZZER_WIFI_PASSWORD");
const HOST_ADDR: Option<&str> = option_env!("BUZZER_HOST_ADDR");

fn load_config() -> Result<DeviceConfig> {
    let mut config = DeviceConfig::default();
    if let Some(ssid) = WIFI_SSID {
        config.wifi.ssid = ssid.to_string();
    }
    if let Some(password) = WIFI_PASSWORD {
        config.wifi.password = password.to_string();
    }
    if let Some(addr) = HOST_ADDR {
        config.host.address = addr.parse()?;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> Result<()> {
    esp_idf_svc::sys::link_patches();
    EspLogger::initialize_default();

    let config = load_config()?;
    info!(
        "Buzzer firmware starting, host {}, network '{}'",
        config.host.address, config.wifi.ssid
    );

    let peripherals = Peripherals::take()?;
    let sysloop = EspSystemEventLoop::take()?;
    let nvs = EspDefaultNvsPartition::take()?;

    let pins = BoardPins::take(peripherals.pins)?;
    let signals = Arc::new(DeviceSignals::new(config.timing.audio_duration_ticks));

    let tick = TickHandler::new(
        signals.tick.clone(),
        pins.transducer,
        pins.status_led,
        config.timing.status_divider,
    );
    let _timer = start_tick(peripherals.timer00, config.timing.tick_hz, tick)?;

    let client = Arc::new(HostClient::new());
    // Never triggered on the device.
    let shutdown = Shutdown::new();

    let button = ButtonMonitor::new(signals.clone(), client.clone(), pins.pcb_led);
    spawn_button_poll(
        pins.button,
        button,
        config.timing.button_poll(),
        shutdown.clone(),
    )?;
    spawn_heartbeat(client.clone(), config.timing.heartbeat(), shutdown.clone())?;

    let wifi = EspAssociation::new(
        peripherals.modem,
        sysloop,
        Some(nvs),
        &config.wifi.ssid,
        &config.wifi.password,
    )?;

    let mut orchestrator = Orchestrator::new(
        ConnectionManager::new(wifi, config.wifi.max_retries),
        TcpConnector::new(config.host.address),
        client,
        DeviceController::new(signals, pins.button_led),
        pins.id,
    )
    .with_reconnect_delay(config.timing.reconnect_delay());

    orchestrator.run(&shutdown);
    Ok(())
}
