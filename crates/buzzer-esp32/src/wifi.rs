//! WiFi association for ESP32.
//!
//! Adapts `EspWifi` to the core's [`Association`] trait. Driver events are
//! delivered by the system event loop, so each relevant one is forwarded
//! into a channel that [`Association::next_event`] blocks on.

use std::collections::VecDeque;
use std::net::Ipv4Addr;
use std::sync::mpsc;

use anyhow::{anyhow, Result};
use buzzer_core::network::{Association, LinkEvent, NetError};
use esp_idf_svc::eventloop::{EspSubscription, EspSystemEventLoop, System};
use esp_idf_svc::hal::modem::Modem;
use esp_idf_svc::hal::peripheral;
use esp_idf_svc::netif::IpEvent;
use esp_idf_svc::nvs::EspDefaultNvsPartition;
use esp_idf_svc::sys::EspError;
use esp_idf_svc::wifi::{AuthMethod, ClientConfiguration, Configuration, EspWifi, WifiEvent};
use log::{debug, info};

fn driver_error(e: EspError) -> NetError {
    NetError::Driver(e.to_string())
}

/// Station-mode WiFi driven by the connection manager.
pub struct EspAssociation {
    wifi: Box<EspWifi<'static>>,
    events: mpsc::Receiver<LinkEvent>,
    /// Events synthesised locally, served before the channel.
    pending: VecDeque<LinkEvent>,
    _wifi_sub: EspSubscription<'static, System>,
    _ip_sub: EspSubscription<'static, System>,
}

impl EspAssociation {
    /// Configure the station for `ssid`. The radio is not started yet.
    ///
    /// # Arguments
    ///
    /// * `ssid` - Network name (cannot be empty)
    /// * `password` - Network password (empty for open networks)
    pub fn new(
        modem: impl peripheral::Peripheral<P = Modem> + 'static,
        sysloop: EspSystemEventLoop,
        nvs: Option<EspDefaultNvsPartition>,
        ssid: &str,
        password: &str,
    ) -> Result<Self> {
        if ssid.is_empty() {
            return Err(anyhow!("WiFi SSID cannot be empty"));
        }

        let auth_method = if password.is_empty() {
            info!("WiFi password is empty, using open network");
            AuthMethod::None
        } else {
            AuthMethod::WPA2Personal
        };

        let mut wifi = Box::new(EspWifi::new(modem, sysloop.clone(), nvs)?);
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: ssid
                .try_into()
                .map_err(|_| anyhow!("SSID too long (max 32 chars)"))?,
            password: password
                .try_into()
                .map_err(|_| anyhow!("Password too long (max 64 chars)"))?,
            auth_method,
            ..Default::default()
        }))?;

        let (tx, events) = mpsc::channel();

        let wifi_tx = tx.clone();
        let wifi_sub = sysloop.subscribe::<WifiEvent, _>(move |event| {
            let event = match event {
                WifiEvent::StaStarted => LinkEvent::Started,
                WifiEvent::StaDisconnected(_) => LinkEvent::Disconnected,
                _ => return,
            };
            let _ = wifi_tx.send(event);
        })?;

        let ip_sub = sysloop.subscribe::<IpEvent, _>(move |event| {
            if let IpEvent::DhcpIpAssigned(assignment) = event {
                let _ = tx.send(LinkEvent::GotAddress(assignment.ip()));
            }
        })?;

        Ok(Self {
            wifi,
            events,
            pending: VecDeque::new(),
            _wifi_sub: wifi_sub,
            _ip_sub: ip_sub,
        })
    }
}

impl Association for EspAssociation {
    fn current_address(&self) -> Option<Ipv4Addr> {
        if !self.wifi.is_connected().unwrap_or(false) {
            return None;
        }
        self.wifi
            .sta_netif()
            .get_ip_info()
            .ok()
            .map(|info| info.ip)
            .filter(|ip| !ip.is_unspecified())
    }

    fn start(&mut self) -> Result<(), NetError> {
        while self.events.try_recv().is_ok() {}
        self.pending.clear();

        if self.wifi.is_started().map_err(driver_error)? {
            // Already running; no StaStarted will come.
            debug!("WiFi already started");
            self.pending.push_back(LinkEvent::Started);
            Ok(())
        } else {
            info!("Starting WiFi");
            self.wifi.start().map_err(driver_error)
        }
    }

    fn associate(&mut self) -> Result<(), NetError> {
        self.wifi.connect().map_err(driver_error)
    }

    fn next_event(&mut self) -> Result<LinkEvent, NetError> {
        if let Some(event) = self.pending.pop_front() {
            return Ok(event);
        }
        self.events
            .recv()
            .map_err(|_| NetError::Driver("WiFi event channel closed".into()))
    }
}
