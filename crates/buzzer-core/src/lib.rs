//! # buzzer-core
//!
//! Control core of a networked quiz buzzer.
//!
//! This crate provides:
//! - The 1 kHz tick core driving the transducer and status LED
//! - The connectivity state machine and button edge detection
//! - The host protocol client and its session lifecycle
//! - The network retry contract and the orchestration loop
//!
//! Hardware and the link layer sit behind traits ([`hal::OutputLine`],
//! [`hal::InputLine`], [`network::Association`], [`transport::Connector`]),
//! so the same core runs on ESP32 and in the Linux simulator. There is no
//! async code; every context is a plain thread or an interrupt.

pub mod client;
pub mod config;
pub mod device;
pub mod hal;
pub mod network;
pub mod orchestrator;
pub mod state;
pub mod tasks;
pub mod tick;
pub mod transport;

pub use client::{HostClient, SessionEnd, SessionError};
pub use config::{ConfigError, DeviceConfig};
pub use device::{ButtonMonitor, DeviceController, DeviceSignals, ModeSink, PressSink};
pub use network::{Association, ConnectionManager, LinkEvent, NetError, StaticLink};
pub use orchestrator::{CycleOutcome, Orchestrator};
pub use state::{ConnectivityState, DeviceEvent, TransitionError};
pub use tasks::Shutdown;
pub use tick::{TickHandler, TickSignals};
pub use transport::{Connector, TcpConnector, Transport};
