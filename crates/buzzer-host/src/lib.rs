//! # buzzer-host
//!
//! Host side of the buzzer protocol on the tokio runtime.
//!
//! This crate provides:
//! - A TCP listener that accepts buzzers and checks their handshake
//! - A broadcast stream of [`HostEvent`]s (joins, presses, heartbeats)
//! - A [`DeviceRegistry`] for sending mode commands to connected buzzers

pub mod registry;
pub mod server;

pub use buzzer_protocol::{Mode, ModuleId};
pub use registry::{DeviceHandle, DeviceRegistry};
pub use server::{BuzzerServer, HostError, HostEvent, ServerConfig};
