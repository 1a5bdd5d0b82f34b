//! Rust library for controlling Anthem A/V receivers and amplifiers
//!
//! This library speaks the Anthem IP control protocol over TCP and keeps a
//! live mirror of the device's state. It supports:
//!
//! - MRX x20, MRX x40, AVM 60/70/90 and MDX/MDA models
//! - Automatic reconnection with exponential backoff
//! - Power, volume, mute and input control for every zone
//! - Listening mode, dynamic range and panel brightness settings
//! - Real-time state updates via callback or subscription
//!
//! # Quick Start
//!
//! ```no_run
//! use anthemav::{Connection, UpdateCallback};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let callback: UpdateCallback = Arc::new(|message: &str| println!("Update: {}", message));
//!     let connection = Connection::create("192.168.1.50", 14999, true, Some(callback)).await?;
//!
//!     let avr = connection.avr();
//!     avr.wait_for_device_initialised(Duration::from_secs(5)).await?;
//!     println!("Connected to {} ({})", avr.model(), avr.mac_address());
//!
//!     // Control the main zone
//!     avr.set_power(true)?;
//!     avr.set_volume(35)?;
//!
//!     // And the second one
//!     if let Some(zone) = avr.zone(2) {
//!         zone.set_mute(true)?;
//!     }
//!
//!     connection.close();
//!     Ok(())
//! }
//! ```
//!
//! # Subscriptions
//!
//! ```no_run
//! use anthemav::{Connection, StateUpdate};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let connection = Connection::create("192.168.1.50", 14999, true, None).await?;
//!     let mut updates = connection.avr().subscribe();
//!     while let Ok(update) = updates.recv().await {
//!         if let StateUpdate::Zone { zone, message } = update {
//!             println!("Zone {} changed: {}", zone, message);
//!         }
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! The library is organized into several layers:
//!
//! - **Connection**: Supervises the TCP session and reconnects
//! - **Avr**: Protocol engine, framing and dispatching received messages
//! - **Zone**: Per-zone control handle
//! - **Model**: Dialect and zone layout derived from the model string
//! - **Commands**: Static command tables

mod avr;
mod commands;
mod config;
mod connection;
mod error;
mod model;
mod protocol;
mod store;
mod subscription;
mod transport;
mod types;
mod zone;

// Public exports
pub use avr::{Avr, UpdateCallback};
pub use commands::{
    match_prefix, Code, CommandDescriptor, DeviceCode, ZoneCode, DEVICE_COMMANDS, ZONE_COMMANDS,
};
pub use config::{ConnectionConfig, EngineTimings, ReconnectPolicy};
pub use connection::{Backoff, Connection};
pub use error::{AnthemError, Result};
pub use model::{Dialect, Identification, ListeningMode, ModelProfile, VolumeScale};
pub use protocol::{DeviceError, Framer, InputMessage, DEFAULT_PORT};
pub use store::{AttributeStore, InputDirectory};
pub use subscription::{StateReceiver, StateUpdate, Topic};
pub use types::{
    attenuation_to_volume, volume_to_attenuation, AvrSnapshot, InputSlot, ZoneNumber,
    ZoneSnapshot, EMPTY_MAC, MAX_ATTENUATION, MIN_ATTENUATION,
};
pub use zone::Zone;
