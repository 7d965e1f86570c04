//! Bluetooth Module
//!
//! Drives a Beurer TL100 lamp over BLE.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                      LightDriver                         │
//! │  (command sequencing, optimistic state, public API)      │
//! └──────────────┬──────────────────────────┬───────────────┘
//!                │                          │
//!                ▼                          ▼
//!        ┌──────────────┐          ┌──────────────────┐
//!        │  Connection  │─events──▶│ DeviceStateStore │
//!        │              │          │                  │
//!        │ - retries    │          │ - watch channel  │
//!        │ - GATT link  │          │ - notifications  │
//!        └──────┬───────┘          └──────────────────┘
//!               │
//!               ▼
//!        ┌──────────────┐    ┌──────────┐
//!        │ BluetoothHost│    │ Protocol │
//!        │ (WinRT/fake) │    │ - frames │
//!        └──────────────┘    └──────────┘
//! ```
//!
//! ## Modules
//!
//! - [`protocol`] - Frame layout, checksum and command payloads
//! - [`notification`] - Status frame interpretation
//! - [`state`] - Shared device state and update callback
//! - [`transport`] - Host and link traits
//! - [`connection`] - Link lifecycle, retries and link events
//! - [`service`] - Command sequencing

pub mod connection;
pub mod notification;
pub mod protocol;
pub mod service;
pub mod state;
pub mod transport;

#[cfg(windows)]
pub mod scanner;
#[cfg(windows)]
pub mod winrt;

#[cfg(test)]
mod fake;

pub use service::{DriverConfig, LightDriver};
