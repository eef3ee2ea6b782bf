// WiFi Access Point Control Library
// Shared modules for daemon and tests

#![warn(missing_docs)]

//! WiFi Access Point Control Library
//!
//! This library provides the control-plane core of a WiFi access point:
//! validated configuration, a start/stop lifecycle that guards which settings
//! may change while the radio is up, and fan-out of radio status events to
//! any number of subscribers.
//!
//! # Main Components
//!
//! - [`ap_config`]: Configuration store with field-level validation
//! - [`controller`]: Lifecycle state machine and the [`controller::ApService`] handle
//! - [`driver`]: Radio driver and network provisioner interfaces
//! - [`error`]: Error kinds reported by service operations
//! - [`event_bus`]: Multi-subscriber event delivery
//! - [`hostapd`]: Radio driver backed by a hostapd process
//! - [`ingest`]: Bridge from radio notifications to the event bus
//! - [`provisioner`]: Script-driven IP range provisioning
//! - [`settings`]: Configuration file parsing and validation
//! - [`state_file`]: Status file for external monitoring
//! - [`types`]: Shared data structures

pub mod ap_config;
pub mod controller;
pub mod driver;
pub mod error;
pub mod event_bus;
pub mod hostapd;
pub mod ingest;
pub mod provisioner;
pub mod settings;
pub mod state_file;
pub mod types;
