// Radio notification ingestion

//! Event ingestion adapter
//!
//! Turns driver-specific [`RadioNotification`]s into canonical [`ApEvent`]s
//! and publishes them on the event bus. Notifications arrive on the driver's
//! own thread or task, concurrently with service calls; the adapter holds its
//! own lock only briefly and does no blocking work beyond the publication.
//!
//! Associated stations are tracked by MAC address, so a repeated connect or a
//! disconnect for a station that never connected is dropped and client
//! counts kept by subscribers cannot drift. The set is cleared whenever the
//! radio reports the AP up or down.
//!
//! `ApEnabled`/`ApDisabled` reports that arrive while the controller is itself
//! starting or stopping the radio are dropped: the controller announces those
//! transitions once the driver call has returned. Outside such a window they
//! signal a change the controller did not ask for and are forwarded.

use crate::driver::{RadioDriver, RadioNotification};
use crate::event_bus::EventBus;
use crate::types::ApEvent;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared marker set while the controller drives a start or stop
#[derive(Debug, Clone, Default)]
pub struct TransitionFlag(Arc<AtomicBool>);

impl TransitionFlag {
    /// Mark a controller-driven transition as in progress
    pub fn begin(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Mark the transition as finished
    pub fn end(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    /// Whether a transition is in progress
    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Begin a transition that ends when the guard is dropped, including
    /// when the owning future is cancelled mid-call
    pub fn enter(&self) -> TransitionGuard {
        self.begin();
        TransitionGuard(self.clone())
    }
}

/// Ends a transition on drop
#[derive(Debug)]
pub struct TransitionGuard(TransitionFlag);

impl Drop for TransitionGuard {
    fn drop(&mut self) {
        self.0.end();
    }
}

/// Bridges radio notifications onto the AP event bus
pub struct EventIngestion {
    bus: Arc<EventBus<ApEvent>>,
    transition: TransitionFlag,
    stations: Mutex<HashSet<String>>,
}

impl EventIngestion {
    /// Create an adapter publishing on `bus`
    pub fn new(bus: Arc<EventBus<ApEvent>>, transition: TransitionFlag) -> Self {
        Self {
            bus,
            transition,
            stations: Mutex::new(HashSet::new()),
        }
    }

    /// Register this adapter as the driver's notification handler
    pub fn attach(self: Arc<Self>, driver: &dyn RadioDriver) {
        driver.set_notification_handler(Box::new(move |notification| {
            self.ingest(notification)
        }));
        log::debug!("Event ingestion attached to radio driver");
    }

    /// Map a notification to the event subscribers should see, if any
    pub fn translate(&self, notification: &RadioNotification) -> Option<ApEvent> {
        match notification {
            RadioNotification::ApEnabled | RadioNotification::ApDisabled => {
                self.stations.lock().clear();
                if self.transition.is_set() {
                    None
                } else if matches!(notification, RadioNotification::ApEnabled) {
                    Some(ApEvent::Started)
                } else {
                    Some(ApEvent::Stopped)
                }
            }
            RadioNotification::StationConnected { mac } => self
                .stations
                .lock()
                .insert(mac.to_ascii_lowercase())
                .then_some(ApEvent::ClientConnected),
            RadioNotification::StationDisconnected { mac } => self
                .stations
                .lock()
                .remove(&mac.to_ascii_lowercase())
                .then_some(ApEvent::ClientDisconnected),
            RadioNotification::Failure { .. } => Some(ApEvent::HardwareError),
        }
    }

    /// Number of stations currently associated
    pub fn station_count(&self) -> usize {
        self.stations.lock().len()
    }

    /// Translate and publish a notification
    pub fn ingest(&self, notification: RadioNotification) {
        match &notification {
            RadioNotification::StationConnected { mac } => {
                log::info!("Station {} connected", mac);
            }
            RadioNotification::StationDisconnected { mac } => {
                log::info!("Station {} disconnected", mac);
            }
            RadioNotification::Failure { reason } => {
                log::error!("Radio failure: {}", reason);
            }
            RadioNotification::ApDisabled if !self.transition.is_set() => {
                log::warn!("Radio reports AP stopped unexpectedly");
            }
            _ => log::debug!("Radio: {:?}", notification),
        }

        match self.translate(&notification) {
            Some(event) => self.bus.publish(&event),
            None => log::debug!("Notification {:?} dropped", notification),
        }
    }
}
