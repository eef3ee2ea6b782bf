// Collaborator interfaces: radio driver and network provisioner

//! Collaborator interfaces
//!
//! The AP service never touches hardware or the IP stack itself. It talks to
//! a [`RadioDriver`] for start/stop and capability queries, and to a
//! [`NetworkProvisioner`] for the AP subnet's address plan. Both traits are
//! object safe so the daemon can pick implementations at runtime and tests can
//! substitute in-memory doubles.

use crate::ap_config::ApConfig;
use crate::error::{DriverError, ProvisionError};
use crate::types::IpRange;
use async_trait::async_trait;

/// Raw status notification emitted by a radio driver
///
/// Drivers may raise these from any thread or task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RadioNotification {
    /// The radio reports the AP is up
    ApEnabled,
    /// The radio reports the AP is down, on request or not
    ApDisabled,
    /// A station associated
    StationConnected {
        /// Station MAC address as reported by the driver
        mac: String,
    },
    /// A station disassociated or was deauthenticated
    StationDisconnected {
        /// Station MAC address as reported by the driver
        mac: String,
    },
    /// The driver process or hardware failed
    Failure {
        /// Driver-supplied description
        reason: String,
    },
}

/// Callback a driver invokes for every notification
pub type NotificationHandler = Box<dyn Fn(RadioNotification) + Send + Sync>;

/// Radio driver command interface
#[async_trait]
pub trait RadioDriver: Send + Sync {
    /// Bring the AP up with the given settings
    ///
    /// # Errors
    ///
    /// `HardwareAbsent` if there is no radio, `BringUpFailed` if the driver
    /// could not be installed or started, `Failed` otherwise.
    async fn start(&self, config: &ApConfig) -> Result<(), DriverError>;

    /// Take the AP down
    ///
    /// # Errors
    ///
    /// Returns an error if teardown could not be confirmed.
    async fn stop(&self) -> Result<(), DriverError>;

    /// Push new settings to a running AP without restarting it
    ///
    /// # Errors
    ///
    /// `Unsupported` unless [`RadioDriver::supports_live_reconfig`] is true.
    async fn reconfigure(&self, _config: &ApConfig) -> Result<(), DriverError> {
        Err(DriverError::Unsupported("live reconfiguration".to_string()))
    }

    /// Largest client limit the hardware accepts
    fn max_clients_capability(&self) -> u8;

    /// Whether settings can be changed while the AP is running
    fn supports_live_reconfig(&self) -> bool {
        false
    }

    /// Register the single notification callback
    ///
    /// Called once at service initialisation; a later call replaces the
    /// previous handler.
    fn set_notification_handler(&self, handler: NotificationHandler);

    /// Drop the notification callback
    fn clear_notification_handler(&self);
}

/// Applies IP addressing and DHCP ranges for the AP subnet
#[async_trait]
pub trait NetworkProvisioner: Send + Sync {
    /// Apply `range` to the AP interface
    ///
    /// # Errors
    ///
    /// Returns an error if the range was rejected or could not be applied.
    async fn apply_range(&self, range: &IpRange) -> Result<(), ProvisionError>;
}
