// Access point lifecycle controller

//! Lifecycle controller
//!
//! [`Lifecycle`] is the pure transition table for the AP state machine
//! (Stopped -> Starting -> Running -> Stopping -> Stopped). [`ApService`] owns
//! one of them together with the configuration store, the event bus and the
//! collaborators, and drives the radio driver according to the actions the
//! table returns.
//!
//! Service calls are expected to be serialized by the caller (they take
//! `&mut self`). Only event delivery runs concurrently with them.

use crate::ap_config::ApConfig;
use crate::driver::{NetworkProvisioner, RadioDriver};
use crate::error::{ApError, Result};
use crate::event_bus::{EventBus, SubscriptionId};
use crate::ingest::{EventIngestion, TransitionFlag};
use crate::types::{ApEvent, ApState, IeeeStdMask, SecurityProtocol};
use std::sync::Arc;

/// Inputs to the lifecycle state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleCommand {
    /// Caller asked to start the AP
    Start,
    /// Driver confirmed start
    StartSucceeded,
    /// Driver start failed
    StartFailed,
    /// Caller asked to stop the AP
    Stop,
    /// Driver confirmed teardown
    StopSucceeded,
    /// Driver could not confirm teardown
    StopFailed,
}

/// What the service must do after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Invoke the driver's start with a configuration snapshot
    StartRadio,
    /// Invoke the driver's stop
    StopRadio,
    /// Publish an event to subscribers
    Announce(ApEvent),
    /// No action needed
    None,
}

/// AP lifecycle state machine
#[derive(Debug)]
pub struct Lifecycle {
    state: ApState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Create a state machine in `Stopped`
    pub fn new() -> Self {
        Self {
            state: ApState::Stopped,
        }
    }

    /// Apply a command, returning the action to take
    ///
    /// Caller requests that are illegal in the current state fail with
    /// `InvalidState` and leave the state untouched. Driver completions that
    /// do not match a pending request are internal faults.
    pub fn handle(&mut self, cmd: LifecycleCommand) -> Result<LifecycleAction> {
        log::debug!("Lifecycle: {:?}, Command: {:?}", self.state, cmd);

        match (self.state, cmd) {
            (ApState::Stopped, LifecycleCommand::Start) => {
                log::info!("Starting access point");
                self.state = ApState::Starting;
                Ok(LifecycleAction::StartRadio)
            }

            (ApState::Starting, LifecycleCommand::StartSucceeded) => {
                log::info!("Access point running");
                self.state = ApState::Running;
                Ok(LifecycleAction::Announce(ApEvent::Started))
            }

            (ApState::Starting, LifecycleCommand::StartFailed) => {
                log::warn!("Access point start failed, back to stopped");
                self.state = ApState::Stopped;
                Ok(LifecycleAction::None)
            }

            // Starting is accepted so an abandoned start can still be torn down
            (ApState::Running, LifecycleCommand::Stop)
            | (ApState::Starting, LifecycleCommand::Stop) => {
                log::info!("Stopping access point");
                self.state = ApState::Stopping;
                Ok(LifecycleAction::StopRadio)
            }

            (ApState::Stopping, LifecycleCommand::StopSucceeded) => {
                log::info!("Access point stopped");
                self.state = ApState::Stopped;
                Ok(LifecycleAction::Announce(ApEvent::Stopped))
            }

            // Falling back to Stopped keeps the service retriable; the radio
            // may still be up.
            (ApState::Stopping, LifecycleCommand::StopFailed) => {
                log::warn!("Driver did not confirm teardown, assuming stopped");
                self.state = ApState::Stopped;
                Ok(LifecycleAction::None)
            }

            (state, LifecycleCommand::Start) | (state, LifecycleCommand::Stop) => {
                log::warn!("Rejecting {:?} while {}", cmd, state);
                Err(ApError::InvalidState(state))
            }

            (state, cmd) => Err(ApError::Fault(format!(
                "unexpected {:?} while {}",
                cmd, state
            ))),
        }
    }

    /// Get current state
    pub fn state(&self) -> ApState {
        self.state
    }
}

/// The WiFi access point service
///
/// One instance per process. It owns the lifecycle state and pending
/// configuration, registers itself for driver notifications on creation and
/// releases that registration in [`ApService::shutdown`].
pub struct ApService {
    lifecycle: Lifecycle,
    config: ApConfig,
    driver: Arc<dyn RadioDriver>,
    provisioner: Arc<dyn NetworkProvisioner>,
    bus: Arc<EventBus<ApEvent>>,
    transition: TransitionFlag,
}

impl ApService {
    /// Create the service and hook the driver's notifications to the bus
    pub fn new(driver: Arc<dyn RadioDriver>, provisioner: Arc<dyn NetworkProvisioner>) -> Self {
        let bus = Arc::new(EventBus::new("wifi-ap"));
        let transition = TransitionFlag::default();

        Arc::new(EventIngestion::new(Arc::clone(&bus), transition.clone()))
            .attach(driver.as_ref());

        log::debug!("WiFi access point service is ready");

        Self {
            lifecycle: Lifecycle::new(),
            config: ApConfig::new(),
            driver,
            provisioner,
            bus,
            transition,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ApState {
        self.lifecycle.state()
    }

    /// Pending configuration
    pub fn config(&self) -> &ApConfig {
        &self.config
    }

    /// The event bus, for subscribers that outlive a borrow of the service
    pub fn event_bus(&self) -> Arc<EventBus<ApEvent>> {
        Arc::clone(&self.bus)
    }

    /// Register an event handler
    pub fn subscribe<F>(&self, handler: F) -> SubscriptionId
    where
        F: Fn(&ApEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(handler)
    }

    /// Register an event handler with its own context value
    pub fn subscribe_with_context<C, F>(&self, context: C, handler: F) -> SubscriptionId
    where
        C: Send + Sync + 'static,
        F: Fn(&ApEvent, &C) + Send + Sync + 'static,
    {
        self.bus.subscribe_with_context(context, handler)
    }

    /// Remove an event handler. Safe to call more than once.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.bus.unsubscribe(id);
    }

    /// Start the access point with the current configuration
    ///
    /// All settings must be in place beforehand; the driver decides whether
    /// the snapshot is usable. Fails with `InvalidState` unless stopped.
    /// Driver failures map to `NotFound` (no hardware), `NotSupported`
    /// (bring-up failed) or `Fault`.
    pub async fn start(&mut self) -> Result<()> {
        self.lifecycle.handle(LifecycleCommand::Start)?;

        let snapshot = self.config.clone();
        let outcome = {
            let _transition = self.transition.enter();
            self.driver.start(&snapshot).await
        };

        match outcome {
            Ok(()) => {
                let action = self.lifecycle.handle(LifecycleCommand::StartSucceeded)?;
                self.perform(action);
                Ok(())
            }
            Err(e) => {
                log::error!("Radio driver start failed: {}", e);
                self.lifecycle.handle(LifecycleCommand::StartFailed)?;
                Err(e.into())
            }
        }
    }

    /// Stop the access point
    ///
    /// Legal from Running (and from Starting, for an abandoned start). If the
    /// driver cannot confirm teardown the service still falls back to Stopped
    /// and returns `Fault`.
    pub async fn stop(&mut self) -> Result<()> {
        self.stop_radio(true).await
    }

    /// Bring the lifecycle back to Stopped after the radio went down on its
    /// own
    ///
    /// The driver is still asked to tear down so it can reap what is left.
    /// No `Stopped` event is published: subscribers already received one
    /// from the radio.
    pub async fn acknowledge_radio_down(&mut self) -> Result<()> {
        self.stop_radio(false).await
    }

    async fn stop_radio(&mut self, announce: bool) -> Result<()> {
        self.lifecycle.handle(LifecycleCommand::Stop)?;

        let outcome = {
            let _transition = self.transition.enter();
            self.driver.stop().await
        };

        match outcome {
            Ok(()) => {
                let action = self.lifecycle.handle(LifecycleCommand::StopSucceeded)?;
                if announce {
                    self.perform(action);
                }
                Ok(())
            }
            Err(e) => {
                log::error!("Radio driver stop failed: {}", e);
                self.lifecycle.handle(LifecycleCommand::StopFailed)?;
                Err(ApError::Fault(e.to_string()))
            }
        }
    }

    /// Push the current configuration to a running AP
    ///
    /// Only legal while running on a driver that supports live
    /// reconfiguration.
    pub async fn reload(&mut self) -> Result<()> {
        let state = self.state();
        if state != ApState::Running || !self.driver.supports_live_reconfig() {
            log::warn!("Rejecting reload while {}", state);
            return Err(ApError::InvalidState(state));
        }

        let snapshot = self.config.clone();
        let _transition = self.transition.enter();
        self.driver.reconfigure(&snapshot).await.map_err(|e| {
            log::error!("Radio driver reconfiguration failed: {}", e);
            ApError::from(e)
        })?;
        log::info!("Access point reconfigured");
        Ok(())
    }

    /// Stop the AP if needed and release the driver registration
    pub async fn shutdown(mut self) {
        log::info!("Shutting down access point service");
        if matches!(self.state(), ApState::Running | ApState::Starting) {
            if let Err(e) = self.stop().await {
                log::error!("Failed to stop access point during shutdown: {}", e);
            }
        }
        self.driver.clear_notification_handler();
    }

    /// Set the SSID (1 to 32 octets). Only while stopped.
    pub fn set_ssid(&mut self, ssid: &[u8]) -> Result<()> {
        self.require_stopped("SSID")?;
        self.config.set_ssid(ssid)
    }

    /// Set the security protocol. Only while stopped.
    pub fn set_security_protocol(&mut self, security: SecurityProtocol) -> Result<()> {
        self.require_stopped("security protocol")?;
        self.config.set_security_protocol(security)
    }

    /// Set the WPA passphrase
    pub fn set_passphrase(&mut self, passphrase: &str) -> Result<()> {
        self.require_reconfigurable("passphrase")?;
        self.config.set_passphrase(passphrase)
    }

    /// Set the WPA pre-shared key
    pub fn set_pre_shared_key(&mut self, psk: &str) -> Result<()> {
        self.require_reconfigurable("pre-shared key")?;
        self.config.set_pre_shared_key(psk)
    }

    /// Show or hide the SSID
    pub fn set_discoverable(&mut self, discoverable: bool) -> Result<()> {
        self.require_reconfigurable("discoverability")?;
        self.config.set_discoverable(discoverable);
        Ok(())
    }

    /// Set the channel. Only while stopped.
    pub fn set_channel(&mut self, channel: u16) -> Result<()> {
        self.require_stopped("channel")?;
        self.config.set_channel(channel)
    }

    /// Select IEEE standards. Only while stopped.
    pub fn set_ieee_standard(&mut self, mask: IeeeStdMask) -> Result<()> {
        self.require_stopped("IEEE standard")?;
        self.config.set_ieee_standard(mask)
    }

    /// The IEEE standard mask, once one has been set
    pub fn ieee_standard(&self) -> Result<IeeeStdMask> {
        self.config.ieee_standard()
    }

    /// Set the regulatory domain. Only while stopped.
    pub fn set_country_code(&mut self, code: &str) -> Result<()> {
        self.require_stopped("country code")?;
        self.config.set_country_code(code)
    }

    /// Set the client limit, bounded by the radio's capability
    pub fn set_max_clients(&mut self, max_clients: u8) -> Result<()> {
        self.require_reconfigurable("max clients")?;
        let capability = self.driver.max_clients_capability();
        self.config.set_max_clients(max_clients, capability)
    }

    /// Validate an address plan and hand it to the network provisioner
    ///
    /// The range is only recorded once the provisioner has accepted it.
    pub async fn set_ip_range(&mut self, ap: &str, start: &str, stop: &str) -> Result<()> {
        let range = ApConfig::validate_ip_range(ap, start, stop)?;

        self.provisioner.apply_range(&range).await.map_err(|e| {
            log::error!("Network provisioner failed: {}", e);
            ApError::from(e)
        })?;

        log::info!(
            "AP address {} serving {}-{}",
            range.ap,
            range.start,
            range.stop
        );
        self.config.set_ip_range(range);
        Ok(())
    }

    fn perform(&self, action: LifecycleAction) {
        if let LifecycleAction::Announce(event) = action {
            self.bus.publish(&event);
        }
    }

    fn require_stopped(&self, field: &str) -> Result<()> {
        let state = self.state();
        if state.is_stopped() {
            Ok(())
        } else {
            log::warn!("Cannot change {} while {}", field, state);
            Err(ApError::InvalidState(state))
        }
    }

    fn require_reconfigurable(&self, field: &str) -> Result<()> {
        let state = self.state();
        match state {
            ApState::Stopped => Ok(()),
            ApState::Running if self.driver.supports_live_reconfig() => Ok(()),
            _ => {
                log::warn!("Cannot change {} while {}", field, state);
                Err(ApError::InvalidState(state))
            }
        }
    }
}
