// In-memory collaborators for service tests

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use wifi_ap::ap_config::ApConfig;
use wifi_ap::controller::ApService;
use wifi_ap::driver::{NetworkProvisioner, NotificationHandler, RadioDriver, RadioNotification};
use wifi_ap::error::{DriverError, ProvisionError};
use wifi_ap::types::{ApEvent, IpRange};

type SharedHandler = Arc<dyn Fn(RadioNotification) + Send + Sync>;

/// Radio driver double that records calls and echoes notifications the way
/// hostapd does (ApEnabled on start, ApDisabled on stop)
pub struct MockDriver {
    handler: Mutex<Option<SharedHandler>>,
    start_result: Mutex<Result<(), DriverError>>,
    stop_result: Mutex<Result<(), DriverError>>,
    capability: u8,
    live_reconfig: bool,
    pub start_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub reconfigure_calls: AtomicUsize,
    pub last_config: Mutex<Option<ApConfig>>,
}

impl MockDriver {
    pub fn new() -> Self {
        Self::with_capabilities(32, false)
    }

    pub fn with_capabilities(capability: u8, live_reconfig: bool) -> Self {
        Self {
            handler: Mutex::new(None),
            start_result: Mutex::new(Ok(())),
            stop_result: Mutex::new(Ok(())),
            capability,
            live_reconfig,
            start_calls: AtomicUsize::new(0),
            stop_calls: AtomicUsize::new(0),
            reconfigure_calls: AtomicUsize::new(0),
            last_config: Mutex::new(None),
        }
    }

    pub fn fail_start_with(&self, err: DriverError) {
        *self.start_result.lock() = Err(err);
    }

    pub fn fail_stop_with(&self, err: DriverError) {
        *self.stop_result.lock() = Err(err);
    }

    pub fn has_handler(&self) -> bool {
        self.handler.lock().is_some()
    }

    pub fn starts(&self) -> usize {
        self.start_calls.load(Ordering::SeqCst)
    }

    pub fn stops(&self) -> usize {
        self.stop_calls.load(Ordering::SeqCst)
    }

    /// Raise a notification as the radio would
    pub fn emit(&self, notification: RadioNotification) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(notification);
        }
    }
}

#[async_trait]
impl RadioDriver for MockDriver {
    async fn start(&self, config: &ApConfig) -> Result<(), DriverError> {
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock() = Some(config.clone());
        let result = self.start_result.lock().clone();
        if result.is_ok() {
            self.emit(RadioNotification::ApEnabled);
        }
        result
    }

    async fn stop(&self) -> Result<(), DriverError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        let result = self.stop_result.lock().clone();
        if result.is_ok() {
            self.emit(RadioNotification::ApDisabled);
        }
        result
    }

    async fn reconfigure(&self, config: &ApConfig) -> Result<(), DriverError> {
        self.reconfigure_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_config.lock() = Some(config.clone());
        Ok(())
    }

    fn max_clients_capability(&self) -> u8 {
        self.capability
    }

    fn supports_live_reconfig(&self) -> bool {
        self.live_reconfig
    }

    fn set_notification_handler(&self, handler: NotificationHandler) {
        *self.handler.lock() = Some(Arc::from(handler));
    }

    fn clear_notification_handler(&self) {
        *self.handler.lock() = None;
    }
}

/// Provisioner double that accepts or rejects every range
pub struct MockProvisioner {
    accept: bool,
    pub applied: Mutex<Vec<IpRange>>,
}

impl MockProvisioner {
    pub fn accepting() -> Self {
        Self {
            accept: true,
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn rejecting() -> Self {
        Self {
            accept: false,
            applied: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.applied.lock().len()
    }
}

#[async_trait]
impl NetworkProvisioner for MockProvisioner {
    async fn apply_range(&self, range: &IpRange) -> Result<(), ProvisionError> {
        self.applied.lock().push(*range);
        if self.accept {
            Ok(())
        } else {
            Err(ProvisionError("subnet already in use".to_string()))
        }
    }
}

/// A service wired to fresh doubles
pub fn service_with(
    driver: MockDriver,
    provisioner: MockProvisioner,
) -> (ApService, Arc<MockDriver>, Arc<MockProvisioner>) {
    let driver = Arc::new(driver);
    let provisioner = Arc::new(provisioner);
    let service = ApService::new(driver.clone(), provisioner.clone());
    (service, driver, provisioner)
}

pub fn service() -> (ApService, Arc<MockDriver>, Arc<MockProvisioner>) {
    service_with(MockDriver::new(), MockProvisioner::accepting())
}

/// Subscribe a recorder and return the shared list it appends to
pub fn record_events(service: &ApService) -> Arc<Mutex<Vec<ApEvent>>> {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let s = Arc::clone(&seen);
    service.subscribe(move |event| s.lock().push(*event));
    seen
}

/// A service with a complete open configuration, ready to start
pub fn startable() -> (ApService, Arc<MockDriver>, Arc<MockProvisioner>) {
    let (mut service, driver, provisioner) = service();
    service.set_ssid(b"TestNet").unwrap();
    service
        .set_security_protocol(wifi_ap::types::SecurityProtocol::Open)
        .unwrap();
    (service, driver, provisioner)
}
