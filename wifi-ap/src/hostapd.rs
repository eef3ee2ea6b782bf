// hostapd-backed radio driver

//! hostapd radio driver
//!
//! This module implements [`RadioDriver`] on top of a `hostapd` child
//! process: the configuration snapshot is rendered to a `hostapd.conf`, the
//! daemon is spawned, and its stdout is followed on a background task to
//! confirm bring-up and to turn `AP-*` status lines into
//! [`RadioNotification`]s. Live reconfiguration goes through `hostapd_cli`.

use crate::ap_config::ApConfig;
use crate::driver::{NotificationHandler, RadioDriver, RadioNotification};
use crate::error::DriverError;
use crate::settings::{self, HostapdSettings};
use crate::types::{Credential, IeeeStandard, IeeeStdMask, SecurityProtocol};
use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::fmt::Write as _;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdout, Command};
use tokio::sync::{oneshot, Mutex};
use tokio::task::JoinHandle;

/// How long hostapd gets to report AP-ENABLED
const START_TIMEOUT_SECS: u64 = 10;

/// Control socket directory written into hostapd.conf
const CTRL_INTERFACE_DIR: &str = "/run/hostapd";

type SharedHandler = Arc<RwLock<Option<Arc<dyn Fn(RadioNotification) + Send + Sync>>>>;

struct HostapdProcess {
    child: Child,
    reader: JoinHandle<()>,
    stopping: Arc<AtomicBool>,
}

/// Radio driver managing a `hostapd` process for one interface
pub struct HostapdDriver {
    interface: String,
    binary: String,
    cli: String,
    conf_path: PathBuf,
    max_clients: u8,
    live_reconfig: bool,
    handler: SharedHandler,
    process: Mutex<Option<HostapdProcess>>,
}

impl HostapdDriver {
    /// Create a driver for `interface`
    ///
    /// # Errors
    ///
    /// Returns an error if the interface name contains characters that are
    /// unsafe to pass to hostapd.
    pub fn new(interface: String, hostapd: &HostapdSettings) -> Result<Self> {
        settings::validate_name(&interface, "Interface name")?;

        Ok(Self {
            interface,
            binary: hostapd.binary.clone(),
            cli: hostapd.cli.clone(),
            conf_path: hostapd.conf_path.clone(),
            max_clients: hostapd.max_clients,
            live_reconfig: hostapd.live_reconfig,
            handler: Arc::new(RwLock::new(None)),
            process: Mutex::new(None),
        })
    }

    /// Get the interface name
    pub fn interface(&self) -> &str {
        &self.interface
    }

    /// Whether the kernel exposes a wireless PHY for the interface
    fn radio_present(&self) -> bool {
        Path::new("/sys/class/net")
            .join(&self.interface)
            .join("phy80211")
            .exists()
    }

    fn write_conf(&self, config: &ApConfig) -> Result<()> {
        if let Some(dir) = self.conf_path.parent() {
            std::fs::create_dir_all(dir).context("Failed to create hostapd config directory")?;
        }
        std::fs::write(&self.conf_path, render_conf(&self.interface, config))
            .with_context(|| format!("Failed to write {}", self.conf_path.display()))?;
        Ok(())
    }

    async fn spawn(&self) -> std::result::Result<(HostapdProcess, oneshot::Receiver<()>), DriverError> {
        let mut child = Command::new(&self.binary)
            .arg(&self.conf_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| match e.kind() {
                ErrorKind::NotFound => {
                    DriverError::HardwareAbsent(format!("{} not installed", self.binary))
                }
                _ => DriverError::BringUpFailed(format!("failed to spawn {}: {}", self.binary, e)),
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DriverError::Failed("hostapd stdout not captured".to_string()))?;

        let stopping = Arc::new(AtomicBool::new(false));
        let (enabled_tx, enabled_rx) = oneshot::channel();
        let reader = tokio::spawn(follow_output(
            stdout,
            Arc::clone(&self.handler),
            Arc::clone(&stopping),
            enabled_tx,
        ));

        Ok((
            HostapdProcess {
                child,
                reader,
                stopping,
            },
            enabled_rx,
        ))
    }
}

#[async_trait]
impl RadioDriver for HostapdDriver {
    async fn start(&self, config: &ApConfig) -> std::result::Result<(), DriverError> {
        let mut slot = self.process.lock().await;
        if slot.is_some() {
            return Err(DriverError::Failed("hostapd already running".to_string()));
        }

        // hostapd refuses to come up without these
        config
            .check_startable()
            .map_err(|e| DriverError::Failed(e.to_string()))?;

        if !self.radio_present() {
            return Err(DriverError::HardwareAbsent(format!(
                "no wireless PHY behind {}",
                self.interface
            )));
        }

        self.write_conf(config)
            .map_err(|e| DriverError::Failed(format!("{:#}", e)))?;

        log::info!("Starting hostapd on {}", self.interface);
        let (mut process, enabled_rx) = self.spawn().await?;

        match tokio::time::timeout(Duration::from_secs(START_TIMEOUT_SECS), enabled_rx).await {
            Ok(Ok(())) => {
                log::info!("hostapd is up on {}", self.interface);
                *slot = Some(process);
                Ok(())
            }
            Ok(Err(_)) => {
                // Reader finished without AP-ENABLED: hostapd exited
                let status = process.child.wait().await.ok();
                let _ = process.reader.await;
                Err(DriverError::BringUpFailed(format!(
                    "hostapd exited during start ({})",
                    status.map_or_else(|| "unknown status".to_string(), |s| s.to_string())
                )))
            }
            Err(_) => {
                log::error!("hostapd did not enable the AP within {}s", START_TIMEOUT_SECS);
                process.stopping.store(true, Ordering::SeqCst);
                let _ = process.child.kill().await;
                let _ = process.reader.await;
                Err(DriverError::BringUpFailed("timed out waiting for AP-ENABLED".to_string()))
            }
        }
    }

    async fn stop(&self) -> std::result::Result<(), DriverError> {
        let mut slot = self.process.lock().await;
        let Some(mut process) = slot.take() else {
            log::debug!("hostapd not running on {}, nothing to stop", self.interface);
            return Ok(());
        };

        log::info!("Stopping hostapd on {}", self.interface);
        process.stopping.store(true, Ordering::SeqCst);

        if let Err(e) = process.child.kill().await {
            // Already exited is fine, anything else means we lost track of it
            if e.kind() != ErrorKind::InvalidInput {
                return Err(DriverError::Failed(format!("failed to kill hostapd: {}", e)));
            }
        }
        // Drain remaining output so no notification trails the stop
        let _ = process.reader.await;

        log::info!("hostapd stopped on {}", self.interface);
        Ok(())
    }

    async fn reconfigure(&self, config: &ApConfig) -> std::result::Result<(), DriverError> {
        if !self.live_reconfig {
            return Err(DriverError::Unsupported("live reconfiguration disabled".to_string()));
        }
        config
            .check_startable()
            .map_err(|e| DriverError::Failed(e.to_string()))?;

        self.write_conf(config)
            .map_err(|e| DriverError::Failed(format!("{:#}", e)))?;

        let output = Command::new(&self.cli)
            .args(["-p", CTRL_INTERFACE_DIR, "-i", &self.interface, "reload"])
            .output()
            .await
            .map_err(|e| DriverError::Failed(format!("failed to execute {}: {}", self.cli, e)))?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        if !output.status.success() || stdout.contains("FAIL") {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DriverError::Failed(format!(
                "{} reload failed: {}{}",
                self.cli,
                stdout.trim(),
                stderr.trim()
            )));
        }
        Ok(())
    }

    fn max_clients_capability(&self) -> u8 {
        self.max_clients
    }

    fn supports_live_reconfig(&self) -> bool {
        self.live_reconfig
    }

    fn set_notification_handler(&self, handler: NotificationHandler) {
        *self.handler.write() = Some(Arc::from(handler));
    }

    fn clear_notification_handler(&self) {
        *self.handler.write() = None;
    }
}

/// Follow hostapd's stdout until EOF, forwarding status lines
async fn follow_output(
    stdout: ChildStdout,
    handler: SharedHandler,
    stopping: Arc<AtomicBool>,
    enabled_tx: oneshot::Sender<()>,
) {
    let mut lines = BufReader::new(stdout).lines();
    let mut enabled_tx = Some(enabled_tx);

    let notify = |notification: RadioNotification| {
        // Clone out of the lock so the callback runs unlocked
        let current = handler.read().clone();
        if let Some(callback) = current {
            callback(notification);
        }
    };

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                log::warn!("Failed to read hostapd output: {}", e);
                break;
            }
        };

        log::debug!("hostapd: {}", line);
        let Some(notification) = parse_event_line(&line) else {
            continue;
        };

        if notification == RadioNotification::ApEnabled {
            if let Some(tx) = enabled_tx.take() {
                let _ = tx.send(());
            }
        }
        notify(notification);
    }

    // Only report a crash for an AP that was actually up
    if enabled_tx.is_none() && !stopping.load(Ordering::SeqCst) {
        log::error!("hostapd exited unexpectedly");
        notify(RadioNotification::Failure {
            reason: "hostapd exited unexpectedly".to_string(),
        });
        notify(RadioNotification::ApDisabled);
    }
}

/// Parse one line of hostapd output into a notification
///
/// Lines look like `wlan0: AP-STA-CONNECTED 02:00:00:00:01:00`; the interface
/// prefix is optional. Anything that is not a recognised event yields `None`.
pub fn parse_event_line(line: &str) -> Option<RadioNotification> {
    let message = line.split_once(": ").map_or(line, |(_, rest)| rest);
    let mut parts = message.split_whitespace();

    match parts.next()? {
        "AP-ENABLED" => Some(RadioNotification::ApEnabled),
        "AP-DISABLED" => Some(RadioNotification::ApDisabled),
        "AP-STA-CONNECTED" => parts.next().map(|mac| RadioNotification::StationConnected {
            mac: mac.to_string(),
        }),
        "AP-STA-DISCONNECTED" => parts.next().map(|mac| RadioNotification::StationDisconnected {
            mac: mac.to_string(),
        }),
        _ => None,
    }
}

/// hostapd `hw_mode` for a standard mask and channel
fn hw_mode(mask: IeeeStdMask, channel: u16) -> &'static str {
    if channel > 14 {
        "a"
    } else if mask.contains(IeeeStandard::G) || mask.contains(IeeeStandard::N) {
        "g"
    } else if mask.contains(IeeeStandard::B) {
        "b"
    } else if mask.contains(IeeeStandard::Ad) {
        "ad"
    } else if mask.contains(IeeeStandard::A) || mask.contains(IeeeStandard::Ac) {
        "a"
    } else {
        "g"
    }
}

/// Render a hostapd.conf for `interface` from a configuration snapshot
pub fn render_conf(interface: &str, config: &ApConfig) -> String {
    let mask = config.effective_ieee_standard();
    let mut conf = String::new();

    // Writing to a String cannot fail
    let _ = writeln!(conf, "interface={}", interface);
    let _ = writeln!(conf, "driver=nl80211");
    let _ = writeln!(conf, "ctrl_interface={}", CTRL_INTERFACE_DIR);
    let _ = writeln!(conf, "ssid2={}", hex_encode(config.ssid()));
    let _ = writeln!(conf, "country_code={}", config.country_code());
    let _ = writeln!(conf, "hw_mode={}", hw_mode(mask, config.channel()));
    let _ = writeln!(conf, "channel={}", config.channel());
    let _ = writeln!(conf, "max_num_sta={}", config.max_clients());
    let _ = writeln!(
        conf,
        "ignore_broadcast_ssid={}",
        if config.discoverable() { 0 } else { 1 }
    );

    for (standard, key) in [
        (IeeeStandard::D, "ieee80211d"),
        (IeeeStandard::H, "ieee80211h"),
        (IeeeStandard::N, "ieee80211n"),
        (IeeeStandard::Ac, "ieee80211ac"),
        (IeeeStandard::W, "ieee80211w"),
    ] {
        if mask.contains(standard) {
            let _ = writeln!(conf, "{}=1", key);
        }
    }

    let _ = writeln!(conf, "auth_algs=1");
    match config.security_protocol() {
        SecurityProtocol::Open | SecurityProtocol::Wep => {
            let _ = writeln!(conf, "wpa=0");
        }
        SecurityProtocol::Wpa => {
            let _ = writeln!(conf, "wpa=1");
            let _ = writeln!(conf, "wpa_key_mgmt=WPA-PSK");
            let _ = writeln!(conf, "wpa_pairwise=TKIP");
        }
        SecurityProtocol::Wpa2 => {
            let _ = writeln!(conf, "wpa=2");
            let _ = writeln!(conf, "wpa_key_mgmt=WPA-PSK");
            let _ = writeln!(conf, "rsn_pairwise=CCMP");
        }
    }

    if config.security_protocol().requires_credential() {
        match config.credential() {
            Some(Credential::Passphrase(p)) => {
                let _ = writeln!(conf, "wpa_passphrase={}", p);
            }
            Some(Credential::PreSharedKey(psk)) => {
                let _ = writeln!(conf, "wpa_psk={}", psk);
            }
            None => {}
        }
    }

    conf
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut s, b| {
        let _ = write!(s, "{:02x}", b);
        s
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hostapd_settings() -> HostapdSettings {
        HostapdSettings {
            binary: "hostapd".to_string(),
            cli: "hostapd_cli".to_string(),
            conf_path: PathBuf::from("/run/wifi-ap/hostapd.conf"),
            max_clients: 32,
            live_reconfig: true,
        }
    }

    fn base_config() -> ApConfig {
        let mut config = ApConfig::new();
        config.set_ssid(b"TestNet").unwrap();
        config.set_passphrase("supersecret").unwrap();
        config
    }

    #[test]
    fn test_driver_creation() {
        let driver = HostapdDriver::new("wlan0".to_string(), &hostapd_settings()).unwrap();
        assert_eq!(driver.interface(), "wlan0");
        assert_eq!(driver.max_clients_capability(), 32);
        assert!(driver.supports_live_reconfig());
    }

    #[test]
    fn test_driver_creation_invalid_interface() {
        assert!(HostapdDriver::new("wlan0; reboot".to_string(), &hostapd_settings()).is_err());
        assert!(HostapdDriver::new("".to_string(), &hostapd_settings()).is_err());
    }

    #[test]
    fn test_parse_event_lines() {
        assert_eq!(
            parse_event_line("wlan0: AP-ENABLED"),
            Some(RadioNotification::ApEnabled)
        );
        assert_eq!(
            parse_event_line("wlan0: AP-DISABLED "),
            Some(RadioNotification::ApDisabled)
        );
        assert_eq!(
            parse_event_line("wlan0: AP-STA-CONNECTED 02:00:00:00:01:00"),
            Some(RadioNotification::StationConnected {
                mac: "02:00:00:00:01:00".to_string()
            })
        );
        assert_eq!(
            parse_event_line("AP-STA-DISCONNECTED 02:00:00:00:01:00"),
            Some(RadioNotification::StationDisconnected {
                mac: "02:00:00:00:01:00".to_string()
            })
        );
    }

    #[test]
    fn test_parse_event_lines_ignored() {
        assert_eq!(parse_event_line(""), None);
        assert_eq!(parse_event_line("Configuration file: /run/hostapd.conf"), None);
        assert_eq!(parse_event_line("wlan0: interface state UNINITIALIZED->ENABLED"), None);
        assert_eq!(parse_event_line("nl80211: Could not configure driver mode"), None);
        // Station event without a MAC is malformed
        assert_eq!(parse_event_line("wlan0: AP-STA-CONNECTED"), None);
    }

    #[test]
    fn test_render_wpa2_passphrase() {
        let conf = render_conf("wlan0", &base_config());
        assert!(conf.contains("interface=wlan0\n"));
        assert!(conf.contains("ssid2=546573744e6574\n"));
        assert!(conf.contains("hw_mode=g\n"));
        assert!(conf.contains("channel=7\n"));
        assert!(conf.contains("country_code=US\n"));
        assert!(conf.contains("max_num_sta=10\n"));
        assert!(conf.contains("ignore_broadcast_ssid=0\n"));
        assert!(conf.contains("wpa=2\n"));
        assert!(conf.contains("rsn_pairwise=CCMP\n"));
        assert!(conf.contains("wpa_passphrase=supersecret\n"));
        assert!(!conf.contains("wpa_psk="));
    }

    #[test]
    fn test_render_uses_latest_credential() {
        let psk = "ab".repeat(32);
        let mut config = base_config();
        config.set_pre_shared_key(&psk).unwrap();
        let conf = render_conf("wlan0", &config);
        assert!(conf.contains(&format!("wpa_psk={}\n", psk)));
        assert!(!conf.contains("wpa_passphrase="));
    }

    #[test]
    fn test_render_open_hidden() {
        let mut config = base_config();
        config.set_security_protocol(SecurityProtocol::Open).unwrap();
        config.set_discoverable(false);
        let conf = render_conf("wlan0", &config);
        assert!(conf.contains("wpa=0\n"));
        assert!(conf.contains("ignore_broadcast_ssid=1\n"));
        assert!(!conf.contains("wpa_passphrase="));
    }

    #[test]
    fn test_render_5ghz_n_ac() {
        let mut config = base_config();
        let mask: IeeeStdMask = [IeeeStandard::A, IeeeStandard::N, IeeeStandard::Ac]
            .into_iter()
            .collect();
        config.set_ieee_standard(mask).unwrap();
        config.set_channel(36).unwrap();
        let conf = render_conf("wlan0", &config);
        assert!(conf.contains("hw_mode=a\n"));
        assert!(conf.contains("ieee80211n=1\n"));
        assert!(conf.contains("ieee80211ac=1\n"));
        assert!(!conf.contains("ieee80211d=1"));
    }

    #[test]
    fn test_hw_mode() {
        assert_eq!(hw_mode(IeeeStandard::B.into(), 6), "b");
        assert_eq!(hw_mode(IeeeStandard::Ad.into(), 2), "ad");
        assert_eq!(hw_mode(IeeeStandard::A.into(), 100), "a");
        assert_eq!(hw_mode(IeeeStdMask::from_bits(0), 6), "g");
    }

    #[test]
    fn test_hex_encode() {
        assert_eq!(hex_encode(&[]), "");
        assert_eq!(hex_encode(&[0x00, 0xff, 0x1a]), "00ff1a");
    }

    #[tokio::test]
    async fn test_stop_when_not_running() {
        let driver = HostapdDriver::new("wlan0".to_string(), &hostapd_settings()).unwrap();
        assert!(driver.stop().await.is_ok());
    }

    #[tokio::test]
    async fn test_reconfigure_disabled() {
        let mut settings = hostapd_settings();
        settings.live_reconfig = false;
        let driver = HostapdDriver::new("wlan0".to_string(), &settings).unwrap();
        assert!(matches!(
            driver.reconfigure(&base_config()).await,
            Err(DriverError::Unsupported(_))
        ));
    }

    #[tokio::test]
    async fn test_start_refuses_incomplete_config() {
        let driver = HostapdDriver::new("nosuchif0".to_string(), &hostapd_settings()).unwrap();

        // No SSID
        assert!(matches!(
            driver.start(&ApConfig::new()).await,
            Err(DriverError::Failed(_))
        ));

        // WPA2 without a credential
        let mut config = ApConfig::new();
        config.set_ssid(b"TestNet").unwrap();
        assert!(matches!(
            driver.start(&config).await,
            Err(DriverError::Failed(_))
        ));
    }

    #[tokio::test]
    async fn test_start_without_radio_is_hardware_absent() {
        let driver = HostapdDriver::new("nosuchif0".to_string(), &hostapd_settings()).unwrap();
        assert!(matches!(
            driver.start(&base_config()).await,
            Err(DriverError::HardwareAbsent(_))
        ));
    }

    #[test]
    fn test_notification_handler_registration() {
        let driver = HostapdDriver::new("wlan0".to_string(), &hostapd_settings()).unwrap();
        driver.set_notification_handler(Box::new(|_| {}));
        assert!(driver.handler.read().is_some());
        driver.clear_notification_handler();
        assert!(driver.handler.read().is_none());
    }
}
