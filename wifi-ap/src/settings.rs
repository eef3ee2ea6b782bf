// Daemon configuration file parser

//! Configuration file parsing and validation
//!
//! This module loads the daemon's TOML configuration and checks the parts
//! that only make sense at file level (interface names, collaborator paths).
//! The `[ap]` table is not validated here: it is applied through the same
//! service setters a runtime caller would use, so both paths share one set
//! of rules.

use crate::controller::ApService;
use crate::types::{IeeeStandard, IeeeStdMask, SecurityProtocol};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// `[general]` table
    pub general: GeneralSettings,
    /// `[hostapd]` table
    #[serde(default)]
    pub hostapd: HostapdSettings,
    /// `[provisioner]` table; IP ranges are rejected without it
    #[serde(default)]
    pub provisioner: Option<ProvisionerSettings>,
    /// `[ap]` table
    #[serde(default)]
    pub ap: ApSettings,
}

/// General daemon options
#[derive(Debug, Deserialize, Clone)]
pub struct GeneralSettings {
    /// Wireless interface the AP runs on
    pub interface: String,
    /// Default `env_logger` filter, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Status file for external monitoring
    #[serde(default = "default_state_file")]
    pub state_file: PathBuf,
}

/// hostapd driver options
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HostapdSettings {
    /// hostapd executable
    pub binary: String,
    /// hostapd_cli executable, used for reloads
    pub cli: String,
    /// Where the generated hostapd.conf is written
    pub conf_path: PathBuf,
    /// Client limit the hardware supports
    pub max_clients: u8,
    /// Allow credential/discoverability/client-limit changes while running
    pub live_reconfig: bool,
}

impl Default for HostapdSettings {
    fn default() -> Self {
        Self {
            binary: "hostapd".to_string(),
            cli: "hostapd_cli".to_string(),
            conf_path: PathBuf::from("/run/wifi-ap/hostapd.conf"),
            max_clients: 32,
            live_reconfig: true,
        }
    }
}

/// Network provisioner options
#[derive(Debug, Deserialize, Clone)]
pub struct ProvisionerSettings {
    /// Script invoked as `<script> <iface> <ap> <start> <stop>`
    pub script: PathBuf,
}

/// Initial AP settings applied at startup
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ApSettings {
    /// Network name
    pub ssid: Option<String>,
    /// Security protocol
    pub security: Option<SecurityProtocol>,
    /// WPA passphrase
    pub passphrase: Option<String>,
    /// WPA pre-shared key, 64 hex digits
    pub psk: Option<String>,
    /// Broadcast the SSID
    pub discoverable: Option<bool>,
    /// Channel number
    pub channel: Option<u16>,
    /// Enabled IEEE standards; empty leaves the hardware default
    pub ieee_standards: Vec<IeeeStandard>,
    /// ISO 3166-1 alpha-2 regulatory domain
    pub country_code: Option<String>,
    /// Client limit
    pub max_clients: Option<u8>,
    /// Address plan handed to the provisioner
    pub ip_range: Option<IpRangeSettings>,
    /// Start the AP once the settings are applied
    pub autostart: bool,
}

impl Default for ApSettings {
    fn default() -> Self {
        Self {
            ssid: None,
            security: None,
            passphrase: None,
            psk: None,
            discoverable: None,
            channel: None,
            ieee_standards: Vec::new(),
            country_code: None,
            max_clients: None,
            ip_range: None,
            autostart: true,
        }
    }
}

/// Address plan as written in the configuration file
#[derive(Debug, Deserialize, Clone)]
pub struct IpRangeSettings {
    /// Address of the AP itself
    pub ap: String,
    /// First leased address
    pub start: String,
    /// Last leased address
    pub stop: String,
}

// Default values for configuration
fn default_log_level() -> String {
    "info".to_string()
}

fn default_state_file() -> PathBuf {
    PathBuf::from("/run/wifi-ap/state")
}

/// Load configuration from TOML file
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let contents = fs::read_to_string(path.as_ref()).context("Failed to read config file")?;

    let settings: Settings = toml::from_str(&contents).context("Failed to parse config file")?;

    validate_settings(&settings)?;
    Ok(settings)
}

/// Validate file-level configuration values
fn validate_settings(settings: &Settings) -> Result<()> {
    validate_name(&settings.general.interface, "interface")?;

    if settings.hostapd.binary.is_empty() {
        anyhow::bail!("hostapd.binary cannot be empty");
    }

    if settings.hostapd.max_clients == 0 {
        anyhow::bail!("hostapd.max_clients must be > 0");
    }

    if settings.ap.ip_range.is_some() && settings.provisioner.is_none() {
        anyhow::bail!("ap.ip_range requires a [provisioner] section");
    }

    Ok(())
}

/// Validates that a name (interface or similar) is safe to pass to external
/// commands. Only allows alphanumeric characters, hyphens, underscores and
/// dots.
pub fn validate_name(name: &str, field_name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("{} cannot be empty", field_name);
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        anyhow::bail!(
            "{} contains invalid characters: '{}'. Only alphanumeric, hyphens, underscores and dots are allowed",
            field_name,
            name
        );
    }

    Ok(())
}

/// Apply the `[ap]` table to the service through its regular setters
///
/// Standards are applied before the channel so the channel is checked
/// against the configured band.
pub async fn apply_ap_settings(ap: &ApSettings, service: &mut ApService) -> Result<()> {
    if !ap.ieee_standards.is_empty() {
        let mask: IeeeStdMask = ap.ieee_standards.iter().copied().collect();
        service
            .set_ieee_standard(mask)
            .context("Invalid ap.ieee_standards")?;
    }
    if let Some(channel) = ap.channel {
        service.set_channel(channel).context("Invalid ap.channel")?;
    }
    if let Some(ssid) = &ap.ssid {
        service
            .set_ssid(ssid.as_bytes())
            .context("Invalid ap.ssid")?;
    }
    if let Some(security) = ap.security {
        service
            .set_security_protocol(security)
            .context("Invalid ap.security")?;
    }
    if let Some(passphrase) = &ap.passphrase {
        service
            .set_passphrase(passphrase)
            .context("Invalid ap.passphrase")?;
    }
    if let Some(psk) = &ap.psk {
        service
            .set_pre_shared_key(psk)
            .context("Invalid ap.psk")?;
    }
    if let Some(discoverable) = ap.discoverable {
        service
            .set_discoverable(discoverable)
            .context("Invalid ap.discoverable")?;
    }
    if let Some(code) = &ap.country_code {
        service
            .set_country_code(code)
            .context("Invalid ap.country_code")?;
    }
    if let Some(max_clients) = ap.max_clients {
        service
            .set_max_clients(max_clients)
            .context("Invalid ap.max_clients")?;
    }
    if let Some(range) = &ap.ip_range {
        service
            .set_ip_range(&range.ap, &range.start, &range.stop)
            .await
            .context("Failed to apply ap.ip_range")?;
    }
    Ok(())
}
