// Access point configuration store

//! AP configuration store
//!
//! [`ApConfig`] holds the settings that will be handed to the radio driver on
//! the next start. Every setter validates its input first and only then
//! writes the field, so a rejected call never leaves a partial update behind.
//! Setters here know nothing about the lifecycle; gating by state is done by
//! [`crate::controller::ApService`].

use crate::error::{ApError, Result};
use crate::types::{Credential, IeeeStandard, IeeeStdMask, IpRange, SecurityProtocol};
use std::net::Ipv4Addr;

/// Longest SSID in octets (IEEE 802.11)
pub const MAX_SSID_LEN: usize = 32;
/// Shortest WPA passphrase
pub const MIN_PASSPHRASE_LEN: usize = 8;
/// Longest WPA passphrase
pub const MAX_PASSPHRASE_LEN: usize = 63;
/// Length of a hex-encoded pre-shared key
pub const PSK_HEX_LEN: usize = 64;

/// Channel used when none has been set
pub const DEFAULT_CHANNEL: u16 = 7;
/// Regulatory domain used when none has been set
pub const DEFAULT_COUNTRY_CODE: &str = "US";
/// Client limit used when none has been set
pub const DEFAULT_MAX_CLIENTS: u8 = 10;
/// Hardware mode the radio runs in until a standard is established
pub const DEFAULT_HW_MODE: IeeeStandard = IeeeStandard::G;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CredentialKind {
    Passphrase,
    PreSharedKey,
}

/// Pending (or applied) access point settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApConfig {
    ssid: Vec<u8>,
    security: SecurityProtocol,
    passphrase: Option<String>,
    psk: Option<String>,
    last_credential: Option<CredentialKind>,
    discoverable: bool,
    channel: u16,
    ieee_standard: Option<IeeeStdMask>,
    country_code: String,
    max_clients: u8,
    ip_range: Option<IpRange>,
}

impl Default for ApConfig {
    fn default() -> Self {
        Self {
            ssid: Vec::new(),
            security: SecurityProtocol::Wpa2,
            passphrase: None,
            psk: None,
            last_credential: None,
            discoverable: true,
            channel: DEFAULT_CHANNEL,
            ieee_standard: None,
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            max_clients: DEFAULT_MAX_CLIENTS,
            ip_range: None,
        }
    }
}

impl ApConfig {
    /// Create a configuration holding the defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the SSID. Any octets are accepted, it need not be UTF-8.
    pub fn set_ssid(&mut self, ssid: &[u8]) -> Result<()> {
        if ssid.is_empty() || ssid.len() > MAX_SSID_LEN {
            return Err(ApError::InvalidArgument(format!(
                "SSID must be 1 to {} octets, got {}",
                MAX_SSID_LEN,
                ssid.len()
            )));
        }
        self.ssid = ssid.to_vec();
        Ok(())
    }

    /// Set the security protocol. WEP is always refused.
    pub fn set_security_protocol(&mut self, security: SecurityProtocol) -> Result<()> {
        if security == SecurityProtocol::Wep {
            return Err(ApError::InvalidArgument(
                "WEP is deprecated and not supported".to_string(),
            ));
        }
        self.security = security;
        Ok(())
    }

    /// Set the WPA passphrase (8 to 63 printable ASCII characters)
    pub fn set_passphrase(&mut self, passphrase: &str) -> Result<()> {
        let len = passphrase.len();
        if !(MIN_PASSPHRASE_LEN..=MAX_PASSPHRASE_LEN).contains(&len) {
            return Err(ApError::InvalidArgument(format!(
                "passphrase must be {} to {} characters, got {}",
                MIN_PASSPHRASE_LEN, MAX_PASSPHRASE_LEN, len
            )));
        }
        if !passphrase.bytes().all(|b| (0x20..=0x7e).contains(&b)) {
            return Err(ApError::InvalidArgument(
                "passphrase must be printable ASCII".to_string(),
            ));
        }
        self.passphrase = Some(passphrase.to_string());
        self.last_credential = Some(CredentialKind::Passphrase);
        Ok(())
    }

    /// Set the raw pre-shared key (64 hexadecimal digits)
    pub fn set_pre_shared_key(&mut self, psk: &str) -> Result<()> {
        if psk.len() != PSK_HEX_LEN || !psk.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(ApError::InvalidArgument(format!(
                "pre-shared key must be {} hex digits",
                PSK_HEX_LEN
            )));
        }
        self.psk = Some(psk.to_string());
        self.last_credential = Some(CredentialKind::PreSharedKey);
        Ok(())
    }

    /// Show or hide the SSID in beacons
    pub fn set_discoverable(&mut self, discoverable: bool) {
        self.discoverable = discoverable;
    }

    /// Set the channel, checked against the band of the selected standard(s)
    pub fn set_channel(&mut self, channel: u16) -> Result<()> {
        let mask = self.effective_ieee_standard();
        if !mask.admits_channel(channel) {
            return Err(ApError::OutOfRange(format!(
                "channel {} not valid for IEEE standard mask {:#06x}",
                channel,
                mask.bits()
            )));
        }
        self.channel = channel;
        Ok(())
    }

    /// Select the enabled IEEE standards
    ///
    /// The mask must only use known bits and must enable at least one
    /// physical-layer standard; amendments alone are refused.
    pub fn set_ieee_standard(&mut self, mask: IeeeStdMask) -> Result<()> {
        if mask.bits() & !IeeeStdMask::KNOWN_BITS != 0 {
            return Err(ApError::InvalidArgument(format!(
                "unknown IEEE standard bits in {:#06x}",
                mask.bits()
            )));
        }
        if !mask.standards().any(IeeeStandard::is_phy) {
            return Err(ApError::InvalidArgument(format!(
                "IEEE standard mask {:#06x} selects no physical layer",
                mask.bits()
            )));
        }
        self.ieee_standard = Some(mask);
        Ok(())
    }

    /// The IEEE standard mask, once one has been set
    pub fn ieee_standard(&self) -> Result<IeeeStdMask> {
        self.ieee_standard
            .ok_or_else(|| ApError::Fault("no IEEE standard has been set".to_string()))
    }

    /// Set the ISO 3166-1 alpha-2 regulatory domain
    pub fn set_country_code(&mut self, code: &str) -> Result<()> {
        if code.len() != 2 || !code.bytes().all(|b| b.is_ascii_alphabetic()) {
            return Err(ApError::InvalidArgument(format!(
                "country code must be two letters, got '{}'",
                code
            )));
        }
        self.country_code = code.to_ascii_uppercase();
        Ok(())
    }

    /// Set the client limit, bounded by what the radio can handle
    pub fn set_max_clients(&mut self, max_clients: u8, capability: u8) -> Result<()> {
        if max_clients == 0 {
            return Err(ApError::OutOfRange("max clients must be > 0".to_string()));
        }
        if max_clients > capability {
            return Err(ApError::OutOfRange(format!(
                "max clients {} exceeds radio capability {}",
                max_clients, capability
            )));
        }
        self.max_clients = max_clients;
        Ok(())
    }

    /// Parse and check an address plan without storing it
    ///
    /// The AP address must not fall inside the lease range, and the range
    /// must not be reversed.
    pub fn validate_ip_range(ap: &str, start: &str, stop: &str) -> Result<IpRange> {
        let range = IpRange {
            ap: parse_host_addr(ap, "AP address")?,
            start: parse_host_addr(start, "range start")?,
            stop: parse_host_addr(stop, "range stop")?,
        };

        if range.start > range.stop {
            return Err(ApError::InvalidArgument(format!(
                "range start {} is after range stop {}",
                range.start, range.stop
            )));
        }
        if range.lease_range_contains(range.ap) {
            return Err(ApError::InvalidArgument(format!(
                "AP address {} lies inside lease range {}-{}",
                range.ap, range.start, range.stop
            )));
        }
        Ok(range)
    }

    /// Record an address plan the provisioner has accepted
    pub(crate) fn set_ip_range(&mut self, range: IpRange) {
        self.ip_range = Some(range);
    }

    /// Check that the configuration is complete enough to start
    pub fn check_startable(&self) -> Result<()> {
        if self.ssid.is_empty() {
            return Err(ApError::Fault("no SSID configured".to_string()));
        }
        if self.security.requires_credential() && self.credential().is_none() {
            return Err(ApError::Fault(format!(
                "{:?} requires a passphrase or pre-shared key",
                self.security
            )));
        }
        if !self.effective_ieee_standard().admits_channel(self.channel) {
            return Err(ApError::Fault(format!(
                "channel {} is not valid for the selected IEEE standard",
                self.channel
            )));
        }
        Ok(())
    }

    /// SSID octets
    pub fn ssid(&self) -> &[u8] {
        &self.ssid
    }

    /// Security protocol
    pub fn security_protocol(&self) -> SecurityProtocol {
        self.security
    }

    /// The credential to use on start: whichever of passphrase and PSK was
    /// set most recently
    pub fn credential(&self) -> Option<Credential<'_>> {
        match self.last_credential? {
            CredentialKind::Passphrase => self.passphrase.as_deref().map(Credential::Passphrase),
            CredentialKind::PreSharedKey => self.psk.as_deref().map(Credential::PreSharedKey),
        }
    }

    /// Whether the SSID is broadcast
    pub fn discoverable(&self) -> bool {
        self.discoverable
    }

    /// Channel number
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// The selected standards, or the hardware default mode if none was set
    pub fn effective_ieee_standard(&self) -> IeeeStdMask {
        self.ieee_standard
            .unwrap_or_else(|| IeeeStdMask::from(DEFAULT_HW_MODE))
    }

    /// Regulatory domain
    pub fn country_code(&self) -> &str {
        &self.country_code
    }

    /// Client limit
    pub fn max_clients(&self) -> u8 {
        self.max_clients
    }

    /// Address plan, if one has been applied
    pub fn ip_range(&self) -> Option<&IpRange> {
        self.ip_range.as_ref()
    }
}

fn parse_host_addr(s: &str, what: &str) -> Result<Ipv4Addr> {
    let addr: Ipv4Addr = s
        .trim()
        .parse()
        .map_err(|_| ApError::InvalidArgument(format!("{} '{}' is not an IPv4 address", what, s)))?;

    if addr.is_unspecified() || addr.is_broadcast() || addr.is_multicast() {
        return Err(ApError::InvalidArgument(format!(
            "{} {} is not a host address",
            what, addr
        )));
    }
    Ok(addr)
}

#[cfg(test)]
mod tests {
    use super::*;

    const PSK: &str = "00112233445566778899aabbccddeeff00112233445566778899aabbccddeeff";

    #[test]
    fn test_defaults() {
        let config = ApConfig::new();
        assert!(config.ssid().is_empty());
        assert_eq!(config.security_protocol(), SecurityProtocol::Wpa2);
        assert!(config.discoverable());
        assert_eq!(config.channel(), 7);
        assert_eq!(config.country_code(), "US");
        assert_eq!(config.max_clients(), 10);
        assert!(config.ip_range().is_none());
        assert!(config.credential().is_none());
    }

    #[test]
    fn test_ssid_length_bounds() {
        let mut config = ApConfig::new();
        assert!(matches!(config.set_ssid(b""), Err(ApError::InvalidArgument(_))));
        assert!(config.set_ssid(b"a").is_ok());
        assert!(config.set_ssid(&[b'x'; 32]).is_ok());
        assert!(matches!(
            config.set_ssid(&[b'x'; 33]),
            Err(ApError::InvalidArgument(_))
        ));
        // Rejected call leaves the previous value in place
        assert_eq!(config.ssid(), &[b'x'; 32]);
    }

    #[test]
    fn test_ssid_non_utf8() {
        let mut config = ApConfig::new();
        assert!(config.set_ssid(&[0xff, 0x00, 0xfe]).is_ok());
        assert_eq!(config.ssid(), &[0xff, 0x00, 0xfe]);
    }

    #[test]
    fn test_wep_rejected() {
        let mut config = ApConfig::new();
        assert!(matches!(
            config.set_security_protocol(SecurityProtocol::Wep),
            Err(ApError::InvalidArgument(_))
        ));
        assert_eq!(config.security_protocol(), SecurityProtocol::Wpa2);

        assert!(config.set_security_protocol(SecurityProtocol::Open).is_ok());
        assert!(config.set_security_protocol(SecurityProtocol::Wpa).is_ok());
    }

    #[test]
    fn test_passphrase_bounds() {
        let mut config = ApConfig::new();
        assert!(config.set_passphrase("1234567").is_err());
        assert!(config.set_passphrase("12345678").is_ok());
        assert!(config.set_passphrase(&"p".repeat(63)).is_ok());
        assert!(config.set_passphrase(&"p".repeat(64)).is_err());
        assert!(config.set_passphrase("tab\tinside").is_err());
    }

    #[test]
    fn test_psk_format() {
        let mut config = ApConfig::new();
        assert!(config.set_pre_shared_key(PSK).is_ok());
        assert!(config.set_pre_shared_key(&PSK[..63]).is_err());
        assert!(config.set_pre_shared_key(&PSK.replace('a', "z")).is_err());
    }

    #[test]
    fn test_credential_most_recent_wins() {
        let mut config = ApConfig::new();
        config.set_passphrase("correct horse").unwrap();
        assert_eq!(config.credential(), Some(Credential::Passphrase("correct horse")));

        config.set_pre_shared_key(PSK).unwrap();
        assert_eq!(config.credential(), Some(Credential::PreSharedKey(PSK)));

        config.set_passphrase("battery staple").unwrap();
        assert_eq!(config.credential(), Some(Credential::Passphrase("battery staple")));
    }

    #[test]
    fn test_rejected_credential_keeps_precedence() {
        let mut config = ApConfig::new();
        config.set_pre_shared_key(PSK).unwrap();
        assert!(config.set_passphrase("short").is_err());
        assert_eq!(config.credential(), Some(Credential::PreSharedKey(PSK)));
    }

    #[test]
    fn test_channel_default_mode_is_g() {
        let mut config = ApConfig::new();
        for channel in 1..=14 {
            assert!(config.set_channel(channel).is_ok(), "channel {}", channel);
        }
        assert!(matches!(config.set_channel(0), Err(ApError::OutOfRange(_))));
        assert!(matches!(config.set_channel(15), Err(ApError::OutOfRange(_))));
        assert!(matches!(config.set_channel(36), Err(ApError::OutOfRange(_))));
    }

    #[test]
    fn test_channel_follows_standard() {
        let mut config = ApConfig::new();

        config.set_ieee_standard(IeeeStandard::A.into()).unwrap();
        assert!(config.set_channel(6).is_err());
        assert!(config.set_channel(36).is_ok());
        assert!(config.set_channel(196).is_ok());
        assert!(config.set_channel(197).is_err());

        config.set_ieee_standard(IeeeStandard::Ad.into()).unwrap();
        assert!(config.set_channel(1).is_ok());
        assert!(config.set_channel(6).is_ok());
        assert!(config.set_channel(7).is_err());
    }

    #[test]
    fn test_channel_property_all_values() {
        let masks = [
            IeeeStdMask::from(IeeeStandard::B),
            IeeeStdMask::from(IeeeStandard::A),
            IeeeStdMask::from(IeeeStandard::Ad),
        ];
        for mask in masks {
            let mut config = ApConfig::new();
            config.set_ieee_standard(mask).unwrap();
            for channel in 0..=u16::from(u8::MAX) {
                let expected = mask.admits_channel(channel);
                let result = config.set_channel(channel);
                assert_eq!(result.is_ok(), expected, "mask {:?} channel {}", mask, channel);
                if !expected {
                    assert!(matches!(result, Err(ApError::OutOfRange(_))));
                }
            }
        }
    }

    #[test]
    fn test_ieee_standard_validation() {
        let mut config = ApConfig::new();
        assert!(matches!(config.ieee_standard(), Err(ApError::Fault(_))));

        assert!(matches!(
            config.set_ieee_standard(IeeeStdMask::from_bits(0)),
            Err(ApError::InvalidArgument(_))
        ));
        assert!(matches!(
            config.set_ieee_standard(IeeeStdMask::from_bits(0x8000)),
            Err(ApError::InvalidArgument(_))
        ));
        // Amendments without a PHY
        assert!(matches!(
            config.set_ieee_standard(IeeeStandard::W.into()),
            Err(ApError::InvalidArgument(_))
        ));

        let mask: IeeeStdMask = [IeeeStandard::G, IeeeStandard::N, IeeeStandard::W]
            .into_iter()
            .collect();
        config.set_ieee_standard(mask).unwrap();
        assert_eq!(config.ieee_standard().unwrap(), mask);
    }

    #[test]
    fn test_country_code() {
        let mut config = ApConfig::new();
        assert!(config.set_country_code("fr").is_ok());
        assert_eq!(config.country_code(), "FR");
        assert!(config.set_country_code("USA").is_err());
        assert!(config.set_country_code("U").is_err());
        assert!(config.set_country_code("1A").is_err());
        assert!(config.set_country_code("").is_err());
        assert_eq!(config.country_code(), "FR");
    }

    #[test]
    fn test_max_clients() {
        let mut config = ApConfig::new();
        assert!(matches!(config.set_max_clients(0, 32), Err(ApError::OutOfRange(_))));
        assert!(config.set_max_clients(1, 32).is_ok());
        assert!(config.set_max_clients(32, 32).is_ok());
        assert!(matches!(config.set_max_clients(33, 32), Err(ApError::OutOfRange(_))));
        assert_eq!(config.max_clients(), 32);
    }

    #[test]
    fn test_discoverable() {
        let mut config = ApConfig::new();
        config.set_discoverable(false);
        assert!(!config.discoverable());
    }

    #[test]
    fn test_validate_ip_range() {
        let range = ApConfig::validate_ip_range("192.168.10.1", "192.168.10.10", "192.168.10.50")
            .unwrap();
        assert_eq!(range.ap, Ipv4Addr::new(192, 168, 10, 1));

        // AP inside the lease range
        assert!(ApConfig::validate_ip_range("192.168.10.20", "192.168.10.10", "192.168.10.50")
            .is_err());
        assert!(ApConfig::validate_ip_range("192.168.10.10", "192.168.10.10", "192.168.10.50")
            .is_err());
        // Reversed range
        assert!(ApConfig::validate_ip_range("192.168.10.1", "192.168.10.50", "192.168.10.10")
            .is_err());
        // Malformed
        assert!(ApConfig::validate_ip_range("192.168.10", "192.168.10.10", "192.168.10.50")
            .is_err());
        assert!(ApConfig::validate_ip_range("192.168.10.1", "bogus", "192.168.10.50").is_err());
        assert!(ApConfig::validate_ip_range("0.0.0.0", "192.168.10.10", "192.168.10.50").is_err());
        assert!(ApConfig::validate_ip_range(
            "192.168.10.1",
            "192.168.10.10",
            "255.255.255.255"
        )
        .is_err());
    }

    #[test]
    fn test_check_startable() {
        let mut config = ApConfig::new();
        assert!(matches!(config.check_startable(), Err(ApError::Fault(_))));

        config.set_ssid(b"TestNet").unwrap();
        // WPA2 by default, no credential yet
        assert!(config.check_startable().is_err());

        config.set_passphrase("supersecret").unwrap();
        assert!(config.check_startable().is_ok());

        config.set_security_protocol(SecurityProtocol::Open).unwrap();
        assert!(config.check_startable().is_ok());
    }

    #[test]
    fn test_check_startable_channel_outside_new_standard() {
        let mut config = ApConfig::new();
        config.set_ssid(b"TestNet").unwrap();
        config.set_security_protocol(SecurityProtocol::Open).unwrap();
        config.set_channel(11).unwrap();
        config.set_ieee_standard(IeeeStandard::A.into()).unwrap();
        assert!(config.check_startable().is_err());

        config.set_channel(36).unwrap();
        assert!(config.check_startable().is_ok());
    }
}
