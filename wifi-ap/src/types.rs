// Shared value types for the AP control plane

//! Shared data structures
//!
//! This module defines the value types that flow between the configuration
//! store, the lifecycle controller, the collaborators and event subscribers:
//! security protocols, the IEEE standard bit mask, lifecycle states, events
//! and the IP address range handed to the network provisioner.

use serde::Deserialize;
use std::fmt;
use std::net::Ipv4Addr;

/// Security protocol advertised by the access point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SecurityProtocol {
    /// No authentication
    Open,
    /// Wired Equivalent Privacy. Recognised so it can be refused.
    Wep,
    /// WPA-Personal
    #[serde(alias = "wpa-personal")]
    Wpa,
    /// WPA2-Personal
    #[serde(alias = "wpa2-personal")]
    Wpa2,
}

impl SecurityProtocol {
    /// Whether this protocol needs a passphrase or pre-shared key
    pub fn requires_credential(self) -> bool {
        matches!(self, SecurityProtocol::Wpa | SecurityProtocol::Wpa2)
    }
}

/// A single IEEE 802.11 standard or amendment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IeeeStandard {
    /// 802.11a (5 GHz)
    A,
    /// 802.11b (2.4 GHz)
    B,
    /// 802.11g (2.4 GHz)
    G,
    /// 802.11ad (60 GHz)
    Ad,
    /// 802.11d (regulatory domain)
    D,
    /// 802.11h (spectrum management)
    H,
    /// 802.11i (security)
    I,
    /// 802.11n (2.4 and 5 GHz)
    N,
    /// 802.11ac (5 GHz)
    Ac,
    /// 802.11w (management frame protection)
    W,
}

impl IeeeStandard {
    /// Every known standard, in bit order
    pub const ALL: [IeeeStandard; 10] = [
        IeeeStandard::A,
        IeeeStandard::B,
        IeeeStandard::G,
        IeeeStandard::Ad,
        IeeeStandard::D,
        IeeeStandard::H,
        IeeeStandard::I,
        IeeeStandard::N,
        IeeeStandard::Ac,
        IeeeStandard::W,
    ];

    /// Bit assigned to this standard in an [`IeeeStdMask`]
    pub const fn bit(self) -> u16 {
        match self {
            IeeeStandard::A => 0x0001,
            IeeeStandard::B => 0x0002,
            IeeeStandard::G => 0x0004,
            IeeeStandard::Ad => 0x0008,
            IeeeStandard::D => 0x0010,
            IeeeStandard::H => 0x0020,
            IeeeStandard::I => 0x0040,
            IeeeStandard::N => 0x0080,
            IeeeStandard::Ac => 0x0100,
            IeeeStandard::W => 0x0200,
        }
    }

    /// Whether this is a physical-layer standard (as opposed to an amendment)
    pub fn is_phy(self) -> bool {
        matches!(
            self,
            IeeeStandard::A
                | IeeeStandard::B
                | IeeeStandard::G
                | IeeeStandard::N
                | IeeeStandard::Ac
                | IeeeStandard::Ad
        )
    }

    /// Channel ranges this standard may operate on. Empty for amendments.
    pub fn channel_bands(self) -> &'static [(u16, u16)] {
        match self {
            IeeeStandard::B | IeeeStandard::G => &[(1, 14)],
            IeeeStandard::A | IeeeStandard::Ac => &[(7, 196)],
            IeeeStandard::N => &[(1, 14), (7, 196)],
            IeeeStandard::Ad => &[(1, 6)],
            _ => &[],
        }
    }
}

/// Bit set of enabled IEEE 802.11 standards
///
/// The mask itself is unvalidated; [`crate::ap_config::ApConfig::set_ieee_standard`]
/// decides which masks are acceptable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct IeeeStdMask(u16);

impl IeeeStdMask {
    /// Every bit with a known meaning
    pub const KNOWN_BITS: u16 = 0x03FF;

    /// Wrap raw bits
    pub const fn from_bits(bits: u16) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(self) -> u16 {
        self.0
    }

    /// Whether `standard` is enabled in this mask
    pub fn contains(self, standard: IeeeStandard) -> bool {
        self.0 & standard.bit() != 0
    }

    /// Enabled standards, in bit order
    pub fn standards(self) -> impl Iterator<Item = IeeeStandard> {
        IeeeStandard::ALL
            .into_iter()
            .filter(move |standard| self.contains(*standard))
    }

    /// Whether `channel` is admitted by at least one enabled standard
    pub fn admits_channel(self, channel: u16) -> bool {
        self.standards()
            .flat_map(|standard| standard.channel_bands().iter())
            .any(|&(low, high)| (low..=high).contains(&channel))
    }
}

impl From<IeeeStandard> for IeeeStdMask {
    fn from(standard: IeeeStandard) -> Self {
        Self(standard.bit())
    }
}

impl FromIterator<IeeeStandard> for IeeeStdMask {
    fn from_iter<I: IntoIterator<Item = IeeeStandard>>(iter: I) -> Self {
        Self(iter.into_iter().fold(0, |bits, standard| bits | standard.bit()))
    }
}

/// Authentication secret resolved for a start request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    /// Passphrase the driver derives the PSK from
    Passphrase(&'a str),
    /// Raw pre-shared key, 64 hex digits
    PreSharedKey(&'a str),
}

/// Address plan for the AP subnet
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IpRange {
    /// Address of the access point itself
    pub ap: Ipv4Addr,
    /// First address leased to clients
    pub start: Ipv4Addr,
    /// Last address leased to clients
    pub stop: Ipv4Addr,
}

impl IpRange {
    /// Whether `addr` falls within `[start, stop]`
    pub fn lease_range_contains(&self, addr: Ipv4Addr) -> bool {
        (self.start..=self.stop).contains(&addr)
    }
}

/// Access point lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApState {
    Stopped,  // Radio down, configuration freely editable
    Starting, // Driver start in progress
    Running,  // AP broadcasting
    Stopping, // Driver stop in progress
}

impl ApState {
    /// Whether hardware-sensitive settings may be changed
    pub fn is_stopped(self) -> bool {
        self == ApState::Stopped
    }
}

impl fmt::Display for ApState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ApState::Stopped => "stopped",
            ApState::Starting => "starting",
            ApState::Running => "running",
            ApState::Stopping => "stopping",
        };
        f.write_str(s)
    }
}

/// Events delivered to subscribers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ApEvent {
    /// The access point started broadcasting
    Started,
    /// The access point stopped, on request or unexpectedly
    Stopped,
    /// A station associated
    ClientConnected,
    /// A station left
    ClientDisconnected,
    /// The radio reported a failure
    HardwareError,
}
