//! Script-driven network provisioning
//!
//! Applies the AP subnet's address plan by running an external provisioning
//! script (which typically assigns the AP address and rewrites the DHCP
//! server's lease range), then checks the address actually landed on the
//! interface.

use crate::driver::NetworkProvisioner;
use crate::error::ProvisionError;
use crate::settings;
use crate::types::IpRange;
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Runs `<script> <interface> <ap> <start> <stop>`
pub struct ScriptProvisioner {
    interface: String,
    script: PathBuf,
}

impl ScriptProvisioner {
    /// Create a provisioner for the given interface
    ///
    /// # Errors
    ///
    /// Returns an error if the interface name is unsafe to pass to a script.
    pub fn new(interface: String, script: PathBuf) -> Result<Self> {
        settings::validate_name(&interface, "Interface name")?;
        Ok(Self { interface, script })
    }

    async fn run_script(&self, range: &IpRange) -> Result<()> {
        anyhow::ensure!(
            Path::new("/sys/class/net").join(&self.interface).exists(),
            "interface {} does not exist",
            self.interface
        );

        let output = Command::new(&self.script)
            .args([
                self.interface.clone(),
                range.ap.to_string(),
                range.start.to_string(),
                range.stop.to_string(),
            ])
            .output()
            .await
            .with_context(|| format!("Failed to execute {}", self.script.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "{} exited with {}: {}",
                self.script.display(),
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkProvisioner for ScriptProvisioner {
    async fn apply_range(&self, range: &IpRange) -> std::result::Result<(), ProvisionError> {
        log::info!(
            "Provisioning {} on {} (leases {}-{})",
            range.ap,
            self.interface,
            range.start,
            range.stop
        );

        self.run_script(range)
            .await
            .map_err(|e| ProvisionError(format!("{:#}", e)))?;

        match interface_has_address(&self.interface, range.ap) {
            Ok(true) => {}
            Ok(false) => log::warn!(
                "Provisioning script succeeded but {} is not assigned to {}",
                range.ap,
                self.interface
            ),
            Err(e) => log::warn!("Failed to list interface addresses: {}", e),
        }
        Ok(())
    }
}

/// Whether `addr` is assigned to `interface`
fn interface_has_address(interface: &str, addr: Ipv4Addr) -> Result<bool> {
    let ifaces = if_addrs::get_if_addrs().context("Failed to get network interfaces")?;

    Ok(ifaces.iter().any(|iface| {
        iface.name == interface
            && matches!(&iface.addr, if_addrs::IfAddr::V4(v4) if v4.ip == addr)
    }))
}
