// State file writer for external monitoring
//!
//! Keeps a small key=value status file up to date from AP events, for
//! consumption by status bar widgets and shell scripts.

use crate::types::{ApEvent, ApState};
use anyhow::{Context, Result};
use parking_lot::Mutex;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug)]
struct Status {
    state: ApState,
    ssid: String,
    clients: usize,
}

/// Status file fed by AP events
#[derive(Debug)]
pub struct StateFile {
    path: PathBuf,
    status: Mutex<Status>,
}

impl StateFile {
    /// Track status for an AP broadcasting `ssid`
    pub fn new(path: PathBuf, ssid: &[u8], state: ApState) -> Self {
        Self {
            path,
            status: Mutex::new(Status {
                state,
                ssid: String::from_utf8_lossy(ssid).into_owned(),
                clients: 0,
            }),
        }
    }

    /// Path of the status file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Fold an event into the status and rewrite the file
    pub fn on_event(&self, event: &ApEvent) -> Result<()> {
        {
            let mut status = self.status.lock();
            match event {
                ApEvent::Started => {
                    status.state = ApState::Running;
                    status.clients = 0;
                }
                ApEvent::Stopped => {
                    status.state = ApState::Stopped;
                    status.clients = 0;
                }
                ApEvent::ClientConnected => status.clients += 1,
                ApEvent::ClientDisconnected => {
                    status.clients = status.clients.saturating_sub(1);
                }
                ApEvent::HardwareError => {}
            }
        }
        self.write()
    }

    /// Write current status to the file
    pub fn write(&self) -> Result<()> {
        // Create directory if it doesn't exist
        if let Some(dir) = self.path.parent() {
            if !dir.exists() {
                fs::create_dir_all(dir).context("Failed to create state directory")?;
            }
        }

        let timestamp = SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let content = {
            let status = self.status.lock();
            format!(
                "STATE={}\nSSID={}\nCLIENTS={}\nTIMESTAMP={}\n",
                status.state, status.ssid, status.clients, timestamp
            )
        };

        fs::write(&self.path, content).context("Failed to write state file")?;
        Ok(())
    }

    /// Remove state file on shutdown
    pub fn cleanup(&self) {
        let _ = fs::remove_file(&self.path);
    }
}
