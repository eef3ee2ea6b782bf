// WiFi Access Point Daemon

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tokio::time::Instant;
use wifi_ap::{
    controller::ApService,
    driver::NetworkProvisioner,
    error::ProvisionError,
    hostapd::HostapdDriver,
    provisioner::ScriptProvisioner,
    settings::{apply_ap_settings, load_settings},
    state_file::StateFile,
    types::{ApEvent, ApState, IpRange},
};

/// Maximum number of consecutive restart attempts after the AP dies
const MAX_RESTART_ATTEMPTS: u8 = 5;

/// Initial restart delay in seconds (exponential backoff: 1s, 2s, 4s, 8s, 16s)
const INITIAL_RESTART_DELAY_SECS: u64 = 1;

#[derive(Parser)]
#[command(name = "wifi-apd")]
#[command(about = "WiFi access point control daemon", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/wifi-ap/config.toml")]
    config: PathBuf,
}

/// Stand-in when no `[provisioner]` section is configured
struct NoProvisioner;

#[async_trait]
impl NetworkProvisioner for NoProvisioner {
    async fn apply_range(&self, _range: &IpRange) -> Result<(), ProvisionError> {
        Err(ProvisionError("no provisioner configured".to_string()))
    }
}

/// Restart bookkeeping after an unexpected AP stop
struct RestartPlan {
    at: Option<Instant>,
    attempt: u8,
    delay_secs: u64,
}

impl RestartPlan {
    fn new() -> Self {
        Self {
            at: None,
            attempt: 0,
            delay_secs: INITIAL_RESTART_DELAY_SECS,
        }
    }

    /// Schedule the next attempt. Returns false once attempts are exhausted.
    fn schedule(&mut self) -> bool {
        if self.attempt >= MAX_RESTART_ATTEMPTS {
            self.at = None;
            return false;
        }
        self.attempt += 1;
        log::info!(
            "Access point restart attempt {}/{} in {}s...",
            self.attempt,
            MAX_RESTART_ATTEMPTS,
            self.delay_secs
        );
        self.at = Some(Instant::now() + Duration::from_secs(self.delay_secs));
        self.delay_secs *= 2;
        true
    }

    fn reset(&mut self) {
        *self = Self::new();
    }
}

fn main() -> Result<()> {
    // 2 threads is sufficient: 1 for the service loop, 1 for hostapd output
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("wifi-apd")
        .thread_stack_size(2 * 1024 * 1024) // 2MB stack (vs 8MB default)
        .enable_time()
        .enable_io()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    let settings = load_settings(&args.config)
        .with_context(|| format!("Failed to load config from {:?}", args.config))?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&settings.general.log_level),
    )
    .init();

    log::info!("Starting wifi-apd");
    log::info!("Interface: {}", settings.general.interface);
    log::info!("hostapd: {}", settings.hostapd.binary);

    let driver = Arc::new(
        HostapdDriver::new(settings.general.interface.clone(), &settings.hostapd)
            .context("Failed to create hostapd driver")?,
    );

    let provisioner: Arc<dyn NetworkProvisioner> = match &settings.provisioner {
        Some(p) => Arc::new(
            ScriptProvisioner::new(settings.general.interface.clone(), p.script.clone())
                .context("Failed to create network provisioner")?,
        ),
        None => Arc::new(NoProvisioner),
    };

    let mut service = ApService::new(driver, provisioner);

    apply_ap_settings(&settings.ap, &mut service)
        .await
        .context("Failed to apply AP settings")?;

    // Status file follows every event
    let state_file = Arc::new(StateFile::new(
        settings.general.state_file.clone(),
        service.config().ssid(),
        service.state(),
    ));
    if let Err(e) = state_file.write() {
        log::warn!("Failed to write state file: {}", e);
    }
    let sf = Arc::clone(&state_file);
    let state_sub = service.subscribe(move |event| {
        if let Err(e) = sf.on_event(event) {
            log::warn!("Failed to write state file: {}", e);
        }
    });

    // Forward events to the service loop; the callback runs on the driver's
    // context and must not block
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ApEvent>();
    let loop_sub = service.subscribe(move |event| {
        let _ = event_tx.send(*event);
    });

    if settings.ap.autostart {
        if let Err(e) = service.start().await {
            service.unsubscribe(loop_sub);
            service.unsubscribe(state_sub);
            state_file.cleanup();
            return Err(e).context("Failed to start access point");
        }
        log::info!(
            "Access point '{}' is up",
            String::from_utf8_lossy(service.config().ssid())
        );
    } else {
        log::info!("Autostart disabled, access point left stopped");
    }

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())
        .context("Failed to set up SIGTERM handler")?;
    let mut sigint = signal::unix::signal(signal::unix::SignalKind::interrupt())
        .context("Failed to set up SIGINT handler")?;

    let mut restart = RestartPlan::new();

    log::info!("Daemon started successfully");

    // Main event loop
    loop {
        tokio::select! {
            // Shutdown signals
            _ = sigterm.recv() => {
                log::info!("Received SIGTERM");
                break;
            }
            _ = sigint.recv() => {
                log::info!("Received SIGINT");
                break;
            }

            Some(event) = event_rx.recv() => {
                match event {
                    // Radio went down without being asked to
                    ApEvent::Stopped if service.state() == ApState::Running => {
                        log::warn!("Access point stopped unexpectedly");
                        if let Err(e) = service.acknowledge_radio_down().await {
                            log::warn!("Failed to resynchronise after unexpected stop: {}", e);
                        }
                        if settings.ap.autostart && !restart.schedule() {
                            log::error!("Giving up on restarting the access point");
                        }
                    }
                    ApEvent::Started => restart.reset(),
                    _ => {}
                }
            }

            _ = tokio::time::sleep_until(restart.at.unwrap_or_else(Instant::now)), if restart.at.is_some() => {
                restart.at = None;
                match service.start().await {
                    Ok(()) => log::info!("Access point restarted"),
                    Err(e) => {
                        log::error!("Failed to restart access point: {}", e);
                        if !restart.schedule() {
                            log::error!(
                                "Failed to restart the access point after {} attempts",
                                MAX_RESTART_ATTEMPTS
                            );
                        }
                    }
                }
            }
        }
    }

    // Graceful shutdown
    service.unsubscribe(loop_sub);
    service.shutdown().await;
    state_file.cleanup();

    log::info!("Shutdown complete");
    Ok(())
}
