//! Connection manager with automatic reconnection support
//!
//! Drives the bridge through its lifecycle:
//!
//! ```text
//! Searching ──both found──▶ Connected ──worker stopped──▶ Teardown ──cool-down──▶ Searching
//! ```
//!
//! Each pass through `Connected` is one generation: one open serial link,
//! one hwmon directory, one PWM poller and one feedback listener sharing a
//! cancellation token. Generations never overlap.

use std::collections::HashMap;
use std::path::PathBuf;

use tokio::sync::watch;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use vfan_core::{FanChannel, Result, StaticConfig, TimingConfig, VfanError};
use vfan_hardware::{is_disconnect_error, SerialLink};

use super::BridgeHardware;
use crate::bridge::{FeedbackListener, PwmPoller};

/// Connection state machine states
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeState {
    /// Looking for the serial device and the hwmon directory
    Searching,
    /// Both workers are running
    Connected {
        generation: u64,
        port: String,
        hwmon_root: PathBuf,
    },
    /// Workers stopped, device being released
    Teardown,
    /// Shutdown requested, manager returned
    Stopped,
}

impl BridgeState {
    /// Get a string representation for logs
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeState::Searching => "searching",
            BridgeState::Connected { .. } => "connected",
            BridgeState::Teardown => "teardown",
            BridgeState::Stopped => "stopped",
        }
    }
}

/// How a generation ended
#[derive(Debug)]
pub enum GenerationEnd {
    /// The serial device could not be opened
    OpenFailed(VfanError),
    /// A worker hit an unrecoverable I/O error
    Failed(VfanError),
    /// The process is shutting down
    Shutdown,
}

/// Resources resolved by one successful discovery attempt
#[derive(Debug, Clone, PartialEq, Eq)]
struct Target {
    port: String,
    hwmon_root: PathBuf,
}

/// Supervises generations of the bridge
pub struct ConnectionManager<H: BridgeHardware> {
    hardware: H,
    channel_ids: Vec<String>,
    timing: TimingConfig,
    state: watch::Sender<BridgeState>,
    generations: u64,
}

impl<H: BridgeHardware> ConnectionManager<H> {
    pub fn new(hardware: H, config: &StaticConfig) -> Self {
        let (state, _) = watch::channel(BridgeState::Searching);
        Self {
            hardware,
            channel_ids: config.hwmon.channels.clone(),
            timing: config.timing.clone(),
            state,
            generations: 0,
        }
    }

    /// Observe state transitions
    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<BridgeState> {
        self.state.subscribe()
    }

    /// Get the current connection state
    #[cfg(test)]
    pub fn state(&self) -> BridgeState {
        self.state.borrow().clone()
    }

    /// Number of generations started since startup
    pub fn generations(&self) -> u64 {
        self.generations
    }

    fn set_state(&self, state: BridgeState) {
        debug!("Bridge state: {}", state.as_str());
        self.state.send_replace(state);
    }

    /// Run until `shutdown` is cancelled
    pub async fn run(&mut self, shutdown: CancellationToken) {
        info!(
            "Bridge started for channels {:?} (poll {:?}, probe {:?}, cool-down {:?})",
            self.channel_ids,
            self.timing.poll_interval(),
            self.timing.probe_interval(),
            self.timing.cooldown()
        );

        loop {
            self.set_state(BridgeState::Searching);
            let Some(target) = self.search(&shutdown).await else {
                break;
            };

            match self.run_generation(target, &shutdown).await {
                GenerationEnd::Shutdown => break,
                GenerationEnd::OpenFailed(e) => {
                    self.set_state(BridgeState::Teardown);
                    warn!("Failed to open serial device: {}", e);
                }
                GenerationEnd::Failed(e) if is_disconnect_error(&e) => {
                    warn!("Device disconnected ({}), trying to recover...", e);
                }
                GenerationEnd::Failed(e) => {
                    warn!("Connection lost ({}), trying to recover...", e);
                }
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.timing.cooldown()) => {}
            }
        }

        self.set_state(BridgeState::Stopped);
    }

    /// Probe until both resources resolve in the same attempt
    ///
    /// Returns `None` only when shutdown is requested.
    async fn search(&self, shutdown: &CancellationToken) -> Option<Target> {
        let mut attempt = 0u64;

        loop {
            if shutdown.is_cancelled() {
                return None;
            }

            attempt += 1;
            match self.probe() {
                Ok(target) => return Some(target),
                Err(reason) if attempt == 1 => info!("Waiting for hardware: {}", reason),
                Err(reason) => debug!("Discovery attempt {}: {}", attempt, reason),
            }

            tokio::select! {
                _ = shutdown.cancelled() => return None,
                _ = sleep(self.timing.probe_interval()) => {}
            }
        }
    }

    /// One discovery attempt; the error is a human-readable reason
    fn probe(&self) -> std::result::Result<Target, String> {
        let port = match self.hardware.find_serial_device() {
            Ok(Some(port)) => port,
            Ok(None) => return Err("serial device not found".to_string()),
            Err(e) => {
                warn!("Serial discovery failed: {}", e);
                return Err(e.to_string());
            }
        };

        let hwmon_root = match self.hardware.find_hwmon_root() {
            Ok(Some(root)) => root,
            Ok(None) => return Err("marked hwmon directory not found".to_string()),
            Err(e) => {
                warn!("hwmon discovery failed: {}", e);
                return Err(e.to_string());
            }
        };

        Ok(Target { port, hwmon_root })
    }

    /// Open the device, run both workers, release the device
    async fn run_generation(
        &mut self,
        target: Target,
        shutdown: &CancellationToken,
    ) -> GenerationEnd {
        let mut link = match self.hardware.open(&target.port) {
            Ok(link) => link,
            Err(e) => return GenerationEnd::OpenFailed(e),
        };

        self.generations += 1;
        info!(
            "Connected to {} (generation {}), hwmon at {}",
            target.port,
            self.generations,
            target.hwmon_root.display()
        );
        self.set_state(BridgeState::Connected {
            generation: self.generations,
            port: target.port.clone(),
            hwmon_root: target.hwmon_root.clone(),
        });

        let channels = FanChannel::from_ids(&self.channel_ids, &target.hwmon_root);
        let cancel = shutdown.child_token();
        let (poll_result, listen_result, last_rpm) = run_workers(
            &mut link,
            PwmPoller::new(channels, self.timing.poll_interval()),
            FeedbackListener::new(&target.hwmon_root),
            &cancel,
        )
        .await;

        self.set_state(BridgeState::Teardown);
        link.close();
        info!(
            "Generation {} ended, last reported RPM: {:?}",
            self.generations, last_rpm
        );

        if shutdown.is_cancelled() {
            return GenerationEnd::Shutdown;
        }
        match poll_result.and(listen_result) {
            Err(e) => GenerationEnd::Failed(e),
            Ok(()) => {
                error!("Bridge workers stopped without an error");
                GenerationEnd::Failed(VfanError::Other("workers stopped".to_string()))
            }
        }
    }
}

/// Run poller and listener side by side until both have returned
///
/// Whichever worker stops first cancels the other; neither half of the link
/// is released before both are done with it. The listener's per-channel RPM
/// map comes back with the results.
async fn run_workers(
    link: &mut SerialLink,
    mut poller: PwmPoller,
    mut listener: FeedbackListener,
    cancel: &CancellationToken,
) -> (Result<()>, Result<()>, HashMap<String, u32>) {
    let sink = link.sink.as_mut();
    let source = link.source.as_mut();

    let poll = async {
        let result = poller.run(sink, cancel).await;
        cancel.cancel();
        result
    };
    let listen = async move {
        let result = listener.run(source, cancel).await;
        cancel.cancel();
        (result, listener.into_last_rpm())
    };

    let (poll_result, (listen_result, last_rpm)) = tokio::join!(poll, listen);
    (poll_result, listen_result, last_rpm)
}
