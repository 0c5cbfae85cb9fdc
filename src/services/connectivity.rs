//! Reachability probing and the link state machine.
//!
//! A probe is one `/ping` round trip. The monitor owns no network state of
//! its own; it folds each outcome into the shared [`AppState`] and reports
//! whether the device answered.

use std::thread;
use std::time::Duration;

use chrono::Utc;
use log::{debug, info, warn};

use crate::client::DeviceClient;
use crate::state::{self, AppState, LinkState};

pub struct ConnectivityMonitor {
    probe_interval: Duration,
}

impl ConnectivityMonitor {
    pub fn new(probe_interval: Duration) -> Self {
        ConnectivityMonitor { probe_interval }
    }

    /// One reachability probe. Always passes through `Checking` so observers
    /// can tell a probe is in flight, then lands in `Connected` or
    /// `Disconnected`. The snapshot is replaced wholesale either way.
    pub fn check_connection(&self, client: &DeviceClient, state: &mut AppState) -> bool {
        state.link = LinkState::Checking;

        match client.ping() {
            Ok(ping) => {
                state.connectivity = state::snapshot_from_ping(&state.connectivity, &ping, Utc::now());
                state.link = LinkState::Connected;
                debug!(
                    "Probe ok (ap={:?}, sta_connected={}, sensor_ready={})",
                    state.connectivity.ap_address, state.connectivity.station.connected, state.connectivity.sensor_ready
                );
                true
            }
            Err(e) => {
                state.connectivity = state::snapshot_from_failure(&state.connectivity, e.to_string());
                state.link = LinkState::Disconnected;
                warn!("Probe failed: {}", e);
                false
            }
        }
    }

    /// Probe until the device is reachable with a warmed-up sensor.
    ///
    /// While `sensor_ready` is false the monitor re-probes on its fixed
    /// cadence; the moment it flips true, automatic probing stops. Blocks
    /// indefinitely when the device stays away — the supervisor decides how
    /// long to keep a session alive, not this loop.
    pub fn wait_until_ready(&self, client: &DeviceClient, state: &mut AppState) {
        loop {
            if self.check_connection(client, state) && state.connectivity.sensor_ready {
                info!("Device connected and sensor warmed up");
                return;
            }
            if state.link == LinkState::Connected {
                info!("Device connected, waiting for sensor warm-up");
            }
            thread::sleep(self.probe_interval);
        }
    }
}
