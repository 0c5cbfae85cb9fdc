//! Status polling and reconciliation against local optimistic state.
//!
//! The loop runs only while the link is `Connected` and hands control back to
//! the supervisor the moment connectivity is lost; that is the explicit
//! start/stop transition for polling. Mirror writes happen strictly after the
//! in-memory state has been updated, so nothing is ever persisted for a
//! reading the state does not yet reflect.

use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use diesel::PgConnection;
use log::{debug, warn};

use crate::client::{DeviceClient, DeviceClientError};
use crate::services::connectivity::ConnectivityMonitor;
use crate::services::telemetry::TelemetryMirror;
use crate::state::{self, AppState, LinkState};

pub struct Synchronizer {
    poll_interval: Duration,
    poll_in_flight: bool,
}

impl Synchronizer {
    pub fn new(poll_interval: Duration) -> Self {
        Synchronizer {
            poll_interval,
            poll_in_flight: false,
        }
    }

    /// One status poll. Returns `Ok(true)` when fresh state was applied and
    /// `Ok(false)` when the tick was dropped because a poll was already in
    /// flight — overlapping polls are never issued for the same device.
    ///
    /// Failure annotates the state (`error`, `loading=false`) and leaves the
    /// last known-good reading untouched.
    pub fn poll_once(&mut self, client: &DeviceClient, state: &mut AppState) -> Result<bool, DeviceClientError> {
        if self.poll_in_flight {
            debug!("Poll tick dropped: previous poll still in flight");
            return Ok(false);
        }
        self.poll_in_flight = true;
        state.loading = true;

        let result = client.status();
        self.poll_in_flight = false;

        match result {
            Ok(status) => {
                state::apply_status(state, &status, Utc::now());
                Ok(true)
            }
            Err(e) => {
                state::apply_poll_failure(state, e.to_string());
                Err(e)
            }
        }
    }

    /// Poll on a steady cadence, mirroring each successful reading.
    ///
    /// Returns when connectivity is lost (a failed poll followed by a failed
    /// reachability probe). Poll failures themselves are non-fatal: the state
    /// keeps its last reading, the error is surfaced, and the next tick
    /// retries.
    pub fn run_loop(
        &mut self,
        conn: &mut PgConnection,
        client: &DeviceClient,
        monitor: &ConnectivityMonitor,
        mirror: &mut TelemetryMirror,
        state: &mut AppState,
    ) {
        loop {
            let tick_start = Instant::now();

            match self.poll_once(client, state) {
                Ok(true) => mirror.record(conn, &state.air, state.fan.pwm),
                Ok(false) => {}
                Err(e) => {
                    warn!("Status poll failed: {}", e);
                    // The link may have dropped; re-probe before the next tick.
                    if !monitor.check_connection(client, state) {
                        return;
                    }
                }
            }

            if state.link != LinkState::Connected {
                return;
            }

            // Maintain steady cadence
            let elapsed = tick_start.elapsed();
            if elapsed < self.poll_interval {
                thread::sleep(self.poll_interval - elapsed);
            }
        }
    }
}
