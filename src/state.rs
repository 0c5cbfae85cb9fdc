//! In-memory state owned by the client: link state machine, connectivity
//! snapshot, the latest air-quality reading and the reconciled fan state.
//!
//! Two rules shape everything here:
//! - Connectivity snapshots are replaced wholesale on every probe, never
//!   partially merged, so a device reset cannot hide behind stale fields.
//! - A field absent from a device reply keeps its previous in-memory value;
//!   a failed poll keeps the whole previous reading. The UI must never flash
//!   to "no data" because one request was lost.

use chrono::{DateTime, TimeZone, Utc};

use crate::models::device::{AirQuality, FanMode, PingData, StatusData};

/// Connectivity state machine: `Unknown → Checking → Connected | Disconnected`,
/// re-entrant through `Checking` on every manual or scheduled probe.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub enum LinkState {
    #[default]
    Unknown,
    Checking,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StationSnapshot {
    pub connected: bool,
    pub address: Option<String>,
    pub ssid: Option<String>,
}

/// Facts derived from the most recent reachability probe.
///
/// Invariant: `reachable == false` implies `last_error` is set, except in the
/// initial never-probed state.
#[derive(Debug, Clone, Default)]
pub struct ConnectivitySnapshot {
    pub reachable: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub ap_address: Option<String>,
    pub station: StationSnapshot,
    pub sensor_ready: bool,
    pub last_error: Option<String>,
}

/// Latest device-reported air-quality reading. `state` is authoritative from
/// the device; `Unknown` only before the first successful read.
#[derive(Debug, Clone, Default)]
pub struct AirReading {
    pub value: Option<f64>,
    pub state: AirQuality,
    pub observed_at: Option<DateTime<Utc>>,
}

/// Reconciled fan state: device-reported truth overlaid with pending local
/// intent between polls.
#[derive(Debug, Clone, Default)]
pub struct FanState {
    pub mode: FanMode,
    pub pwm: u8,
    pub setpoint: u16,
    /// The speed to resume when the user re-enters MANUAL. Written only while
    /// the mode is MANUAL, never from AUTO-derived pwm values.
    pub last_manual_pwm: u8,
}

impl FanState {
    /// Set the pwm, recording it as the manual resume speed only while in
    /// MANUAL. All pwm writes, device-reported or local, go through here.
    pub fn set_pwm(&mut self, pwm: u8) {
        self.pwm = pwm;
        if self.mode == FanMode::Manual {
            self.last_manual_pwm = pwm;
        }
    }
}

/// The whole of the client's mutable state, constructed once at the
/// composition root and passed down explicitly.
#[derive(Debug, Default)]
pub struct AppState {
    pub link: LinkState,
    pub connectivity: ConnectivitySnapshot,
    pub air: AirReading,
    pub fan: FanState,
    pub loading: bool,
    /// Last user-facing failure; dismissed by the next successful poll.
    pub error: Option<String>,
    /// Sequence number of the most recent dispatched command. A completion
    /// carrying an older number was superseded and must not write state.
    pub command_seq: u64,
}

pub fn clamp_pwm(value: i64) -> u8 {
    value.clamp(0, 255) as u8
}

pub fn clamp_setpoint(value: i64) -> u16 {
    value.clamp(0, 1000) as u16
}

/// Build the snapshot for a successful ping reply. Fields the reply omits
/// inherit the previous snapshot's values; absence is forward compatibility,
/// not an error.
pub fn snapshot_from_ping(prev: &ConnectivitySnapshot, ping: &PingData, now: DateTime<Utc>) -> ConnectivitySnapshot {
    let net = ping.net.clone().unwrap_or_default();
    ConnectivitySnapshot {
        reachable: true,
        last_success_at: Some(now),
        ap_address: net.ap_ip.or_else(|| prev.ap_address.clone()),
        station: StationSnapshot {
            connected: net.sta_connected.unwrap_or(prev.station.connected),
            address: net.sta_ip.or_else(|| prev.station.address.clone()),
            ssid: net.sta_ssid.or_else(|| prev.station.ssid.clone()),
        },
        sensor_ready: ping.sensor_ready.unwrap_or(prev.sensor_ready),
        last_error: None,
    }
}

/// Build the snapshot for a failed probe: unreachable, sensor no longer
/// considered warm, error recorded. Network identity facts carry over so the
/// last known addresses stay visible.
pub fn snapshot_from_failure(prev: &ConnectivitySnapshot, error: String) -> ConnectivitySnapshot {
    ConnectivitySnapshot {
        reachable: false,
        last_success_at: prev.last_success_at,
        ap_address: prev.ap_address.clone(),
        station: prev.station.clone(),
        sensor_ready: false,
        last_error: Some(error),
    }
}

/// Fold a successful `/status` reply into the reading and fan state.
///
/// Mode is applied before pwm so that `last_manual_pwm` tracks pwm writes
/// under the mode the device actually reported.
pub fn apply_status(state: &mut AppState, status: &StatusData, now: DateTime<Utc>) {
    if let Some(air) = &status.air {
        if let Some(value) = air.air_quality_value {
            state.air.value = Some(value);
        }
        if let Some(tier) = air.air_quality_state {
            state.air.state = tier;
        }
    }
    state.air.observed_at = Some(device_clock(status).unwrap_or(now));

    if let Some(fan) = &status.fan {
        if let Some(mode) = fan.mode {
            state.fan.mode = mode;
        }
        if let Some(setpoint) = fan.setpoint {
            state.fan.setpoint = clamp_setpoint(setpoint);
        }
        if let Some(pwm) = fan.pwm {
            state.fan.set_pwm(clamp_pwm(pwm));
        }
    }

    state.loading = false;
    state.error = None;
}

/// A failed poll annotates the state without touching the last known-good
/// reading; the next successful tick self-heals.
pub fn apply_poll_failure(state: &mut AppState, error: String) {
    state.loading = false;
    state.error = Some(error);
}

fn device_clock(status: &StatusData) -> Option<DateTime<Utc>> {
    status
        .time
        .as_ref()
        .and_then(|t| t.millis)
        .and_then(|millis| Utc.timestamp_millis_opt(millis).single())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::{AirStatus, Envelope, FanStatus, NetInfo};

    fn status_with(value: Option<f64>, tier: Option<AirQuality>, fan: Option<FanStatus>) -> StatusData {
        StatusData {
            air: Some(AirStatus {
                air_quality_value: value,
                air_quality_state: tier,
            }),
            fan,
            time: None,
        }
    }

    #[test]
    fn failed_poll_keeps_previous_reading() {
        let mut state = AppState::default();
        apply_status(
            &mut state,
            &status_with(Some(42.0), Some(AirQuality::Good), None),
            Utc::now(),
        );

        apply_poll_failure(&mut state, "request timed out".to_string());

        assert_eq!(state.air.value, Some(42.0));
        assert_eq!(state.air.state, AirQuality::Good);
        assert!(!state.loading);
        assert_eq!(state.error.as_deref(), Some("request timed out"));
    }

    #[test]
    fn successful_poll_clears_error() {
        let mut state = AppState::default();
        apply_poll_failure(&mut state, "network error".to_string());

        apply_status(
            &mut state,
            &status_with(Some(10.0), Some(AirQuality::Good), None),
            Utc::now(),
        );
        assert!(state.error.is_none());
    }

    #[test]
    fn absent_fields_keep_prior_values() {
        let mut state = AppState::default();
        apply_status(
            &mut state,
            &status_with(Some(80.0), Some(AirQuality::Moderate), None),
            Utc::now(),
        );

        // Newer firmware momentarily reporting nothing for air.
        apply_status(&mut state, &status_with(None, None, None), Utc::now());

        assert_eq!(state.air.value, Some(80.0));
        assert_eq!(state.air.state, AirQuality::Moderate);
    }

    #[test]
    fn last_manual_pwm_follows_manual_writes_only() {
        let mut state = AppState::default();

        // Device reports MANUAL at 180: resume speed recorded.
        apply_status(
            &mut state,
            &status_with(
                None,
                None,
                Some(FanStatus {
                    mode: Some(FanMode::Manual),
                    pwm: Some(180),
                    setpoint: None,
                }),
            ),
            Utc::now(),
        );
        assert_eq!(state.fan.last_manual_pwm, 180);

        // AUTO regulation spins the fan up; resume speed must not move.
        apply_status(
            &mut state,
            &status_with(
                None,
                None,
                Some(FanStatus {
                    mode: Some(FanMode::Auto),
                    pwm: Some(255),
                    setpoint: None,
                }),
            ),
            Utc::now(),
        );
        assert_eq!(state.fan.pwm, 255);
        assert_eq!(state.fan.last_manual_pwm, 180);
    }

    #[test]
    fn wire_values_are_clamped() {
        let mut state = AppState::default();
        apply_status(
            &mut state,
            &status_with(
                None,
                None,
                Some(FanStatus {
                    mode: Some(FanMode::Manual),
                    pwm: Some(9999),
                    setpoint: Some(-5),
                }),
            ),
            Utc::now(),
        );
        assert_eq!(state.fan.pwm, 255);
        assert_eq!(state.fan.setpoint, 0);
    }

    #[test]
    fn ping_snapshot_inherits_absent_sensor_ready() {
        let warm = ConnectivitySnapshot {
            sensor_ready: true,
            ..ConnectivitySnapshot::default()
        };
        let ping = PingData {
            net: None,
            sensor_ready: None,
        };

        let next = snapshot_from_ping(&warm, &ping, Utc::now());
        assert!(next.sensor_ready, "absent sensorReady must fall back to prior value");

        // First-ever check: initial value is false and stays false.
        let initial = ConnectivitySnapshot::default();
        let next = snapshot_from_ping(&initial, &ping, Utc::now());
        assert!(!next.sensor_ready);
    }

    #[test]
    fn failure_snapshot_clears_sensor_and_records_error() {
        let prev = ConnectivitySnapshot {
            reachable: true,
            sensor_ready: true,
            ap_address: Some("192.168.4.1".to_string()),
            ..ConnectivitySnapshot::default()
        };

        let next = snapshot_from_failure(&prev, "no route to host".to_string());
        assert!(!next.reachable);
        assert!(!next.sensor_ready);
        assert_eq!(next.last_error.as_deref(), Some("no route to host"));
        // Identity facts carry over.
        assert_eq!(next.ap_address.as_deref(), Some("192.168.4.1"));
    }

    #[test]
    fn ping_snapshot_extracts_network_identity() {
        let ping = PingData {
            net: Some(NetInfo {
                ap_ip: Some("192.168.4.1".to_string()),
                sta_connected: Some(true),
                sta_ip: Some("10.0.0.17".to_string()),
                sta_ssid: Some("casa".to_string()),
            }),
            sensor_ready: Some(true),
        };

        let now = Utc::now();
        let next = snapshot_from_ping(&ConnectivitySnapshot::default(), &ping, now);
        assert!(next.reachable);
        assert_eq!(next.last_success_at, Some(now));
        assert_eq!(next.ap_address.as_deref(), Some("192.168.4.1"));
        assert!(next.station.connected);
        assert_eq!(next.station.address.as_deref(), Some("10.0.0.17"));
        assert_eq!(next.station.ssid.as_deref(), Some("casa"));
        assert!(next.sensor_ready);
        assert!(next.last_error.is_none());
    }

    #[test]
    fn status_fixture_end_to_end() {
        let json = std::fs::read_to_string("tests/data/status.json").expect("fixture present");
        let mut de = serde_json::Deserializer::from_str(&json);
        let envelope: Envelope<StatusData> = serde_path_to_error::deserialize(&mut de).expect("parse status");
        let status = envelope.data.expect("data present");

        let mut state = AppState::default();
        apply_status(&mut state, &status, Utc::now());

        assert_eq!(state.air.value, Some(120.0));
        assert_eq!(state.air.state, AirQuality::Bad);
        assert_eq!(state.fan.mode, FanMode::Auto);
        assert_eq!(state.fan.pwm, 0);
        assert_eq!(state.fan.setpoint, 500);
        assert_eq!(
            state.air.observed_at,
            Utc.timestamp_millis_opt(1000).single(),
            "device clock wins over local time"
        );
    }
}
