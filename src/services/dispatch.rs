//! User-intent commands: mode switches, speed and setpoint changes, and
//! station Wi-Fi provisioning.
//!
//! Commands are optimistic: local state mutates before the request goes out
//! and is never rolled back — the next successful poll reconciles truth from
//! the device. A failed command is surfaced to the caller and must be
//! re-issued explicitly; there are no retries.
//!
//! Every function takes the client and state as explicit parameters; there
//! is no ambient store access here.

use log::{info, warn};

use crate::client::{DeviceClient, DeviceClientError};
use crate::models::device::{ControlRequest, FanMode, StationStatus, WifiConfigRequest};
use crate::state::{AppState, FanState, LinkState, StationSnapshot};

#[derive(Debug)]
pub enum CommandError {
    /// Commanding while disconnected is rejected before any network call.
    NotConnected,
    /// Provisioning requires both an ssid and a password.
    MissingCredentials,
    Device(DeviceClientError),
}

impl core::fmt::Display for CommandError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            CommandError::NotConnected => write!(f, "device not connected"),
            CommandError::MissingCredentials => write!(f, "ssid and password are required"),
            CommandError::Device(e) => write!(f, "command failed: {}", e),
        }
    }
}

impl std::error::Error for CommandError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CommandError::Device(e) => Some(e),
            _ => None,
        }
    }
}

impl From<DeviceClientError> for CommandError {
    fn from(value: DeviceClientError) -> Self {
        CommandError::Device(value)
    }
}

fn ensure_connected(state: &AppState) -> Result<(), CommandError> {
    if state.link == LinkState::Connected {
        Ok(())
    } else {
        Err(CommandError::NotConnected)
    }
}

fn next_seq(state: &mut AppState) -> u64 {
    state.command_seq += 1;
    state.command_seq
}

/// The pwm a MANUAL switch should target: the recorded resume speed when one
/// exists, otherwise whatever the fan is doing right now, otherwise 0.
pub fn resolve_manual_pwm(fan: &FanState) -> u8 {
    if fan.last_manual_pwm > 0 { fan.last_manual_pwm } else { fan.pwm }
}

/// Switch fan mode. MANUAL resumes the remembered speed; AUTO hands
/// regulation back to the device, which needs the current setpoint.
pub fn apply_mode(client: &DeviceClient, state: &mut AppState, mode: FanMode) -> Result<(), CommandError> {
    ensure_connected(state)?;
    next_seq(state);

    let request = match mode {
        FanMode::Manual => {
            let target = resolve_manual_pwm(&state.fan);
            state.fan.mode = FanMode::Manual;
            state.fan.set_pwm(target);
            ControlRequest {
                fan_mode: FanMode::Manual,
                fan_pwm: Some(target),
                setpoint: None,
            }
        }
        FanMode::Auto => {
            state.fan.mode = FanMode::Auto;
            ControlRequest {
                fan_mode: FanMode::Auto,
                fan_pwm: None,
                setpoint: Some(state.fan.setpoint),
            }
        }
    };

    send(client, state, &request)
}

/// Interactive speed adjustment. Intermediate values (commit=false) update
/// local state only, for live feedback; the device sees a single request on
/// commit, so a continuous gesture cannot flood it.
pub fn apply_speed(client: &DeviceClient, state: &mut AppState, pwm: u8, commit: bool) -> Result<(), CommandError> {
    ensure_connected(state)?;
    state.fan.set_pwm(pwm);
    if !commit {
        return Ok(());
    }
    next_seq(state);

    let request = ControlRequest {
        fan_mode: state.fan.mode,
        fan_pwm: Some(pwm),
        setpoint: None,
    };
    send(client, state, &request)
}

/// Interactive setpoint adjustment; same commit semantics as [`apply_speed`].
pub fn apply_setpoint(client: &DeviceClient, state: &mut AppState, setpoint: u16, commit: bool) -> Result<(), CommandError> {
    ensure_connected(state)?;
    state.fan.setpoint = setpoint.min(1000);
    if !commit {
        return Ok(());
    }
    next_seq(state);

    let request = ControlRequest {
        fan_mode: state.fan.mode,
        fan_pwm: None,
        setpoint: Some(state.fan.setpoint),
    };
    send(client, state, &request)
}

fn send(client: &DeviceClient, state: &mut AppState, request: &ControlRequest) -> Result<(), CommandError> {
    if let Err(e) = client.send_control(request) {
        state.error = Some(e.to_string());
        return Err(CommandError::Device(e));
    }
    Ok(())
}

/// Provision the device's upstream (station) Wi-Fi. Prior station state is
/// only replaced by a successful, non-superseded response.
pub fn provision_station(
    client: &DeviceClient,
    state: &mut AppState,
    ssid: &str,
    password: &str,
) -> Result<(), CommandError> {
    ensure_connected(state)?;
    if ssid.trim().is_empty() || password.is_empty() {
        return Err(CommandError::MissingCredentials);
    }

    warn_if_ssid_not_visible(client, ssid);

    let seq = next_seq(state);
    let request = WifiConfigRequest {
        ssid: ssid.to_string(),
        password: password.to_string(),
    };
    match client.configure_station(&request) {
        Ok(station) => {
            complete_station(state, seq, &station);
            info!(
                "Station provisioned (ssid={:?}, connected={})",
                state.connectivity.station.ssid, state.connectivity.station.connected
            );
            Ok(())
        }
        Err(e) => {
            state.error = Some(e.to_string());
            Err(CommandError::Device(e))
        }
    }
}

/// Apply a provisioning response. A completion whose sequence number is older
/// than the latest dispatched command was superseded and must not clobber the
/// newer state.
pub fn complete_station(state: &mut AppState, seq: u64, station: &StationStatus) {
    if seq < state.command_seq {
        return;
    }
    let prev = &state.connectivity.station;
    state.connectivity.station = StationSnapshot {
        connected: station.sta_connected.unwrap_or(prev.connected),
        address: station.sta_ip.clone().or_else(|| prev.address.clone()),
        ssid: station.sta_ssid.clone().or_else(|| prev.ssid.clone()),
    };
}

/// Best-effort scan before provisioning; a missing or open target network is
/// worth a warning but never blocks the attempt.
fn warn_if_ssid_not_visible(client: &DeviceClient, ssid: &str) {
    match client.wifi_scan() {
        Ok(networks) => {
            let hit = networks.iter().find(|n| n.ssid.as_deref() == Some(ssid));
            match hit {
                None => warn!("Target network {:?} not visible to the device", ssid),
                Some(n) if n.secure == Some(false) => warn!("Target network {:?} is open", ssid),
                Some(_) => {}
            }
        }
        Err(e) => warn!("Wi-Fi scan failed, provisioning blind: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DeviceEndpoint;
    use std::net::TcpListener;

    fn refused_client() -> DeviceClient {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        DeviceClient::new(&DeviceEndpoint {
            host: "127.0.0.1".to_string(),
            port,
            request_timeout_ms: 1000,
        })
    }

    fn connected_state() -> AppState {
        AppState {
            link: LinkState::Connected,
            ..AppState::default()
        }
    }

    #[test]
    fn commands_require_connection() {
        let client = refused_client();
        let mut state = AppState::default();

        assert!(matches!(
            apply_mode(&client, &mut state, FanMode::Manual),
            Err(CommandError::NotConnected)
        ));
        assert!(matches!(
            apply_speed(&client, &mut state, 120, true),
            Err(CommandError::NotConnected)
        ));
        assert!(matches!(
            provision_station(&client, &mut state, "casa", "secret"),
            Err(CommandError::NotConnected)
        ));
        // No optimistic mutation happened either.
        assert_eq!(state.fan.pwm, 0);
        assert_eq!(state.command_seq, 0);
    }

    #[test]
    fn manual_with_all_zeros_targets_exactly_zero() {
        let fan = FanState::default();
        assert_eq!(resolve_manual_pwm(&fan), 0);
    }

    #[test]
    fn manual_resumes_remembered_speed() {
        let fan = FanState {
            last_manual_pwm: 180,
            pwm: 0,
            ..FanState::default()
        };
        assert_eq!(resolve_manual_pwm(&fan), 180);

        let fan = FanState {
            last_manual_pwm: 0,
            pwm: 90,
            ..FanState::default()
        };
        assert_eq!(resolve_manual_pwm(&fan), 90);
    }

    #[test]
    fn failed_manual_switch_keeps_optimistic_state() {
        let client = refused_client();
        let mut state = connected_state();
        state.fan.last_manual_pwm = 180;

        let result = apply_mode(&client, &mut state, FanMode::Manual);
        assert!(matches!(result, Err(CommandError::Device(_))));

        // Optimistic update survives the failure; no rollback.
        assert_eq!(state.fan.mode, FanMode::Manual);
        assert_eq!(state.fan.pwm, 180);
        assert!(state.error.is_some());
    }

    #[test]
    fn uncommitted_adjustments_stay_local() {
        let client = refused_client();
        let mut state = connected_state();
        state.fan.mode = FanMode::Manual;

        // Would fail if it hit the network: the client's target is refused.
        apply_speed(&client, &mut state, 40, false).unwrap();
        apply_speed(&client, &mut state, 90, false).unwrap();
        assert_eq!(state.fan.pwm, 90);
        assert_eq!(state.fan.last_manual_pwm, 90);

        apply_setpoint(&client, &mut state, 750, false).unwrap();
        assert_eq!(state.fan.setpoint, 750);
        assert_eq!(state.command_seq, 0, "no command dispatched before commit");
    }

    #[test]
    fn provisioning_validates_credentials_before_io() {
        let client = refused_client();
        let mut state = connected_state();

        assert!(matches!(
            provision_station(&client, &mut state, "", "secret"),
            Err(CommandError::MissingCredentials)
        ));
        assert!(matches!(
            provision_station(&client, &mut state, "casa", ""),
            Err(CommandError::MissingCredentials)
        ));
    }

    #[test]
    fn superseded_completion_does_not_clobber_state() {
        let mut state = connected_state();
        let stale_seq = next_seq(&mut state);
        let fresh_seq = next_seq(&mut state);

        let fresh = StationStatus {
            sta_connected: Some(true),
            sta_ip: Some("10.0.0.9".to_string()),
            sta_ssid: Some("nueva".to_string()),
        };
        complete_station(&mut state, fresh_seq, &fresh);

        let stale = StationStatus {
            sta_connected: Some(false),
            sta_ip: Some("10.0.0.2".to_string()),
            sta_ssid: Some("vieja".to_string()),
        };
        complete_station(&mut state, stale_seq, &stale);

        assert!(state.connectivity.station.connected);
        assert_eq!(state.connectivity.station.ssid.as_deref(), Some("nueva"));
    }

    #[test]
    fn completion_inherits_absent_fields() {
        let mut state = connected_state();
        state.connectivity.station.ssid = Some("casa".to_string());
        let seq = next_seq(&mut state);

        complete_station(
            &mut state,
            seq,
            &StationStatus {
                sta_connected: Some(true),
                sta_ip: None,
                sta_ssid: None,
            },
        );
        assert_eq!(state.connectivity.station.ssid.as_deref(), Some("casa"));
        assert!(state.connectivity.station.connected);
    }
}
