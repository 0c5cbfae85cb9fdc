//! Wire models for the purifier's on-device HTTP API (`/api/*`).
//!
//! Scope: types only — no client code.
//!
//! Notes
//! - Every response body is wrapped in an `ok`/`data` envelope; see [`Envelope`].
//! - Response fields are all optional: firmware revisions gain fields over
//!   time, and an absent field must fall back to the last known value rather
//!   than a hard-coded default.
//! - Air-quality tier names on the wire are the firmware's Spanish labels.

use serde::{Deserialize, Serialize};

/// Application-level wrapper around every device response.
///
/// The firmware omits `ok` in some replies; only an explicit `false`
/// counts as a rejection.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub ok: Option<bool>,
    pub data: Option<T>,
}

impl<T> Envelope<T> {
    pub fn is_ok(&self) -> bool {
        self.ok != Some(false)
    }
}

/// Air-quality tier reported by the device, ordered best to worst.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize)]
pub enum AirQuality {
    #[serde(rename = "BUENA")]
    Good,
    #[serde(rename = "MODERADA")]
    Moderate,
    #[serde(rename = "MALA")]
    Bad,
    #[serde(rename = "MUY MALA")]
    VeryBad,
    /// Initial value before any successful read; also absorbs tier names
    /// this client does not know about yet.
    #[default]
    #[serde(rename = "DESCONOCIDA")]
    Unknown,
}

impl<'de> serde::Deserialize<'de> for AirQuality {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;
        impl serde::de::Visitor<'_> for V {
            type Value = AirQuality;

            fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
                write!(f, "an air-quality tier name")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(match value {
                    "BUENA" => AirQuality::Good,
                    "MODERADA" => AirQuality::Moderate,
                    "MALA" => AirQuality::Bad,
                    "MUY MALA" => AirQuality::VeryBad,
                    // Future firmware tiers degrade to Unknown instead of
                    // failing the whole status decode.
                    _ => AirQuality::Unknown,
                })
            }
        }
        deserializer.deserialize_str(V)
    }
}

impl AirQuality {
    /// Worst tier — the one that raises an alert event.
    pub fn is_critical(self) -> bool {
        self == AirQuality::VeryBad
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FanMode {
    #[default]
    #[serde(rename = "AUTO")]
    Auto,
    #[serde(rename = "MANUAL")]
    Manual,
}

impl std::str::FromStr for FanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "AUTO" => Ok(FanMode::Auto),
            "MANUAL" => Ok(FanMode::Manual),
            other => Err(format!("unknown fan mode: {}", other)),
        }
    }
}

// =====================
// GET /ping
// =====================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingData {
    pub net: Option<NetInfo>,
    pub sensor_ready: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetInfo {
    pub ap_ip: Option<String>,
    pub sta_connected: Option<bool>,
    pub sta_ip: Option<String>,
    pub sta_ssid: Option<String>,
}

// =====================
// GET /status
// =====================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StatusData {
    pub air: Option<AirStatus>,
    pub fan: Option<FanStatus>,
    pub time: Option<TimeStatus>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AirStatus {
    pub air_quality_value: Option<f64>,
    pub air_quality_state: Option<AirQuality>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FanStatus {
    pub mode: Option<FanMode>,
    pub pwm: Option<i64>,
    pub setpoint: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TimeStatus {
    /// Device clock in unix milliseconds.
    pub millis: Option<i64>,
}

// =====================
// POST /control
// =====================

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlRequest {
    pub fan_mode: FanMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fan_pwm: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub setpoint: Option<u16>,
}

// =====================
// GET /wifi-scan, POST /wifi-config
// =====================

#[derive(Debug, Clone, Deserialize)]
pub struct WifiNetwork {
    pub ssid: Option<String>,
    pub rssi: Option<i32>,
    pub secure: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct WifiConfigRequest {
    pub ssid: String,
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StationStatus {
    pub sta_connected: Option<bool>,
    pub sta_ip: Option<String>,
    pub sta_ssid: Option<String>,
}

// =====================
// GET /events (the device's own on-flash event log)
// =====================

#[derive(Debug, Clone, Deserialize)]
pub struct DeviceEvent {
    pub id: Option<i64>,
    pub device_id: Option<String>,
    /// Device clock in unix milliseconds.
    pub timestamp: Option<i64>,
    pub event_type: Option<String>,
    pub event_code: Option<String>,
    pub description: Option<String>,
    pub air_quality_value: Option<f64>,
    pub air_quality_state: Option<AirQuality>,
    pub severity: Option<i32>,
    pub fan_speed: Option<i64>,
    pub setpoint: Option<i64>,
}
