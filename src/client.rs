//! HTTP client for the purifier's on-device API.
//!
//! - Blocking client using `ureq` (no async).
//! - One typed method per endpoint; every reply travels in the `{ ok, data }`
//!   envelope, which [`DeviceClient`] unwraps.
//! - The configured request timeout covers the whole call, connect included;
//!   on expiry the call fails with [`DeviceClientError::Timeout`] and nothing
//!   is left in flight.
//! - Stateless across calls: no session, no auth, no retry.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::DeviceEndpoint;
use crate::models::device::{
    ControlRequest, DeviceEvent, Envelope, PingData, StatusData, StationStatus, WifiConfigRequest, WifiNetwork,
};

#[derive(Debug)]
pub enum DeviceClientError {
    /// No response within the configured timeout.
    Timeout,
    /// Connection-level failure: no route, refused, reset.
    Network(String),
    /// HTTP response with a non-2xx status.
    Http { status: u16, body: String },
    /// A 2xx response whose body is not the expected JSON shape.
    Malformed(String),
    /// A well-formed reply carrying an explicit `ok: false`.
    Rejected,
}

impl core::fmt::Display for DeviceClientError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            DeviceClientError::Timeout => write!(f, "request timed out"),
            DeviceClientError::Network(s) => write!(f, "network error: {}", s),
            DeviceClientError::Http { status, body } => write!(f, "http {}: {}", status, body),
            DeviceClientError::Malformed(s) => write!(f, "malformed response: {}", s),
            DeviceClientError::Rejected => write!(f, "device replied ok=false"),
        }
    }
}

impl std::error::Error for DeviceClientError {}

pub struct DeviceClient {
    agent: ureq::Agent,
    base_url: String,
}

impl DeviceClient {
    pub fn new(endpoint: &DeviceEndpoint) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(endpoint.request_timeout_ms))
            .build();
        DeviceClient {
            agent,
            base_url: endpoint.api_base(),
        }
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, DeviceClientError> {
        let req = self.agent.get(&self.url(path)).set("Accept", "application/json");
        Self::handle(req.call())
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: &impl Serialize) -> Result<T, DeviceClientError> {
        let req = self.agent.post(&self.url(path)).set("Accept", "application/json");
        Self::handle(req.send_json(body))
    }

    fn handle<T: DeserializeOwned>(result: Result<ureq::Response, ureq::Error>) -> Result<T, DeviceClientError> {
        match result {
            Ok(resp) => Self::decode(resp),
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(DeviceClientError::Http { status, body })
            }
            Err(err) => Err(Self::classify_transport(err)),
        }
    }

    fn decode<T: DeserializeOwned>(resp: ureq::Response) -> Result<T, DeviceClientError> {
        let body = resp
            .into_string()
            .map_err(|e| DeviceClientError::Network(e.to_string()))?;
        let mut de = serde_json::Deserializer::from_str(&body);
        let envelope: Envelope<T> =
            serde_path_to_error::deserialize(&mut de).map_err(|e| DeviceClientError::Malformed(e.to_string()))?;
        if !envelope.is_ok() {
            return Err(DeviceClientError::Rejected);
        }
        envelope
            .data
            .ok_or_else(|| DeviceClientError::Malformed("response envelope has no data".to_string()))
    }

    /// Tell a timed-out call apart from other transport failures by walking
    /// the error's source chain down to the underlying io error.
    fn classify_transport(err: ureq::Error) -> DeviceClientError {
        use std::error::Error as _;

        let mut source = err.source();
        while let Some(cause) = source {
            if let Some(io) = cause.downcast_ref::<std::io::Error>()
                && matches!(io.kind(), std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock)
            {
                return DeviceClientError::Timeout;
            }
            source = cause.source();
        }
        let message = err.to_string();
        if message.contains("timed out") {
            return DeviceClientError::Timeout;
        }
        DeviceClientError::Network(message)
    }

    /// Lightweight reachability probe.
    pub fn ping(&self) -> Result<PingData, DeviceClientError> {
        self.get("/ping")
    }

    /// Full status snapshot: air quality, fan state, device clock.
    pub fn status(&self) -> Result<StatusData, DeviceClientError> {
        self.get("/status")
    }

    /// Push a fan control command. The device echoes its state back but the
    /// echo is not required; the next poll reconciles.
    pub fn send_control(&self, request: &ControlRequest) -> Result<(), DeviceClientError> {
        let req = self.agent.post(&self.url("/control")).set("Accept", "application/json");
        match req.send_json(request) {
            Ok(resp) => {
                let body = resp
                    .into_string()
                    .map_err(|e| DeviceClientError::Network(e.to_string()))?;
                let envelope: Envelope<serde_json::Value> =
                    serde_json::from_str(&body).map_err(|e| DeviceClientError::Malformed(e.to_string()))?;
                if !envelope.is_ok() {
                    return Err(DeviceClientError::Rejected);
                }
                Ok(())
            }
            Err(ureq::Error::Status(status, resp)) => {
                let body = resp.into_string().unwrap_or_else(|_| String::from("<no body>"));
                Err(DeviceClientError::Http { status, body })
            }
            Err(err) => Err(Self::classify_transport(err)),
        }
    }

    /// Networks visible to the device's station interface.
    pub fn wifi_scan(&self) -> Result<Vec<WifiNetwork>, DeviceClientError> {
        self.get("/wifi-scan")
    }

    /// Provision the device's upstream (station) Wi-Fi credentials.
    pub fn configure_station(&self, request: &WifiConfigRequest) -> Result<StationStatus, DeviceClientError> {
        self.post("/wifi-config", request)
    }

    /// The device's own on-flash event log.
    pub fn events(&self) -> Result<Vec<DeviceEvent>, DeviceClientError> {
        self.get("/events")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::{AirQuality, FanMode};
    use std::net::TcpListener;

    fn endpoint_for(port: u16, timeout_ms: u64) -> DeviceEndpoint {
        DeviceEndpoint {
            host: "127.0.0.1".to_string(),
            port,
            request_timeout_ms: timeout_ms,
        }
    }

    #[test]
    fn url_building_appends_path() {
        let client = DeviceClient::new(&DeviceEndpoint::default());
        assert_eq!(client.url("/ping"), "http://192.168.4.1/api/ping");
        assert_eq!(client.url("status"), "http://192.168.4.1/api/status");
    }

    #[test]
    fn decodes_status_fixture() {
        let json = std::fs::read_to_string("tests/data/status.json").expect("fixture present");
        let mut de = serde_json::Deserializer::from_str(&json);
        let envelope: Envelope<StatusData> = serde_path_to_error::deserialize(&mut de).expect("parse status");
        assert!(envelope.is_ok());

        let data = envelope.data.expect("data present");
        let air = data.air.expect("air present");
        assert_eq!(air.air_quality_value, Some(120.0));
        assert_eq!(air.air_quality_state, Some(AirQuality::Bad));
        let fan = data.fan.expect("fan present");
        assert_eq!(fan.mode, Some(FanMode::Auto));
        assert_eq!(fan.pwm, Some(0));
        assert_eq!(fan.setpoint, Some(500));
        assert_eq!(data.time.and_then(|t| t.millis), Some(1000));
    }

    #[test]
    fn decodes_ping_fixture() {
        let json = std::fs::read_to_string("tests/data/ping.json").expect("fixture present");
        let mut de = serde_json::Deserializer::from_str(&json);
        let envelope: Envelope<PingData> = serde_path_to_error::deserialize(&mut de).expect("parse ping");
        let data = envelope.data.expect("data present");
        let net = data.net.expect("net present");
        assert_eq!(net.ap_ip.as_deref(), Some("192.168.4.1"));
        assert_eq!(net.sta_connected, Some(true));
        assert_eq!(data.sensor_ready, Some(true));
    }

    #[test]
    fn rejected_envelope_is_not_a_parse_error() {
        let mut de = serde_json::Deserializer::from_str("{\"ok\":false}");
        let envelope: Envelope<StatusData> = serde_path_to_error::deserialize(&mut de).unwrap();
        assert!(!envelope.is_ok());
    }

    #[test]
    fn refused_connection_reports_network_error() {
        // Grab a free port, then close the listener so the connect is refused.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let client = DeviceClient::new(&endpoint_for(port, 1000));
        match client.ping() {
            Err(DeviceClientError::Network(_)) | Err(DeviceClientError::Timeout) => {}
            other => panic!("expected transport failure, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn unanswered_request_times_out() {
        // Accept the connection into the backlog but never answer.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let client = DeviceClient::new(&endpoint_for(port, 300));
        match client.status() {
            Err(DeviceClientError::Timeout) => {}
            other => panic!("expected timeout, got {:?}", other.map(|_| ())),
        }
        drop(listener);
    }
}
