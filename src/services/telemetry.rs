//! Mirrors successful polls into the persistent store.
//!
//! One measurement row per successful poll with a non-null value — the only
//! time series the history view has, so rows are never deduplicated or
//! throttled. Alongside it, a severity-5 AIR_CRITICAL event whenever the
//! reading sits in the worst tier, gated by the configured [`AlertPolicy`].
//!
//! Insert failures never propagate into the polling loop: the in-memory
//! reading stays authoritative and the failure is logged for visibility.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use log::warn;
use uuid::Uuid;

use crate::config::AlertPolicy;
use crate::db::models::{event_codes, event_types, Measurement, NewEvent, NewMeasurement, AIR_CRITICAL_SEVERITY};
use crate::models::device::AirQuality;
use crate::schema;
use crate::state::AirReading;
use crate::utils::serde_enum_name;

pub struct TelemetryMirror {
    device_id: Uuid,
    policy: AlertPolicy,
    previous_tier: AirQuality,
}

impl TelemetryMirror {
    pub fn new(device_id: Uuid, policy: AlertPolicy) -> Self {
        TelemetryMirror {
            device_id,
            policy,
            previous_tier: AirQuality::Unknown,
        }
    }

    /// Record one successful poll. Readings without a value are skipped
    /// entirely (nothing to chart, nothing to alert on).
    pub fn record(&mut self, conn: &mut PgConnection, reading: &AirReading, fan_pwm: u8) {
        let Some((measurement, alert)) = self.build_rows(reading, fan_pwm) else {
            return;
        };

        if let Err(e) = insert_measurement(conn, &measurement) {
            warn!("Measurement insert failed: {}", e);
        }
        if let Some(event) = alert {
            if let Err(e) = insert_event(conn, &event) {
                warn!("Event insert failed: {}", e);
            }
        }
    }

    /// Pure row construction, separated from the inserts so the alert policy
    /// is testable without a database.
    fn build_rows(&mut self, reading: &AirReading, fan_pwm: u8) -> Option<(NewMeasurement, Option<NewEvent>)> {
        let value = reading.value?;
        let tier_name = serde_enum_name(&reading.state).unwrap_or_default();

        let alerting = match self.policy {
            AlertPolicy::EveryPoll => reading.state.is_critical(),
            AlertPolicy::OnTransition => reading.state.is_critical() && !self.previous_tier.is_critical(),
        };
        self.previous_tier = reading.state;

        let measurement = NewMeasurement {
            device_id: self.device_id,
            air_quality_value: value,
            air_quality_state: tier_name.clone(),
            fan_speed: fan_pwm as i32,
        };
        let alert = alerting.then(|| NewEvent {
            device_id: self.device_id,
            event_type: event_types::ALERT.to_string(),
            event_code: Some(event_codes::AIR_CRITICAL.to_string()),
            description: "air quality in critical tier".to_string(),
            air_quality_value: Some(value),
            air_quality_state: tier_name,
            severity: AIR_CRITICAL_SEVERITY,
        });

        Some((measurement, alert))
    }
}

fn insert_measurement(conn: &mut PgConnection, row: &NewMeasurement) -> Result<usize, String> {
    use schema::measurements::dsl as M;

    diesel::insert_into(M::measurements)
        .values(row)
        .execute(conn)
        .map_err(|e| format!("insert measurement failed: {}", e))
}

fn insert_event(conn: &mut PgConnection, row: &NewEvent) -> Result<usize, String> {
    use schema::events::dsl as E;

    diesel::insert_into(E::events)
        .values(row)
        .execute(conn)
        .map_err(|e| format!("insert event failed: {}", e))
}

/// Measurement history for one device since a lower bound, ascending — the
/// query shape the history view consumes.
pub fn fetch_history(
    conn: &mut PgConnection,
    device_id: Uuid,
    since: DateTime<Utc>,
) -> Result<Vec<Measurement>, String> {
    use schema::measurements::dsl as M;

    M::measurements
        .filter(M::device_id.eq(device_id).and(M::timestamp.ge(since)))
        .order(M::timestamp.asc())
        .load(conn)
        .map_err(|e| format!("history query failed: {}", e))
}
