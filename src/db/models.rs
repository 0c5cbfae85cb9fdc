//! Diesel model structs for the two append-only telemetry tables.
//!
//! Both tables are insert-only from this client: no upsert, no update, no
//! delete. `timestamp`/`created_at` are assigned by the database, which is
//! why the Insertable structs omit them.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::schema;

// Standardized values for `events.event_type` / `events.event_code`.
pub mod event_types {
    pub const ALERT: &str = "ALERT";
}

pub mod event_codes {
    pub const AIR_CRITICAL: &str = "AIR_CRITICAL";
}

/// Severity attached to AIR_CRITICAL events.
pub const AIR_CRITICAL_SEVERITY: i32 = 5;

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::measurements)]
pub struct Measurement {
    pub id: i64,
    pub device_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub air_quality_value: f64,
    pub air_quality_state: String,
    pub fan_speed: i32,
}

#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::measurements)]
pub struct NewMeasurement {
    pub device_id: Uuid,
    pub air_quality_value: f64,
    pub air_quality_state: String,
    pub fan_speed: i32,
}

#[derive(Debug, Clone, Queryable, Identifiable, Selectable, Serialize, Deserialize)]
#[diesel(table_name = schema::events)]
pub struct Event {
    pub id: i64,
    pub device_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub event_type: String,
    pub event_code: Option<String>,
    pub description: String,
    pub air_quality_value: Option<f64>,
    pub air_quality_state: String,
    pub severity: i32,
}

#[derive(Debug, Clone, PartialEq, Insertable, Serialize, Deserialize)]
#[diesel(table_name = schema::events)]
pub struct NewEvent {
    pub device_id: Uuid,
    pub event_type: String,
    pub event_code: Option<String>,
    pub description: String,
    pub air_quality_value: Option<f64>,
    pub air_quality_state: String,
    pub severity: i32,
}
