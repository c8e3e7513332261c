//! Diesel row structs for the read path.

use chrono::{DateTime, Utc};
use diesel::prelude::*;

use crate::models::reading::ReadingRecord;
use crate::schema;

#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = schema::sensordata)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct SensorRow {
    pub id: i64,
    pub created_at: DateTime<Utc>,
    pub mq135: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub aqi: i64,
}

impl From<SensorRow> for ReadingRecord {
    fn from(row: SensorRow) -> Self {
        ReadingRecord {
            id: row.id,
            timestamp: row.created_at,
            mq135: row.mq135,
            temperature: row.temperature,
            humidity: row.humidity,
            aqi: row.aqi,
        }
    }
}
