//! Sensor reading rows as stored in the `sensordata` table.
//!
//! Notes
//! - `created_at` is always an offset-aware instant; it is kept in UTC here and only
//!   converted to the display zone on its way to a presenter.
//! - `aqi` is an integer column, but some writers push it through a float
//!   pipeline, so integral floats such as `42.0` are accepted on the wire.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReadingRecord {
    pub id: i64,
    #[serde(rename = "created_at")]
    pub timestamp: DateTime<Utc>,
    pub mq135: f64,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(deserialize_with = "deserialize_aqi")]
    pub aqi: i64,
}

impl ReadingRecord {
    pub fn value(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Mq135 => self.mq135,
            Metric::Temperature => self.temperature,
            Metric::Humidity => self.humidity,
            Metric::Aqi => self.aqi as f64,
        }
    }

    pub fn localize(&self, zone: Tz) -> LocalizedReading {
        LocalizedReading {
            id: self.id,
            timestamp: self.timestamp.with_timezone(&zone),
            mq135: self.mq135,
            temperature: self.temperature,
            humidity: self.humidity,
            aqi: self.aqi,
        }
    }
}

/// A reading with its timestamp already in the display zone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocalizedReading {
    pub id: i64,
    pub timestamp: DateTime<Tz>,
    pub mq135: f64,
    pub temperature: f64,
    pub humidity: f64,
    pub aqi: i64,
}

/// Chartable columns of a reading.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Metric {
    Mq135,
    Temperature,
    Humidity,
    Aqi,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Mq135, Metric::Temperature, Metric::Humidity, Metric::Aqi];

    pub fn display_name(self) -> &'static str {
        match self {
            Metric::Mq135 => "MQ135",
            Metric::Temperature => "Temperature",
            Metric::Humidity => "Humidity",
            Metric::Aqi => "AQI",
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            Metric::Temperature => "°C",
            Metric::Humidity => "%",
            Metric::Mq135 | Metric::Aqi => "",
        }
    }
}

/// Order a fetched batch newest-first (by `id`) and cap it at `limit` rows.
pub fn normalize_batch(mut rows: Vec<ReadingRecord>, limit: usize) -> Vec<ReadingRecord> {
    rows.sort_by(|a, b| b.id.cmp(&a.id));
    rows.dedup_by_key(|r| r.id);
    rows.truncate(limit);
    rows
}

fn deserialize_aqi<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct V;
    impl<'de> serde::de::Visitor<'de> for V {
        type Value = i64;

        fn expecting(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
            write!(f, "an integer air quality index")
        }

        fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            i64::try_from(value).map_err(|_| E::invalid_value(serde::de::Unexpected::Unsigned(value), &self))
        }

        fn visit_f64<E>(self, value: f64) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if value.is_finite() && value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
                Ok(value as i64)
            } else {
                Err(E::invalid_value(serde::de::Unexpected::Float(value), &self))
            }
        }
    }

    deserializer.deserialize_any(V)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(id: i64, aqi: i64) -> ReadingRecord {
        ReadingRecord {
            id,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 0).unwrap() + chrono::Duration::seconds(id),
            mq135: 120.0,
            temperature: 24.5,
            humidity: 61.0,
            aqi,
        }
    }

    #[test]
    fn decodes_store_row_and_ignores_extra_columns() {
        let json = r#"{
            "id": 7,
            "created_at": "2024-03-01T06:00:07.123456+00:00",
            "mq135": 118,
            "temperature": 24.5,
            "humidity": 61.0,
            "aqi": 42,
            "device": "esp32-kitchen"
        }"#;
        let row: ReadingRecord = serde_json::from_str(json).expect("row decodes");
        assert_eq!(row.id, 7);
        assert_eq!(row.mq135, 118.0);
        assert_eq!(row.aqi, 42);
        assert_eq!(row.timestamp.timestamp(), Utc.with_ymd_and_hms(2024, 3, 1, 6, 0, 7).unwrap().timestamp());
    }

    #[test]
    fn aqi_accepts_integral_floats_only() {
        let base = r#"{"id":1,"created_at":"2024-03-01T06:00:00Z","mq135":1,"temperature":1,"humidity":1,"aqi":"#;
        let ok: ReadingRecord = serde_json::from_str(&format!("{base}42.0}}")).expect("integral float");
        assert_eq!(ok.aqi, 42);
        assert!(serde_json::from_str::<ReadingRecord>(&format!("{base}42.5}}")).is_err());
        assert!(serde_json::from_str::<ReadingRecord>(&format!("{base}null}}")).is_err());
    }

    #[test]
    fn normalize_orders_newest_first_and_truncates() {
        let rows = vec![record(3, 10), record(5, 20), record(4, 30), record(1, 40)];
        let out = normalize_batch(rows, 3);
        let ids: Vec<i64> = out.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
    }

    #[test]
    fn localize_keeps_instant_and_values() {
        let r = record(9, 77);
        let local = r.localize(chrono_tz::Asia::Kolkata);
        assert_eq!(local.timestamp, r.timestamp);
        assert_eq!(local.timestamp.format("%H:%M:%S").to_string(), "11:30:09");
        assert_eq!(local.aqi, 77);
    }

    #[test]
    fn metric_values_follow_columns() {
        let r = record(1, 55);
        assert_eq!(r.value(Metric::Aqi), 55.0);
        assert_eq!(r.value(Metric::Temperature), 24.5);
        assert_eq!(r.value(Metric::Humidity), 61.0);
        assert_eq!(r.value(Metric::Mq135), 120.0);
    }
}
