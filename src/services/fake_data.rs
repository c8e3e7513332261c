use crate::client::{FetchError, ReadingSource};
use crate::models::reading::ReadingRecord;
use chrono::{DateTime, Duration, Timelike, Utc};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f64::consts::PI;
use std::num::NonZeroU32;

const STEP_SECONDS: i64 = 2;
const BACKLOG_ROWS: usize = 1_500;
const MAX_ROWS: usize = 10_000;
const FIRST_ID: i64 = 1;
pub const DEFAULT_SEED: u64 = 0x0A51_D0C5_5E45_0125;

/// In-memory stand-in for the readings table.
///
/// Starts with a backlog of samples ending at creation time and appends one new
/// sample per fetch, the way the upstream sensor keeps inserting rows.
pub struct FakeSource {
    rng: StdRng,
    rows: Vec<ReadingRecord>,
    next_id: i64,
}

impl FakeSource {
    pub fn new(seed: u64, now: DateTime<Utc>) -> Self {
        Self::with_backlog(seed, now, BACKLOG_ROWS)
    }

    pub fn with_backlog(seed: u64, now: DateTime<Utc>, backlog: usize) -> Self {
        let mut source = FakeSource {
            rng: StdRng::seed_from_u64(seed),
            rows: Vec::with_capacity(backlog + 64),
            next_id: FIRST_ID,
        };
        let step = Duration::seconds(STEP_SECONDS);
        let mut ts = now - step * (backlog as i32);
        for _ in 0..backlog {
            ts += step;
            source.push_sample(ts);
        }
        info!(
            "Fake data: seeded {} synthetic reading(s) ending at {}",
            backlog,
            now.to_rfc3339()
        );
        source
    }

    fn push_sample(&mut self, ts: DateTime<Utc>) {
        let day_fraction = ts.num_seconds_from_midnight() as f64 / 86_400.0;
        let temperature = compute_temperature(day_fraction, &mut self.rng);
        let humidity = compute_humidity(temperature, &mut self.rng);
        let mq135 = compute_mq135(day_fraction, &mut self.rng);

        self.rows.push(ReadingRecord {
            id: self.next_id,
            timestamp: ts,
            mq135: round1(mq135),
            temperature: round1(temperature),
            humidity: round1(humidity),
            aqi: aqi_from_mq135(mq135),
        });
        self.next_id += 1;

        if self.rows.len() > MAX_ROWS {
            let excess = self.rows.len() - MAX_ROWS;
            self.rows.drain(..excess);
        }
    }
}

impl ReadingSource for FakeSource {
    fn describe(&self) -> String {
        String::from("synthetic readings")
    }

    fn fetch_latest(&mut self, limit: NonZeroU32) -> Result<Vec<ReadingRecord>, FetchError> {
        let step = Duration::seconds(STEP_SECONDS);
        let next_ts = match self.rows.last() {
            Some(last) if last.timestamp + step > Utc::now() => last.timestamp + step,
            _ => Utc::now(),
        };
        self.push_sample(next_ts);

        Ok(self
            .rows
            .iter()
            .rev()
            .take(limit.get() as usize)
            .cloned()
            .collect())
    }
}

fn compute_temperature(day_fraction: f64, rng: &mut StdRng) -> f64 {
    let diurnal = ((day_fraction - 0.35) * 2.0 * PI).sin() * 4.5;
    let random = rng.random_range(-0.3..=0.3);
    (28.0 + diurnal + random).clamp(15.0, 45.0)
}

fn compute_humidity(temperature: f64, rng: &mut StdRng) -> f64 {
    let temperature_component = (28.0 - temperature) * 2.2;
    let random = rng.random_range(-1.5..=1.5);
    (58.0 + temperature_component + random).clamp(20.0, 95.0)
}

fn compute_mq135(day_fraction: f64, rng: &mut StdRng) -> f64 {
    let traffic = gaussian(day_fraction, 0.36, 0.05) * 90.0 + gaussian(day_fraction, 0.8, 0.06) * 120.0;
    let random = rng.random_range(-8.0..=8.0);
    let spike = if rng.random_bool(0.01) {
        rng.random_range(80.0..=250.0)
    } else {
        0.0
    };
    (140.0 + traffic + random + spike).max(0.0)
}

/// Rough linear calibration of the MQ135 output onto the AQI scale.
fn aqi_from_mq135(mq135: f64) -> i64 {
    ((mq135 - 110.0) * 1.25).clamp(0.0, 500.0).round() as i64
}

fn gaussian(x: f64, center: f64, width: f64) -> f64 {
    let exponent = -((x - center) * (x - center)) / (2.0 * width * width);
    exponent.exp()
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn source() -> FakeSource {
        FakeSource::with_backlog(DEFAULT_SEED, Utc.with_ymd_and_hms(2025, 1, 14, 9, 0, 0).unwrap(), 200)
    }

    #[test]
    fn returns_newest_first_up_to_limit() {
        let mut s = source();
        let rows = s.fetch_latest(NonZeroU32::new(50).unwrap()).unwrap();
        assert_eq!(rows.len(), 50);
        assert_eq!(rows[0].id, 201);
        assert!(rows.windows(2).all(|w| w[0].id == w[1].id + 1));
        assert!(rows.windows(2).all(|w| w[0].timestamp > w[1].timestamp));
    }

    #[test]
    fn each_fetch_appends_one_row() {
        let mut s = source();
        let limit = NonZeroU32::new(5).unwrap();
        let first = s.fetch_latest(limit).unwrap();
        let second = s.fetch_latest(limit).unwrap();
        assert_eq!(second[0].id, first[0].id + 1);
        assert!(second[0].timestamp > first[0].timestamp);
    }

    #[test]
    fn limit_larger_than_table() {
        let mut s = source();
        let rows = s.fetch_latest(NonZeroU32::new(1000).unwrap()).unwrap();
        assert_eq!(rows.len(), 201);
    }

    #[test]
    fn values_stay_plausible() {
        let mut s = source();
        for row in s.fetch_latest(NonZeroU32::new(201).unwrap()).unwrap() {
            assert!((0..=500).contains(&row.aqi));
            assert!((15.0..=45.0).contains(&row.temperature));
            assert!((20.0..=95.0).contains(&row.humidity));
            assert!(row.mq135 >= 0.0);
        }
    }

    #[test]
    fn same_seed_same_backlog() {
        let now = Utc.with_ymd_and_hms(2025, 1, 14, 9, 0, 0).unwrap();
        let a = FakeSource::with_backlog(7, now, 30);
        let b = FakeSource::with_backlog(7, now, 30);
        assert_eq!(a.rows, b.rows);
    }

    #[test]
    fn aqi_calibration_is_clamped() {
        assert_eq!(aqi_from_mq135(0.0), 0);
        assert_eq!(aqi_from_mq135(150.0), 50);
        assert_eq!(aqi_from_mq135(10_000.0), 500);
    }
}
