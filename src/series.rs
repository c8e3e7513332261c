//! Chart series assembly.
//!
//! The store hands batches back newest-first; charts want oldest-first. Every
//! series built here is re-sorted ascending by timestamp, and gaps between
//! samples are left exactly as they are.

use crate::models::reading::{Metric, ReadingRecord};
use chrono::DateTime;
use chrono_tz::Tz;
use core::fmt;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimePoint {
    pub timestamp: DateTime<Tz>,
    pub value: f64,
}

/// Points for a single metric, ascending by timestamp.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimeSeries {
    points: Vec<TimePoint>,
}

impl TimeSeries {
    pub fn points(&self) -> &[TimePoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&TimePoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&TimePoint> {
        self.points.last()
    }

    /// Smallest and largest value, ignoring NaN.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.points
            .iter()
            .map(|p| p.value)
            .filter(|v| !v.is_nan())
            .fold(None, |acc, v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

pub type SeriesMap = BTreeMap<Metric, TimeSeries>;

/// Build one ascending series per requested metric, with timestamps in `zone`.
pub fn build(rows: &[ReadingRecord], metrics: &[Metric], zone: Tz) -> SeriesMap {
    let mut ordered: Vec<&ReadingRecord> = rows.iter().collect();
    // stable: equal timestamps fall back to id order
    ordered.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.id.cmp(&b.id)));

    metrics
        .iter()
        .map(|&metric| {
            let points = ordered
                .iter()
                .map(|row| TimePoint {
                    timestamp: row.timestamp.with_timezone(&zone),
                    value: row.value(metric),
                })
                .collect();
            (metric, TimeSeries { points })
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyInput;

impl Display for EmptyInput {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "no readings in batch")
    }
}

impl Error for EmptyInput {}

/// Newest reading of a newest-first batch.
pub fn latest(rows: &[ReadingRecord]) -> Result<&ReadingRecord, EmptyInput> {
    rows.first().ok_or(EmptyInput)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{classify, SeverityBand};
    use chrono::{Duration, TimeZone, Utc};

    fn ist() -> Tz {
        chrono_tz::Asia::Kolkata
    }

    /// `count` rows newest-first, ids `top..`, one minute apart, with uneven aqi.
    fn batch(top: i64, count: usize) -> Vec<ReadingRecord> {
        let base = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        (0..count as i64)
            .map(|i| {
                let id = top - i;
                ReadingRecord {
                    id,
                    timestamp: base + Duration::minutes(id),
                    mq135: 100.0 + (id % 7) as f64,
                    temperature: 20.0 + (id % 11) as f64 / 2.0,
                    humidity: 40.0 + (id % 13) as f64,
                    aqi: 10 + (id * 37) % 311,
                }
            })
            .collect()
    }

    #[test]
    fn latest_is_first_of_newest_first_input() {
        let rows = batch(5, 3);
        assert_eq!(latest(&rows).map(|r| r.id), Ok(5));
        assert_eq!(latest(&[]), Err(EmptyInput));
    }

    #[test]
    fn series_are_ascending() {
        let rows = batch(200, 120);
        let map = build(&rows, &Metric::ALL, ist());
        assert_eq!(map.len(), 4);
        for series in map.values() {
            assert_eq!(series.len(), 120);
            assert!(series.points().windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
        }
    }

    #[test]
    fn preserves_gaps_without_interpolation() {
        let mut rows = batch(10, 3);
        rows[0].timestamp += Duration::hours(6);
        let map = build(&rows, &[Metric::Aqi], ist());
        let points = map[&Metric::Aqi].points();
        assert_eq!(points.len(), 3);
        assert_eq!(points[2].timestamp - points[1].timestamp, Duration::hours(6) + Duration::minutes(1));
    }

    #[test]
    fn timestamps_are_in_display_zone() {
        let rows = batch(1, 1);
        let map = build(&rows, &[Metric::Temperature], ist());
        let point = map[&Metric::Temperature].first().copied().unwrap();
        assert_eq!(point.timestamp.timezone(), ist());
        assert_eq!(point.timestamp.format("%:z").to_string(), "+05:30");
        assert_eq!(point.timestamp, rows[0].timestamp);
    }

    #[test]
    fn daylight_saving_zones_shift_per_instant() {
        let mut rows = batch(2, 2);
        rows[0].timestamp = Utc.with_ymd_and_hms(2024, 7, 1, 12, 0, 0).unwrap();
        rows[1].timestamp = Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap();
        let map = build(&rows, &[Metric::Aqi], chrono_tz::Europe::Berlin);
        let offsets: Vec<String> = map[&Metric::Aqi]
            .points()
            .iter()
            .map(|p| p.timestamp.format("%H:%M %:z").to_string())
            .collect();
        assert_eq!(offsets, vec!["13:00 +01:00", "14:00 +02:00"]);
    }

    #[test]
    fn round_trip_preserves_every_pair() {
        for size in [0usize, 1, 1000] {
            let rows = batch(5_000, size);
            let map = build(&rows, &Metric::ALL, ist());
            for metric in Metric::ALL {
                let mut expected: Vec<(DateTime<Utc>, u64)> = rows
                    .iter()
                    .map(|r| (r.timestamp, r.value(metric).to_bits()))
                    .collect();
                let mut actual: Vec<(DateTime<Utc>, u64)> = map[&metric]
                    .points()
                    .iter()
                    .map(|p| (p.timestamp.with_timezone(&Utc), p.value.to_bits()))
                    .collect();
                assert!(map[&metric].points().iter().all(|p| p.timestamp.timezone() == ist()));
                expected.sort_unstable();
                actual.sort_unstable();
                assert_eq!(actual, expected, "metric {metric:?}, size {size}");
            }
        }
    }

    #[test]
    fn live_window_scenario() {
        let rows = batch(1000, 50);
        assert_eq!(rows.last().map(|r| r.id), Some(951));
        assert!(rows.iter().all(|r| (10..=320).contains(&r.aqi)));

        let newest = latest(&rows).unwrap();
        assert_eq!(newest.id, 1000);
        assert_eq!(newest.aqi, 312);
        assert_eq!(classify(newest.aqi), SeverityBand::Hazardous);
        for row in &rows {
            let band = classify(row.aqi);
            let position = SeverityBand::ALL.iter().position(|b| *b == band).unwrap();
            let floor = match position {
                0 => i64::MIN,
                i => SeverityBand::ALL[i - 1].upper_bound().unwrap(),
            };
            assert!(row.aqi > floor && band.upper_bound().is_none_or(|max| row.aqi <= max), "aqi {} -> {band:?}", row.aqi);
        }

        let map = build(&rows, &[Metric::Aqi], ist());
        let series = &map[&Metric::Aqi];
        assert_eq!(series.len(), 50);
        assert_eq!(series.first().unwrap().timestamp, rows[49].timestamp);
        assert_eq!(series.last().unwrap().timestamp, rows[0].timestamp);
    }

    #[test]
    fn value_range_skips_nan() {
        let mut rows = batch(3, 3);
        rows[1].temperature = f64::NAN;
        let map = build(&rows, &[Metric::Temperature], ist());
        let (lo, hi) = map[&Metric::Temperature].value_range().unwrap();
        assert!(lo <= hi);
        assert!(!lo.is_nan() && !hi.is_nan());
        assert_eq!(TimeSeries::default().value_range(), None);
    }
}
