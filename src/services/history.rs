//! Historical view: one larger fetch when the view is opened, no timer.

use crate::client::ReadingSource;
use crate::models::reading::{LocalizedReading, Metric};
use crate::series::{self, SeriesMap};
use chrono_tz::Tz;
use log::{info, warn};
use std::num::NonZeroU32;

/// Metrics charted together on the history view.
pub const HISTORY_METRICS: [Metric; 3] = [Metric::Aqi, Metric::Temperature, Metric::Humidity];

#[derive(Debug, Clone, PartialEq)]
pub enum HistoryView {
    Loaded {
        /// Newest first, for the data log.
        table: Vec<LocalizedReading>,
        /// Oldest first, one series per entry of `HISTORY_METRICS`.
        chart: SeriesMap,
    },
    NoData,
    Unavailable { reason: String },
}

pub fn build<S: ReadingSource + ?Sized>(source: &mut S, limit: NonZeroU32, zone: Tz) -> HistoryView {
    let rows = match source.fetch_latest(limit) {
        Ok(rows) => rows,
        Err(e) => {
            warn!("History: fetch of {} row(s) from {} failed: {}", limit, source.describe(), e);
            return HistoryView::Unavailable { reason: e.to_string() };
        }
    };
    if rows.is_empty() {
        info!("History: store returned no rows");
        return HistoryView::NoData;
    }

    let chart = series::build(&rows, &HISTORY_METRICS, zone);
    let table: Vec<LocalizedReading> = rows.iter().map(|r| r.localize(zone)).collect();
    if let (Some(newest), Some(oldest)) = (table.first(), table.last()) {
        info!(
            "History: loaded {} row(s) from {} to {}",
            table.len(),
            oldest.timestamp.to_rfc3339(),
            newest.timestamp.to_rfc3339()
        );
    }
    HistoryView::Loaded { table, chart }
}
