//! Presentation side of the pipeline.
//!
//! `Presenter` is what the views hand their output to. `TerminalPresenter` is a
//! text implementation: metrics, the AQI scale bar, sparkline charts and the
//! historical data log. Band colours are drawn with ANSI truecolor unless disabled.

use crate::classify::SeverityBand;
use crate::models::reading::Metric;
use crate::series::TimeSeries;
use crate::services::history::HistoryView;
use crate::services::live::{LiveFrame, LiveSnapshot};
use owo_colors::OwoColorize;
use std::io::{self, IsTerminal, Write};

pub trait Presenter: Send {
    fn present_live(&mut self, frame: &LiveFrame) -> io::Result<()>;
    fn present_history(&mut self, view: &HistoryView) -> io::Result<()>;
    fn present_forecast(&mut self) -> io::Result<()>;
}

const SEGMENT_WIDTH: usize = 11;
const LIVE_CHART_WIDTH: usize = 50;
const HISTORY_CHART_WIDTH: usize = 72;
const SPARK_LEVELS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

pub struct TerminalPresenter<W: Write + Send> {
    out: W,
    no_color: bool,
}

impl TerminalPresenter<io::Stdout> {
    /// Colours on when stdout is a terminal and `NO_COLOR` is unset.
    pub fn stdout() -> Self {
        let out = io::stdout();
        let no_color = !out.is_terminal() || std::env::var_os("NO_COLOR").is_some();
        TerminalPresenter { out, no_color }
    }
}

impl<W: Write + Send> TerminalPresenter<W> {
    /// Plain output without escape codes.
    pub fn new(out: W) -> Self {
        TerminalPresenter { out, no_color: true }
    }

    pub fn with_color(mut self, enabled: bool) -> Self {
        self.no_color = !enabled;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn live_snapshot(&mut self, snapshot: &LiveSnapshot) -> io::Result<()> {
        let latest = &snapshot.latest;
        writeln!(
            self.out,
            "AQI Level: {}   Temperature: {} °C   Humidity: {} %",
            latest.aqi, latest.temperature, latest.humidity
        )?;
        writeln!(self.out, "Last Updated: {}", snapshot.updated_at)?;
        writeln!(
            self.out,
            "Current Status: {} ({})",
            format_band_colored(snapshot.band.label(), snapshot.band, self.no_color),
            snapshot.band.color()
        )?;
        for line in scale_bar(snapshot.band, self.no_color) {
            writeln!(self.out, "{}", line)?;
        }
        let value = format!("{} AQI", latest.aqi);
        writeln!(self.out, "{}", format_band_colored(&value, snapshot.band, self.no_color))?;
        writeln!(self.out)?;
        writeln!(self.out, "Live Trend")?;
        writeln!(self.out, "{}", render_series(Metric::Aqi, &snapshot.trend, LIVE_CHART_WIDTH))
    }
}

impl<W: Write + Send> Presenter for TerminalPresenter<W> {
    fn present_live(&mut self, frame: &LiveFrame) -> io::Result<()> {
        writeln!(self.out, "== Live AQI Monitoring ==")?;
        match frame {
            LiveFrame::Reading(snapshot) => self.live_snapshot(snapshot)?,
            LiveFrame::NoData => writeln!(self.out, "No data yet.")?,
            LiveFrame::Connecting { reason } => writeln!(self.out, "Connecting to cloud... ({})", reason)?,
            LiveFrame::SchemaMismatch { detail } => {
                writeln!(self.out, "Received readings in an unexpected format: {}", detail)?
            }
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    fn present_history(&mut self, view: &HistoryView) -> io::Result<()> {
        writeln!(self.out, "== Historical Data ==")?;
        match view {
            HistoryView::NoData => writeln!(self.out, "No data found.")?,
            HistoryView::Unavailable { reason } => writeln!(self.out, "History unavailable: {}", reason)?,
            HistoryView::Loaded { table, chart } => {
                writeln!(self.out, "Full History Trends")?;
                for (metric, series) in chart {
                    writeln!(self.out, "{}", render_series(*metric, series, HISTORY_CHART_WIDTH))?;
                }
                writeln!(self.out)?;
                writeln!(self.out, "Data Log (Newest First)")?;
                writeln!(
                    self.out,
                    "{:>8}  {:<25}  {:>8}  {:>11}  {:>8}  {:>5}",
                    "id", "Timestamp", "MQ135", "Temperature", "Humidity", "AQI"
                )?;
                for row in table {
                    writeln!(
                        self.out,
                        "{:>8}  {:<25}  {:>8.1}  {:>11.1}  {:>8.1}  {:>5}",
                        row.id,
                        row.timestamp.format("%Y-%m-%d %H:%M:%S%:z").to_string(),
                        row.mq135,
                        row.temperature,
                        row.humidity,
                        row.aqi
                    )?;
                }
            }
        }
        writeln!(self.out)?;
        self.out.flush()
    }

    fn present_forecast(&mut self) -> io::Result<()> {
        writeln!(self.out, "== Future AQI Forecasting ==")?;
        writeln!(self.out, "Model training in progress...")?;
        writeln!(self.out)?;
        self.out.flush()
    }
}

/// Text in the band's colour.
pub fn format_band_colored(text: &str, band: SeverityBand, no_color: bool) -> String {
    if no_color {
        return text.to_string();
    }
    let (r, g, b) = band.rgb();
    format!("{}", text.truecolor(r, g, b).bold())
}

/// Text on a background of the band's colour, dark or light for contrast.
fn format_band_filled(text: &str, band: SeverityBand) -> String {
    let (r, g, b) = band.rgb();
    if band.needs_dark_text() {
        format!("{}", text.on_truecolor(r, g, b).black())
    } else {
        format!("{}", text.on_truecolor(r, g, b).white())
    }
}

/// Segment row, tick row and a marker under the active band.
pub fn scale_bar(active: SeverityBand, no_color: bool) -> [String; 3] {
    let segments: String = SeverityBand::ALL
        .iter()
        .map(|&band| {
            let segment = format!("[{:^width$}]", band.scale_label(), width = SEGMENT_WIDTH - 2);
            if band == active && !no_color {
                format_band_filled(&segment, band)
            } else {
                segment
            }
        })
        .collect();
    let ticks: String = SeverityBand::SCALE_TICKS
        .iter()
        .map(|tick| format!("{:<width$}", tick, width = SEGMENT_WIDTH))
        .collect();
    let position = SeverityBand::ALL.iter().position(|b| *b == active).unwrap_or(0);
    let marker = format!("{}{}", " ".repeat(position * SEGMENT_WIDTH), "^".repeat(SEGMENT_WIDTH));
    [segments, ticks.trim_end().to_string(), marker]
}

/// One-line chart: sparkline plus range and time span.
pub fn render_series(metric: Metric, series: &TimeSeries, width: usize) -> String {
    let label = format!("{:<12}", metric.display_name());
    let (Some(first), Some(last), Some((lo, hi))) = (series.first(), series.last(), series.value_range()) else {
        return format!("{}(no points)", label);
    };
    let values: Vec<f64> = series.points().iter().map(|p| p.value).collect();
    format!(
        "{}{}  min {:.1}{unit} max {:.1}{unit}  {} → {} ({} points)",
        label,
        sparkline(&values, width),
        lo,
        hi,
        first.timestamp.format(TIME_FORMAT),
        last.timestamp.format(TIME_FORMAT),
        series.len(),
        unit = metric.unit()
    )
}

/// Map values onto eight block heights, averaging into `width` buckets when longer.
pub fn sparkline(values: &[f64], width: usize) -> String {
    if values.is_empty() || width == 0 {
        return String::new();
    }
    let buckets: Vec<f64> = if values.len() <= width {
        values.to_vec()
    } else {
        (0..width)
            .map(|i| {
                let start = i * values.len() / width;
                let end = ((i + 1) * values.len() / width).max(start + 1);
                let chunk = &values[start..end];
                chunk.iter().sum::<f64>() / chunk.len() as f64
            })
            .collect()
    };

    let finite = buckets.iter().copied().filter(|v| v.is_finite());
    let lo = finite.clone().fold(f64::INFINITY, f64::min);
    let hi = finite.fold(f64::NEG_INFINITY, f64::max);
    let top = SPARK_LEVELS.len() - 1;

    buckets
        .iter()
        .map(|v| {
            if !v.is_finite() {
                ' '
            } else if hi - lo <= f64::EPSILON {
                SPARK_LEVELS[top / 2]
            } else {
                let level = ((v - lo) / (hi - lo) * top as f64).round() as usize;
                SPARK_LEVELS[level.min(top)]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::reading::ReadingRecord;
    use crate::series;
    use crate::services::live::frame_from_rows;
    use chrono::{Duration, TimeZone, Utc};
    use chrono_tz::Tz;

    fn zone() -> Tz {
        chrono_tz::Asia::Kolkata
    }

    fn rows() -> Vec<ReadingRecord> {
        let base = Utc.with_ymd_and_hms(2025, 1, 14, 9, 0, 0).unwrap();
        (1..=4)
            .rev()
            .map(|id| ReadingRecord {
                id,
                timestamp: base + Duration::seconds(2 * id),
                mq135: 200.0,
                temperature: 27.3,
                humidity: 58.1,
                aqi: 30 * id,
            })
            .collect()
    }

    fn output(f: impl FnOnce(&mut TerminalPresenter<Vec<u8>>) -> io::Result<()>) -> String {
        let mut presenter = TerminalPresenter::new(Vec::new());
        f(&mut presenter).unwrap();
        String::from_utf8(presenter.into_inner()).unwrap()
    }

    #[test]
    fn sparkline_scales_between_extremes() {
        assert_eq!(sparkline(&[1.0, 2.0, 3.0], 10), "▁▅█");
        assert_eq!(sparkline(&[5.0, 5.0], 10), "▄▄");
        assert_eq!(sparkline(&[], 10), "");
        assert_eq!(sparkline(&(0..1000).map(f64::from).collect::<Vec<_>>(), 20).chars().count(), 20);
    }

    #[test]
    fn scale_bar_marks_active_band() {
        let [segments, ticks, marker] = scale_bar(SeverityBand::Unhealthy, true);
        assert!(segments.contains("Severe"));
        assert!(!segments.contains('\x1b'));
        assert!(ticks.starts_with("0 "));
        assert!(ticks.ends_with("301+"));
        assert_eq!(marker.find('^'), Some(3 * SEGMENT_WIDTH));
    }

    #[test]
    fn active_segment_is_filled_with_band_color() {
        let [segments, _, _] = scale_bar(SeverityBand::Unhealthy, false);
        assert_eq!(segments.matches("\x1b[48;2;").count(), 1);
        assert!(segments.contains("\x1b[48;2;255;0;0m"));
        assert!(!segments.contains("\x1b[30m"));

        let [segments, _, _] = scale_bar(SeverityBand::Moderate, false);
        assert!(segments.contains("\x1b[48;2;255;255;0m"));
        assert!(segments.contains("\x1b[30m"));
    }

    #[test]
    fn colored_live_frame_paints_aqi_value() {
        let frame = frame_from_rows(&rows(), zone());
        let mut presenter = TerminalPresenter::new(Vec::new()).with_color(true);
        presenter.present_live(&frame).unwrap();
        let text = String::from_utf8(presenter.into_inner()).unwrap();
        let value_line = text.lines().find(|l| l.contains("120 AQI")).unwrap();
        assert!(value_line.contains("\x1b[38;2;255;126;0m"), "{value_line:?}");
        assert_eq!(format_band_colored("Good", SeverityBand::Good, true), "Good");
    }

    #[test]
    fn live_reading_output() {
        let frame = frame_from_rows(&rows(), zone());
        let text = output(|p| p.present_live(&frame));
        assert!(text.contains("AQI Level: 120"));
        assert!(text.contains("Current Status: Unhealthy (Sens.) (#ff7e00)"));
        assert!(text.contains("Last Updated: 14:30:08"));
        assert!(text.contains("(4 points)"));
    }

    #[test]
    fn live_empty_and_failure_output() {
        assert!(output(|p| p.present_live(&LiveFrame::NoData)).contains("No data yet."));
        let text = output(|p| {
            p.present_live(&LiveFrame::Connecting {
                reason: "timed out".into(),
            })
        });
        assert!(text.contains("Connecting to cloud... (timed out)"));
    }

    #[test]
    fn history_output_lists_rows_newest_first() {
        let rows = rows();
        let view = HistoryView::Loaded {
            table: rows.iter().map(|r| r.localize(zone())).collect(),
            chart: series::build(&rows, &crate::services::history::HISTORY_METRICS, zone()),
        };
        let text = output(|p| p.present_history(&view));
        let log = text.split("Data Log (Newest First)").nth(1).unwrap();
        let first_row = log.lines().nth(2).unwrap();
        assert!(first_row.trim_start().starts_with("4 "), "{first_row}");
        assert!(first_row.contains("+05:30"));
        assert!(text.contains("Temperature"));
        assert!(text.contains("Humidity"));
    }

    #[test]
    fn history_no_data_and_unavailable_differ() {
        assert!(output(|p| p.present_history(&HistoryView::NoData)).contains("No data found."));
        let text = output(|p| {
            p.present_history(&HistoryView::Unavailable {
                reason: "http 503".into(),
            })
        });
        assert!(text.contains("History unavailable: http 503"));
    }

    #[test]
    fn forecast_placeholder() {
        assert!(output(|p| p.present_forecast()).contains("Model training in progress..."));
    }
}
