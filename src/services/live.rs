//! Live view: periodic refresh of the most recent readings.
//!
//! A `LiveView` is created when the live view is activated and owns everything that
//! cycle needs: its own reading source, its presenter, the timer thread and the last
//! rendered frame. Every cycle fetches the newest `LIVE_WINDOW` rows and replaces the
//! frame wholesale, so an empty or failed fetch is shown as such instead of leaving
//! the previous frame on screen.
//!
//! Cycles run one after another on the view's thread. A cycle that takes longer
//! than the interval makes the scheduler skip the ticks it missed rather than
//! firing them back to back.

use crate::classify::{classify, SeverityBand};
use crate::client::{FetchError, ReadingSource};
use crate::models::reading::{LocalizedReading, Metric, ReadingRecord};
use crate::render::Presenter;
use crate::series::{self, TimeSeries};
use chrono_tz::Tz;
use log::{debug, error, info, warn};
use std::io;
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Rows fetched per live cycle, independent of earlier outcomes.
pub const LIVE_WINDOW: NonZeroU32 = match NonZeroU32::new(50) {
    Some(n) => n,
    None => unreachable!(),
};

/// Refresh cadence, kept within [`RefreshInterval::MIN`]..=[`RefreshInterval::MAX`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RefreshInterval(Duration);

impl RefreshInterval {
    pub const MIN: Duration = Duration::from_secs(2);
    pub const MAX: Duration = Duration::from_secs(60);

    pub fn clamped(secs: u64) -> Self {
        RefreshInterval(Duration::from_secs(secs).clamp(Self::MIN, Self::MAX))
    }

    pub fn as_duration(self) -> Duration {
        self.0
    }

    #[cfg(test)]
    pub(crate) fn unchecked(interval: Duration) -> Self {
        RefreshInterval(interval)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LiveSettings {
    pub interval: RefreshInterval,
    pub zone: Tz,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LiveSnapshot {
    pub latest: LocalizedReading,
    pub band: SeverityBand,
    /// `HH:MM:SS` of the latest reading in the display zone.
    pub updated_at: String,
    /// AQI over the live window, oldest first.
    pub trend: TimeSeries,
}

/// What the live view shows after a cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveFrame {
    Reading(LiveSnapshot),
    /// The store answered but holds no rows yet.
    NoData,
    /// The store could not be reached this cycle.
    Connecting { reason: String },
    SchemaMismatch { detail: String },
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RefreshState {
    Idle,
    Refreshing,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct LiveStats {
    /// Cycles whose frame was rendered.
    pub rendered: u64,
    /// Cycles that finished after deactivation and were thrown away.
    pub discarded: u64,
    /// Timer ticks dropped because a cycle overran them.
    pub skipped_ticks: u64,
}

/// Turn a newest-first batch into a frame.
pub fn frame_from_rows(rows: &[ReadingRecord], zone: Tz) -> LiveFrame {
    let Ok(newest) = series::latest(rows) else {
        return LiveFrame::NoData;
    };
    let trend = series::build(rows, &[Metric::Aqi], zone)
        .remove(&Metric::Aqi)
        .unwrap_or_default();
    let latest = newest.localize(zone);
    LiveFrame::Reading(LiveSnapshot {
        band: classify(newest.aqi),
        updated_at: latest.timestamp.format("%H:%M:%S").to_string(),
        latest,
        trend,
    })
}

/// One fetch + build + classify pass.
pub fn refresh_once<S: ReadingSource + ?Sized>(source: &mut S, zone: Tz) -> LiveFrame {
    match source.fetch_latest(LIVE_WINDOW) {
        Ok(rows) => frame_from_rows(&rows, zone),
        Err(FetchError::Schema(mismatch)) => LiveFrame::SchemaMismatch {
            detail: mismatch.to_string(),
        },
        Err(e) => LiveFrame::Connecting { reason: e.to_string() },
    }
}

#[derive(Default)]
struct Shared {
    active: AtomicBool,
    refreshing: AtomicBool,
    frame: Mutex<Option<LiveFrame>>,
    rendered: AtomicU64,
    discarded: AtomicU64,
    skipped_ticks: AtomicU64,
}

impl Shared {
    fn stats(&self) -> LiveStats {
        LiveStats {
            rendered: self.rendered.load(Ordering::SeqCst),
            discarded: self.discarded.load(Ordering::SeqCst),
            skipped_ticks: self.skipped_ticks.load(Ordering::SeqCst),
        }
    }
}

pub struct LiveView {
    shared: Arc<Shared>,
    stop_tx: Sender<()>,
    handle: Option<JoinHandle<()>>,
}

impl LiveView {
    /// Start refreshing immediately and then every `settings.interval`.
    pub fn activate<S, P>(source: S, presenter: P, settings: LiveSettings) -> io::Result<LiveView>
    where
        S: ReadingSource + 'static,
        P: Presenter + 'static,
    {
        let shared = Arc::new(Shared::default());
        shared.active.store(true, Ordering::SeqCst);
        let (stop_tx, stop_rx) = mpsc::channel();

        info!(
            "Live view activated: source={}, interval={}s, window={}",
            source.describe(),
            settings.interval.as_duration().as_secs_f64(),
            LIVE_WINDOW
        );

        let worker_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("live-refresh".to_string())
            .spawn(move || run_loop(source, presenter, settings, &worker_shared, stop_rx))?;

        Ok(LiveView {
            shared,
            stop_tx,
            handle: Some(handle),
        })
    }

    pub fn state(&self) -> RefreshState {
        if self.shared.refreshing.load(Ordering::SeqCst) {
            RefreshState::Refreshing
        } else {
            RefreshState::Idle
        }
    }

    /// Last rendered frame, if any cycle has rendered yet.
    pub fn current_frame(&self) -> Option<LiveFrame> {
        self.shared
            .frame
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> LiveStats {
        self.shared.stats()
    }

    /// Stop scheduling cycles without waiting. A cycle in flight finishes and is discarded.
    pub fn stop(&self) {
        // Under the frame lock so a cycle never renders after this returns.
        {
            let _frame = self.shared.frame.lock().unwrap_or_else(PoisonError::into_inner);
            self.shared.active.store(false, Ordering::SeqCst);
        }
        let _ = self.stop_tx.send(());
    }

    /// Stop and wait for the timer thread to exit.
    pub fn deactivate(mut self) -> LiveStats {
        self.stop();
        self.join_worker();
        let stats = self.shared.stats();
        info!(
            "Live view deactivated: rendered={}, discarded={}, skipped_ticks={}",
            stats.rendered, stats.discarded, stats.skipped_ticks
        );
        stats
    }

    /// Block until the view is stopped from elsewhere (or its thread dies).
    pub fn wait(mut self) -> LiveStats {
        self.join_worker();
        self.shared.stats()
    }

    fn join_worker(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            error!("Live refresh thread panicked");
        }
    }
}

impl Drop for LiveView {
    fn drop(&mut self) {
        self.stop();
        self.join_worker();
    }
}

fn run_loop<S, P>(mut source: S, mut presenter: P, settings: LiveSettings, shared: &Shared, stop_rx: Receiver<()>)
where
    S: ReadingSource,
    P: Presenter,
{
    let interval = settings.interval.as_duration();
    let mut next_tick = Instant::now();
    let mut consecutive_failures = 0u32;

    loop {
        shared.refreshing.store(true, Ordering::SeqCst);
        let frame = refresh_once(&mut source, settings.zone);
        shared.refreshing.store(false, Ordering::SeqCst);
        log_outcome(&frame, &mut consecutive_failures);

        if !render_if_active(shared, &mut presenter, frame) {
            shared.discarded.fetch_add(1, Ordering::SeqCst);
            debug!("Live view deactivated during a cycle; discarding its result");
            break;
        }

        next_tick += interval;
        let now = Instant::now();
        let mut missed = 0u64;
        while next_tick <= now {
            next_tick += interval;
            missed += 1;
        }
        if missed > 0 {
            shared.skipped_ticks.fetch_add(missed, Ordering::SeqCst);
            warn!("Refresh cycle overran its interval; skipped {} tick(s)", missed);
        }

        match stop_rx.recv_timeout(next_tick.saturating_duration_since(Instant::now())) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
}

/// Check activation and render while holding the frame lock; `false` if inactive.
fn render_if_active<P: Presenter>(shared: &Shared, presenter: &mut P, frame: LiveFrame) -> bool {
    let mut current = shared.frame.lock().unwrap_or_else(PoisonError::into_inner);
    if !shared.active.load(Ordering::SeqCst) {
        return false;
    }
    if let Err(e) = presenter.present_live(&frame) {
        warn!("Rendering live frame failed: {}", e);
    }
    *current = Some(frame);
    shared.rendered.fetch_add(1, Ordering::SeqCst);
    true
}

fn log_outcome(frame: &LiveFrame, consecutive_failures: &mut u32) {
    match frame {
        LiveFrame::Reading(snapshot) => {
            if *consecutive_failures > 0 {
                info!("Store reachable again after {} failed cycle(s)", consecutive_failures);
            }
            *consecutive_failures = 0;
            debug!(
                "Live cycle: latest id={} aqi={} ({}), {} point(s)",
                snapshot.latest.id,
                snapshot.latest.aqi,
                snapshot.band.label(),
                snapshot.trend.len()
            );
        }
        LiveFrame::NoData => {
            *consecutive_failures = 0;
            debug!("Live cycle: store returned no rows");
        }
        LiveFrame::Connecting { reason } => {
            *consecutive_failures += 1;
            if *consecutive_failures <= 3 {
                warn!("Live cycle failed: {} (attempt {})", reason, consecutive_failures);
            } else {
                debug!("Live cycle failed: {} (attempt {})", reason, consecutive_failures);
            }
        }
        LiveFrame::SchemaMismatch { detail } => {
            error!("Live cycle rejected malformed rows: {}", detail);
        }
    }
}
