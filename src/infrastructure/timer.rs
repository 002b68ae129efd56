//! Pausable call duration timer
//!
//! Counts whole seconds spent connected. The counter only moves on its own
//! tick; `pause` freezes it and `reset` is the only way back to zero. The
//! part of a period already run when pausing is carried into the next run,
//! so short stretches between holds still add up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::debug;

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// A live ticker and the point its first period is counted from
struct Run {
    ticker: JoinHandle<()>,
    anchor: Instant,
    base: u64,
}

pub struct DurationTimer {
    period: Duration,
    elapsed: Arc<watch::Sender<u64>>,
    /// Bumped whenever the current ticker is retired
    epoch: Arc<AtomicU64>,
    run: Option<Run>,
    /// Unfinished part of a period left over from the last run
    carry: Duration,
}

impl DurationTimer {
    pub fn new(period: Duration) -> Self {
        let (tx, _) = watch::channel(0);
        Self {
            period,
            elapsed: Arc::new(tx),
            epoch: Arc::new(AtomicU64::new(0)),
            run: None,
            carry: Duration::ZERO,
        }
    }

    /// Begin ticking; no-op while already running
    pub fn start(&mut self) {
        if self.run.is_some() {
            return;
        }
        debug!("Duration timer started at {}s", self.elapsed());
        self.spawn_ticker();
    }

    /// Stop ticking, keep the counter
    pub fn pause(&mut self) {
        if self.stop_ticker() {
            debug!(
                "Duration timer paused at {}s (+{}ms carried)",
                self.elapsed(),
                self.carry.as_millis()
            );
        }
    }

    /// Continue from the current counter value
    pub fn resume(&mut self) {
        if self.run.is_some() {
            return;
        }
        debug!("Duration timer resumed at {}s", self.elapsed());
        self.spawn_ticker();
    }

    /// Stop ticking and zero the counter
    pub fn reset(&mut self) {
        self.stop_ticker();
        self.carry = Duration::ZERO;
        self.elapsed.send_replace(0);
    }

    pub fn elapsed(&self) -> u64 {
        *self.elapsed.borrow()
    }

    pub fn is_running(&self) -> bool {
        self.run.is_some()
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.elapsed.subscribe()
    }

    fn spawn_ticker(&mut self) {
        let now = Instant::now();
        let anchor = now.checked_sub(self.carry).unwrap_or(now);
        let base = self.elapsed();

        let elapsed = Arc::clone(&self.elapsed);
        let epoch = Arc::clone(&self.epoch);
        let mine = epoch.load(Ordering::SeqCst);
        let period = self.period;

        let ticker = tokio::spawn(async move {
            let mut interval = interval_at(anchor + period, period);
            loop {
                interval.tick().await;
                // A retired ticker must never move the counter, even if the
                // abort races with this tick on another worker.
                let live = elapsed.send_if_modified(|secs| {
                    if epoch.load(Ordering::SeqCst) != mine {
                        return false;
                    }
                    *secs += 1;
                    true
                });
                if !live {
                    break;
                }
            }
        });

        self.run = Some(Run {
            ticker,
            anchor,
            base,
        });
    }

    /// Retire the ticker and settle the counter from the clock
    fn stop_ticker(&mut self) -> bool {
        let Some(run) = self.run.take() else {
            return false;
        };
        self.epoch.fetch_add(1, Ordering::SeqCst);
        run.ticker.abort();

        let ran = Instant::now().saturating_duration_since(run.anchor).as_nanos();
        let period = self.period.as_nanos().max(1);
        let whole = (ran / period) as u64;
        self.carry = Duration::from_nanos((ran % period) as u64);

        // Ticks the ticker had not processed yet still count
        let settled = run.base + whole;
        self.elapsed.send_if_modified(|secs| {
            if *secs == settled {
                return false;
            }
            *secs = settled;
            true
        });
        true
    }
}

impl Default for DurationTimer {
    fn default() -> Self {
        Self::new(DEFAULT_TICK)
    }
}

impl Drop for DurationTimer {
    fn drop(&mut self) {
        self.stop_ticker();
    }
}

/// `m:ss`, or `h:mm:ss` from one hour on
pub fn format_duration(seconds: u64) -> String {
    let h = seconds / 3600;
    let m = (seconds % 3600) / 60;
    let s = seconds % 60;
    if h > 0 {
        format!("{}:{:02}:{:02}", h, m, s)
    } else {
        format!("{}:{:02}", m, s)
    }
}
