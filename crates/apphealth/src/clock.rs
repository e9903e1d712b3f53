//! Time source for the event loop.
//!
//! The monitor never reads the wall clock directly. [`TokioClock`] is the
//! production source; [`ManualClock`] lets tests fire ticks by hand.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

/// Source of the current time and of periodic tickers.
pub trait Clock: Send + Sync + 'static {
    fn now(&self) -> Instant;

    /// A ticker whose first tick fires one `period` from now.
    ///
    /// `period` must be non-zero.
    fn ticker(&self, period: Duration) -> Ticker;
}

/// Periodic tick source. Dropping it stops the ticker.
pub struct Ticker {
    inner: TickerInner,
}

enum TickerInner {
    Interval(tokio::time::Interval),
    Manual(mpsc::Receiver<Instant>),
}

impl Ticker {
    /// Wait for the next tick. Cancel safe.
    pub async fn tick(&mut self) -> Instant {
        match &mut self.inner {
            TickerInner::Interval(interval) => interval.tick().await.into_std(),
            TickerInner::Manual(rx) => match rx.recv().await {
                Some(at) => at,
                // Clock dropped; no more ticks will ever arrive.
                None => std::future::pending().await,
            },
        }
    }
}

impl std::fmt::Debug for Ticker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self.inner {
            TickerInner::Interval(_) => "interval",
            TickerInner::Manual(_) => "manual",
        };
        f.debug_struct("Ticker").field("kind", &kind).finish()
    }
}

/// Clock backed by the tokio timer. Honors `tokio::time::pause`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    fn ticker(&self, period: Duration) -> Ticker {
        let start = tokio::time::Instant::now() + period;
        let mut interval = tokio::time::interval_at(start, period);
        // A slow consumer gets one late tick, not a burst.
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Ticker {
            inner: TickerInner::Interval(interval),
        }
    }
}

/// Hand-driven clock for tests.
///
/// Time only moves on [`ManualClock::advance`]. Each ticker buffers at most
/// one undelivered tick; further due ticks are dropped until it is read.
#[derive(Debug, Clone)]
pub struct ManualClock {
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug)]
struct ManualState {
    now: Instant,
    tickers: Vec<ManualTicker>,
}

#[derive(Debug)]
struct ManualTicker {
    period: Duration,
    next: Instant,
    tx: mpsc::Sender<Instant>,
}

impl ManualClock {
    /// Clock frozen at the current instant with no tickers.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ManualState {
                now: Instant::now(),
                tickers: Vec::new(),
            })),
        }
    }

    /// Move time forward and fire every ticker that came due.
    pub fn advance(&self, by: Duration) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.now += by;
        let now = state.now;
        state.tickers.retain(|t| !t.tx.is_closed());
        for ticker in &mut state.tickers {
            while ticker.next <= now {
                let _ = ticker.tx.try_send(ticker.next);
                ticker.next += ticker.period;
            }
        }
    }

    /// Number of tickers that have not been dropped.
    pub fn ticker_count(&self) -> usize {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.tickers.iter().filter(|t| !t.tx.is_closed()).count()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.state.lock().unwrap_or_else(PoisonError::into_inner).now
    }

    fn ticker(&self, period: Duration) -> Ticker {
        assert!(!period.is_zero(), "ticker period must be non-zero");
        let (tx, rx) = mpsc::channel(1);
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let next = state.now + period;
        state.tickers.push(ManualTicker { period, next, tx });
        Ticker {
            inner: TickerInner::Manual(rx),
        }
    }
}
