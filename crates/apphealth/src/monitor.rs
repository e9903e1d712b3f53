//! App health monitor — event loop and lifecycle.
//!
//! A single background task owns all derived health state. It arbitrates
//! between four sources, one per iteration, first-ready wins:
//!
//! - cancellation (caller token or [`AppHealth::close`]) stops the loop;
//! - a passive report is applied to the transition logic;
//! - a ticker tick requests a probe via the single-slot queue;
//! - a pending probe request runs the probe inline, so probes never overlap.
//!
//! Readers ([`AppHealth::get_status`]) and producers ([`AppHealth::enqueue`],
//! [`AppHealth::report_health`]) never block: the counter is atomic and both
//! mailboxes are single-slot, drop-on-full.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span, debug, info, info_span, warn};

use crate::clock::{Clock, Ticker, TokioClock};
use crate::config::AppHealthConfig;
use crate::counter::{FailureCounter, Transition};
use crate::error::{HealthError, HealthResult};
use crate::notifier::{ChangeCallback, ChangeNotifier, change_callback};
use crate::probe::{ProbeExecutor, ProbeFunction, ProbeOutcome};
use crate::status::Status;

/// `last_report` value before any result has been accepted.
const NEVER: u64 = u64::MAX;

/// State read from outside the loop.
struct Shared {
    counter: FailureCounter,
    /// Microseconds since `AppHealth::epoch` of the last accepted result.
    last_report: AtomicU64,
}

/// Receiving halves of the two mailboxes, handed to the loop on start.
struct Mailboxes {
    reports: mpsc::Receiver<Status>,
    queue: mpsc::Receiver<()>,
}

/// Debounced health monitor for one app.
///
/// Starts unhealthy. Share it behind an `Arc` once started; only
/// [`AppHealth::on_health_change`] and the builder methods need `&mut`.
pub struct AppHealth {
    config: AppHealthConfig,
    probe: Option<ProbeFunction>,
    change_cb: Option<ChangeCallback>,
    clock: Arc<dyn Clock>,
    epoch: Instant,
    span: Span,
    shared: Arc<Shared>,
    report_tx: mpsc::Sender<Status>,
    queue_tx: mpsc::Sender<()>,
    /// `None` once the loop has been started.
    mailboxes: Mutex<Option<Mailboxes>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl AppHealth {
    /// Create a monitor. A missing probe function is reported by `start`.
    pub fn new(config: AppHealthConfig, probe: Option<ProbeFunction>) -> Self {
        let (report_tx, reports) = mpsc::channel(1);
        let (queue_tx, queue) = mpsc::channel(1);
        let clock: Arc<dyn Clock> = Arc::new(TokioClock);
        let epoch = clock.now();

        Self {
            shared: Arc::new(Shared {
                counter: FailureCounter::new(config.threshold),
                last_report: AtomicU64::new(NEVER),
            }),
            config,
            probe,
            change_cb: None,
            clock,
            epoch,
            span: info_span!("apphealth"),
            report_tx,
            queue_tx,
            mailboxes: Mutex::new(Some(Mailboxes { reports, queue })),
            tasks: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the time source. Must be called before `start`.
    pub fn with_clock(mut self, clock: impl Clock) -> Self {
        self.epoch = clock.now();
        self.clock = Arc::new(clock);
        self
    }

    /// Span every background task of this monitor runs in.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Set the transition callback, replacing any previous one.
    ///
    /// The callback is captured when probing starts; later calls do not
    /// affect a running loop. Invocations are independent tasks and may
    /// observe transitions out of order.
    pub fn on_health_change<F, Fut>(&mut self, cb: F)
    where
        F: Fn(CancellationToken, Status) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.change_cb = Some(change_callback(cb));
    }

    /// Validate the configuration and start the event loop.
    ///
    /// The loop stops when `ctx` is cancelled or on [`AppHealth::close`].
    /// Must be called from within a tokio runtime.
    pub fn start(&self, ctx: &CancellationToken) -> HealthResult<()> {
        let mut slot = self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner);

        if self.closed.load(Ordering::SeqCst) {
            return Err(HealthError::Closed);
        }
        if slot.is_none() {
            return Err(HealthError::AlreadyStarted);
        }
        let probe = self.probe.clone().ok_or(HealthError::MissingProbe)?;
        self.config.validate()?;
        let Some(mailboxes) = slot.take() else {
            return Err(HealthError::AlreadyStarted);
        };

        let _enter = self.span.enter();
        info!(
            interval = ?self.config.probe_interval,
            timeout = ?self.config.probe_timeout,
            threshold = self.config.threshold,
            probe_only = self.config.probe_only,
            "app health probes starting"
        );

        let token = ctx.child_token();

        // Link the internal shutdown signal to the loop token.
        let shutdown = self.shutdown.clone();
        let loop_token = token.clone();
        self.tasks.spawn(
            async move {
                tokio::select! {
                    _ = shutdown.cancelled() => {}
                    _ = loop_token.cancelled() => {}
                }
                loop_token.cancel();
            }
            .instrument(self.span.clone()),
        );

        let ticker = self.clock.ticker(self.config.probe_interval);
        let event_loop = EventLoop {
            shared: self.shared.clone(),
            clock: self.clock.clone(),
            epoch: self.epoch,
            notifier: ChangeNotifier::new(
                self.change_cb.clone(),
                self.tasks.clone(),
                self.span.clone(),
            ),
            executor: ProbeExecutor::new(probe, self.config.probe_timeout),
            queue_tx: self.queue_tx.clone(),
            token,
        };
        self.tasks
            .spawn(event_loop.run(ticker, mailboxes).instrument(self.span.clone()));

        Ok(())
    }

    /// Request an out-of-band probe.
    ///
    /// At most one request is pending at a time; extra requests are dropped.
    pub fn enqueue(&self) {
        enqueue(&self.queue_tx);
    }

    /// Passive health signal pushed by the app.
    ///
    /// Ignored in probe-only mode. If an earlier report has not been read
    /// by the loop yet, this one is dropped.
    pub fn report_health(&self, status: Status) {
        if self.config.probe_only {
            return;
        }
        let _ = self.report_tx.try_send(status);
    }

    /// Current debounced status. Never blocks.
    pub fn get_status(&self) -> Status {
        let failures = self.shared.counter.count();
        if failures >= self.config.threshold {
            return Status::unhealthy(format!("app health check failed {failures} times"));
        }
        Status::healthy()
    }

    /// Consecutive unhealthy results seen so far.
    pub fn failure_count(&self) -> u32 {
        self.shared.counter.count()
    }

    /// When the most recent result was accepted, if any.
    pub fn last_report(&self) -> Option<Instant> {
        let micros = self.shared.last_report.load(Ordering::SeqCst);
        (micros != NEVER).then(|| self.epoch + Duration::from_micros(micros))
    }

    /// Whether `close` has been called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Stop probing and wait for the loop and every pending callback.
    ///
    /// Idempotent and safe to call concurrently; every caller returns only
    /// once the monitor is quiescent. Never fails.
    pub async fn close(&self) -> HealthResult<()> {
        {
            let _guard = self.mailboxes.lock().unwrap_or_else(PoisonError::into_inner);
            if self
                .closed
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                self.shutdown.cancel();
                self.tasks.close();
            }
        }
        self.tasks.wait().await;
        Ok(())
    }
}

impl Drop for AppHealth {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn enqueue(queue: &mpsc::Sender<()>) {
    let _ = queue.try_send(());
}

/// Sole mutator of derived health state while probing is running.
struct EventLoop {
    shared: Arc<Shared>,
    clock: Arc<dyn Clock>,
    epoch: Instant,
    notifier: ChangeNotifier,
    executor: ProbeExecutor,
    queue_tx: mpsc::Sender<()>,
    token: CancellationToken,
}

impl EventLoop {
    async fn run(self, mut ticker: Ticker, mut mailboxes: Mailboxes) {
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                Some(status) = mailboxes.reports.recv() => {
                    debug!("received health status report");
                    self.set_result(status);
                }
                _ = ticker.tick() => {
                    debug!("probing app health");
                    enqueue(&self.queue_tx);
                }
                Some(()) = mailboxes.queue.recv() => {
                    // Inline on purpose: the loop is blocked while probing.
                    self.probe().await;
                }
            }
        }
        drop(ticker);
        info!("app health probes stopping");
    }

    async fn probe(&self) {
        match self.executor.execute(&self.token).await {
            ProbeOutcome::Faulted(status) => self.set_result(status),
            ProbeOutcome::Reported(status) => {
                if self.shared.counter.is_healthy() != status.is_healthy {
                    debug!(
                        healthy = status.is_healthy,
                        "app health probe detected status change"
                    );
                    self.set_result(status);
                } else {
                    debug!(healthy = status.is_healthy, "app health probe status is unchanged");
                }
            }
            ProbeOutcome::Cancelled => debug!("app health probe abandoned on shutdown"),
        }
    }

    fn set_result(&self, status: Status) {
        let elapsed = self.clock.now().saturating_duration_since(self.epoch);
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(NEVER - 1);
        self.shared.last_report.store(micros, Ordering::SeqCst);

        match self.shared.counter.record(status.is_healthy) {
            Some(Transition::BecameHealthy) => {
                info!("app entered healthy status");
                self.notifier.notify(&self.token, status);
            }
            Some(Transition::BecameUnhealthy) => {
                match &status.reason {
                    Some(reason) => warn!(%reason, "app entered unhealthy status"),
                    None => warn!("app entered unhealthy status"),
                }
                self.notifier.notify(&self.token, status);
            }
            None => {}
        }
    }
}
