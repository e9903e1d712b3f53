//! Probe executor.
//!
//! Wraps the external probe function with the configured timeout. The
//! probe contract: an unreachable or failing app is an unhealthy
//! [`Status`] with `Ok`; `Err` is reserved for faults of the probing
//! mechanism itself.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::error;

use crate::BoxFuture;
use crate::status::Status;

/// Function that performs a single health probe.
pub type ProbeFunction =
    Arc<dyn Fn(CancellationToken) -> BoxFuture<anyhow::Result<Status>> + Send + Sync>;

/// Box an async closure into a [`ProbeFunction`].
pub fn probe_fn<F, Fut>(f: F) -> ProbeFunction
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<Status>> + Send + 'static,
{
    Arc::new(
        move |token: CancellationToken| -> BoxFuture<anyhow::Result<Status>> {
            Box::pin(f(token))
        },
    )
}

/// What a single probe run produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ProbeOutcome {
    /// The probe reported on the app (a timeout counts as unhealthy).
    Reported(Status),
    /// The probe mechanism failed; carries the synthesized unhealthy status.
    Faulted(Status),
    /// The monitor shut down mid-probe; nothing to record.
    Cancelled,
}

pub(crate) struct ProbeExecutor {
    probe: ProbeFunction,
    timeout: Duration,
}

impl ProbeExecutor {
    pub(crate) fn new(probe: ProbeFunction, timeout: Duration) -> Self {
        Self { probe, timeout }
    }

    /// Run one probe bounded by the timeout and by `parent` cancellation.
    pub(crate) async fn execute(&self, parent: &CancellationToken) -> ProbeOutcome {
        let token = parent.child_token();
        // Cancel the probe's token however we leave this function.
        let _guard = token.clone().drop_guard();

        let probe = tokio::time::timeout(self.timeout, (self.probe)(token));
        let result = tokio::select! {
            _ = parent.cancelled() => return ProbeOutcome::Cancelled,
            result = probe => result,
        };

        match result {
            Ok(Ok(status)) => ProbeOutcome::Reported(status),
            Ok(Err(e)) => {
                let detail = format!("{e:#}");
                error!(error = %detail, "app health probe could not complete");
                ProbeOutcome::Faulted(Status::unhealthy(format!("probe error: {detail}")))
            }
            Err(_) => ProbeOutcome::Reported(Status::unhealthy(format!(
                "probe timed out after {:?}",
                self.timeout
            ))),
        }
    }
}
