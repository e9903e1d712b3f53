//! Transition callback dispatch.
//!
//! Each transition runs the callback in its own tracked task so a slow
//! observer never stalls probing. Tasks are independent of one another:
//! under rapid flapping the callback may observe transitions out of
//! chronological order and must not assume strict ordering across calls.

use std::future::Future;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span};

use crate::BoxFuture;
use crate::status::Status;

/// Callback invoked when the app becomes healthy or unhealthy.
///
/// The token is cancelled once the monitor shuts down.
pub type ChangeCallback = Arc<dyn Fn(CancellationToken, Status) -> BoxFuture<()> + Send + Sync>;

/// Box an async closure into a [`ChangeCallback`].
pub fn change_callback<F, Fut>(f: F) -> ChangeCallback
where
    F: Fn(CancellationToken, Status) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(
        move |token: CancellationToken, status: Status| -> BoxFuture<()> {
            Box::pin(f(token, status))
        },
    )
}

/// Spawns callback invocations on a shared [`TaskTracker`].
pub(crate) struct ChangeNotifier {
    callback: Option<ChangeCallback>,
    tasks: TaskTracker,
    span: Span,
}

impl ChangeNotifier {
    pub(crate) fn new(callback: Option<ChangeCallback>, tasks: TaskTracker, span: Span) -> Self {
        Self {
            callback,
            tasks,
            span,
        }
    }

    pub(crate) fn notify(&self, token: &CancellationToken, status: Status) {
        let Some(cb) = self.callback.clone() else {
            return;
        };
        let token = token.clone();
        self.tasks
            .spawn(async move { cb(token, status).await }.instrument(self.span.clone()));
    }
}
