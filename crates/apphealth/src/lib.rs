//! apphealth — debounced health monitoring for a managed app.
//!
//! Combines active probes issued on an interval with passive status
//! reports pushed by the app itself, and converts the raw outcomes into
//! a hysteresis-filtered healthy/unhealthy signal. Interested parties
//! are notified once per transition, not once per check.
//!
//! # Architecture
//!
//! ```text
//! AppHealth
//!   ├── Event loop task (sole owner of derived state)
//!   │   ├── Ticker tick        → enqueue()
//!   │   ├── Probe request slot → ProbeExecutor (inline, serialized)
//!   │   ├── Report slot        → transition logic
//!   │   └── Cancellation       → stop ticker, exit
//!   ├── FailureCounter (lock-free hysteresis)
//!   └── ChangeNotifier (tracked per-transition callback tasks)
//! ```
//!
//! # Hysteresis
//!
//! The monitor starts unhealthy (`failure_count == threshold`). A single
//! healthy result resets the counter; `threshold` consecutive unhealthy
//! results are needed to go back to unhealthy. The "became unhealthy"
//! notification fires only on the result that lands exactly on the
//! threshold.

pub mod clock;
pub mod config;
pub mod counter;
pub mod error;
pub mod http;
pub mod monitor;
pub mod notifier;
pub mod probe;
pub mod status;

pub use clock::{Clock, ManualClock, Ticker, TokioClock};
pub use config::{AppHealthConfig, parse_duration};
pub use counter::{FailureCounter, Transition};
pub use error::{ConfigError, HealthError, HealthResult};
pub use http::http_probe;
pub use monitor::AppHealth;
pub use notifier::{ChangeCallback, change_callback};
pub use probe::{ProbeFunction, probe_fn};
pub use status::Status;

/// Cancellation handle passed to probes and callbacks.
pub use tokio_util::sync::CancellationToken;

/// Boxed future returned by probe functions and change callbacks.
pub type BoxFuture<T> = std::pin::Pin<Box<dyn std::future::Future<Output = T> + Send>>;
