//! End-to-end tests for the app health monitor.
//!
//! - Scheduled probes crossing the threshold in both directions
//! - Timer-driven scenario under paused tokio time
//! - HTTP probe against a local listener

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use apphealth::{AppHealth, AppHealthConfig, CancellationToken, Status, http_probe, probe_fn};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::Instant;

fn scripted(script: Vec<Status>) -> apphealth::ProbeFunction {
    let script = Arc::new(Mutex::new(VecDeque::from(script)));
    probe_fn(move |_| {
        let next = script.lock().unwrap().pop_front().unwrap_or_else(Status::healthy);
        async move { Ok(next) }
    })
}

// ── Threshold 2, 10ms interval, 5ms timeout ────────────────────────

#[tokio::test(start_paused = true)]
async fn transitions_follow_scheduled_probes() {
    let config = AppHealthConfig {
        probe_interval: Duration::from_millis(10),
        probe_timeout: Duration::from_millis(5),
        threshold: 2,
        probe_only: false,
    };
    let probe = scripted(vec![
        Status::unhealthy("tick 1"),
        Status::unhealthy("tick 2"),
        Status::healthy(),
    ]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut health = AppHealth::new(config, Some(probe));
    health.on_health_change(move |_token, status| {
        let tx = tx.clone();
        async move {
            let _ = tx.send((Instant::now(), status));
        }
    });

    // The app announces itself healthy before the first tick.
    health.report_health(Status::healthy());
    let start = Instant::now();
    health.start(&CancellationToken::new()).unwrap();

    let mut seen = Vec::new();
    for _ in 0..3 {
        let (at, status) = rx.recv().await.unwrap();
        seen.push((at - start, status));
    }
    health.close().await.unwrap();

    assert_eq!(
        seen,
        vec![
            (Duration::ZERO, Status::healthy()),
            (Duration::from_millis(20), Status::unhealthy("tick 2")),
            (Duration::from_millis(30), Status::healthy()),
        ]
    );
    assert!(rx.try_recv().is_err());
    assert!(health.get_status().is_healthy);
}

/// Same schedule without the initial report: the app was never healthy, so
/// the unhealthy results match the current status and are not fed through.
#[tokio::test(start_paused = true)]
async fn failures_before_first_success_only_announce_recovery() {
    let config = AppHealthConfig {
        probe_interval: Duration::from_millis(10),
        probe_timeout: Duration::from_millis(5),
        threshold: 2,
        probe_only: false,
    };
    let probe = scripted(vec![
        Status::unhealthy("tick 1"),
        Status::unhealthy("tick 2"),
        Status::healthy(),
    ]);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut health = AppHealth::new(config, Some(probe));
    health.on_health_change(move |_token, status| {
        let tx = tx.clone();
        async move {
            let _ = tx.send((Instant::now(), status));
        }
    });

    let start = Instant::now();
    health.start(&CancellationToken::new()).unwrap();

    let (at, status) = rx.recv().await.unwrap();
    assert_eq!(at - start, Duration::from_millis(30));
    assert_eq!(status, Status::healthy());
    assert_eq!(health.failure_count(), 0);

    health.close().await.unwrap();
    assert!(rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn slow_probe_times_out_into_unhealthy() {
    let config = AppHealthConfig {
        probe_interval: Duration::from_millis(10),
        probe_timeout: Duration::from_millis(5),
        threshold: 1,
        probe_only: false,
    };
    let probe = probe_fn(|_| async {
        tokio::time::sleep(Duration::from_secs(1)).await;
        Ok(Status::healthy())
    });

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut health = AppHealth::new(config, Some(probe));
    health.on_health_change(move |_token, status| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(status);
        }
    });
    health.report_health(Status::healthy());
    health.start(&CancellationToken::new()).unwrap();

    assert_eq!(rx.recv().await, Some(Status::healthy()));
    let down = rx.recv().await.unwrap();
    assert!(!down.is_healthy);
    assert_eq!(down.reason.as_deref(), Some("probe timed out after 5ms"));

    health.close().await.unwrap();
}

#[tokio::test]
async fn close_is_idempotent_without_start() {
    let health = AppHealth::new(AppHealthConfig::default(), None);
    health.close().await.unwrap();
    health.close().await.unwrap();
    assert!(health.is_closed());
}

// ── HTTP probe ─────────────────────────────────────────────────────

/// Answer every connection with the given status line.
async fn serve(status_line: &'static str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            tokio::spawn(async move {
                let mut buf = [0u8; 1024];
                let _ = socket.read(&mut buf).await;
                let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\n\r\n");
                let _ = socket.write_all(response.as_bytes()).await;
            });
        }
    });
    addr
}

#[tokio::test]
async fn http_endpoint_becomes_healthy() {
    let addr = serve("200 OK").await;
    let config = AppHealthConfig {
        probe_interval: Duration::from_millis(20),
        probe_timeout: Duration::from_millis(20),
        threshold: 3,
        probe_only: true,
    };

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut health = AppHealth::new(config, Some(http_probe(addr, "/healthz")));
    health.on_health_change(move |_token, status| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(status);
        }
    });
    health.start(&CancellationToken::new()).unwrap();

    let status = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no transition within 5s");
    assert_eq!(status, Some(Status::healthy()));
    assert!(health.get_status().is_healthy);

    health.close().await.unwrap();
}

#[tokio::test]
async fn http_endpoint_failing_stays_unhealthy() {
    let addr = serve("500 Internal Server Error").await;
    let config = AppHealthConfig {
        probe_interval: Duration::from_millis(10),
        probe_timeout: Duration::from_millis(10),
        threshold: 1,
        probe_only: true,
    };

    let mut health = AppHealth::new(config, Some(http_probe(addr, "/healthz")));
    let (tx, mut rx) = mpsc::unbounded_channel::<Status>();
    health.on_health_change(move |_token, status| {
        let tx = tx.clone();
        async move {
            let _ = tx.send(status);
        }
    });
    health.start(&CancellationToken::new()).unwrap();

    tokio::time::sleep(Duration::from_millis(100)).await;
    health.close().await.unwrap();

    assert!(!health.get_status().is_healthy);
    assert!(rx.try_recv().is_err());
}
