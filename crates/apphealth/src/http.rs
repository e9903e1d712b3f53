//! Stock HTTP probe.
//!
//! Issues `GET http://{address}{path}` over a fresh HTTP/1 connection.
//! Connection and protocol failures are reported as unhealthy statuses;
//! only a request that cannot be built is an internal error. The
//! connection driver stops as soon as the probe's token is cancelled, so
//! nothing outlives the probe that opened it.

use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::probe::{ProbeFunction, probe_fn};
use crate::status::Status;

/// Build a probe function that checks `address` (ip:port) at `path`.
pub fn http_probe(address: impl Into<String>, path: impl Into<String>) -> ProbeFunction {
    let target = Arc::new((address.into(), path.into()));
    probe_fn(move |token| {
        let target = target.clone();
        async move {
            let (address, path) = &*target;
            tokio::select! {
                biased;
                _ = token.cancelled() => Ok(Status::unhealthy("probe cancelled")),
                result = get(address, path, &token) => result,
            }
        }
    })
}

async fn get(address: &str, path: &str, token: &CancellationToken) -> anyhow::Result<Status> {
    let uri = format!("http://{address}{path}");

    let stream = match tokio::net::TcpStream::connect(address).await {
        Ok(s) => s,
        Err(e) => {
            debug!(error = %e, %uri, "health probe connection failed");
            return Ok(Status::unhealthy(format!("connect to {address}: {e}")));
        }
    };

    let io = hyper_util::rt::TokioIo::new(stream);
    let (mut sender, conn) = match hyper::client::conn::http1::handshake(io).await {
        Ok(pair) => pair,
        Err(e) => {
            debug!(error = %e, %uri, "health probe handshake failed");
            return Ok(Status::unhealthy(format!("handshake with {address}: {e}")));
        }
    };

    // Drive the connection until it completes or the probe is over.
    let driver_token = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = driver_token.cancelled() => {}
            _ = conn => {}
        }
    });

    let req = http::Request::builder()
        .method("GET")
        .uri(&uri)
        .header("host", address)
        .header("user-agent", "apphealth/0.1")
        .body(http_body_util::Empty::<bytes::Bytes>::new())
        .with_context(|| format!("building probe request for {uri}"))?;

    match sender.send_request(req).await {
        Ok(resp) if resp.status().is_success() => Ok(Status::healthy()),
        Ok(resp) => {
            debug!(status = %resp.status(), %uri, "health probe non-2xx");
            Ok(Status::unhealthy(format!(
                "app returned status {}",
                resp.status().as_u16()
            )))
        }
        Err(e) => {
            debug!(error = %e, %uri, "health probe request failed");
            Ok(Status::unhealthy(format!("request to {uri}: {e}")))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use std::time::Duration;
    use tokio::net::TcpListener;
    use tokio::sync::oneshot;

    /// Serve exactly one HTTP response with the given status line.
    async fn serve_once(status_line: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let response = format!("HTTP/1.1 {status_line}\r\ncontent-length: 0\r\n\r\n");
            let _ = socket.write_all(response.as_bytes()).await;
        });
        addr
    }

    #[tokio::test]
    async fn success_is_healthy() {
        let addr = serve_once("200 OK").await;
        let probe = http_probe(addr, "/healthz");
        let status = probe(CancellationToken::new()).await.unwrap();
        assert_eq!(status, Status::healthy());
    }

    #[tokio::test]
    async fn non_2xx_is_unhealthy() {
        let addr = serve_once("503 Service Unavailable").await;
        let probe = http_probe(addr, "/healthz");
        let status = probe(CancellationToken::new()).await.unwrap();
        assert_eq!(status, Status::unhealthy("app returned status 503"));
    }

    #[tokio::test]
    async fn closed_port_is_unhealthy_not_error() {
        let probe = http_probe("127.0.0.1:1", "/healthz");
        let status = probe(CancellationToken::new()).await.unwrap();
        assert!(!status.is_healthy);
        assert!(status.reason.unwrap().starts_with("connect to 127.0.0.1:1"));
    }

    #[tokio::test]
    async fn cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        // Unroutable address; would hang without cancellation.
        let probe = http_probe("10.255.255.1:80", "/healthz");
        let status = probe(token).await.unwrap();
        assert_eq!(status, Status::unhealthy("probe cancelled"));
    }

    #[tokio::test]
    async fn cancellation_closes_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let (got_request, request_seen) = oneshot::channel();
        let (got_eof, eof_seen) = oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = socket.read(&mut buf).await;
            let _ = got_request.send(());
            // Never answer; wait for the client to hang up.
            while let Ok(n) = socket.read(&mut buf).await {
                if n == 0 {
                    let _ = got_eof.send(());
                    return;
                }
            }
        });

        let token = CancellationToken::new();
        let check = tokio::spawn(http_probe(addr, "/healthz")(token.clone()));

        request_seen.await.unwrap();
        token.cancel();
        let status = check.await.unwrap().unwrap();
        assert_eq!(status, Status::unhealthy("probe cancelled"));

        tokio::time::timeout(Duration::from_secs(2), eof_seen)
            .await
            .expect("connection still open after cancellation")
            .unwrap();
    }
}
