//! Java-edition Server List Ping: one timeout-bounded status round trip per call.

pub mod codec;
pub mod motd;
mod status;

#[cfg(any(test, feature = "fake-server"))]
pub mod fake;

pub use status::parse_status;

use novacolumn_core::{Endpoint, ProbeOutcome, StatusSnapshot};
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol: {0}")]
    Protocol(String),
    #[error("invalid status json: {0}")]
    Json(#[from] serde_json::Error),
}

/// A failed poll. Always names the endpoint that was being polled.
#[derive(Debug, thiserror::Error)]
#[error("{endpoint}: {cause}")]
pub struct ProbeFailure {
    pub endpoint: Endpoint,
    #[source]
    pub cause: ProbeError,
}

/// Poll `host:port` once. The whole exchange, including name resolution and
/// connect, must finish within `limit`.
pub async fn probe(host: &str, port: u16, limit: Duration) -> Result<StatusSnapshot, ProbeFailure> {
    let endpoint = Endpoint::new(host, port);
    match timeout(limit, exchange(host, port)).await {
        Ok(Ok((json, latency))) => status::parse_status(endpoint.clone(), &json, latency)
            .map_err(|cause| ProbeFailure { endpoint, cause }),
        Ok(Err(cause)) => Err(ProbeFailure { endpoint, cause }),
        Err(_) => Err(ProbeFailure { endpoint, cause: ProbeError::Timeout(limit) }),
    }
}

/// [`probe`] folded into a [`ProbeOutcome`], logging the result.
pub async fn probe_outcome(endpoint: &Endpoint, limit: Duration) -> ProbeOutcome {
    match probe(&endpoint.host, endpoint.port, limit).await {
        Ok(snapshot) => {
            tracing::info!("🗸 {}", endpoint);
            ProbeOutcome::Success(snapshot)
        }
        Err(failure) => {
            tracing::warn!("𐄂 {}: {}", failure.endpoint, failure.cause);
            ProbeOutcome::Failure(failure.endpoint)
        }
    }
}

async fn exchange(host: &str, port: u16) -> Result<(String, f64), ProbeError> {
    let mut stream = TcpStream::connect((host, port)).await?;
    stream.set_nodelay(true)?;
    stream.write_all(&codec::handshake(host, port)).await?;

    let started = Instant::now();
    stream.write_all(&codec::status_request()).await?;
    let (id, body) = codec::read_packet(&mut stream).await?;
    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;

    if id != 0x00 {
        return Err(ProbeError::Protocol(format!("unexpected packet id {id:#04x}")));
    }
    let json = codec::decode_string(&body)?;
    Ok((json, latency_ms))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake::{FakeServer, Reply};

    const STATUS: &str = r#"{"version":{"name":"1.20.4","protocol":765},"players":{"max":10,"online":1,"sample":[{"name":"alice","id":"4566e69f-c907-48ee-8d71-d7ba5aa00d20"}]},"description":"hello"}"#;

    #[tokio::test]
    async fn probes_a_live_server() {
        let srv = FakeServer::start(Reply::Status(STATUS.into())).await.unwrap();
        let snap = probe("127.0.0.1", srv.port(), Duration::from_secs(2)).await.unwrap();
        assert_eq!(snap.endpoint, Endpoint::new("127.0.0.1", srv.port()));
        assert_eq!(snap.version_name, "1.20.4");
        assert_eq!(snap.sample.len(), 1);
        assert!(snap.latency_ms >= 0.0);
    }

    #[tokio::test]
    async fn stalled_server_times_out_within_limit() {
        let srv = FakeServer::start(Reply::Stall).await.unwrap();
        let started = Instant::now();
        let err = probe("127.0.0.1", srv.port(), Duration::from_millis(150)).await.unwrap_err();
        assert!(matches!(err.cause, ProbeError::Timeout(_)));
        assert_eq!(err.endpoint.port, srv.port());
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn garbage_reply_is_a_decode_failure() {
        let srv = FakeServer::start(Reply::Status("not json".into())).await.unwrap();
        let err = probe("127.0.0.1", srv.port(), Duration::from_secs(2)).await.unwrap_err();
        assert!(matches!(err.cause, ProbeError::Json(_)));
    }

    #[tokio::test]
    async fn refused_connection_maps_to_failure_outcome() {
        let port = crate::fake::closed_port().await.unwrap();
        let ep = Endpoint::new("127.0.0.1", port);
        let outcome = probe_outcome(&ep, Duration::from_secs(2)).await;
        assert_eq!(outcome, ProbeOutcome::Failure(ep));
    }
}
