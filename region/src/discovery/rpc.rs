//! Region side of the rack agent link.
//!
//! One TCP connection per call: write the signed request, half-close, read the
//! JSON response until EOF.

use alloc::sync::Arc;
use core::time::Duration;
use std::io;

use ipnet::IpNet;
use secrecy::SecretString;
use thiserror::Error as ThisError;
use tokio::{
    io::{AsyncReadExt as _, AsyncWriteExt as _},
    net::TcpStream,
    time::{Instant, timeout_at},
};

use metalfleet_common::{
    Discovery, MAX_MESSAGE_BYTES, RackOperation, RackRequest, RackResponse, create_signed_message,
};

/// A rack agent the region can talk to.
#[derive(Debug, Clone)]
pub struct RackAgent {
    pub name: String,
    pub ip: String,
    pub port: u16,
    pub shared_secret: Arc<SecretString>,
}

/// Why a single agent call produced nothing.
#[derive(Debug, ThisError)]
pub enum RackCallError {
    #[error("Failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: io::Error,
    },
    #[error("I/O error talking to rack agent: {0}")]
    Io(#[from] io::Error),
    #[error("No response within {0:?}")]
    Timeout(Duration),
    #[error("Malformed response: {0}")]
    Malformed(String),
    /// The agent answered with an error of its own.
    #[error("{0}")]
    Agent(String),
}

impl RackCallError {
    /// Text shown in scan summaries.
    #[must_use]
    pub fn reason(&self) -> String {
        match *self {
            Self::Connect { .. } | Self::Io(_) | Self::Timeout(_) => "unreachable".to_owned(),
            Self::Malformed(_) | Self::Agent(_) => self.to_string(),
        }
    }
}

/// Transport to rack agents, swappable in tests.
pub trait RackClient: Send + Sync {
    /// Asks `rack` for the neighbours it has seen inside `cidrs`.
    fn scan(
        &self,
        rack: &RackAgent,
        cidrs: &[IpNet],
        timeout: Duration,
    ) -> impl Future<Output = Result<Vec<Discovery>, RackCallError>> + Send;

    /// Succeeds when `rack` answers a signed status request.
    fn status(
        &self,
        rack: &RackAgent,
        timeout: Duration,
    ) -> impl Future<Output = Result<(), RackCallError>> + Send;
}

/// The production [`RackClient`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpRackClient;

impl TcpRackClient {
    async fn exchange(
        rack: &RackAgent,
        request: &RackRequest,
        timeout: Duration,
    ) -> Result<RackResponse, RackCallError> {
        let deadline = Instant::now() + timeout;
        let addr = format!("{}:{}", rack.ip, rack.port);

        let mut stream = match timeout_at(deadline, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(source)) => return Err(RackCallError::Connect { addr, source }),
            Err(_elapsed) => return Err(RackCallError::Timeout(timeout)),
        };

        let payload =
            serde_json::to_string(request).map_err(|e| RackCallError::Malformed(e.to_string()))?;
        let message = create_signed_message(&payload, &rack.shared_secret);

        let mut buf = Vec::new();
        let round_trip = async {
            stream.write_all(message.as_bytes()).await?;
            stream.shutdown().await?;
            (&mut stream)
                .take(MAX_MESSAGE_BYTES)
                .read_to_end(&mut buf)
                .await?;
            Ok::<_, io::Error>(())
        };
        match timeout_at(deadline, round_trip).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e.into()),
            Err(_elapsed) => return Err(RackCallError::Timeout(timeout)),
        }

        let response: RackResponse =
            serde_json::from_slice(&buf).map_err(|e| RackCallError::Malformed(e.to_string()))?;
        match response.error {
            Some(error) => Err(RackCallError::Agent(error)),
            None => Ok(response),
        }
    }
}

impl RackClient for TcpRackClient {
    async fn scan(
        &self,
        rack: &RackAgent,
        cidrs: &[IpNet],
        timeout: Duration,
    ) -> Result<Vec<Discovery>, RackCallError> {
        let request = RackRequest::new(
            RackOperation::Scan,
            cidrs.iter().map(ToString::to_string).collect(),
        );
        Ok(Self::exchange(rack, &request, timeout).await?.discoveries)
    }

    async fn status(&self, rack: &RackAgent, timeout: Duration) -> Result<(), RackCallError> {
        let request = RackRequest::new(RackOperation::Status, Vec::new());
        Self::exchange(rack, &request, timeout).await.map(drop)
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    fn rack(port: u16) -> RackAgent {
        RackAgent {
            name: "rack1".to_owned(),
            ip: "127.0.0.1".to_owned(),
            port,
            shared_secret: Arc::new(SecretString::from("secret")),
        }
    }

    async fn serve_once(reply: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            socket.read_to_end(&mut request).await.unwrap();
            assert!(String::from_utf8(request).unwrap().contains("\"scan\""), "scan request");
            socket.write_all(reply.as_bytes()).await.unwrap();
        });
        port
    }

    #[tokio::test]
    async fn scan_returns_discoveries() {
        let port = serve_once(
            r#"{"discoveries":[{"mac":"aa:bb:cc:dd:ee:ff","ip":"10.0.0.5","observedAt":1}],"error":null}"#,
        )
        .await;
        let found = TcpRackClient
            .scan(&rack(port), &["10.0.0.0/24".parse().unwrap()], Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ip, "10.0.0.5");
    }

    #[tokio::test]
    async fn agent_errors_are_surfaced_verbatim() {
        let port = serve_once(r#"{"discoveries":[],"error":"Invalid HMAC signature"}"#).await;
        let err = TcpRackClient
            .scan(&rack(port), &[], Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "Invalid HMAC signature");
    }

    #[tokio::test]
    async fn silent_agent_times_out_as_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _keep = tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(60)).await;
        });
        let started = Instant::now();
        let err = TcpRackClient
            .scan(&rack(port), &[], Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, RackCallError::Timeout(_)), "{err:?}");
        assert_eq!(err.reason(), "unreachable");
        assert!(started.elapsed() < Duration::from_secs(5), "bounded by the timeout");
    }

    #[tokio::test]
    async fn refused_connection_is_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        let err = TcpRackClient
            .status(&rack(port), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert_eq!(err.reason(), "unreachable");
    }
}
