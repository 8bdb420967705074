//! Stream Transport
//!
//! Ships envelopes as bincode bodies POSTed to the peer's
//! [`ENDPOINT_FRAME`]. A successful response means the bytes reached the
//! peer's inbox, so every send reports [`Reliability::ReliableStream`].

use super::types::{Inbox, Reliability, Transport};
use crate::error::TransportError;
use crate::membership::directory::NodeDirectory;
use crate::membership::types::NodeId;
use crate::protocol::types::Envelope;

use async_trait::async_trait;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Extension;
use axum::http::StatusCode;
use axum::routing::post;
use std::sync::Arc;
use std::time::Duration;

/// Internal endpoint receiving protocol frames.
pub const ENDPOINT_FRAME: &str = "/internal/frame";

pub struct HttpTransport {
    http_client: reqwest::Client,
    directory: Arc<NodeDirectory>,
    timeout: Duration,
    attempts: usize,
}

impl HttpTransport {
    pub fn new(directory: Arc<NodeDirectory>, timeout: Duration) -> Arc<Self> {
        Arc::new(Self {
            http_client: reqwest::Client::new(),
            directory,
            timeout,
            attempts: 3,
        })
    }

    async fn post_with_retry(
        &self,
        url: String,
        body: Vec<u8>,
    ) -> Result<reqwest::Response, TransportError> {
        let mut delay_ms = 150u64;

        for attempt in 0..self.attempts {
            let response = self
                .http_client
                .post(url.clone())
                .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                .body(body.clone())
                .timeout(self.timeout)
                .send()
                .await;

            match response {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    if attempt + 1 == self.attempts {
                        return Err(TransportError::Http(e));
                    }
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(TransportError::Exhausted)
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        target: &NodeId,
        envelope: &Envelope,
    ) -> Result<Reliability, TransportError> {
        let node = self
            .directory
            .get_member(target)
            .ok_or_else(|| TransportError::UnknownNode(target.clone()))?;

        let body = bincode::serialize(envelope)?;
        let size = body.len();
        let response = self
            .post_with_retry(format!("http://{}{}", node.http_addr, ENDPOINT_FRAME), body)
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::Rejected(response.status().as_u16()));
        }

        tracing::trace!(
            "Sent {:?} ({} bytes) to {:?} over HTTP",
            envelope.frame.kind(),
            size,
            target
        );
        Ok(Reliability::ReliableStream)
    }
}

/// Routes for receiving frames; merge into the node's HTTP router.
pub fn frame_routes(inbox: Inbox) -> Router {
    Router::new()
        .route(ENDPOINT_FRAME, post(handle_frame))
        .layer(Extension(inbox))
}

pub async fn handle_frame(Extension(inbox): Extension<Inbox>, body: Bytes) -> StatusCode {
    let envelope: Envelope = match bincode::deserialize(&body) {
        Ok(envelope) => envelope,
        Err(e) => {
            tracing::warn!("Failed to deserialize frame body: {}", e);
            return StatusCode::BAD_REQUEST;
        }
    };

    if inbox.send(envelope).is_err() {
        tracing::error!("Inbox closed, rejecting frame");
        return StatusCode::SERVICE_UNAVAILABLE;
    }

    StatusCode::OK
}
