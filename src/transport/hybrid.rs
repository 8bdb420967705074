//! Size-Routed Transport
//!
//! Small frames (requests, ACKACKs, small results) are cheap to resend and go
//! over UDP. Frames larger than `datagram_limit` go over the HTTP stream, so a
//! slow acknowledgment of a large result never triggers a resend of it.

use super::http::HttpTransport;
use super::types::{Reliability, Transport};
use super::udp::UdpTransport;
use crate::error::TransportError;
use crate::membership::types::NodeId;
use crate::protocol::types::Envelope;

use async_trait::async_trait;
use std::sync::Arc;

pub struct HybridTransport {
    udp: Arc<UdpTransport>,
    http: Arc<HttpTransport>,
    datagram_limit: usize,
}

impl HybridTransport {
    pub fn new(udp: Arc<UdpTransport>, http: Arc<HttpTransport>, datagram_limit: usize) -> Arc<Self> {
        Arc::new(Self {
            udp,
            http,
            datagram_limit,
        })
    }

    /// Whether an envelope of this encoded size goes over the datagram path.
    pub fn fits_datagram(&self, encoded_len: usize) -> bool {
        encoded_len <= self.datagram_limit
    }
}

#[async_trait]
impl Transport for HybridTransport {
    async fn send(
        &self,
        target: &NodeId,
        envelope: &Envelope,
    ) -> Result<Reliability, TransportError> {
        let size = bincode::serialized_size(envelope)? as usize;

        if self.fits_datagram(size) {
            self.udp.send(target, envelope).await
        } else {
            tracing::debug!(
                "{:?} #{} is {} bytes, sending over stream",
                envelope.frame.kind(),
                envelope.frame.task_num(),
                size
            );
            self.http.send(target, envelope).await
        }
    }
}
