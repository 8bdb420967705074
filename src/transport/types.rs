use crate::error::TransportError;
use crate::membership::types::NodeId;
use crate::protocol::types::Envelope;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// How a frame was delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Reliability {
    /// Ordered, lossless stream: once sent, the bytes arrive.
    ReliableStream,
    /// Datagram: the frame may be lost.
    Unreliable,
}

/// Channel every transport pushes received envelopes into.
pub type Inbox = mpsc::UnboundedSender<Envelope>;

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, target: &NodeId, envelope: &Envelope)
    -> Result<Reliability, TransportError>;
}
