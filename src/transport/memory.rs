//! In-Process Network
//!
//! Connects nodes living in the same process through unbounded channels.
//! Each attached node declares the reliability its outgoing frames report.
//! Fault rules can drop or delay frames of a given kind, which is how the
//! tests reproduce lost datagrams and slow acknowledgments.

use super::types::{Reliability, Transport};
use crate::error::TransportError;
use crate::membership::types::NodeId;
use crate::protocol::types::{Envelope, FrameKind};

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Copy)]
pub enum FaultAction {
    Drop,
    Delay(Duration),
}

#[derive(Debug, Clone)]
struct FaultRule {
    action: FaultAction,
    /// `None` applies to every matching frame.
    remaining: Option<u32>,
}

pub struct MemoryNetwork {
    inboxes: DashMap<NodeId, mpsc::UnboundedSender<Envelope>>,
    faults: DashMap<FrameKind, FaultRule>,
    sent: DashMap<FrameKind, AtomicU64>,
    dropped: DashMap<FrameKind, AtomicU64>,
}

impl MemoryNetwork {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inboxes: DashMap::new(),
            faults: DashMap::new(),
            sent: DashMap::new(),
            dropped: DashMap::new(),
        })
    }

    /// Connects a node and returns its transport and the receiving end of its inbox.
    pub fn attach(
        self: &Arc<Self>,
        node: NodeId,
        reliability: Reliability,
    ) -> (Arc<MemoryTransport>, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.inboxes.insert(node.clone(), tx);

        let transport = Arc::new(MemoryTransport {
            network: self.clone(),
            local: node,
            reliability,
        });
        (transport, rx)
    }

    /// Removes a node; frames addressed to it fail with `LinkDown`.
    pub fn disconnect(&self, node: &NodeId) {
        self.inboxes.remove(node);
    }

    /// Drops the next `count` frames of `kind` (all of them for `None`).
    pub fn drop_frames(&self, kind: FrameKind, count: Option<u32>) {
        self.faults.insert(
            kind,
            FaultRule {
                action: FaultAction::Drop,
                remaining: count,
            },
        );
    }

    /// Delays the next `count` frames of `kind` (all of them for `None`).
    pub fn delay_frames(&self, kind: FrameKind, delay: Duration, count: Option<u32>) {
        self.faults.insert(
            kind,
            FaultRule {
                action: FaultAction::Delay(delay),
                remaining: count,
            },
        );
    }

    pub fn clear_faults(&self) {
        self.faults.clear();
    }

    /// Frames of `kind` handed to the network, including dropped ones.
    pub fn sent_count(&self, kind: FrameKind) -> u64 {
        self.sent
            .get(&kind)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn dropped_count(&self, kind: FrameKind) -> u64 {
        self.dropped
            .get(&kind)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    fn take_fault(&self, kind: FrameKind) -> Option<FaultAction> {
        let mut rule = self.faults.get_mut(&kind)?;
        let action = rule.action;
        let remaining = rule.remaining;
        match remaining {
            Some(0) => None,
            Some(n) => {
                rule.remaining = Some(n - 1);
                Some(action)
            }
            None => Some(action),
        }
    }

    fn count(map: &DashMap<FrameKind, AtomicU64>, kind: FrameKind) {
        map.entry(kind)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    fn deliver(&self, target: &NodeId, envelope: Envelope) -> Result<(), TransportError> {
        let inbox = self
            .inboxes
            .get(target)
            .map(|tx| tx.value().clone())
            .ok_or_else(|| TransportError::LinkDown(target.clone()))?;
        inbox
            .send(envelope)
            .map_err(|_| TransportError::LinkDown(target.clone()))
    }
}

/// One node's handle onto a [`MemoryNetwork`].
pub struct MemoryTransport {
    network: Arc<MemoryNetwork>,
    local: NodeId,
    reliability: Reliability,
}

impl MemoryTransport {
    pub fn local(&self) -> &NodeId {
        &self.local
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn send(
        &self,
        target: &NodeId,
        envelope: &Envelope,
    ) -> Result<Reliability, TransportError> {
        let kind = envelope.frame.kind();
        MemoryNetwork::count(&self.network.sent, kind);

        match self.network.take_fault(kind) {
            Some(FaultAction::Drop) => {
                MemoryNetwork::count(&self.network.dropped, kind);
                tracing::trace!(
                    "Dropping {:?} #{} {:?} -> {:?}",
                    kind,
                    envelope.frame.task_num(),
                    self.local,
                    target
                );
                Ok(self.reliability)
            }
            Some(FaultAction::Delay(delay)) => {
                let network = self.network.clone();
                let target = target.clone();
                let envelope = envelope.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = network.deliver(&target, envelope) {
                        tracing::debug!("Delayed frame not delivered: {}", e);
                    }
                });
                Ok(self.reliability)
            }
            None => {
                self.network.deliver(target, envelope.clone())?;
                Ok(self.reliability)
            }
        }
    }
}
