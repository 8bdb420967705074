use crate::error::RemoteFailure;
use crate::membership::types::NodeId;

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};

/// Lifecycle of one remote call.
///
/// The originator walks `Created → Sent → LocalAck → Done`; the executing
/// node walks `RemoteExecuting → ResultSent → RemoteAckAck → Done`.
/// States only move forward.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TaskState {
    Created = 0,
    Sent = 1,
    RemoteExecuting = 2,
    ResultSent = 3,
    LocalAck = 4,
    RemoteAckAck = 5,
    Done = 6,
}

impl TaskState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => TaskState::Created,
            1 => TaskState::Sent,
            2 => TaskState::RemoteExecuting,
            3 => TaskState::ResultSent,
            4 => TaskState::LocalAck,
            5 => TaskState::RemoteAckAck,
            _ => TaskState::Done,
        }
    }
}

/// Shared, forward-only protocol state of a call.
#[derive(Debug, Clone, Default)]
pub struct StateCell(Arc<AtomicU8>);

impl StateCell {
    pub fn get(&self) -> TaskState {
        TaskState::from_u8(self.0.load(Ordering::Acquire))
    }

    /// Moves to `to` unless the call is already further along.
    pub(crate) fn advance(&self, to: TaskState) {
        self.0.fetch_max(to as u8, Ordering::AcqRel);
    }
}

/// Outcome of a remote execution as it travels back to the originator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    /// Encoded task after `dinvoke` completed.
    Done(Vec<u8>),
    Failed(RemoteFailure),
}

/// The three messages of a round trip, plus the liveness pair used while a
/// long `dinvoke` is running.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Frame {
    /// Originator → target: run this task.
    Request {
        task_num: u64,
        type_id: String,
        payload: Vec<u8>,
    },
    /// Target → originator: the result.
    Ack { task_num: u64, reply: Reply },
    /// Originator → target: the result was processed, release it.
    AckAck { task_num: u64 },
    /// Originator → target: is this call still executing?
    Poll { task_num: u64 },
    /// Target → originator: the request arrived and is still executing.
    Working { task_num: u64 },
}

impl Frame {
    pub fn kind(&self) -> FrameKind {
        match self {
            Frame::Request { .. } => FrameKind::Request,
            Frame::Ack { .. } => FrameKind::Ack,
            Frame::AckAck { .. } => FrameKind::AckAck,
            Frame::Poll { .. } => FrameKind::Poll,
            Frame::Working { .. } => FrameKind::Working,
        }
    }

    pub fn task_num(&self) -> u64 {
        match self {
            Frame::Request { task_num, .. }
            | Frame::Ack { task_num, .. }
            | Frame::AckAck { task_num }
            | Frame::Poll { task_num }
            | Frame::Working { task_num } => *task_num,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FrameKind {
    Request,
    Ack,
    AckAck,
    Poll,
    Working,
}

/// A frame together with its sender, as carried by every transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub from: NodeId,
    pub frame: Frame,
}

/// Releases the executing node's resources for a call (runs `on_ack_ack`).
pub type ReleaseFn = Box<dyn FnOnce() + Send + Sync>;

/// What the executing node keeps after running a task.
pub struct RemoteOutcome {
    pub reply: Reply,
    pub release: Option<ReleaseFn>,
}

impl RemoteOutcome {
    pub fn failed(failure: RemoteFailure) -> Self {
        Self {
            reply: Reply::Failed(failure),
            release: None,
        }
    }
}

/// Per-node protocol counters.
#[derive(Debug, Default)]
pub struct ProtocolStats {
    pub requests_sent: AtomicU64,
    pub request_retransmits: AtomicU64,
    pub request_wait_extensions: AtomicU64,
    pub acks_sent: AtomicU64,
    pub ack_retransmits: AtomicU64,
    pub ack_wait_extensions: AtomicU64,
    pub ackacks_sent: AtomicU64,
    pub calls_executed: AtomicU64,
    pub duplicate_requests: AtomicU64,
    pub duplicate_ackacks: AtomicU64,
    pub stale_acks: AtomicU64,
    pub duplicate_acks: AtomicU64,
    pub ackack_give_ups: AtomicU64,
    pub polls_sent: AtomicU64,
    pub working_sent: AtomicU64,
    pub working_received: AtomicU64,
}

impl ProtocolStats {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ProtocolStatsSnapshot {
        let read = |c: &AtomicU64| c.load(Ordering::Relaxed);
        ProtocolStatsSnapshot {
            requests_sent: read(&self.requests_sent),
            request_retransmits: read(&self.request_retransmits),
            request_wait_extensions: read(&self.request_wait_extensions),
            acks_sent: read(&self.acks_sent),
            ack_retransmits: read(&self.ack_retransmits),
            ack_wait_extensions: read(&self.ack_wait_extensions),
            ackacks_sent: read(&self.ackacks_sent),
            calls_executed: read(&self.calls_executed),
            duplicate_requests: read(&self.duplicate_requests),
            duplicate_ackacks: read(&self.duplicate_ackacks),
            stale_acks: read(&self.stale_acks),
            duplicate_acks: read(&self.duplicate_acks),
            ackack_give_ups: read(&self.ackack_give_ups),
            polls_sent: read(&self.polls_sent),
            working_sent: read(&self.working_sent),
            working_received: read(&self.working_received),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolStatsSnapshot {
    pub requests_sent: u64,
    pub request_retransmits: u64,
    pub request_wait_extensions: u64,
    pub acks_sent: u64,
    pub ack_retransmits: u64,
    pub ack_wait_extensions: u64,
    pub ackacks_sent: u64,
    pub calls_executed: u64,
    pub duplicate_requests: u64,
    pub duplicate_ackacks: u64,
    pub stale_acks: u64,
    pub duplicate_acks: u64,
    pub ackack_give_ups: u64,
    pub polls_sent: u64,
    pub working_sent: u64,
    pub working_received: u64,
}
