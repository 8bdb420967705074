//! Error Taxonomy
//!
//! Errors surfaced by the task protocol and the atomic update engine.
//!
//! - **ContractViolation**: a type is missing from the type table or cannot be
//!   encoded/decoded. Fatal, reported at submission time, never retried.
//! - **TransportTimeout**: a round trip gave up after exhausting its
//!   retransmit or wait-extension budget.
//! - **VersionConflict**: a compare-and-set lost a race. Retried internally by
//!   the atomic engine; only visible when raised by a direct store call.
//! - **ApplicationFailure**: the remote `dinvoke` or an update function failed.
//!   Carried back as the outcome of the operation.

use crate::membership::types::NodeId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TaskError {
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("no acknowledgment from {target:?} after {attempts} attempts")]
    TransportTimeout { target: NodeId, attempts: u32 },

    #[error("version conflict on '{key}': expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("application failure: {0}")]
    ApplicationFailure(String),

    #[error("atomic update of '{key}' gave up after {attempts} attempts")]
    RetriesExhausted { key: String, attempts: u32 },

    #[error("node is shutting down")]
    Shutdown,
}

impl From<CodecError> for TaskError {
    fn from(e: CodecError) -> Self {
        TaskError::ContractViolation(e.to_string())
    }
}

/// Failures of the serialization contract.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CodecError {
    #[error("failed to encode {type_id}: {reason}")]
    Encode { type_id: String, reason: String },

    #[error("failed to decode {type_id}: {reason}")]
    Decode { type_id: String, reason: String },

    #[error("type '{0}' is not registered")]
    Unregistered(String),

    #[error("type id '{0}' is already registered by another type")]
    DuplicateTypeId(String),

    #[error("type id must not be empty")]
    EmptyTypeId,

    #[error("type mismatch: stored '{stored}', requested '{requested}'")]
    TypeMismatch { stored: String, requested: String },
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("unknown node {0:?}")]
    UnknownNode(NodeId),

    #[error("link to {0:?} is down")]
    LinkDown(NodeId),

    #[error("frame of {size} bytes exceeds datagram limit {limit}")]
    FrameTooLarge { size: usize, limit: usize },

    #[error("frame encoding failed: {0}")]
    Encoding(#[from] bincode::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("peer rejected frame with status {0}")]
    Rejected(u16),

    #[error("retry attempts exhausted")]
    Exhausted,
}

/// Wire form of a failed remote execution.
///
/// Travels inside an ACK so the originator sees the same error class the
/// target raised instead of a generic transport failure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteFailure {
    Contract(String),
    Application(String),
}

impl From<RemoteFailure> for TaskError {
    fn from(f: RemoteFailure) -> Self {
        match f {
            RemoteFailure::Contract(msg) => TaskError::ContractViolation(msg),
            RemoteFailure::Application(msg) => TaskError::ApplicationFailure(msg),
        }
    }
}
