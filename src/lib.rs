//! Distributed Task Cluster Library
//!
//! Remote execution of serializable tasks with two-phase acknowledgment, and
//! lock-free atomic updates over a versioned key-value store built on top of
//! it. The node binary (`main.rs`) wires these modules to real sockets.
//!
//! ## Architecture Modules
//!
//! - **`membership`**: the static node directory (who is in the cluster, where they listen).
//! - **`codec`**: the serialization contract (`Wire`) and the type table that
//!   routes incoming bytes to the right decoder.
//! - **`transport`**: frame delivery over UDP, HTTP, both, or in-process channels.
//!   Every send reports whether the channel was reliable.
//! - **`protocol`**: the distributed task state machine. Request, Ack and AckAck,
//!   with reliability-aware retries on both legs.
//! - **`storage`**: versioned store partitioned across the directory, plus the
//!   read and compare-and-set tasks used to reach a key's home node.
//! - **`atomic`**: optimistic read-compute-CAS updates with retry and backoff.
//! - **`cluster`**: the per-node context and the `ClusterNode` facade.
//! - **`config`**: TOML configuration with defaults for every field.

pub mod atomic;
pub mod cluster;
pub mod codec;
pub mod config;
pub mod error;
pub mod membership;
pub mod protocol;
pub mod storage;
pub mod transport;

pub use atomic::types::{Atomic, AtomicOutcome};
pub use cluster::context::ClusterContext;
pub use cluster::node::ClusterNode;
pub use codec::wire::{AtomicValue, DeepCopy, Wire};
pub use error::TaskError;
pub use membership::types::NodeId;
pub use protocol::handle::TaskHandle;
pub use protocol::task::DTask;
pub use protocol::types::TaskState;
