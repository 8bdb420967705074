//! Versioned Storage Module
//!
//! In-memory key-value store where every key carries a version counter.
//!
//! ## Core Concepts
//! - **Partitioning**: keys hash into 256 fixed partitions.
//! - **Placement**: `PartitionManager` maps each partition onto one home node
//!   of the sorted node directory.
//! - **Versioning**: version `0` means absent; every committed write adds one.
//!   `compare_and_set` only writes when the caller's expected version matches.
//! - **Typed cache**: decoded values are cached per entry and shared behind
//!   `Arc`, so repeated local reads skip decoding.
//! - **Remote access**: `ReadEntryTask` and `CompareAndSetTask` run the same
//!   operations on a key's home node through the task protocol.

pub mod memory;
pub mod partitioner;
pub mod protocol;
pub mod types;

#[cfg(test)]
mod tests;
