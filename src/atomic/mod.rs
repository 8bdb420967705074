//! Atomic Update Module
//!
//! Lock-free single-key updates through optimistic concurrency:
//! read `(value, version)`, run the caller's pure function on a private deep
//! copy, then compare-and-set against the version that was read. A lost race
//! re-reads and re-runs the function after a short backoff.
//!
//! When the key lives on another node, the read and the compare-and-set are
//! the store tasks from [`crate::storage::protocol`], sent through the task
//! protocol, so every retry round gets the same delivery guarantees.

pub mod engine;
pub mod types;
