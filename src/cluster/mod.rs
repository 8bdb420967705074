//! Cluster Module
//!
//! Wires one node together: the [`context::ClusterContext`] handed to every
//! running task, the task protocol, the atomic engine and the inbound frame
//! dispatcher. [`node::ClusterNode`] is the entry point applications use.

pub mod context;
pub mod handlers;
pub mod node;

#[cfg(test)]
pub(crate) mod testing;
