//! Node Directory Module
//!
//! The cluster topology is given, not discovered: every node is started with
//! the full list of members. The directory answers "who is node X and where
//! does it listen" and provides the deterministic member ordering the
//! storage partitioner uses to pick a key's home node.

pub mod directory;
pub mod types;
