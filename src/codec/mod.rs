//! Serialization Contract Module
//!
//! Every type that crosses a node boundary implements [`wire::Wire`]: a stable
//! type identifier plus encode, decode and decode-into-existing operations.
//! The [`registry::TypeRegistry`] is the type table that routes incoming
//! bytes to the right decoder. A type that was never registered is rejected
//! when it is first submitted, not halfway through a round trip.

pub mod registry;
pub mod wire;
