//! Transport Module
//!
//! Point-to-point delivery of protocol frames. Every send reports whether the
//! frame went over a reliable ordered stream or an unreliable datagram; the
//! task protocol uses that to decide between waiting longer and resending.
//!
//! ## Implementations
//! - **`memory`**: in-process links with fault injection, used by tests.
//! - **`udp`**: bincode datagrams (unreliable).
//! - **`http`**: bincode frames POSTed over HTTP/TCP (reliable stream).
//! - **`hybrid`**: small frames over UDP, large frames over HTTP.

pub mod http;
pub mod hybrid;
pub mod memory;
pub mod types;
pub mod udp;

#[cfg(test)]
mod tests;
