//! Task Protocol Module
//!
//! Two-phase-acknowledged remote execution:
//!
//! ```text
//! originator                     target
//!     | ---- Request ---------------> |  dinvoke
//!     | ---- Poll / Request --------> |  (while dinvoke runs)
//!     | <--- Working ---------------- |
//!     | <--- Ack (result) ----------- |  result retained
//!     |  decode_into + on_ack         |
//!     | ---- AckAck ----------------> |  on_ack_ack, release
//! ```
//!
//! Overdue acknowledgments are handled per-frame by [`retry::RetryPolicy`]:
//! wait longer when the frame went over a reliable stream or the target has
//! reported `Working`, resend otherwise.

pub mod handle;
pub mod retry;
pub mod rpc;
pub mod task;
pub mod types;
