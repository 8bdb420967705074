//! Overdue-Acknowledgment Policy
//!
//! When an acknowledgment is late, the right reaction depends on how the
//! unacknowledged frame travelled. A frame sent over a reliable stream has
//! arrived; the peer is only slow, so we keep waiting. A datagram may have
//! been lost, so we send it again. Both reactions are bounded.

use crate::config::ProtocolConfig;
use crate::transport::types::Reliability;

use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryAction {
    ExtendWait,
    Resend,
    GiveUp,
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// How long to wait for an acknowledgment before reacting.
    pub ack_timeout: Duration,
    /// Resends allowed for frames that went over an unreliable channel.
    pub max_retransmits: u32,
    /// Wait extensions allowed for frames that went over a reliable stream.
    pub max_wait_extensions: u32,
}

/// Retry bookkeeping for one unacknowledged frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RetryBudget {
    pub retransmits: u32,
    pub extensions: u32,
}

impl RetryBudget {
    /// Total waits so far, the first one included.
    pub fn attempts(&self) -> u32 {
        1 + self.retransmits + self.extensions
    }
}

impl RetryPolicy {
    pub fn on_overdue(&self, reliability: Reliability, budget: &mut RetryBudget) -> RetryAction {
        match reliability {
            Reliability::ReliableStream => {
                if budget.extensions >= self.max_wait_extensions {
                    return RetryAction::GiveUp;
                }
                budget.extensions += 1;
                RetryAction::ExtendWait
            }
            Reliability::Unreliable => {
                if budget.retransmits >= self.max_retransmits {
                    return RetryAction::GiveUp;
                }
                budget.retransmits += 1;
                RetryAction::Resend
            }
        }
    }
}

impl From<&ProtocolConfig> for RetryPolicy {
    fn from(config: &ProtocolConfig) -> Self {
        Self {
            ack_timeout: Duration::from_millis(config.ack_timeout_ms.max(1)),
            max_retransmits: config.max_retransmits,
            max_wait_extensions: config.max_wait_extensions,
        }
    }
}
