use crate::codec::wire::AtomicValue;
use crate::config::AtomicConfig;

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A typed atomic operation on one key.
///
/// `atomic` receives a private copy of the current value (`None` when the
/// key is absent) and returns the replacement, or `Ok(None)` to leave the key
/// untouched. It may run several times with different snapshots.
pub trait Atomic: Send + Sync {
    type Value: AtomicValue;

    fn atomic(&self, old: Option<Self::Value>) -> anyhow::Result<Option<Self::Value>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AtomicOutcome {
    /// The update function declined to write.
    Unchanged { attempts: u32 },
    Committed { version: u64, attempts: u32 },
}

impl AtomicOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            AtomicOutcome::Unchanged { attempts } | AtomicOutcome::Committed { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Retry schedule for conflicting compare-and-set rounds.
#[derive(Debug, Clone)]
pub struct AtomicPolicy {
    /// `None` keeps retrying until the update commits.
    pub max_retries: Option<u32>,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub jitter_ms: u64,
}

impl AtomicPolicy {
    /// Pause before retry number `retry` (starting at 1).
    pub fn backoff(&self, retry: u32) -> Duration {
        let exp = retry.saturating_sub(1).min(16);
        let delay = self
            .backoff_base
            .saturating_mul(1u32 << exp)
            .min(self.backoff_max);
        let jitter = if self.jitter_ms == 0 {
            0
        } else {
            rand::random::<u64>() % (self.jitter_ms + 1)
        };
        delay + Duration::from_millis(jitter)
    }

    pub fn exhausted(&self, retries: u32) -> bool {
        self.max_retries.is_some_and(|max| retries >= max)
    }
}

impl From<&AtomicConfig> for AtomicPolicy {
    fn from(config: &AtomicConfig) -> Self {
        Self {
            max_retries: (config.max_retries > 0).then_some(config.max_retries),
            backoff_base: Duration::from_millis(config.backoff_base_ms),
            backoff_max: Duration::from_millis(config.backoff_max_ms),
            jitter_ms: config.jitter_ms,
        }
    }
}
