use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// Version reported for a key that holds no value.
pub const ABSENT_VERSION: u64 = 0;

/// Raw contents of a store entry as they travel between nodes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedBytes {
    pub type_id: String,
    pub bytes: Vec<u8>,
    pub version: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CasOutcome {
    /// The write was applied; `version` is the new version of the key.
    Committed { version: u64 },
    /// The key moved on; `current` is its version now.
    Conflict { current: u64 },
}

pub(crate) struct StoreEntry {
    pub type_id: String,
    pub bytes: Vec<u8>,
    pub version: u64,
    /// Decoded value, filled on first typed read or by a typed write.
    pub cached: Option<Arc<dyn Any + Send + Sync>>,
}

impl StoreEntry {
    pub fn to_versioned(&self) -> VersionedBytes {
        VersionedBytes {
            type_id: self.type_id.clone(),
            bytes: self.bytes.clone(),
            version: self.version,
        }
    }
}
