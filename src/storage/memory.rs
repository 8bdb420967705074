use super::partitioner::PartitionManager;
use super::types::{ABSENT_VERSION, CasOutcome, StoreEntry, VersionedBytes};
use crate::codec::wire::Wire;
use crate::error::{CodecError, TaskError};

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::Any;
use std::sync::Arc;

/// This node's share of the versioned key-value store.
///
/// Entries are grouped by partition. Every committed write bumps the key's
/// version by one, starting from [`ABSENT_VERSION`].
pub struct VersionedStore {
    local_data: DashMap<u32, DashMap<String, StoreEntry>>,
    partitioner: Arc<PartitionManager>,
}

impl VersionedStore {
    pub fn new(partitioner: Arc<PartitionManager>) -> Arc<Self> {
        Arc::new(Self {
            local_data: DashMap::new(),
            partitioner,
        })
    }

    pub fn get(&self, key: &str) -> Option<VersionedBytes> {
        let partition = self.partitioner.get_partition(key);
        let bucket = self.local_data.get(&partition)?;
        let entry = bucket.get(key)?;
        Some(entry.to_versioned())
    }

    /// Current version of `key`, [`ABSENT_VERSION`] when it holds nothing.
    pub fn version(&self, key: &str) -> u64 {
        self.get_version(key).unwrap_or(ABSENT_VERSION)
    }

    fn get_version(&self, key: &str) -> Option<u64> {
        let partition = self.partitioner.get_partition(key);
        let bucket = self.local_data.get(&partition)?;
        let version = bucket.get(key)?.version;
        Some(version)
    }

    /// Writes `bytes` only if the key is still at `expected`.
    pub fn compare_and_set(
        &self,
        key: &str,
        expected: u64,
        type_id: &str,
        bytes: Vec<u8>,
    ) -> CasOutcome {
        self.cas_entry(key, expected, type_id, bytes, None)
    }

    fn cas_entry(
        &self,
        key: &str,
        expected: u64,
        type_id: &str,
        bytes: Vec<u8>,
        cached: Option<Arc<dyn Any + Send + Sync>>,
    ) -> CasOutcome {
        let partition = self.partitioner.get_partition(key);
        let bucket = self.local_data.entry(partition).or_default();

        let outcome = match bucket.entry(key.to_string()) {
            Entry::Occupied(mut existing) => {
                let current = existing.get().version;
                if current != expected {
                    CasOutcome::Conflict { current }
                } else {
                    let entry = existing.get_mut();
                    entry.type_id = type_id.to_string();
                    entry.bytes = bytes;
                    entry.version = current + 1;
                    entry.cached = cached;
                    CasOutcome::Committed {
                        version: current + 1,
                    }
                }
            }
            Entry::Vacant(slot) => {
                if expected != ABSENT_VERSION {
                    CasOutcome::Conflict {
                        current: ABSENT_VERSION,
                    }
                } else {
                    slot.insert(StoreEntry {
                        type_id: type_id.to_string(),
                        bytes,
                        version: ABSENT_VERSION + 1,
                        cached,
                    });
                    CasOutcome::Committed {
                        version: ABSENT_VERSION + 1,
                    }
                }
            }
        };

        match outcome {
            CasOutcome::Committed { version } => {
                tracing::trace!("Committed '{}' at version {}", key, version)
            }
            CasOutcome::Conflict { current } => tracing::trace!(
                "CAS on '{}' expected {} but found {}",
                key,
                expected,
                current
            ),
        }
        outcome
    }

    /// Unconditional write, used for seeding. Returns the new version.
    pub fn put<V: Wire + Sync>(&self, key: &str, value: V) -> Result<u64, CodecError> {
        let bytes = value.encode()?;
        let partition = self.partitioner.get_partition(key);
        let bucket = self.local_data.entry(partition).or_default();
        let mut entry = bucket.entry(key.to_string()).or_insert_with(|| StoreEntry {
            type_id: V::TYPE_ID.to_string(),
            bytes: Vec::new(),
            version: ABSENT_VERSION,
            cached: None,
        });

        entry.type_id = V::TYPE_ID.to_string();
        entry.bytes = bytes;
        entry.version += 1;
        entry.cached = Some(Arc::new(value));
        Ok(entry.version)
    }

    /// Typed read through the decode cache.
    ///
    /// The returned `Arc` is the shared cached instance; callers that mutate
    /// must take a deep copy first.
    pub fn get_typed<V: Wire + Sync>(&self, key: &str) -> Result<Option<(Arc<V>, u64)>, CodecError> {
        let partition = self.partitioner.get_partition(key);
        let Some(bucket) = self.local_data.get(&partition) else {
            return Ok(None);
        };
        let Some(mut entry) = bucket.get_mut(key) else {
            return Ok(None);
        };

        if entry.type_id != V::TYPE_ID {
            return Err(CodecError::TypeMismatch {
                stored: entry.type_id.clone(),
                requested: V::TYPE_ID.to_string(),
            });
        }

        if let Some(cached) = entry.cached.clone() {
            if let Ok(value) = cached.downcast::<V>() {
                return Ok(Some((value, entry.version)));
            }
        }

        let value = Arc::new(V::decode(&entry.bytes)?);
        entry.cached = Some(value.clone());
        Ok(Some((value, entry.version)))
    }

    /// Typed compare-and-set; a committed value goes straight into the cache.
    pub fn compare_and_set_typed<V: Wire + Sync>(
        &self,
        key: &str,
        expected: u64,
        value: V,
    ) -> Result<CasOutcome, CodecError> {
        let bytes = value.encode()?;
        Ok(self.cas_entry(key, expected, V::TYPE_ID, bytes, Some(Arc::new(value))))
    }

    /// Like [`compare_and_set_typed`](Self::compare_and_set_typed) but reports
    /// a lost race as [`TaskError::VersionConflict`].
    pub fn put_if_version<V: Wire + Sync>(
        &self,
        key: &str,
        expected: u64,
        value: V,
    ) -> Result<u64, TaskError> {
        match self.compare_and_set_typed(key, expected, value)? {
            CasOutcome::Committed { version } => Ok(version),
            CasOutcome::Conflict { current } => Err(TaskError::VersionConflict {
                key: key.to_string(),
                expected,
                actual: current,
            }),
        }
    }

    pub fn len(&self) -> usize {
        self.local_data.iter().map(|bucket| bucket.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn partitioner(&self) -> &Arc<PartitionManager> {
        &self.partitioner
    }
}
