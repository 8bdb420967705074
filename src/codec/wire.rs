use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CodecError;

/// A type that can be shipped between nodes.
///
/// Fields marked `#[serde(skip)]` are transient: they never travel and keep
/// their local value across [`Wire::decode_into`].
pub trait Wire: Serialize + DeserializeOwned + Send + Sized + 'static {
    /// Stable identifier used to route bytes to the right decoder.
    const TYPE_ID: &'static str;

    fn encode(&self) -> Result<Vec<u8>, CodecError> {
        bincode::serialize(self).map_err(|e| CodecError::Encode {
            type_id: Self::TYPE_ID.to_string(),
            reason: e.to_string(),
        })
    }

    fn decode(bytes: &[u8]) -> Result<Self, CodecError> {
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode {
            type_id: Self::TYPE_ID.to_string(),
            reason: e.to_string(),
        })
    }

    /// Copies every field that travels on the wire from `remote` into `self`.
    /// Transient fields of `self` must be left untouched.
    fn restore(&mut self, remote: Self);

    /// Decodes `bytes` into this existing instance.
    fn decode_into(&mut self, bytes: &[u8]) -> Result<(), CodecError> {
        let remote = Self::decode(bytes)?;
        self.restore(remote);
        Ok(())
    }
}

/// Explicit deep copy for values handed to atomic update functions.
///
/// The copy must share no mutable state with the original.
pub trait DeepCopy {
    fn deep_copy(&self) -> Self;
}

/// Values that can live in the versioned store and be updated atomically.
pub trait AtomicValue: Wire + DeepCopy + Sync {}

impl<T: Wire + DeepCopy + Sync> AtomicValue for T {}
