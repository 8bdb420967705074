//! Type Table
//!
//! Maps stable type identifiers to the code that knows how to decode and run
//! them. Task types register an erased remote executor; value types register
//! only their identity so the atomic engine can check them before use.
//!
//! Registration is the capability check: a type that is missing, or whose
//! identifier collides with a different Rust type, fails here.

use super::wire::{AtomicValue, Wire};
use crate::cluster::context::ClusterContext;
use crate::error::CodecError;
use crate::membership::types::NodeId;
use crate::protocol::task::{DTask, execute_decoded};
use crate::protocol::types::RemoteOutcome;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::any::TypeId;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Erased remote execution: decode the payload, run `dinvoke`, encode the result.
pub type RemoteExecFn = Arc<
    dyn Fn(Vec<u8>, NodeId, Arc<ClusterContext>) -> Pin<Box<dyn Future<Output = RemoteOutcome> + Send>>
        + Send
        + Sync,
>;

#[derive(Clone)]
enum TypeKind {
    Task(RemoteExecFn),
    Value,
}

#[derive(Clone)]
struct TypeEntry {
    rust_type: TypeId,
    rust_name: &'static str,
    kind: TypeKind,
}

pub struct TypeRegistry {
    types: DashMap<String, TypeEntry>,
}

impl TypeRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Registers a task type so it can be submitted from and executed on this node.
    pub fn register_task<T: DTask>(&self) -> Result<(), CodecError> {
        let exec: RemoteExecFn = Arc::new(
            |payload: Vec<u8>, sender: NodeId, ctx: Arc<ClusterContext>| {
                Box::pin(execute_decoded::<T>(payload, sender, ctx))
                    as Pin<Box<dyn Future<Output = RemoteOutcome> + Send>>
            },
        );
        self.insert::<T>(TypeKind::Task(exec))
    }

    /// Registers a value type for use with the atomic update engine.
    pub fn register_value<V: AtomicValue>(&self) -> Result<(), CodecError> {
        self.insert::<V>(TypeKind::Value)
    }

    fn insert<T: Wire>(&self, kind: TypeKind) -> Result<(), CodecError> {
        if T::TYPE_ID.is_empty() {
            return Err(CodecError::EmptyTypeId);
        }

        match self.types.entry(T::TYPE_ID.to_string()) {
            Entry::Occupied(existing) => {
                let same_kind = matches!(
                    (&existing.get().kind, &kind),
                    (TypeKind::Task(_), TypeKind::Task(_)) | (TypeKind::Value, TypeKind::Value)
                );
                if existing.get().rust_type == TypeId::of::<T>() && same_kind {
                    return Ok(());
                }
                tracing::error!(
                    "Type id '{}' already taken by {}",
                    T::TYPE_ID,
                    existing.get().rust_name
                );
                Err(CodecError::DuplicateTypeId(T::TYPE_ID.to_string()))
            }
            Entry::Vacant(slot) => {
                slot.insert(TypeEntry {
                    rust_type: TypeId::of::<T>(),
                    rust_name: std::any::type_name::<T>(),
                    kind,
                });
                tracing::info!("Registered wire type: {}", T::TYPE_ID);
                Ok(())
            }
        }
    }

    /// Fails unless `T` is registered as a task under its own type id.
    pub fn ensure_task<T: DTask>(&self) -> Result<(), CodecError> {
        match self.types.get(T::TYPE_ID) {
            Some(entry)
                if entry.rust_type == TypeId::of::<T>()
                    && matches!(entry.kind, TypeKind::Task(_)) =>
            {
                Ok(())
            }
            _ => Err(CodecError::Unregistered(T::TYPE_ID.to_string())),
        }
    }

    /// Fails unless `V` is registered as an atomic value.
    pub fn ensure_value<V: AtomicValue>(&self) -> Result<(), CodecError> {
        match self.types.get(V::TYPE_ID) {
            Some(entry)
                if entry.rust_type == TypeId::of::<V>() && matches!(entry.kind, TypeKind::Value) =>
            {
                Ok(())
            }
            _ => Err(CodecError::Unregistered(V::TYPE_ID.to_string())),
        }
    }

    /// Looks up the remote executor for an incoming request.
    pub fn executor(&self, type_id: &str) -> Option<RemoteExecFn> {
        self.types.get(type_id).and_then(|entry| match &entry.kind {
            TypeKind::Task(exec) => Some(exec.clone()),
            TypeKind::Value => None,
        })
    }

    pub fn list_types(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.types.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    pub fn has_type(&self, type_id: &str) -> bool {
        self.types.contains_key(type_id)
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self {
            types: DashMap::new(),
        }
    }
}
