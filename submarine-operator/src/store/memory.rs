//! In-memory object store with optimistic concurrency.
//!
//! Backs the test suite; behaves like the remote store contract the
//! reconciler is written against: monotonic resource versions, `Conflict`
//! on stale updates, `AlreadyExists` on create races, and status
//! subresource protection. The last one mirrors the API server with a
//! registered status subresource: a main-endpoint `update` silently keeps
//! the stored status, and `update_status` touches nothing but `.status`,
//! so a status write routed through the wrong endpoint fails the tests
//! instead of passing by accident.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::cache::ObjectKey;

use super::{ObjectStore, StoreError, StoreResult};

fn to_json<K: Serialize>(obj: &K) -> StoreResult<Value> {
    serde_json::to_value(obj).map_err(|e| StoreError::Transient(e.to_string()))
}

fn from_json<K: DeserializeOwned>(value: Value) -> StoreResult<K> {
    serde_json::from_value(value).map_err(|e| StoreError::Transient(e.to_string()))
}

fn with_status(mut target: Value, status: Option<Value>) -> Value {
    if let Some(map) = target.as_object_mut() {
        match status {
            Some(status) => {
                map.insert("status".to_string(), status);
            }
            None => {
                map.remove("status");
            }
        }
    }
    target
}

/// In-memory store for one kind.
pub struct MemoryStore<K> {
    objects: Arc<RwLock<BTreeMap<ObjectKey, K>>>,
    revision: Arc<AtomicU64>,
    writes: Arc<AtomicU64>,
}

impl<K> Clone for MemoryStore<K> {
    fn clone(&self) -> Self {
        Self {
            objects: Arc::clone(&self.objects),
            revision: Arc::clone(&self.revision),
            writes: Arc::clone(&self.writes),
        }
    }
}

impl<K> Default for MemoryStore<K> {
    fn default() -> Self {
        Self {
            objects: Arc::new(RwLock::new(BTreeMap::new())),
            revision: Arc::new(AtomicU64::new(0)),
            writes: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl<K> MemoryStore<K>
where
    K: Resource<DynamicType = ()> + Clone,
{
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of create/update calls served. Lets tests assert that a
    /// reconcile pass performed no writes.
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    /// Snapshot of every stored object.
    pub fn snapshot(&self) -> Vec<K> {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn next_revision(&self) -> String {
        self.revision.fetch_add(1, Ordering::SeqCst).wrapping_add(1).to_string()
    }

    fn key_for(namespace: Option<&str>, obj: &K) -> StoreResult<ObjectKey> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Transient("object has no name".to_string()))?;
        let namespace = namespace
            .map(str::to_string)
            .or_else(|| obj.meta().namespace.clone());
        Ok(ObjectKey { namespace, name })
    }
}

#[async_trait]
impl<K> ObjectStore<K> for MemoryStore<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<K>> {
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        Ok(objects
            .iter()
            .filter(|(key, _)| namespace.is_none() || key.namespace.as_deref() == namespace)
            .map(|(_, obj)| obj.clone())
            .collect())
    }

    async fn get(&self, namespace: Option<&str>, name: &str) -> StoreResult<K> {
        let key = ObjectKey {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        };
        let objects = self.objects.read().unwrap_or_else(PoisonError::into_inner);
        objects.get(&key).cloned().ok_or(StoreError::NotFound)
    }

    async fn create(&self, namespace: Option<&str>, obj: &K) -> StoreResult<K> {
        let key = Self::key_for(namespace, obj)?;
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        if objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists);
        }

        // Status is subresource-only; created objects start without one.
        let mut stored: K = from_json(with_status(to_json(obj)?, None))?;
        let revision = self.next_revision();
        stored.meta_mut().namespace = key.namespace.clone();
        stored.meta_mut().resource_version = Some(revision.clone());
        if stored.meta().uid.is_none() {
            stored.meta_mut().uid = Some(format!("mem-uid-{revision}"));
        }
        objects.insert(key, stored.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored)
    }

    async fn update(&self, namespace: Option<&str>, obj: &K) -> StoreResult<K> {
        let key = Self::key_for(namespace, obj)?;
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let current = objects.get(&key).ok_or(StoreError::NotFound)?;

        let submitted = obj.meta().resource_version.as_deref();
        let stored = current.meta().resource_version.as_deref();
        if let (Some(submitted), Some(stored)) = (submitted, stored) {
            if submitted != stored {
                return Err(StoreError::Conflict);
            }
        }

        // Main-endpoint writes cannot touch the status subresource; the
        // stored status survives whatever the caller submitted.
        let current_status = to_json(current)?.get("status").cloned();
        let mut updated: K = from_json(with_status(to_json(obj)?, current_status))?;
        updated.meta_mut().namespace = key.namespace.clone();
        updated.meta_mut().resource_version = Some(self.next_revision());
        if updated.meta().uid.is_none() {
            updated.meta_mut().uid = current.meta().uid.clone();
        }
        objects.insert(key, updated.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }

    async fn update_status(&self, namespace: Option<&str>, obj: &K) -> StoreResult<K> {
        let key = Self::key_for(namespace, obj)?;
        let mut objects = self.objects.write().unwrap_or_else(PoisonError::into_inner);
        let current = objects.get(&key).ok_or(StoreError::NotFound)?;

        let submitted = obj.meta().resource_version.as_deref();
        let stored = current.meta().resource_version.as_deref();
        if let (Some(submitted), Some(stored)) = (submitted, stored) {
            if submitted != stored {
                return Err(StoreError::Conflict);
            }
        }

        // Only `.status` moves; spec and metadata stay as stored.
        let incoming_status = to_json(obj)?.get("status").cloned();
        let mut updated: K = from_json(with_status(to_json(current)?, incoming_status))?;
        updated.meta_mut().resource_version = Some(self.next_revision());
        objects.insert(key, updated.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(updated)
    }
}
