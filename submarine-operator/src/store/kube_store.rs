//! `kube::Api`-backed object stores.

use std::fmt::Debug;
use std::marker::PhantomData;

use async_trait::async_trait;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::api::{ListParams, Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::{ObjectStore, StoreError, StoreResult};

/// Merge patch carrying only the status of `obj`, for the status
/// subresource endpoint.
fn status_patch<K: Serialize>(obj: &K) -> StoreResult<serde_json::Value> {
    let status = serde_json::to_value(obj)
        .map_err(|e| StoreError::Transient(e.to_string()))?
        .get("status")
        .cloned()
        .unwrap_or(serde_json::Value::Null);
    Ok(serde_json::json!({ "status": status }))
}

fn classify(err: kube::Error) -> StoreError {
    match err {
        kube::Error::Api(ae) if ae.code == 404 => StoreError::NotFound,
        kube::Error::Api(ae) if ae.code == 409 && ae.reason == "AlreadyExists" => {
            StoreError::AlreadyExists
        }
        kube::Error::Api(ae) if ae.code == 409 => StoreError::Conflict,
        other => StoreError::Transient(other.to_string()),
    }
}

/// Store for namespaced kinds.
pub struct NamespacedKubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> NamespacedKubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>,
{
    /// Create a store for a namespaced kind.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: Option<&str>) -> StoreResult<Api<K>> {
        let ns = namespace.ok_or_else(|| {
            StoreError::Transient(format!("{} requires a namespace", K::kind(&())))
        })?;
        Ok(Api::namespaced(self.client.clone(), ns))
    }
}

#[async_trait]
impl<K> ObjectStore<K> for NamespacedKubeStore<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<K>> {
        let api = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let objects = api.list(&ListParams::default()).await.map_err(classify)?;
        Ok(objects.items)
    }

    async fn get(&self, namespace: Option<&str>, name: &str) -> StoreResult<K> {
        self.api(namespace)?.get(name).await.map_err(classify)
    }

    async fn create(&self, namespace: Option<&str>, obj: &K) -> StoreResult<K> {
        self.api(namespace)?
            .create(&PostParams::default(), obj)
            .await
            .map_err(classify)
    }

    async fn update(&self, namespace: Option<&str>, obj: &K) -> StoreResult<K> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Transient("object has no name".to_string()))?;
        self.api(namespace)?
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(classify)
    }

    async fn update_status(&self, namespace: Option<&str>, obj: &K) -> StoreResult<K> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Transient("object has no name".to_string()))?;
        let patch = status_patch(obj)?;
        self.api(namespace)?
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(classify)
    }
}

/// Store for cluster-scoped kinds.
pub struct ClusterKubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> ClusterKubeStore<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>,
{
    /// Create a store for a cluster-scoped kind.
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self) -> Api<K> {
        Api::all(self.client.clone())
    }
}

#[async_trait]
impl<K> ObjectStore<K> for ClusterKubeStore<K>
where
    K: Resource<Scope = ClusterResourceScope, DynamicType = ()>
        + Clone
        + Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    async fn list(&self, _namespace: Option<&str>) -> StoreResult<Vec<K>> {
        let objects = self
            .api()
            .list(&ListParams::default())
            .await
            .map_err(classify)?;
        Ok(objects.items)
    }

    async fn get(&self, _namespace: Option<&str>, name: &str) -> StoreResult<K> {
        self.api().get(name).await.map_err(classify)
    }

    async fn create(&self, _namespace: Option<&str>, obj: &K) -> StoreResult<K> {
        self.api()
            .create(&PostParams::default(), obj)
            .await
            .map_err(classify)
    }

    async fn update(&self, _namespace: Option<&str>, obj: &K) -> StoreResult<K> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Transient("object has no name".to_string()))?;
        self.api()
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(classify)
    }

    async fn update_status(&self, _namespace: Option<&str>, obj: &K) -> StoreResult<K> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| StoreError::Transient("object has no name".to_string()))?;
        let patch = status_patch(obj)?;
        self.api()
            .patch_status(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(classify)
    }
}
