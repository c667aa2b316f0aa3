//! Object-store abstraction over the cluster API server.
//!
//! The reconciler only ever talks to a [`ObjectStore`] per kind; the
//! production implementation wraps `kube::Api`, and the in-memory
//! implementation backs the test suite. Mutation relies on the store's
//! optimistic-concurrency resource versions; a version mismatch surfaces as
//! [`StoreError::Conflict`] and is retried through the work queue.

mod kube_store;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    PersistentVolume, PersistentVolumeClaim, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use thiserror::Error;

pub use kube_store::{ClusterKubeStore, NamespacedKubeStore};
pub use memory::MemoryStore;

use crate::crd::{IngressRoute, Submarine};

/// Classified object-store failures.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The requested object does not exist.
    #[error("object not found")]
    NotFound,

    /// An object with the same name already exists.
    #[error("object already exists")]
    AlreadyExists,

    /// The update lost an optimistic-concurrency race.
    #[error("resource version conflict")]
    Conflict,

    /// Any other failure (network, timeout, server error). Retryable.
    #[error("store request failed: {0}")]
    Transient(String),
}

impl StoreError {
    /// True when the error means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound)
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// CRUD surface the core requires from the cluster store, per watched kind.
///
/// `namespace` is `Some` for namespaced kinds and `None` for cluster-scoped
/// ones. Watching is not part of this trait; deltas arrive through the
/// informer adapter instead.
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    /// List all objects of the kind, optionally restricted to a namespace.
    async fn list(&self, namespace: Option<&str>) -> StoreResult<Vec<K>>;

    /// Fetch one object by name.
    async fn get(&self, namespace: Option<&str>, name: &str) -> StoreResult<K>;

    /// Create an object, failing with [`StoreError::AlreadyExists`] on a
    /// name collision.
    async fn create(&self, namespace: Option<&str>, obj: &K) -> StoreResult<K>;

    /// Replace an object through the main resource endpoint, failing with
    /// [`StoreError::Conflict`] when the submitted resource version is
    /// stale. For kinds with a registered status subresource, the server
    /// ignores `.status` on this path; use
    /// [`ObjectStore::update_status`] instead.
    async fn update(&self, namespace: Option<&str>, obj: &K) -> StoreResult<K>;

    /// Write only `obj`'s status through the status subresource endpoint.
    /// Everything outside `.status` is ignored.
    async fn update_status(&self, namespace: Option<&str>, obj: &K) -> StoreResult<K>;
}

/// One typed store handle per kind the operator manages.
///
/// Mirrors the per-kind client handles the reconciler needs: children are
/// created and updated through these, while reads during reconciliation go
/// through the informer caches.
#[derive(Clone)]
pub struct Stores {
    /// Submarine parents (status updates).
    pub submarines: Arc<dyn ObjectStore<Submarine>>,
    /// Server, database and tensorboard Deployments.
    pub deployments: Arc<dyn ObjectStore<Deployment>>,
    /// Server, database and tensorboard Services.
    pub services: Arc<dyn ObjectStore<Service>>,
    /// The server ServiceAccount.
    pub service_accounts: Arc<dyn ObjectStore<ServiceAccount>>,
    /// Cluster-scoped PersistentVolumes.
    pub persistent_volumes: Arc<dyn ObjectStore<PersistentVolume>>,
    /// PersistentVolumeClaims.
    pub persistent_volume_claims: Arc<dyn ObjectStore<PersistentVolumeClaim>>,
    /// The server Ingress.
    pub ingresses: Arc<dyn ObjectStore<Ingress>>,
    /// The tensorboard Traefik IngressRoute.
    pub ingress_routes: Arc<dyn ObjectStore<IngressRoute>>,
    /// The server ClusterRole.
    pub cluster_roles: Arc<dyn ObjectStore<ClusterRole>>,
    /// The server ClusterRoleBinding.
    pub cluster_role_bindings: Arc<dyn ObjectStore<ClusterRoleBinding>>,
}

impl Stores {
    /// Build stores backed by the live cluster through a kube client.
    pub fn kube(client: &kube::Client) -> Self {
        Self {
            submarines: Arc::new(NamespacedKubeStore::new(client.clone())),
            deployments: Arc::new(NamespacedKubeStore::new(client.clone())),
            services: Arc::new(NamespacedKubeStore::new(client.clone())),
            service_accounts: Arc::new(NamespacedKubeStore::new(client.clone())),
            persistent_volumes: Arc::new(ClusterKubeStore::new(client.clone())),
            persistent_volume_claims: Arc::new(NamespacedKubeStore::new(client.clone())),
            ingresses: Arc::new(NamespacedKubeStore::new(client.clone())),
            ingress_routes: Arc::new(NamespacedKubeStore::new(client.clone())),
            cluster_roles: Arc::new(ClusterKubeStore::new(client.clone())),
            cluster_role_bindings: Arc::new(ClusterKubeStore::new(client.clone())),
        }
    }
}
