//! Informer-fed object caches (listers).
//!
//! Reconciliation reads go through these in-memory caches rather than the
//! remote store; the informer adapter keeps them current from the watch
//! stream. Reads are synchronous and never block on I/O.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    PersistentVolume, PersistentVolumeClaim, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::{Resource, ResourceExt};

use crate::crd::{IngressRoute, Submarine};

/// Identity of a cached object: `namespace` is `None` for cluster-scoped
/// kinds.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    /// Namespace, when the kind is namespaced.
    pub namespace: Option<String>,
    /// Object name.
    pub name: String,
}

impl ObjectKey {
    /// Key of a live object, taken from its metadata.
    pub fn of<K: Resource<DynamicType = ()>>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Thread-safe cache of one kind, keyed by namespace and name.
pub struct ObjectCache<K> {
    objects: Arc<RwLock<HashMap<ObjectKey, K>>>,
    synced: Arc<AtomicBool>,
}

impl<K> Clone for ObjectCache<K> {
    fn clone(&self) -> Self {
        Self {
            objects: Arc::clone(&self.objects),
            synced: Arc::clone(&self.synced),
        }
    }
}

impl<K> Default for ObjectCache<K> {
    fn default() -> Self {
        Self {
            objects: Arc::new(RwLock::new(HashMap::new())),
            synced: Arc::new(AtomicBool::new(false)),
        }
    }
}

impl<K> ObjectCache<K>
where
    K: Resource<DynamicType = ()> + Clone,
{
    /// Create an empty, not-yet-synced cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an object by namespace and name.
    pub fn get(&self, namespace: Option<&str>, name: &str) -> Option<K> {
        let key = ObjectKey {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        };
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    /// Insert or replace an object under its own metadata key.
    pub fn upsert(&self, obj: K) {
        let key = ObjectKey::of(&obj);
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, obj);
    }

    /// Remove an object.
    pub fn remove(&self, obj: &K) {
        let key = ObjectKey::of(obj);
        self.objects
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&key);
    }

    /// Replace the whole cache content, e.g. after a relist.
    pub fn replace(&self, objects: Vec<K>) {
        let mut map = HashMap::with_capacity(objects.len());
        for obj in objects {
            map.insert(ObjectKey::of(&obj), obj);
        }
        *self
            .objects
            .write()
            .unwrap_or_else(PoisonError::into_inner) = map;
    }

    /// Number of cached objects.
    pub fn len(&self) -> usize {
        self.objects
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// True when the cache holds no objects.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark the initial list as complete.
    pub fn mark_synced(&self) {
        self.synced.store(true, Ordering::SeqCst);
    }

    /// Whether the initial list has completed.
    pub fn has_synced(&self) -> bool {
        self.synced.load(Ordering::SeqCst)
    }
}

/// The full set of caches the operator maintains, one per watched kind.
#[derive(Clone, Default)]
pub struct Caches {
    /// Submarine parents.
    pub submarines: ObjectCache<Submarine>,
    /// Deployments.
    pub deployments: ObjectCache<Deployment>,
    /// Services.
    pub services: ObjectCache<Service>,
    /// ServiceAccounts.
    pub service_accounts: ObjectCache<ServiceAccount>,
    /// PersistentVolumes (cluster-scoped).
    pub persistent_volumes: ObjectCache<PersistentVolume>,
    /// PersistentVolumeClaims.
    pub persistent_volume_claims: ObjectCache<PersistentVolumeClaim>,
    /// Ingresses.
    pub ingresses: ObjectCache<Ingress>,
    /// Traefik IngressRoutes.
    pub ingress_routes: ObjectCache<IngressRoute>,
    /// ClusterRoles (cluster-scoped).
    pub cluster_roles: ObjectCache<ClusterRole>,
    /// ClusterRoleBindings (cluster-scoped).
    pub cluster_role_bindings: ObjectCache<ClusterRoleBinding>,
}

impl Caches {
    /// Create the empty cache set.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Maps a child kind to its cache inside [`Caches`]; lets one generic
/// informer handler serve every watched child kind.
pub trait Cached: Sized {
    /// The cache holding objects of this kind.
    fn cache(caches: &Caches) -> &ObjectCache<Self>;
}

macro_rules! cached {
    ($kind:ty, $field:ident) => {
        impl Cached for $kind {
            fn cache(caches: &Caches) -> &ObjectCache<Self> {
                &caches.$field
            }
        }
    };
}

cached!(Deployment, deployments);
cached!(Service, services);
cached!(ServiceAccount, service_accounts);
cached!(PersistentVolume, persistent_volumes);
cached!(PersistentVolumeClaim, persistent_volume_claims);
cached!(Ingress, ingresses);
cached!(IngressRoute, ingress_routes);
cached!(ClusterRole, cluster_roles);
cached!(ClusterRoleBinding, cluster_role_bindings);
