//! Shared harness for end-to-end reconcile tests: in-memory stores, caches,
//! a fake chart engine, and a recording event sink.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    PersistentVolume, PersistentVolumeClaim, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use submarine_operator::cache::Caches;
use submarine_operator::charts::{ChartEngine, ChartHandle};
use submarine_operator::crd::{
    DatabaseSpec, IngressRoute, ServerSpec, StorageSpec, Submarine, SubmarineSpec,
    TensorboardSpec,
};
use submarine_operator::error::OperatorResult;
use submarine_operator::events::{EventRecorder, EventSeverity};
use submarine_operator::queue::{Intent, WorkItem};
use submarine_operator::reconciler::Reconciler;
use submarine_operator::store::{MemoryStore, ObjectStore, Stores};

/// Chart engine fake tracking install/uninstall calls.
#[derive(Default)]
pub struct FakeChartEngine {
    installed: Mutex<HashSet<(String, String)>>,
    installs: Mutex<Vec<ChartHandle>>,
    uninstalls: Mutex<Vec<ChartHandle>>,
}

impl FakeChartEngine {
    pub fn installs(&self) -> Vec<ChartHandle> {
        self.installs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn uninstalls(&self) -> Vec<ChartHandle> {
        self.uninstalls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl ChartEngine for FakeChartEngine {
    async fn is_installed(&self, release: &str, namespace: &str) -> OperatorResult<bool> {
        Ok(self
            .installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&(release.to_string(), namespace.to_string())))
    }

    async fn install(
        &self,
        release: &str,
        _chart_path: &Path,
        namespace: &str,
    ) -> OperatorResult<ChartHandle> {
        let handle = ChartHandle {
            release: release.to_string(),
            namespace: namespace.to_string(),
        };
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert((release.to_string(), namespace.to_string()));
        self.installs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.clone());
        Ok(handle)
    }

    async fn uninstall(&self, handle: &ChartHandle) -> OperatorResult<()> {
        self.installed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&(handle.release.clone(), handle.namespace.clone()));
        self.uninstalls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.clone());
        Ok(())
    }
}

/// One recorded event.
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub severity: EventSeverity,
    pub reason: String,
    pub message: String,
}

/// Event recorder fake capturing everything it is handed.
#[derive(Default)]
pub struct RecordingRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingRecorder {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl EventRecorder for RecordingRecorder {
    async fn event(
        &self,
        _submarine: &Submarine,
        severity: EventSeverity,
        reason: &str,
        message: &str,
    ) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(RecordedEvent {
                severity,
                reason: reason.to_string(),
                message: message.to_string(),
            });
    }
}

/// In-memory operator wiring with direct access to every store.
pub struct Harness {
    pub submarines: MemoryStore<Submarine>,
    pub deployments: MemoryStore<Deployment>,
    pub services: MemoryStore<Service>,
    pub service_accounts: MemoryStore<ServiceAccount>,
    pub persistent_volumes: MemoryStore<PersistentVolume>,
    pub persistent_volume_claims: MemoryStore<PersistentVolumeClaim>,
    pub ingresses: MemoryStore<Ingress>,
    pub ingress_routes: MemoryStore<IngressRoute>,
    pub cluster_roles: MemoryStore<ClusterRole>,
    pub cluster_role_bindings: MemoryStore<ClusterRoleBinding>,
    pub caches: Caches,
    pub charts: Arc<FakeChartEngine>,
    pub recorder: Arc<RecordingRecorder>,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        let submarines = MemoryStore::<Submarine>::new();
        let deployments = MemoryStore::<Deployment>::new();
        let services = MemoryStore::<Service>::new();
        let service_accounts = MemoryStore::<ServiceAccount>::new();
        let persistent_volumes = MemoryStore::<PersistentVolume>::new();
        let persistent_volume_claims = MemoryStore::<PersistentVolumeClaim>::new();
        let ingresses = MemoryStore::<Ingress>::new();
        let ingress_routes = MemoryStore::<IngressRoute>::new();
        let cluster_roles = MemoryStore::<ClusterRole>::new();
        let cluster_role_bindings = MemoryStore::<ClusterRoleBinding>::new();

        let stores = Stores {
            submarines: Arc::new(submarines.clone()),
            deployments: Arc::new(deployments.clone()),
            services: Arc::new(services.clone()),
            service_accounts: Arc::new(service_accounts.clone()),
            persistent_volumes: Arc::new(persistent_volumes.clone()),
            persistent_volume_claims: Arc::new(persistent_volume_claims.clone()),
            ingresses: Arc::new(ingresses.clone()),
            ingress_routes: Arc::new(ingress_routes.clone()),
            cluster_roles: Arc::new(cluster_roles.clone()),
            cluster_role_bindings: Arc::new(cluster_role_bindings.clone()),
        };

        let caches = Caches::new();
        let charts = Arc::new(FakeChartEngine::default());
        let recorder = Arc::new(RecordingRecorder::default());
        let reconciler = Reconciler::new(
            stores,
            caches.clone(),
            recorder.clone(),
            charts.clone(),
            "charts",
        );

        Self {
            submarines,
            deployments,
            services,
            service_accounts,
            persistent_volumes,
            persistent_volume_claims,
            ingresses,
            ingress_routes,
            cluster_roles,
            cluster_role_bindings,
            caches,
            charts,
            recorder,
            reconciler,
        }
    }

    /// Create the parent in the store and make it visible to the caches.
    pub async fn seed_submarine(&self, submarine: Submarine) -> Submarine {
        let namespace = submarine.metadata.namespace.clone();
        let created = self
            .submarines
            .create(namespace.as_deref(), &submarine)
            .await
            .expect("failed to seed submarine");
        self.refresh_caches().await;
        created
    }

    /// Copy every store's content into the caches, simulating the informer
    /// catching up with the store between reconciles.
    pub async fn refresh_caches(&self) {
        self.caches.submarines.replace(list(&self.submarines).await);
        self.caches.deployments.replace(list(&self.deployments).await);
        self.caches.services.replace(list(&self.services).await);
        self.caches
            .service_accounts
            .replace(list(&self.service_accounts).await);
        self.caches
            .persistent_volumes
            .replace(list(&self.persistent_volumes).await);
        self.caches
            .persistent_volume_claims
            .replace(list(&self.persistent_volume_claims).await);
        self.caches.ingresses.replace(list(&self.ingresses).await);
        self.caches
            .ingress_routes
            .replace(list(&self.ingress_routes).await);
        self.caches
            .cluster_roles
            .replace(list(&self.cluster_roles).await);
        self.caches
            .cluster_role_bindings
            .replace(list(&self.cluster_role_bindings).await);
    }

    /// Run one reconcile for a key.
    pub async fn reconcile(&self, key: &str, intent: Intent) -> OperatorResult<()> {
        self.reconciler
            .sync(&WorkItem {
                key: key.to_string(),
                intent,
            })
            .await
    }

    /// Total writes across every child store (excludes the parent store).
    pub fn child_write_count(&self) -> u64 {
        self.deployments.write_count()
            + self.services.write_count()
            + self.service_accounts.write_count()
            + self.persistent_volumes.write_count()
            + self.persistent_volume_claims.write_count()
            + self.ingresses.write_count()
            + self.ingress_routes.write_count()
            + self.cluster_roles.write_count()
            + self.cluster_role_bindings.write_count()
    }
}

async fn list<K>(store: &MemoryStore<K>) -> Vec<K>
where
    K: kube::Resource<DynamicType = ()>
        + Clone
        + serde::Serialize
        + serde::de::DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    store.list(None).await.expect("list failed")
}

/// The S1 parent: `default/ex`, host-path storage.
pub fn example_submarine() -> Submarine {
    let mut submarine = Submarine::new(
        "ex",
        SubmarineSpec {
            version: "0.6".to_string(),
            server: ServerSpec {
                image: None,
                replicas: 1,
            },
            database: DatabaseSpec {
                image: None,
                replicas: None,
                storage_size: "10Gi".to_string(),
            },
            tensorboard: TensorboardSpec {
                storage_size: "1Gi".to_string(),
            },
            storage: StorageSpec {
                storage_type: "host".to_string(),
                nfs_ip: None,
                nfs_path: None,
                host_path: Some("/tmp/sub".to_string()),
            },
        },
    );
    submarine.metadata.namespace = Some("default".to_string());
    submarine
}
