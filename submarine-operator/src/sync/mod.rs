//! Per-subresource syncers.
//!
//! Every syncer follows the same ensure contract: look the child up in the
//! local cache by its deterministic name, create it with the parent's
//! controller owner reference when absent, and refuse to touch it when it
//! exists but is not controlled by this parent. The generic driver lives in
//! [`Reconciler::ensure`]; the per-resource modules contribute the desired
//! objects and the drift checks.

mod database;
mod ingress;
mod rbac;
mod server;
mod subcharts;
mod tensorboard;

use std::collections::BTreeMap;
use std::sync::Arc;

use k8s_openapi::api::core::v1::{
    HostPathVolumeSource, NFSVolumeSource, PersistentVolume, PersistentVolumeClaim,
    PersistentVolumeClaimSpec, PersistentVolumeSpec, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::cache::ObjectCache;
use crate::crd::{StorageSpec, Submarine};
use crate::error::{OperatorError, OperatorResult};
use crate::events::{message_resource_exists, EventSeverity, REASON_ERR_RESOURCE_EXISTS};
use crate::reconciler::Reconciler;
use crate::store::ObjectStore;

pub(crate) const SERVER_NAME: &str = "submarine-server";
pub(crate) const DATABASE_NAME: &str = "submarine-database";
pub(crate) const TENSORBOARD_NAME: &str = "submarine-tensorboard";

/// Controller owner reference pointing at the parent.
pub(crate) fn controller_ref(submarine: &Submarine) -> OperatorResult<OwnerReference> {
    submarine
        .controller_owner_ref(&())
        .ok_or_else(|| OperatorError::MissingUid {
            name: submarine.name_any(),
        })
}

/// Whether `meta` carries a controller back-reference to this parent.
pub(crate) fn is_controlled_by(meta: &ObjectMeta, submarine: &Submarine) -> bool {
    let Some(parent_uid) = submarine.meta().uid.as_deref() else {
        return false;
    };
    meta.owner_references
        .as_deref()
        .unwrap_or_default()
        .iter()
        .any(|r| r.controller == Some(true) && r.kind == "Submarine" && r.uid == parent_uid)
}

impl Reconciler {
    /// Ensure one child exists and is controlled by the parent.
    ///
    /// Absent children are created from `desired` (a create that loses the
    /// race surfaces as `AlreadyExists` and resolves on the next reconcile,
    /// once the cache has caught up). Present children are never mutated
    /// here; the caller handles field-level drift on the returned live
    /// object.
    pub(crate) async fn ensure<K>(
        &self,
        store: &Arc<dyn ObjectStore<K>>,
        cache: &ObjectCache<K>,
        submarine: &Submarine,
        namespace: Option<&str>,
        desired: K,
    ) -> OperatorResult<K>
    where
        K: Resource<DynamicType = ()> + Clone,
    {
        let name = desired.meta().name.clone().unwrap_or_default();

        let Some(live) = cache.get(namespace, &name) else {
            tracing::info!(kind = %K::kind(&()), name = %name, "creating child resource");
            return Ok(store.create(namespace, &desired).await?);
        };

        if !is_controlled_by(live.meta(), submarine) {
            let message = message_resource_exists(&name);
            self.recorder
                .event(
                    submarine,
                    EventSeverity::Warning,
                    REASON_ERR_RESOURCE_EXISTS,
                    &message,
                )
                .await;
            return Err(OperatorError::ResourceExists { name });
        }

        Ok(live)
    }
}

/// Volume backing selected by the parent's storage type.
pub(crate) enum PvBacking {
    Nfs(NFSVolumeSource),
    HostPath(HostPathVolumeSource),
}

/// Map the spec's storage type to a persistent-volume source. `None` means
/// the type is unrecognized and the volume-bearing syncer must be skipped.
pub(crate) fn pv_backing(storage: &StorageSpec) -> Option<PvBacking> {
    match storage.storage_type.as_str() {
        "nfs" => Some(PvBacking::Nfs(NFSVolumeSource {
            server: storage.nfs_ip.clone().unwrap_or_default(),
            path: storage.nfs_path.clone().unwrap_or_default(),
            read_only: None,
        })),
        "host" => Some(PvBacking::HostPath(HostPathVolumeSource {
            path: storage.host_path.clone().unwrap_or_default(),
            type_: Some("DirectoryOrCreate".to_string()),
        })),
        _ => None,
    }
}

fn storage_quantity(size: &str) -> BTreeMap<String, Quantity> {
    let mut map = BTreeMap::new();
    map.insert("storage".to_string(), Quantity(size.to_string()));
    map
}

/// Cluster-scoped PersistentVolume; the name carries a `--<namespace>`
/// suffix to disambiguate across namespaces.
pub(crate) fn new_persistent_volume(
    name: &str,
    size: &str,
    backing: PvBacking,
    oref: &OwnerReference,
) -> PersistentVolume {
    let mut spec = PersistentVolumeSpec {
        access_modes: Some(vec!["ReadWriteMany".to_string()]),
        capacity: Some(storage_quantity(size)),
        ..Default::default()
    };
    match backing {
        PvBacking::Nfs(nfs) => spec.nfs = Some(nfs),
        PvBacking::HostPath(host_path) => spec.host_path = Some(host_path),
    }

    PersistentVolume {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(spec),
        ..Default::default()
    }
}

/// Claim bound to a named PV. The empty storage class disables dynamic
/// provisioning so the claim can only bind the pre-created volume.
pub(crate) fn new_persistent_volume_claim(
    name: &str,
    pv_name: &str,
    size: &str,
    oref: &OwnerReference,
) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(vec!["ReadWriteMany".to_string()]),
            resources: Some(VolumeResourceRequirements {
                requests: Some(storage_quantity(size)),
                ..Default::default()
            }),
            volume_name: Some(pv_name.to_string()),
            storage_class_name: Some(String::new()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use crate::crd::StorageSpec;

    use super::*;

    fn storage(storage_type: &str) -> StorageSpec {
        StorageSpec {
            storage_type: storage_type.to_string(),
            nfs_ip: Some("10.0.0.10".to_string()),
            nfs_path: Some("/export".to_string()),
            host_path: Some("/tmp/sub".to_string()),
        }
    }

    #[test]
    fn backing_follows_storage_type() {
        assert!(matches!(
            pv_backing(&storage("nfs")),
            Some(PvBacking::Nfs(_))
        ));
        assert!(matches!(
            pv_backing(&storage("host")),
            Some(PvBacking::HostPath(_))
        ));
        assert!(pv_backing(&storage("foo")).is_none());
    }

    #[test]
    fn host_backing_creates_missing_directories() {
        let Some(PvBacking::HostPath(host)) = pv_backing(&storage("host")) else {
            panic!("expected host path backing");
        };
        assert_eq!(host.path, "/tmp/sub");
        assert_eq!(host.type_.as_deref(), Some("DirectoryOrCreate"));
    }

    #[test]
    fn claim_pins_volume_and_disables_dynamic_provisioning() {
        let oref = OwnerReference::default();
        let pvc = new_persistent_volume_claim("c", "v", "10Gi", &oref);
        let spec = pvc.spec.expect("claim spec");
        assert_eq!(spec.volume_name.as_deref(), Some("v"));
        assert_eq!(spec.storage_class_name.as_deref(), Some(""));
        assert_eq!(spec.access_modes.as_deref(), Some(&["ReadWriteMany".to_string()][..]));
    }
}
