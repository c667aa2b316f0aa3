//! Submarine database syncer: PersistentVolume, claim, Deployment, Service.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PersistentVolumeClaimVolumeSource, PodSpec,
    PodTemplateSpec, Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use crate::crd::Submarine;
use crate::error::OperatorResult;
use crate::reconciler::Reconciler;

use super::{
    controller_ref, new_persistent_volume, new_persistent_volume_claim, pv_backing, DATABASE_NAME,
};

fn app_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), DATABASE_NAME.to_string());
    labels
}

fn new_database_deployment(
    submarine: &Submarine,
    pvc_name: &str,
    oref: &OwnerReference,
) -> Deployment {
    let image = submarine
        .spec
        .database
        .image
        .clone()
        .filter(|image| !image.is_empty())
        .unwrap_or_else(|| format!("apache/submarine:database-{}", submarine.spec.version));

    Deployment {
        metadata: ObjectMeta {
            name: Some(DATABASE_NAME.to_string()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: submarine.spec.database.replicas,
            selector: LabelSelector {
                match_labels: Some(app_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(app_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: DATABASE_NAME.to_string(),
                        image: Some(image),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        ports: Some(vec![ContainerPort {
                            container_port: 3306,
                            ..Default::default()
                        }]),
                        env: Some(vec![EnvVar {
                            name: "MYSQL_ROOT_PASSWORD".to_string(),
                            value: Some("password".to_string()),
                            value_from: None,
                        }]),
                        volume_mounts: Some(vec![VolumeMount {
                            mount_path: "/var/lib/mysql".to_string(),
                            name: "volume".to_string(),
                            sub_path: Some(DATABASE_NAME.to_string()),
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    volumes: Some(vec![Volume {
                        name: "volume".to_string(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
                            claim_name: pvc_name.to_string(),
                            read_only: None,
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn new_database_service(oref: &OwnerReference) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(DATABASE_NAME.to_string()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port: 3306,
                target_port: Some(IntOrString::Int(3306)),
                name: Some(DATABASE_NAME.to_string()),
                ..Default::default()
            }]),
            selector: Some(app_labels()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl Reconciler {
    /// Ensure the database volume, claim, Deployment, and Service.
    ///
    /// Returns `None` when the parent's storage type is unrecognized: the
    /// whole database is skipped with a warning and the reconcile continues
    /// with the remaining syncers.
    pub(crate) async fn sync_database(
        &self,
        submarine: &Submarine,
        namespace: &str,
    ) -> OperatorResult<Option<Deployment>> {
        let oref = controller_ref(submarine)?;

        let Some(backing) = pv_backing(&submarine.spec.storage) else {
            tracing::warn!(
                storage_type = %submarine.spec.storage.storage_type,
                "unrecognized storage type in submarine spec, skipping database resources"
            );
            return Ok(None);
        };

        // PersistentVolumes are cluster-scoped; the namespace suffix keeps
        // parents in different namespaces from colliding.
        let pv_name = format!("{DATABASE_NAME}-pv--{namespace}");
        self.ensure(
            &self.stores.persistent_volumes,
            &self.caches.persistent_volumes,
            submarine,
            None,
            new_persistent_volume(
                &pv_name,
                &submarine.spec.database.storage_size,
                backing,
                &oref,
            ),
        )
        .await?;

        let pvc_name = format!("{DATABASE_NAME}-pvc");
        self.ensure(
            &self.stores.persistent_volume_claims,
            &self.caches.persistent_volume_claims,
            submarine,
            Some(namespace),
            new_persistent_volume_claim(
                &pvc_name,
                &pv_name,
                &submarine.spec.database.storage_size,
                &oref,
            ),
        )
        .await?;

        let mut deployment = self
            .ensure(
                &self.stores.deployments,
                &self.caches.deployments,
                submarine,
                Some(namespace),
                new_database_deployment(submarine, &pvc_name, &oref),
            )
            .await?;

        if let Some(desired) = submarine.spec.database.replicas {
            let live = deployment.spec.as_ref().and_then(|s| s.replicas);
            if live != Some(desired) {
                tracing::debug!(
                    name = %DATABASE_NAME,
                    desired,
                    live = ?live,
                    "database replicas drifted, restoring"
                );
                deployment = self
                    .stores
                    .deployments
                    .update(
                        Some(namespace),
                        &new_database_deployment(submarine, &pvc_name, &oref),
                    )
                    .await?;
            }
        }

        self.ensure(
            &self.stores.services,
            &self.caches.services,
            submarine,
            Some(namespace),
            new_database_service(&oref),
        )
        .await?;

        Ok(Some(deployment))
    }
}
