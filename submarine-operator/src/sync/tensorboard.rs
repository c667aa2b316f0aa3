//! Tensorboard syncer: volume, claim, Deployment, Service, and the Traefik
//! IngressRoute exposing it under `/tensorboard`.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, PersistentVolumeClaimVolumeSource, PodSpec, PodTemplateSpec,
    Service, ServicePort, ServiceSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use crate::crd::{IngressRoute, IngressRouteSpec, Submarine, TraefikRoute, TraefikServiceRef};
use crate::error::OperatorResult;
use crate::reconciler::Reconciler;

use super::{
    controller_ref, new_persistent_volume, new_persistent_volume_claim, pv_backing,
    TENSORBOARD_NAME,
};

fn pod_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("app".to_string(), format!("{TENSORBOARD_NAME}-pod"));
    labels
}

fn new_tensorboard_deployment(pvc_name: &str, oref: &OwnerReference) -> Deployment {
    Deployment {
        metadata: ObjectMeta {
            name: Some(TENSORBOARD_NAME.to_string()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            selector: LabelSelector {
                match_labels: Some(pod_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![Container {
                        name: format!("{TENSORBOARD_NAME}-container"),
                        image: Some("tensorflow/tensorflow:1.11.0".to_string()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        command: Some(vec![
                            "tensorboard".to_string(),
                            "--logdir=/logs".to_string(),
                            "--path_prefix=/tensorboard".to_string(),
                        ]),
                        ports: Some(vec![ContainerPort {
                            container_port: 6006,
                            ..Default::default()
                        }]),
                        volume_mounts: Some(vec![VolumeMount {
                            mount_path: "/logs".to_string(),
                            name: "volume".to_string(),
                            sub_path: Some(TENSORBOARD_NAME.to_string()),
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

fn new_tensorboard_service(oref: &OwnerReference) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(format!("{TENSORBOARD_NAME}-service")),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(pod_labels()),
            ports: Some(vec![ServicePort {
                protocol: Some("TCP".to_string()),
                port: 8080,
                target_port: Some(IntOrString::Int(6006)),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn new_tensorboard_ingress_route(oref: &OwnerReference) -> IngressRoute {
    let mut route = IngressRoute::new(
        &format!("{TENSORBOARD_NAME}-ingressroute"),
        IngressRouteSpec {
            entry_points: vec!["web".to_string()],
            routes: vec![TraefikRoute {
                kind: "Rule".to_string(),
                match_expr: "PathPrefix(`/tensorboard`)".to_string(),
                services: vec![TraefikServiceRef {
                    name: format!("{TENSORBOARD_NAME}-service"),
                    port: 8080,
                    kind: Some("Service".to_string()),
                }],
            }],
        },
    );
    route.metadata.owner_references = Some(vec![oref.clone()]);
    route
}

impl Reconciler {
    /// Ensure the tensorboard volume, claim, Deployment, Service, and
    /// IngressRoute. Skipped entirely (with a warning) when the storage type
    /// is unrecognized, mirroring the database syncer.
    pub(crate) async fn sync_tensorboard(
        &self,
        submarine: &Submarine,
        namespace: &str,
    ) -> OperatorResult<()> {
        let oref = controller_ref(submarine)?;

        let Some(backing) = pv_backing(&submarine.spec.storage) else {
            tracing::warn!(
                storage_type = %submarine.spec.storage.storage_type,
                "unrecognized storage type in submarine spec, skipping tensorboard resources"
            );
            return Ok(());
        };

        let pv_name = format!("{TENSORBOARD_NAME}-pv--{namespace}");
        self.ensure(
            &self.stores.persistent_volumes,
            &self.caches.persistent_volumes,
            submarine,
            None,
            new_persistent_volume(
                &pv_name,
                &submarine.spec.tensorboard.storage_size,
                backing,
                &oref,
            ),
        )
        .await?;

        let pvc_name = format!("{TENSORBOARD_NAME}-pvc");
        self.ensure(
            &self.stores.persistent_volume_claims,
            &self.caches.persistent_volume_claims,
            submarine,
            Some(namespace),
            new_persistent_volume_claim(
                &pvc_name,
                &pv_name,
                &submarine.spec.tensorboard.storage_size,
                &oref,
            ),
        )
        .await?;

        self.ensure(
            &self.stores.deployments,
            &self.caches.deployments,
            submarine,
            Some(namespace),
            new_tensorboard_deployment(&pvc_name, &oref),
        )
        .await?;

        self.ensure(
            &self.stores.services,
            &self.caches.services,
            submarine,
            Some(namespace),
            new_tensorboard_service(&oref),
        )
        .await?;

        self.ensure(
            &self.stores.ingress_routes,
            &self.caches.ingress_routes,
            submarine,
            Some(namespace),
            new_tensorboard_ingress_route(&oref),
        )
        .await?;

        Ok(())
    }
}
