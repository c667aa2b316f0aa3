//! Submarine server syncer: ServiceAccount, Service, and Deployment.

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EnvVar, PodSpec, PodTemplateSpec, Service, ServiceAccount,
    ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, OwnerReference};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::ObjectMeta;

use crate::crd::Submarine;
use crate::error::OperatorResult;
use crate::reconciler::Reconciler;

use super::{controller_ref, SERVER_NAME};

fn run_labels() -> BTreeMap<String, String> {
    let mut labels = BTreeMap::new();
    labels.insert("run".to_string(), SERVER_NAME.to_string());
    labels
}

fn env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

fn new_server_service_account(oref: &OwnerReference) -> ServiceAccount {
    ServiceAccount {
        metadata: ObjectMeta {
            name: Some(SERVER_NAME.to_string()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn new_server_service(oref: &OwnerReference) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(SERVER_NAME.to_string()),
            labels: Some(run_labels()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            ports: Some(vec![ServicePort {
                port: 8080,
                target_port: Some(IntOrString::Int(8080)),
                protocol: Some("TCP".to_string()),
                ..Default::default()
            }]),
            selector: Some(run_labels()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn new_server_deployment(
    submarine: &Submarine,
    namespace: &str,
    oref: &OwnerReference,
) -> Deployment {
    let image = submarine
        .spec
        .server
        .image
        .clone()
        .filter(|image| !image.is_empty())
        .unwrap_or_else(|| format!("apache/submarine:server-{}", submarine.spec.version));

    Deployment {
        metadata: ObjectMeta {
            name: Some(SERVER_NAME.to_string()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(submarine.spec.server.replicas),
            selector: LabelSelector {
                match_labels: Some(run_labels()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(run_labels()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    service_account_name: Some(SERVER_NAME.to_string()),
                    containers: vec![Container {
                        name: SERVER_NAME.to_string(),
                        image: Some(image),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        env: Some(vec![
                            env("SUBMARINE_SERVER_PORT", "8080"),
                            env("SUBMARINE_SERVER_PORT_8080_TCP", "8080"),
                            env(
                                "SUBMARINE_SERVER_DNS_NAME",
                                &format!("{SERVER_NAME}.{namespace}"),
                            ),
                            env("K8S_APISERVER_URL", "kubernetes.default.svc"),
                            env("ENV_NAMESPACE", namespace),
                        ]),
                        ports: Some(vec![ContainerPort {
                            container_port: 8080,
                            ..Default::default()
                        }]),
                        ..Default::default()
                    }],
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

impl Reconciler {
    /// Ensure the server ServiceAccount, Service, and Deployment, and
    /// reconcile the deployment replica count against the spec.
    pub(crate) async fn sync_server(
        &self,
        submarine: &Submarine,
        namespace: &str,
    ) -> OperatorResult<Deployment> {
        let oref = controller_ref(submarine)?;

        self.ensure(
            &self.stores.service_accounts,
            &self.caches.service_accounts,
            submarine,
            Some(namespace),
            new_server_service_account(&oref),
        )
        .await?;

        self.ensure(
            &self.stores.services,
            &self.caches.services,
            submarine,
            Some(namespace),
            new_server_service(&oref),
        )
        .await?;

        let deployment = self
            .ensure(
                &self.stores.deployments,
                &self.caches.deployments,
                submarine,
                Some(namespace),
                new_server_deployment(submarine, namespace, &oref),
            )
            .await?;

        let desired = submarine.spec.server.replicas;
        let live = deployment.spec.as_ref().and_then(|s| s.replicas);
        if live != Some(desired) {
            tracing::debug!(
                name = %SERVER_NAME,
                desired,
                live = ?live,
                "server replicas drifted, restoring"
            );
            let restored = self
                .stores
                .deployments
                .update(
                    Some(namespace),
                    &new_server_deployment(submarine, namespace, &oref),
                )
                .await?;
            return Ok(restored);
        }

        Ok(deployment)
    }
}
