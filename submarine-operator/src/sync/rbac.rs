//! Server RBAC syncer: ClusterRole and ClusterRoleBinding.
//!
//! The rule set is consumed by the Submarine server at runtime and must stay
//! exactly as published; downstream components look these permissions up by
//! group and resource.

use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, RoleRef, Subject,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;

use crate::crd::Submarine;
use crate::error::OperatorResult;
use crate::reconciler::Reconciler;

use super::{controller_ref, SERVER_NAME};

fn crud_verbs() -> Vec<String> {
    [
        "get",
        "list",
        "watch",
        "create",
        "delete",
        "deletecollection",
        "patch",
        "update",
    ]
    .iter()
    .map(|v| v.to_string())
    .collect()
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

fn new_server_cluster_role(oref: &OwnerReference) -> ClusterRole {
    ClusterRole {
        metadata: ObjectMeta {
            name: Some(SERVER_NAME.to_string()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        rules: Some(vec![
            PolicyRule {
                verbs: crud_verbs(),
                api_groups: Some(strings(&["kubeflow.org"])),
                resources: Some(strings(&[
                    "tfjobs",
                    "tfjobs/status",
                    "pytorchjobs",
                    "pytorchjobs/status",
                    "notebooks",
                    "notebooks/status",
                ])),
                ..Default::default()
            },
            PolicyRule {
                verbs: crud_verbs(),
                api_groups: Some(strings(&["traefik.containo.us"])),
                resources: Some(strings(&["ingressroutes"])),
                ..Default::default()
            },
            PolicyRule {
                verbs: strings(&["*"]),
                api_groups: Some(strings(&[""])),
                resources: Some(strings(&[
                    "pods",
                    "pods/log",
                    "services",
                    "persistentvolumes",
                    "persistentvolumeclaims",
                ])),
                ..Default::default()
            },
            PolicyRule {
                verbs: strings(&["*"]),
                api_groups: Some(strings(&["apps"])),
                resources: Some(strings(&["deployments", "deployments/status"])),
                ..Default::default()
            },
        ]),
        ..Default::default()
    }
}

fn new_server_cluster_role_binding(
    service_account_namespace: &str,
    oref: &OwnerReference,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(SERVER_NAME.to_string()),
            owner_references: Some(vec![oref.clone()]),
            ..Default::default()
        },
        subjects: Some(vec![Subject {
            kind: "ServiceAccount".to_string(),
            name: SERVER_NAME.to_string(),
            namespace: Some(service_account_namespace.to_string()),
            ..Default::default()
        }]),
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: SERVER_NAME.to_string(),
        },
    }
}

impl Reconciler {
    /// Ensure the server's ClusterRole and ClusterRoleBinding.
    pub(crate) async fn sync_rbac(
        &self,
        submarine: &Submarine,
        namespace: &str,
    ) -> OperatorResult<()> {
        let oref = controller_ref(submarine)?;

        self.ensure(
            &self.stores.cluster_roles,
            &self.caches.cluster_roles,
            submarine,
            None,
            new_server_cluster_role(&oref),
        )
        .await?;

        self.ensure(
            &self.stores.cluster_role_bindings,
            &self.caches.cluster_role_bindings,
            submarine,
            None,
            new_server_cluster_role_binding(namespace, &oref),
        )
        .await?;

        Ok(())
    }
}
