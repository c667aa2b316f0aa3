//! Submarine Custom Resource Definition.
//!
//! A `Submarine` describes one complete installation: the API server
//! workload, the MySQL database backing it, a tensorboard instance, and the
//! storage those workloads mount.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Submarine is the Schema for the submarines API.
///
/// The operator reconciles each Submarine into a fixed set of child objects
/// (Deployments, Services, volumes, RBAC bindings, an Ingress, and a Traefik
/// IngressRoute), all owner-referenced back to the parent so that deleting
/// the parent cascades to the children.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "submarine.apache.org",
    version = "v1alpha1",
    kind = "Submarine",
    plural = "submarines",
    namespaced,
    status = "SubmarineStatus",
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Server", "type":"integer", "jsonPath":".status.availableServerReplicas"}"#,
    printcolumn = r#"{"name":"Database", "type":"integer", "jsonPath":".status.availableDatabaseReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineSpec {
    /// Submarine release version, used to derive default workload images.
    pub version: String,

    /// Submarine server workload configuration.
    pub server: ServerSpec,

    /// Database workload configuration.
    pub database: DatabaseSpec,

    /// Tensorboard workload configuration.
    pub tensorboard: TensorboardSpec,

    /// Backing storage for the database and tensorboard volumes.
    pub storage: StorageSpec,
}

/// Submarine server workload configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ServerSpec {
    /// Server image. Defaults to `apache/submarine:server-<version>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Desired number of server replicas.
    pub replicas: i32,
}

/// Database workload configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseSpec {
    /// Database image. Defaults to `apache/submarine:database-<version>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Desired number of database replicas.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Size of the database volume (e.g. "10Gi").
    pub storage_size: String,
}

/// Tensorboard workload configuration.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TensorboardSpec {
    /// Size of the tensorboard log volume (e.g. "1Gi").
    pub storage_size: String,
}

/// Backing storage configuration shared by the database and tensorboard
/// persistent volumes.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct StorageSpec {
    /// Storage flavor: `nfs` or `host`.
    pub storage_type: String,

    /// NFS server address (when `storageType` is `nfs`).
    #[serde(
        default,
        rename = "nfsIP",
        skip_serializing_if = "Option::is_none"
    )]
    pub nfs_ip: Option<String>,

    /// Exported NFS path (when `storageType` is `nfs`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nfs_path: Option<String>,

    /// Host directory (when `storageType` is `host`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_path: Option<String>,
}

/// Observed state of a Submarine, rolled up from its child deployments.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SubmarineStatus {
    /// Available replicas reported by the server deployment.
    #[serde(default)]
    pub available_server_replicas: i32,

    /// Available replicas reported by the database deployment.
    #[serde(default)]
    pub available_database_replicas: i32,
}
