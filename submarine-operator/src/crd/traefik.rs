//! Traefik IngressRoute Custom Resource Definition.
//!
//! Only the fields the operator writes are modeled; the full Traefik schema
//! lives with Traefik itself.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// IngressRoute is the Traefik HTTP routing resource.
#[derive(CustomResource, Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "traefik.containo.us",
    version = "v1alpha1",
    kind = "IngressRoute",
    plural = "ingressroutes",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct IngressRouteSpec {
    /// Traefik entry points the route is attached to.
    pub entry_points: Vec<String>,

    /// Routing rules.
    pub routes: Vec<TraefikRoute>,
}

/// A single Traefik routing rule.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TraefikRoute {
    /// Rule kind; always `Rule` for HTTP matchers.
    pub kind: String,

    /// Traefik matcher expression, e.g. ``PathPrefix(`/tensorboard`)``.
    #[serde(rename = "match")]
    pub match_expr: String,

    /// Backend services receiving the matched traffic.
    pub services: Vec<TraefikServiceRef>,
}

/// Reference to a backend Service inside a Traefik route.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TraefikServiceRef {
    /// Service name.
    pub name: String,

    /// Service port number.
    pub port: i32,

    /// Backend kind; `Service` when routing to a cluster Service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}
