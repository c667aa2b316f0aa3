//! Kubernetes operator for Apache Submarine.
//!
//! Reconciles the `Submarine` custom resource into its managed children:
//! the server workload (ServiceAccount, Service, Deployment, Ingress,
//! cluster RBAC), the MySQL database (volume, claim, Deployment, Service),
//! a tensorboard instance (volume, claim, Deployment, Service, Traefik
//! IngressRoute), and a set of templated sub-releases installed through the
//! chart engine.
//!
//! The controller is level-triggered: object deltas only ever enqueue the
//! owning parent's key, and every reconcile re-derives the full desired
//! state from the parent spec, so lost or reordered events are harmless.
//!
//! # Example
//!
//! ```yaml
//! apiVersion: submarine.apache.org/v1alpha1
//! kind: Submarine
//! metadata:
//!   name: example-submarine
//! spec:
//!   version: "0.6"
//!   server:
//!     replicas: 1
//!   database:
//!     storageSize: 10Gi
//!   tensorboard:
//!     storageSize: 1Gi
//!   storage:
//!     storageType: host
//!     hostPath: /tmp/submarine
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cache;
pub mod charts;
pub mod controller;
pub mod crd;
pub mod error;
pub mod events;
pub mod informer;
pub mod queue;
pub mod reconciler;
pub mod store;
mod sync;
pub mod watch;

pub use crd::{Submarine, SubmarineSpec, SubmarineStatus};
pub use error::{OperatorError, OperatorResult};
