//! Custom Resource Definitions handled by the Submarine operator.
//!
//! - [`Submarine`]: the composite resource describing a full Submarine
//!   installation (server, database, tensorboard, storage).
//! - [`IngressRoute`]: the Traefik routing resource the operator creates for
//!   the tensorboard workload.

mod submarine;
mod traefik;

pub use submarine::{
    DatabaseSpec, ServerSpec, StorageSpec, Submarine, SubmarineSpec, SubmarineStatus,
    TensorboardSpec,
};
pub use traefik::{IngressRoute, IngressRouteSpec, TraefikRoute, TraefikServiceRef};
