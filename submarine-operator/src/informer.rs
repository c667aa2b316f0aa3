//! Informer adapter: turns object deltas into reconciliation requests.
//!
//! Parent deltas enqueue their own key with the matching intent. Child
//! deltas are mapped back to the owning Submarine through the controller
//! owner reference and enqueue that parent with intent `Update`; orphans are
//! dropped. Updates whose resource version did not change are suppressed
//! before enqueueing so resyncs do not re-trigger work.

use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use crate::cache::{Cached, Caches};
use crate::crd::Submarine;
use crate::queue::{Intent, WorkItem, WorkQueue};

/// A typed object delta as delivered by the watch layer.
///
/// `Deleted` always carries the last known state of the object; the watch
/// bridge recovers it from the cache when the delete notification itself
/// arrives without one.
#[derive(Debug, Clone)]
pub enum Delta<K> {
    /// The object appeared.
    Added(K),
    /// The object changed.
    Updated {
        /// State before the change.
        old: K,
        /// State after the change.
        new: K,
    },
    /// The object disappeared; payload is its final known state.
    Deleted(K),
}

/// Event handlers shared by every watched kind.
#[derive(Clone)]
pub struct EventHandlers {
    queue: WorkQueue,
    caches: Caches,
}

impl EventHandlers {
    /// Wire handlers to the queue they enqueue into and the caches they
    /// maintain.
    pub fn new(queue: WorkQueue, caches: Caches) -> Self {
        Self { queue, caches }
    }

    /// The caches these handlers maintain.
    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    /// Handle a delta of the parent kind.
    pub fn handle_submarine(&self, delta: Delta<Submarine>) {
        match delta {
            Delta::Added(submarine) => {
                self.caches.submarines.upsert(submarine.clone());
                self.enqueue_parent(&submarine, Intent::Add);
            }
            Delta::Updated { old, new } => {
                if same_resource_version(old.meta(), new.meta()) {
                    return;
                }
                self.caches.submarines.upsert(new.clone());
                self.enqueue_parent(&new, Intent::Update);
            }
            Delta::Deleted(submarine) => {
                self.caches.submarines.remove(&submarine);
                self.enqueue_parent(&submarine, Intent::Delete);
            }
        }
    }

    /// Handle a delta of any managed child kind.
    pub fn handle_child<K>(&self, delta: Delta<K>)
    where
        K: Cached + Resource<DynamicType = ()> + Clone,
    {
        let obj = match delta {
            Delta::Added(obj) => {
                K::cache(&self.caches).upsert(obj.clone());
                obj
            }
            Delta::Updated { old, new } => {
                if same_resource_version(old.meta(), new.meta()) {
                    return;
                }
                K::cache(&self.caches).upsert(new.clone());
                new
            }
            Delta::Deleted(obj) => {
                K::cache(&self.caches).remove(&obj);
                obj
            }
        };

        let Some(parent_key) = self.resolve_owner(obj.meta()) else {
            tracing::trace!(object = %obj.name_any(), "no Submarine owner, ignoring");
            return;
        };
        self.queue.add(WorkItem {
            key: parent_key,
            intent: Intent::Update,
        });
    }

    /// Map a child object back to the key of the Submarine controlling it.
    ///
    /// Requires a controller owner reference of kind `Submarine` whose
    /// parent is still present in the parent cache; anything else resolves
    /// to `None` and the delta is dropped.
    fn resolve_owner(&self, meta: &ObjectMeta) -> Option<String> {
        let owner = meta
            .owner_references
            .as_deref()
            .unwrap_or_default()
            .iter()
            .find(|r| r.controller == Some(true))?;
        if owner.kind != "Submarine" {
            return None;
        }

        let namespace = meta.namespace.as_deref()?;
        let parent = self.caches.submarines.get(Some(namespace), &owner.name)?;
        Some(format!("{}/{}", namespace, parent.name_any()))
    }

    fn enqueue_parent(&self, submarine: &Submarine, intent: Intent) {
        let Some(namespace) = submarine.namespace() else {
            tracing::warn!(name = %submarine.name_any(), "submarine without namespace, ignoring");
            return;
        };
        self.queue.add(WorkItem {
            key: format!("{}/{}", namespace, submarine.name_any()),
            intent,
        });
    }
}

fn same_resource_version(old: &ObjectMeta, new: &ObjectMeta) -> bool {
    match (&old.resource_version, &new.resource_version) {
        (Some(old), Some(new)) => old == new,
        _ => false,
    }
}
