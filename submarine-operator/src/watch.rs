//! Bridge from `kube` watch streams to informer deltas.
//!
//! One watcher task per kind translates raw watch events into [`Delta`]s
//! for the event handlers, synthesizing the `old` side of updates from the
//! cache and recovering the last cached state for deletes whose
//! notification arrives without one (the tombstone case). `InitDone` marks
//! the corresponding cache as synced, which is what the run loop waits on
//! before starting workers.

use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    PersistentVolume, PersistentVolumeClaim, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding};
use kube::runtime::watcher::{self, watcher};
use kube::runtime::WatchStreamExt;
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use tokio::task::JoinHandle;

use crate::cache::Cached;
use crate::crd::{IngressRoute, Submarine};
use crate::informer::{Delta, EventHandlers};

/// Spawn one watcher per kind the operator manages. The returned handles
/// are aborted on shutdown.
pub fn spawn_all(client: &Client, handlers: &Arc<EventHandlers>) -> Vec<JoinHandle<()>> {
    vec![
        tokio::spawn(run_parent_watcher(
            Api::all(client.clone()),
            Arc::clone(handlers),
        )),
        spawn_child_watcher::<Deployment>(client, handlers),
        spawn_child_watcher::<Service>(client, handlers),
        spawn_child_watcher::<ServiceAccount>(client, handlers),
        spawn_child_watcher::<PersistentVolume>(client, handlers),
        spawn_child_watcher::<PersistentVolumeClaim>(client, handlers),
        spawn_child_watcher::<Ingress>(client, handlers),
        spawn_child_watcher::<IngressRoute>(client, handlers),
        spawn_child_watcher::<ClusterRole>(client, handlers),
        spawn_child_watcher::<ClusterRoleBinding>(client, handlers),
    ]
}

fn spawn_child_watcher<K>(client: &Client, handlers: &Arc<EventHandlers>) -> JoinHandle<()>
where
    K: Cached
        + Resource<DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    tokio::spawn(run_child_watcher(
        Api::<K>::all(client.clone()),
        Arc::clone(handlers),
    ))
}

async fn run_parent_watcher(api: Api<Submarine>, handlers: Arc<EventHandlers>) {
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => {
                let cache = &handlers.caches().submarines;
                let delta = match cache.get(obj.namespace().as_deref(), &obj.name_any()) {
                    Some(old) => Delta::Updated { old, new: obj },
                    None => Delta::Added(obj),
                };
                handlers.handle_submarine(delta);
            }
            Ok(watcher::Event::Delete(obj)) => {
                // Prefer the cached copy: the delete notification may carry
                // a partial final state.
                let cache = &handlers.caches().submarines;
                let last = cache
                    .get(obj.namespace().as_deref(), &obj.name_any())
                    .unwrap_or(obj);
                handlers.handle_submarine(Delta::Deleted(last));
            }
            Ok(watcher::Event::Init) => {}
            Ok(watcher::Event::InitDone) => {
                handlers.caches().submarines.mark_synced();
                tracing::info!("submarine cache synced");
            }
            Err(e) => {
                tracing::error!(error = %e, "submarine watch error");
            }
        }
    }

    tracing::warn!("submarine watch stream ended");
}

async fn run_child_watcher<K>(api: Api<K>, handlers: Arc<EventHandlers>)
where
    K: Cached
        + Resource<DynamicType = ()>
        + Clone
        + Debug
        + DeserializeOwned
        + Send
        + Sync
        + 'static,
{
    let kind = K::kind(&()).to_string();
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();

    while let Some(event) = stream.next().await {
        match event {
            Ok(watcher::Event::Apply(obj)) | Ok(watcher::Event::InitApply(obj)) => {
                let cache = K::cache(handlers.caches());
                let delta = match cache.get(obj.namespace().as_deref(), &obj.name_any()) {
                    Some(old) => Delta::Updated { old, new: obj },
                    None => Delta::Added(obj),
                };
                handlers.handle_child(delta);
            }
            Ok(watcher::Event::Delete(obj)) => {
                let cache = K::cache(handlers.caches());
                let last = cache
                    .get(obj.namespace().as_deref(), &obj.name_any())
                    .unwrap_or(obj);
                handlers.handle_child(Delta::Deleted(last));
            }
            Ok(watcher::Event::Init) => {}
            Ok(watcher::Event::InitDone) => {
                K::cache(handlers.caches()).mark_synced();
                tracing::debug!(kind = %kind, "cache synced");
            }
            Err(e) => {
                tracing::error!(kind = %kind, error = %e, "watch error");
            }
        }
    }

    tracing::warn!(kind = %kind, "watch stream ended");
}
