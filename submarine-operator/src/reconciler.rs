//! The sync handler: converges one Submarine toward its desired state.
//!
//! Syncers run in a fixed order and the sequence aborts on the first error,
//! which the worker turns into a rate-limited requeue. A missing parent is
//! success: the resource was deleted while the key sat in the queue, and the
//! owner-reference cascade reclaims the children.

use std::path::PathBuf;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::Deployment;

use crate::cache::Caches;
use crate::charts::{ChartEngine, InstalledCharts};
use crate::crd::{Submarine, SubmarineStatus};
use crate::error::{OperatorError, OperatorResult};
use crate::events::{EventRecorder, EventSeverity, MESSAGE_SYNCED, REASON_SYNCED};
use crate::queue::{Intent, WorkItem};
use crate::store::Stores;

/// Split a work-queue key into `(namespace, name)`.
pub(crate) fn split_key(key: &str) -> OperatorResult<(String, String)> {
    match key.split_once('/') {
        Some((namespace, name))
            if !namespace.is_empty() && !name.is_empty() && !name.contains('/') =>
        {
            Ok((namespace.to_string(), name.to_string()))
        }
        _ => Err(OperatorError::InvalidWorkItem {
            key: key.to_string(),
        }),
    }
}

/// Reconciles Submarine parents into their managed children.
pub struct Reconciler {
    pub(crate) stores: Stores,
    pub(crate) caches: Caches,
    pub(crate) recorder: Arc<dyn EventRecorder>,
    pub(crate) chart_engine: Arc<dyn ChartEngine>,
    pub(crate) installed_charts: InstalledCharts,
    pub(crate) charts_dir: PathBuf,
}

impl Reconciler {
    /// Assemble a reconciler from its collaborators.
    pub fn new(
        stores: Stores,
        caches: Caches,
        recorder: Arc<dyn EventRecorder>,
        chart_engine: Arc<dyn ChartEngine>,
        charts_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            stores,
            caches,
            recorder,
            chart_engine,
            installed_charts: InstalledCharts::new(),
            charts_dir: charts_dir.into(),
        }
    }

    /// The caches this reconciler reads from.
    pub fn caches(&self) -> &Caches {
        &self.caches
    }

    /// Chart handles currently recorded for a parent key.
    pub fn installed_chart_handles(&self, parent_key: &str) -> Vec<crate::charts::ChartHandle> {
        self.installed_charts.handles(parent_key)
    }

    /// Process one work item.
    pub async fn sync(&self, item: &WorkItem) -> OperatorResult<()> {
        let (namespace, name) = split_key(&item.key)?;
        tracing::debug!(key = %item.key, intent = ?item.intent, "syncing");

        if item.intent == Intent::Delete {
            return self.teardown(&item.key).await;
        }

        let Some(submarine) = self.caches.submarines.get(Some(&namespace), &name) else {
            tracing::info!(key = %item.key, "submarine no longer exists, nothing to do");
            return Ok(());
        };

        self.install_sub_charts(&item.key, &namespace).await?;

        let server = self.sync_server(&submarine, &namespace).await?;
        let database = self.sync_database(&submarine, &namespace).await?;
        self.sync_ingress(&submarine, &namespace).await?;
        self.sync_rbac(&submarine, &namespace).await?;
        self.sync_tensorboard(&submarine, &namespace).await?;

        self.update_status(&submarine, &server, database.as_ref())
            .await?;

        self.recorder
            .event(&submarine, EventSeverity::Normal, REASON_SYNCED, MESSAGE_SYNCED)
            .await;
        Ok(())
    }

    /// Delete branch: uninstall the sub-releases recorded for this parent.
    /// Native children are reclaimed by the store's owner-reference cascade,
    /// not by the operator.
    async fn teardown(&self, parent_key: &str) -> OperatorResult<()> {
        for handle in self.installed_charts.drain(parent_key) {
            tracing::info!(release = %handle.release, namespace = %handle.namespace, "uninstalling sub-chart");
            if let Err(e) = self.chart_engine.uninstall(&handle).await {
                // Best-effort: the handle is already consumed, so the
                // uninstall is attempted exactly once per release.
                tracing::error!(release = %handle.release, error = %e, "failed to uninstall sub-chart");
            }
        }
        Ok(())
    }

    /// Copy the observed deployment availability into the parent status and
    /// write it back through the status subresource. The CRD registers the
    /// subresource, so a main-endpoint write would be stripped by the API
    /// server.
    async fn update_status(
        &self,
        submarine: &Submarine,
        server: &Deployment,
        database: Option<&Deployment>,
    ) -> OperatorResult<()> {
        let available_server = server
            .status
            .as_ref()
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);
        let available_database = database
            .and_then(|d| d.status.as_ref())
            .and_then(|s| s.available_replicas)
            .unwrap_or(0);

        let mut updated = submarine.clone();
        updated.status = Some(SubmarineStatus {
            available_server_replicas: available_server,
            available_database_replicas: available_database,
        });

        let namespace = submarine.metadata.namespace.clone();
        self.stores
            .submarines
            .update_status(namespace.as_deref(), &updated)
            .await?;
        Ok(())
    }
}
