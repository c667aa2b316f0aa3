//! Templated sub-release (chart) engine interface.
//!
//! The operator installs a small set of auxiliary releases alongside each
//! Submarine (traefik, notebook-controller, tfjob, pytorchjob) and
//! uninstalls them when the parent goes away. The engine itself is a black
//! box behind [`ChartEngine`]; the production implementation drives the
//! `helm` CLI.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{OperatorError, OperatorResult};

/// Opaque token identifying an installed release for later uninstall.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartHandle {
    /// Release name.
    pub release: String,
    /// Namespace the release was installed into.
    pub namespace: String,
}

/// Interface to the templated sub-release engine.
#[async_trait]
pub trait ChartEngine: Send + Sync {
    /// Whether a release is already installed in a namespace. Idempotent.
    async fn is_installed(&self, release: &str, namespace: &str) -> OperatorResult<bool>;

    /// Install a release from a local chart path.
    async fn install(
        &self,
        release: &str,
        chart_path: &Path,
        namespace: &str,
    ) -> OperatorResult<ChartHandle>;

    /// Uninstall a previously installed release.
    async fn uninstall(&self, handle: &ChartHandle) -> OperatorResult<()>;
}

/// Chart engine shelling out to the `helm` binary.
pub struct HelmCli {
    binary: PathBuf,
}

impl Default for HelmCli {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("helm"),
        }
    }
}

impl HelmCli {
    /// Use a specific `helm` binary.
    pub fn with_binary(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    async fn run(&self, args: &[&str]) -> OperatorResult<std::process::Output> {
        Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| OperatorError::Chart(format!("failed to run helm: {e}")))
    }
}

#[async_trait]
impl ChartEngine for HelmCli {
    async fn is_installed(&self, release: &str, namespace: &str) -> OperatorResult<bool> {
        let output = self
            .run(&["status", release, "--namespace", namespace])
            .await?;
        Ok(output.status.success())
    }

    async fn install(
        &self,
        release: &str,
        chart_path: &Path,
        namespace: &str,
    ) -> OperatorResult<ChartHandle> {
        let path = chart_path.to_string_lossy();
        let output = self
            .run(&["install", release, &path, "--namespace", namespace])
            .await?;
        if !output.status.success() {
            return Err(OperatorError::Chart(format!(
                "helm install {release} failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(ChartHandle {
            release: release.to_string(),
            namespace: namespace.to_string(),
        })
    }

    async fn uninstall(&self, handle: &ChartHandle) -> OperatorResult<()> {
        let output = self
            .run(&[
                "uninstall",
                &handle.release,
                "--namespace",
                &handle.namespace,
            ])
            .await?;
        if !output.status.success() {
            return Err(OperatorError::Chart(format!(
                "helm uninstall {} failed: {}",
                handle.release,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }
}

/// Registry of chart handles installed on behalf of each parent, keyed by
/// the parent's work-queue key so concurrent Submarines do not tear down
/// each other's releases. In-memory only: releases installed by a previous
/// operator process are rediscovered through `is_installed`, but their
/// handles are not.
#[derive(Default)]
pub struct InstalledCharts {
    inner: Mutex<HashMap<String, Vec<ChartHandle>>>,
}

impl InstalledCharts {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a handle under a parent key.
    pub fn record(&self, parent_key: &str, handle: ChartHandle) {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(parent_key.to_string())
            .or_default()
            .push(handle);
    }

    /// Take every handle recorded for a parent, leaving none behind.
    pub fn drain(&self, parent_key: &str) -> Vec<ChartHandle> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(parent_key)
            .unwrap_or_default()
    }

    /// Handles currently recorded for a parent.
    pub fn handles(&self, parent_key: &str) -> Vec<ChartHandle> {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(parent_key)
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(release: &str) -> ChartHandle {
        ChartHandle {
            release: release.to_string(),
            namespace: "default".to_string(),
        }
    }

    #[test]
    fn drain_empties_only_the_requested_parent() {
        let charts = InstalledCharts::new();
        charts.record("default/a", handle("traefik"));
        charts.record("default/a", handle("tfjob"));
        charts.record("other/b", handle("traefik"));

        let drained = charts.drain("default/a");
        assert_eq!(drained.len(), 2);
        assert!(charts.handles("default/a").is_empty());
        assert_eq!(charts.handles("other/b").len(), 1);

        // Draining again yields nothing: uninstall happens exactly once.
        assert!(charts.drain("default/a").is_empty());
    }
}
