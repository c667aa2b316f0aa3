//! Templated sub-release syncer.
//!
//! Each Submarine expects a set of auxiliary releases in its namespace. The
//! probe/install pair is idempotent; handles are recorded per parent so the
//! delete branch can uninstall exactly what this parent caused to exist.

use crate::error::OperatorResult;
use crate::reconciler::Reconciler;

/// Releases installed alongside every Submarine, from the bundled local
/// chart sources.
const SUB_CHARTS: [&str; 4] = ["traefik", "notebook-controller", "tfjob", "pytorchjob"];

impl Reconciler {
    /// Install any missing sub-release into the parent's namespace.
    pub(crate) async fn install_sub_charts(
        &self,
        parent_key: &str,
        namespace: &str,
    ) -> OperatorResult<()> {
        for release in SUB_CHARTS {
            if self.chart_engine.is_installed(release, namespace).await? {
                continue;
            }

            tracing::info!(release, namespace, "installing sub-chart");
            let handle = self
                .chart_engine
                .install(release, &self.charts_dir.join(release), namespace)
                .await?;
            self.installed_charts.record(parent_key, handle);
        }
        Ok(())
    }
}
