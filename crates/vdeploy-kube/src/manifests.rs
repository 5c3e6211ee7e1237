//! Raw and templated manifest reconciliation
//!
//! The desired text is the raw manifests followed by the rendered template.
//! When it equals the text applied on the last successful pass nothing
//! happens. Otherwise the full set is applied, and objects that were in the
//! last applied text but are no longer declared get deleted.

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vdeploy_core::{
    FailureReason, ManifestsStatus, ParsedManifest, ReleaseContext, codec, join_documents,
};
use vdeploy_engine::TemplateEngine;

use crate::cluster::ClusterClient;
use crate::deadline::bounded;
use crate::error::{KubeError, Result};

/// Applies declared manifests and prunes removed objects
pub struct ManifestReconciler<C, E> {
    cluster: C,
    engine: E,
    context: ReleaseContext,
}

impl<C: ClusterClient, E: TemplateEngine> ManifestReconciler<C, E> {
    pub fn new(cluster: C, engine: E, context: ReleaseContext) -> Self {
        Self {
            cluster,
            engine,
            context,
        }
    }

    /// Desired manifest text: raw manifests, then the rendered template
    pub fn desired_manifests(&self, raw: &str, template: &str) -> Result<String> {
        if template.trim().is_empty() {
            return Ok(join_documents([raw]));
        }
        let rendered = self.engine.render(template, &self.context)?;
        Ok(join_documents([raw, rendered.as_str()]))
    }

    /// Converge the cluster on the declared manifests, recording the outcome in `status`
    pub async fn reconcile(
        &self,
        raw: &str,
        template: &str,
        status: &mut ManifestsStatus,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let result = self.converge(raw, template, status, cancel).await;
        match &result {
            Ok(()) => status.succeed(),
            Err((reason, e)) => status.fail(*reason, e.to_string()),
        }
        result.map_err(|(_, e)| e)
    }

    async fn converge(
        &self,
        raw: &str,
        template: &str,
        status: &mut ManifestsStatus,
        cancel: &CancellationToken,
    ) -> std::result::Result<(), (FailureReason, KubeError)> {
        let install_failed = |e: KubeError| (FailureReason::InstallFailed, e);

        let desired = self.desired_manifests(raw, template).map_err(install_failed)?;
        let (last_applied, readable) = match codec::decompress(&status.last_applied_manifests) {
            Ok(text) => (text, true),
            Err(e) => {
                warn!(error = %e, "last applied manifests unreadable, nothing will be pruned");
                (String::new(), false)
            }
        };

        // An unreadable record is always rewritten, even when nothing is declared
        if readable && desired == last_applied {
            debug!("manifests unchanged");
            return Ok(());
        }

        let mut declared = ParsedManifest::parse(&desired);
        if let Some(e) = declared.error.take() {
            return Err(install_failed(e.into()));
        }
        let declared_keys = declared.keys();

        if !declared.objects.is_empty() {
            bounded(cancel, None, self.cluster.apply(&desired))
                .await
                .map_err(install_failed)?;
            info!(objects = declared.objects.len(), "applied manifests");
        }

        let previous = ParsedManifest::parse(&last_applied);
        if let Some(e) = &previous.error {
            warn!(error = %e, "skipping unparseable objects in last applied manifests");
        }
        // Removed objects go in reverse declaration order
        for object in previous.objects.iter().rev() {
            if declared_keys.contains(&object.key) {
                continue;
            }
            match bounded(cancel, None, self.cluster.delete(&object.key)).await {
                Ok(()) => info!(object = %object.key, "deleted removed object"),
                Err(e) if e.is_not_found() => {
                    debug!(object = %object.key, "removed object already gone")
                }
                Err(e) => return Err((FailureReason::UninstallFailed, e)),
            }
        }

        status.last_applied_manifests = codec::compress(&desired)
            .map_err(|e| install_failed(e.into()))?;
        Ok(())
    }
}
