//! Helm chart reconciliation
//!
//! Each declared chart is installed when its release is missing and upgraded
//! when its config hash differs from the one recorded on the last success.
//! A failed install or upgrade triggers remediation: a release stuck in
//! `pending-install` is deleted, anything else is rolled back. Releases that
//! are recorded in the status but no longer declared are deleted.
//!
//! The first failing chart ends the pass. Charts after it and orphaned
//! releases keep their previous status until a later pass reaches them.

use indexmap::IndexMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use vdeploy_core::{ChartSpec, ChartStatus, FailureReason, ReleaseKey, chart_config_hash};

use crate::cache::ChartCache;
use crate::deadline::bounded;
use crate::error::{KubeError, Result};
use crate::helm::{HelmClient, HelmOptions, is_pending_install};

/// Installs, upgrades and removes chart releases
pub struct ChartReconciler<H> {
    helm: H,
    cache: ChartCache,
}

impl<H: HelmClient> ChartReconciler<H> {
    pub fn new(helm: H, cache: ChartCache) -> Self {
        Self { helm, cache }
    }

    /// Converge releases on `declared`, rewriting `statuses` in declaration order
    ///
    /// Returns the first error; orphan deletion continues past failures.
    pub async fn reconcile(
        &self,
        declared: &[ChartSpec],
        statuses: &mut Vec<ChartStatus>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        // Later duplicates of a release win, matching how the list was last written
        let mut known: IndexMap<ReleaseKey, ChartStatus> =
            statuses.drain(..).map(|s| (s.key(), s)).collect();
        let mut updated = Vec::with_capacity(declared.len());

        for spec in declared {
            let key = spec.release_key();
            let mut status = known
                .shift_remove(&key)
                .unwrap_or_else(|| ChartStatus::pending(&key));
            let result = self.reconcile_chart(spec, &key, &mut status, cancel).await;
            updated.push(status);

            if let Err(e) = result {
                updated.extend(known.into_values());
                *statuses = updated;
                return Err(e);
            }
        }

        let mut first_error = None;
        for (key, mut status) in known {
            match self.delete_orphan(&key, cancel).await {
                Ok(()) => {}
                Err(e) => {
                    status.fail(FailureReason::UninstallFailed, e.to_string());
                    updated.push(status);
                    first_error.get_or_insert(e);
                }
            }
        }

        *statuses = updated;
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn reconcile_chart(
        &self,
        spec: &ChartSpec,
        key: &ReleaseKey,
        status: &mut ChartStatus,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let timeout = spec.timeout();

        let archive = match bounded(cancel, Some(timeout), self.cache.ensure(&self.helm, spec)).await
        {
            Ok(path) => path,
            Err(e) => {
                warn!(release = %key, error = %e, "chart archive unavailable");
                status.fail(FailureReason::ChartPullFailed, e.to_string());
                return Err(e);
            }
        };

        let hash = chart_config_hash(spec).map_err(KubeError::from);
        let hash = match hash {
            Ok(hash) => hash,
            Err(e) => {
                status.fail(FailureReason::InstallFailed, e.to_string());
                return Err(e);
            }
        };

        let exists = match bounded(
            cancel,
            Some(timeout),
            self.helm.exists(&key.name, &key.namespace),
        )
        .await
        {
            Ok(exists) => exists,
            Err(e) => {
                status.fail(FailureReason::InstallFailed, e.to_string());
                return Err(e);
            }
        };

        if exists && status.last_applied_chart_config_hash == hash {
            debug!(release = %key, "chart unchanged");
            status.succeed(hash);
            return Ok(());
        }

        let options = HelmOptions::for_chart(spec, self.cache.chart_dir(spec)).with_path(archive);
        let (verb, reason, result) = if exists {
            info!(release = %key, chart = %spec.chart.name, "upgrading release");
            let upgrade = self.helm.upgrade(&key.name, &key.namespace, &options);
            (
                "upgrade",
                FailureReason::UpgradeFailed,
                bounded(cancel, Some(timeout), upgrade).await,
            )
        } else {
            info!(release = %key, chart = %spec.chart.name, "installing release");
            let install = self.helm.install(&key.name, &key.namespace, &options);
            (
                "install",
                FailureReason::InstallFailed,
                bounded(cancel, Some(timeout), install).await,
            )
        };

        match result {
            Ok(()) => {
                info!(release = %key, "release {} succeeded", verb);
                status.succeed(hash);
                Ok(())
            }
            Err(e) => {
                warn!(release = %key, error = %e, "release {} failed", verb);
                self.remediate(key, timeout, cancel).await;
                status.fail(reason, e.to_string());
                Err(e)
            }
        }
    }

    /// Undo a failed install or upgrade so the next attempt starts clean
    async fn remediate(&self, key: &ReleaseKey, timeout: Duration, cancel: &CancellationToken) {
        let output = match bounded(
            cancel,
            Some(timeout),
            self.helm.status(&key.name, &key.namespace),
        )
        .await
        {
            Ok(output) => output,
            Err(e) => {
                warn!(release = %key, error = %e, "cannot read release status for remediation");
                return;
            }
        };

        if is_pending_install(&output) {
            info!(release = %key, "deleting release stuck in pending-install");
            let delete = self.helm.delete(&key.name, &key.namespace);
            if let Err(e) = bounded(cancel, Some(timeout), delete).await {
                warn!(release = %key, error = %e, "remediation delete failed");
            }
        } else {
            info!(release = %key, "rolling back release");
            let rollback = self.helm.rollback(&key.name, &key.namespace);
            if let Err(e) = bounded(cancel, Some(timeout), rollback).await {
                warn!(release = %key, error = %e, "remediation rollback failed");
            }
        }
    }

    async fn delete_orphan(&self, key: &ReleaseKey, cancel: &CancellationToken) -> Result<()> {
        info!(release = %key, "deleting release that is no longer declared");
        let delete = self.helm.delete(&key.name, &key.namespace);
        match bounded(cancel, None, delete).await {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => {
                warn!(release = %key, error = %e, "failed to delete release");
                Err(e)
            }
        }
    }
}
