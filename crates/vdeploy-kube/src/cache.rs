//! On-disk chart archive cache
//!
//! Every chart gets its own directory under the work dir, named by
//! [`archive_cache_key`]. Any `.tgz` found there is reused; otherwise the
//! archive is materialized from the inline bundle or pulled through helm.

use base64::Engine as _;
use flate2::read::GzDecoder;
use std::path::{Path, PathBuf};
use tar::Archive;
use tracing::{debug, info};
use vdeploy_core::{ChartSpec, archive_cache_key};

use crate::error::{KubeError, Result};
use crate::helm::{HelmClient, HelmOptions};

/// Chart archive cache rooted at a work directory
#[derive(Debug, Clone)]
pub struct ChartCache {
    work_dir: PathBuf,
}

impl ChartCache {
    pub fn new(work_dir: impl Into<PathBuf>) -> Self {
        Self {
            work_dir: work_dir.into(),
        }
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    /// Directory holding the archive for a chart
    pub fn chart_dir(&self, spec: &ChartSpec) -> PathBuf {
        self.work_dir
            .join(archive_cache_key(&spec.chart, &spec.bundle))
    }

    /// First `.tgz` already present in the chart directory
    pub async fn cached_archive(&self, spec: &ChartSpec) -> Result<Option<PathBuf>> {
        find_archive(&self.chart_dir(spec)).await
    }

    /// Path to a local archive for the chart, fetching it when missing
    pub async fn ensure<H>(&self, helm: &H, spec: &ChartSpec) -> Result<PathBuf>
    where
        H: HelmClient + ?Sized,
    {
        let dir = self.chart_dir(spec);
        if let Some(path) = find_archive(&dir).await? {
            debug!(chart = %spec.chart.name, path = %path.display(), "using cached chart archive");
            return Ok(path);
        }

        tokio::fs::create_dir_all(&dir).await?;

        if spec.has_bundle() {
            return self.write_bundle(&dir, spec).await;
        }

        info!(chart = %spec.chart.name, repo = %spec.chart.repo, version = %spec.chart.version, "pulling chart");
        let options = HelmOptions::for_chart(spec, &dir);
        helm.pull(&spec.chart.name, &options).await?;

        find_archive(&dir).await?.ok_or_else(|| {
            KubeError::Archive(format!(
                "pull of {} produced no archive in {}",
                spec.chart.name,
                dir.display()
            ))
        })
    }

    async fn write_bundle(&self, dir: &Path, spec: &ChartSpec) -> Result<PathBuf> {
        let data = base64::engine::general_purpose::STANDARD
            .decode(spec.bundle.trim())
            .map_err(|e| KubeError::Archive(format!("bundle is not valid base64: {}", e)))?;
        verify_archive(&data)?;

        let path = dir.join(spec.chart.archive_file_name());
        // Written under a non-.tgz name first so a partial file is never a cache hit
        let partial = path.with_extension("partial");
        tokio::fs::write(&partial, &data).await?;
        tokio::fs::rename(&partial, &path).await?;

        info!(chart = %spec.chart.name, path = %path.display(), "wrote chart bundle");
        Ok(path)
    }
}

async fn find_archive(dir: &Path) -> Result<Option<PathBuf>> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let mut archives = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "tgz") {
            archives.push(path);
        }
    }
    archives.sort();
    Ok(archives.into_iter().next())
}

/// Check that bytes are a gzip compressed tar with at least one entry
pub fn verify_archive(data: &[u8]) -> Result<()> {
    let mut archive = Archive::new(GzDecoder::new(data));
    let mut entries = archive
        .entries()
        .map_err(|e| KubeError::Archive(format!("bundle is not a gzip tar archive: {}", e)))?;
    match entries.next() {
        Some(Ok(_)) => Ok(()),
        Some(Err(e)) => Err(KubeError::Archive(format!(
            "bundle is not a gzip tar archive: {}",
            e
        ))),
        None => Err(KubeError::Archive("bundle archive is empty".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockHelm, chart_bundle};
    use vdeploy_core::ChartRef;

    fn spec(bundle: String) -> ChartSpec {
        ChartSpec {
            chart: ChartRef {
                name: "nginx".to_string(),
                repo: "https://charts.example.com".to_string(),
                version: "1.0.0".to_string(),
                ..Default::default()
            },
            bundle,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_pull_then_cache_hit() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChartCache::new(dir.path());
        let helm = MockHelm::new();
        let spec = spec(String::new());

        let first = cache.ensure(&helm, &spec).await.unwrap();
        assert_eq!(first.file_name().unwrap(), "nginx-1.0.0.tgz");
        assert!(first.starts_with(cache.chart_dir(&spec)));

        let second = cache.ensure(&helm, &spec).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(helm.operation_counts().pulls, 1);
    }

    #[tokio::test]
    async fn test_bundle_written_without_pull() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChartCache::new(dir.path());
        let helm = MockHelm::new();
        let spec = spec(chart_bundle("nginx", "1.0.0"));

        let path = cache.ensure(&helm, &spec).await.unwrap();
        assert!(path.exists());
        assert_eq!(helm.operation_counts().pulls, 0);

        let data = std::fs::read(&path).unwrap();
        assert!(verify_archive(&data).is_ok());
    }

    #[tokio::test]
    async fn test_invalid_bundle_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChartCache::new(dir.path());
        let helm = MockHelm::new();

        let not_base64 = spec("!!!".to_string());
        assert!(matches!(
            cache.ensure(&helm, &not_base64).await,
            Err(KubeError::Archive(_))
        ));

        let not_gzip = spec(base64::engine::general_purpose::STANDARD.encode("plain text"));
        assert!(matches!(
            cache.ensure(&helm, &not_gzip).await,
            Err(KubeError::Archive(_))
        ));
        assert!(cache.cached_archive(&not_gzip).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_pull_without_archive_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChartCache::new(dir.path());
        let helm = MockHelm::new();
        helm.pull_writes_nothing();

        let err = cache.ensure(&helm, &spec(String::new())).await.unwrap_err();
        assert!(matches!(err, KubeError::Archive(_)));
    }

    #[tokio::test]
    async fn test_changed_bundle_uses_new_dir() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ChartCache::new(dir.path());
        let a = spec(chart_bundle("nginx", "1.0.0"));
        let b = spec(chart_bundle("nginx-next", "1.0.0"));
        assert_ne!(cache.chart_dir(&a), cache.chart_dir(&b));
    }
}
