//! Content hashes used to skip redundant work

use md5::{Digest, Md5};

use crate::desired::{ChartRef, ChartSpec};
use crate::error::Result;

/// Length of the hash prefix used for chart cache directory names
pub const CACHE_KEY_LEN: usize = 10;

/// Hash of the full declared chart spec
///
/// Equal hashes mean the release is already in the declared state.
pub fn chart_config_hash(spec: &ChartSpec) -> Result<String> {
    let json = serde_json::to_vec(spec)?;
    Ok(md5_hex(&json))
}

/// Cache directory name for a chart archive
///
/// Keyed by repository, name and version. Inline bundles additionally
/// contribute their own digest so a changed bundle gets a fresh directory.
pub fn archive_cache_key(chart: &ChartRef, bundle: &str) -> String {
    let mut input = format!("{}/{}@{}", chart.repo, chart.name, chart.version);
    if !bundle.is_empty() {
        input.push('#');
        input.push_str(&md5_hex(bundle.as_bytes()));
    }
    let mut key = md5_hex(input.as_bytes());
    key.truncate(CACHE_KEY_LEN);
    key
}

/// Lowercase hex MD5 of arbitrary bytes
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nginx() -> ChartSpec {
        ChartSpec {
            chart: ChartRef {
                name: "nginx".to_string(),
                repo: "https://example/charts".to_string(),
                version: "1.0.0".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_md5_hex() {
        assert_eq!(md5_hex(b""), "d41d8cd98f00b204e9800998ecf8427e");
        assert_eq!(md5_hex(b"hello world"), "5eb63bbbe01eeed093cb22bb8f5acdc3");
    }

    #[test]
    fn test_chart_config_hash_is_stable() {
        let a = chart_config_hash(&nginx()).unwrap();
        let b = chart_config_hash(&nginx()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_chart_config_hash_changes_with_any_field() {
        let base = chart_config_hash(&nginx()).unwrap();

        let mutations: Vec<fn(&mut ChartSpec)> = vec![
            |s| s.chart.version = "1.0.1".to_string(),
            |s| s.chart.repo = "https://other/charts".to_string(),
            |s| s.chart.username = "admin".to_string(),
            |s| s.chart.password = "secret".to_string(),
            |s| s.chart.insecure = true,
            |s| s.release.name = "web".to_string(),
            |s| s.release.namespace = "web".to_string(),
            |s| s.values = "replicas: 2".to_string(),
            |s| s.bundle = "H4sI".to_string(),
            |s| s.timeout = "5m".to_string(),
        ];

        for mutate in mutations {
            let mut spec = nginx();
            mutate(&mut spec);
            assert_ne!(chart_config_hash(&spec).unwrap(), base, "{:?}", spec);
        }
    }

    #[test]
    fn test_archive_cache_key() {
        let spec = nginx();
        let key = archive_cache_key(&spec.chart, "");
        assert_eq!(key.len(), CACHE_KEY_LEN);
        assert_eq!(key, archive_cache_key(&spec.chart, ""));

        let mut other = spec.chart.clone();
        other.version = "2.0.0".to_string();
        assert_ne!(key, archive_cache_key(&other, ""));
    }

    #[test]
    fn test_archive_cache_key_ignores_values() {
        let mut spec = nginx();
        let key = archive_cache_key(&spec.chart, "");
        spec.values = "replicas: 3".to_string();
        assert_eq!(key, archive_cache_key(&spec.chart, ""));
    }

    #[test]
    fn test_archive_cache_key_includes_bundle() {
        let spec = nginx();
        let pulled = archive_cache_key(&spec.chart, "");
        let bundled = archive_cache_key(&spec.chart, "YQ==");
        assert_ne!(pulled, bundled);
        assert_ne!(bundled, archive_cache_key(&spec.chart, "Yg=="));
    }
}
