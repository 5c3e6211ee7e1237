//! `helm` binary backed [`HelmClient`]

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Output;
use tempfile::NamedTempFile;
use tokio::process::Command;
use tracing::debug;

use super::{HelmClient, HelmOptions};
use crate::error::{KubeError, Result};

/// How to invoke the helm binary
#[derive(Debug, Clone)]
pub struct HelmConfig {
    /// Path or name of the helm executable
    pub binary: PathBuf,
    /// Kubeconfig passed with `--kubeconfig`, if any
    pub kubeconfig: Option<PathBuf>,
}

impl Default for HelmConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("helm"),
            kubeconfig: None,
        }
    }
}

/// Runs helm as a child process
#[derive(Debug, Clone, Default)]
pub struct HelmCli {
    config: HelmConfig,
}

impl HelmCli {
    pub fn new(config: HelmConfig) -> Self {
        Self { config }
    }

    /// Run helm with the given arguments, failing on a non-zero exit
    async fn run(&self, verb: &str, args: Vec<OsString>) -> Result<Output> {
        let mut cmd = Command::new(&self.config.binary);
        cmd.args(&args);
        if let Some(kubeconfig) = &self.config.kubeconfig {
            cmd.arg("--kubeconfig").arg(kubeconfig);
        }
        // A timed-out or cancelled caller drops this future; take helm down with it
        cmd.kill_on_drop(true);

        debug!(command = %verb, "running helm");
        let output = cmd.output().await.map_err(|e| KubeError::Helm {
            command: format!("helm {}", verb),
            message: format!("failed to execute {}: {}", self.config.binary.display(), e),
        })?;

        if output.status.success() {
            Ok(output)
        } else {
            Err(KubeError::Helm {
                command: format!("helm {}", verb),
                message: failure_message(&output),
            })
        }
    }

    /// Shared install/upgrade invocation
    async fn deploy(
        &self,
        verb: &str,
        name: &str,
        namespace: &str,
        options: &HelmOptions,
    ) -> Result<()> {
        let values_file = write_values(options)?;
        let args = deploy_args(
            verb,
            name,
            namespace,
            options,
            values_file.as_ref().map(NamedTempFile::path),
        );
        self.run(verb, args).await?;
        Ok(())
    }
}

#[async_trait]
impl HelmClient for HelmCli {
    async fn install(&self, name: &str, namespace: &str, options: &HelmOptions) -> Result<()> {
        self.deploy("install", name, namespace, options).await
    }

    async fn upgrade(&self, name: &str, namespace: &str, options: &HelmOptions) -> Result<()> {
        self.deploy("upgrade", name, namespace, options).await
    }

    async fn delete(&self, name: &str, namespace: &str) -> Result<()> {
        let args = os_args(["delete", name, "--namespace", namespace]);
        match self.run("delete", args).await {
            Err(e) if is_release_not_found(&e) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn exists(&self, name: &str, namespace: &str) -> Result<bool> {
        match self.status(name, namespace).await {
            Ok(_) => Ok(true),
            Err(e) if is_release_not_found(&e) => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn pull(&self, name: &str, options: &HelmOptions) -> Result<()> {
        self.run("pull", pull_args(name, options)).await?;
        Ok(())
    }

    async fn status(&self, name: &str, namespace: &str) -> Result<Vec<u8>> {
        let args = os_args(["status", name, "--namespace", namespace]);
        Ok(self.run("status", args).await?.stdout)
    }

    async fn rollback(&self, name: &str, namespace: &str) -> Result<()> {
        let args = os_args(["rollback", name, "--namespace", namespace]);
        self.run("rollback", args).await?;
        Ok(())
    }
}

fn os_args<'a>(args: impl IntoIterator<Item = &'a str>) -> Vec<OsString> {
    args.into_iter().map(OsString::from).collect()
}

fn failure_message(output: &Output) -> String {
    let stderr = String::from_utf8_lossy(&output.stderr);
    let stderr = stderr.trim();
    if stderr.is_empty() {
        format!("exited with {}", output.status)
    } else {
        stderr.to_string()
    }
}

fn is_release_not_found(err: &KubeError) -> bool {
    matches!(err, KubeError::Helm { message, .. } if message.contains("release: not found"))
}

/// Values go through a temporary file that lives until helm exits
fn write_values(options: &HelmOptions) -> Result<Option<NamedTempFile>> {
    if options.values.trim().is_empty() {
        return Ok(None);
    }
    std::fs::create_dir_all(&options.work_dir)?;
    let mut file = tempfile::Builder::new()
        .prefix("values-")
        .suffix(".yaml")
        .tempfile_in(&options.work_dir)?;
    std::io::Write::write_all(&mut file, options.values.as_bytes())?;
    Ok(Some(file))
}

/// Repository, version and credential flags shared by deploy and pull
fn push_source_args(args: &mut Vec<OsString>, options: &HelmOptions) {
    if !options.repo.is_empty() && !options.is_oci() {
        args.extend(os_args(["--repo", &options.repo]));
    }
    if !options.version.is_empty() {
        args.extend(os_args(["--version", &options.version]));
    }
    if !options.username.is_empty() {
        args.extend(os_args(["--username", &options.username]));
    }
    if !options.password.is_empty() {
        args.extend(os_args(["--password", &options.password]));
    }
    if options.insecure {
        args.push("--insecure-skip-tls-verify".into());
    }
}

/// Chart reference helm resolves: `oci://registry/path/name` or the bare name
fn chart_reference(name: &str, options: &HelmOptions) -> String {
    if options.is_oci() {
        format!("{}/{}", options.repo.trim_end_matches('/'), name)
    } else {
        name.to_string()
    }
}

fn deploy_args(
    verb: &str,
    name: &str,
    namespace: &str,
    options: &HelmOptions,
    values_file: Option<&Path>,
) -> Vec<OsString> {
    let mut args = os_args([verb, name]);
    match &options.path {
        Some(path) => args.push(path.as_os_str().to_owned()),
        None => {
            args.push(chart_reference(&options.chart, options).into());
            push_source_args(&mut args, options);
        }
    }
    args.extend(os_args(["--namespace", namespace]));
    if options.create_namespace {
        args.push("--create-namespace".into());
    }
    if let Some(file) = values_file {
        args.push("--values".into());
        args.push(file.as_os_str().to_owned());
    }
    if let Some(timeout) = options.timeout {
        args.push("--timeout".into());
        args.push(format!("{}s", timeout.as_secs().max(1)).into());
    }
    args
}

fn pull_args(name: &str, options: &HelmOptions) -> Vec<OsString> {
    let mut args = os_args(["pull"]);
    args.push(chart_reference(name, options).into());
    args.push("--destination".into());
    args.push(options.work_dir.as_os_str().to_owned());
    push_source_args(&mut args, options);
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn strings(args: Vec<OsString>) -> Vec<String> {
        args.into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn options() -> HelmOptions {
        HelmOptions {
            chart: "nginx".to_string(),
            repo: "https://charts.example.com".to_string(),
            version: "1.2.3".to_string(),
            create_namespace: true,
            work_dir: PathBuf::from("/cache/abc"),
            timeout: Some(Duration::from_secs(180)),
            ..Default::default()
        }
    }

    #[test]
    fn test_install_args_from_archive() {
        let opts = options().with_path("/cache/abc/nginx-1.2.3.tgz");
        let args = strings(deploy_args(
            "install",
            "web",
            "apps",
            &opts,
            Some(Path::new("/cache/abc/values-1.yaml")),
        ));
        assert_eq!(
            args,
            vec![
                "install",
                "web",
                "/cache/abc/nginx-1.2.3.tgz",
                "--namespace",
                "apps",
                "--create-namespace",
                "--values",
                "/cache/abc/values-1.yaml",
                "--timeout",
                "180s",
            ]
        );
    }

    #[test]
    fn test_upgrade_args_from_repo() {
        let args = strings(deploy_args("upgrade", "web", "apps", &options(), None));
        assert_eq!(
            args,
            vec![
                "upgrade",
                "web",
                "nginx",
                "--repo",
                "https://charts.example.com",
                "--version",
                "1.2.3",
                "--namespace",
                "apps",
                "--create-namespace",
                "--timeout",
                "180s",
            ]
        );
    }

    #[test]
    fn test_pull_args_oci() {
        let opts = HelmOptions {
            repo: "oci://registry.example.com/charts/".to_string(),
            username: "bot".to_string(),
            password: "secret".to_string(),
            insecure: true,
            ..options()
        };
        let args = strings(pull_args("nginx", &opts));
        assert_eq!(
            args,
            vec![
                "pull",
                "oci://registry.example.com/charts/nginx",
                "--destination",
                "/cache/abc",
                "--version",
                "1.2.3",
                "--username",
                "bot",
                "--password",
                "secret",
                "--insecure-skip-tls-verify",
            ]
        );
    }

    #[test]
    fn test_release_not_found_detection() {
        let err = KubeError::Helm {
            command: "helm status".to_string(),
            message: "Error: release: not found".to_string(),
        };
        assert!(is_release_not_found(&err));
        assert!(!is_release_not_found(&KubeError::Cancelled));
    }

    #[test]
    fn test_write_values_skips_empty() {
        let dir = tempfile::tempdir().unwrap();
        let opts = HelmOptions {
            work_dir: dir.path().to_path_buf(),
            ..Default::default()
        };
        assert!(write_values(&opts).unwrap().is_none());

        let opts = HelmOptions {
            values: "replicas: 2\n".to_string(),
            ..opts
        };
        let file = write_values(&opts).unwrap().unwrap();
        assert_eq!(
            std::fs::read_to_string(file.path()).unwrap(),
            "replicas: 2\n"
        );
    }

    #[tokio::test]
    async fn test_missing_binary_is_helm_error() {
        let helm = HelmCli::new(HelmConfig {
            binary: PathBuf::from("/nonexistent/helm-binary"),
            kubeconfig: None,
        });
        let err = helm.status("web", "apps").await.unwrap_err();
        assert!(matches!(err, KubeError::Helm { .. }));
        assert!(!err.is_not_found());
    }
}
