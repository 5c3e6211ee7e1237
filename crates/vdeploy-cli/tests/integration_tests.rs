//! Integration tests for CLI commands that need no cluster

use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

/// Helper to run vdeploy command
fn vdeploy(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_vdeploy"))
        .args(args)
        .env_remove("VDEPLOY_CONFIG")
        .env("NO_COLOR", "1")
        .output()
        .expect("Failed to execute vdeploy")
}

fn write_config(dir: &TempDir, content: &str) -> String {
    let path = dir.path().join("vdeploy.yaml");
    std::fs::write(&path, content).unwrap();
    path_arg(&path)
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

const CONFIG: &str = r#"
release:
  name: my-vcluster
  namespace: vcluster-my-vcluster
values:
  replicas: 2
deploy:
  manifests: |
    apiVersion: v1
    kind: Namespace
    metadata:
      name: team-a
  manifestsTemplate: |
    apiVersion: apps/v1
    kind: Deployment
    metadata:
      name: {{ release.name }}-web
      namespace: team-a
    spec:
      replicas: {{ values.replicas }}
  charts:
    - chart:
        name: nginx
        repo: https://charts.example.com
        version: 1.0.0
      values: |
        replicaCount: 2
    - chart:
        name: cert-manager
        repo: oci://registry.example.com/charts
        version: 1.14.0
      release:
        namespace: cert-manager
"#;

mod render_command {
    use super::*;

    #[test]
    fn test_render_prints_desired_manifests() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, CONFIG);

        let output = vdeploy(&["render", "--config", &config]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let stdout = String::from_utf8_lossy(&output.stdout);
        insta::assert_snapshot!(stdout, @r"
        apiVersion: v1
        kind: Namespace
        metadata:
          name: team-a
        ---
        apiVersion: apps/v1
        kind: Deployment
        metadata:
          name: my-vcluster-web
          namespace: team-a
        spec:
          replicas: 2
        ");
    }

    #[test]
    fn test_render_template_error_exit_code() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            &dir,
            "deploy:\n  manifestsTemplate: \"name: {{ values.nope.deeper }}\"\n",
        );

        let output = vdeploy(&["render", "--config", &config]);
        assert_eq!(output.status.code(), Some(3));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("vdeploy::cli::template"), "{}", stderr);
    }

    #[test]
    fn test_render_missing_config() {
        let output = vdeploy(&["render", "--config", "/nonexistent/vdeploy.yaml"]);
        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("cannot read"), "{}", stderr);
    }

    #[test]
    fn test_render_config_from_env() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, CONFIG);

        let output = Command::new(env!("CARGO_BIN_EXE_vdeploy"))
            .arg("render")
            .env("VDEPLOY_CONFIG", &config)
            .output()
            .expect("Failed to execute vdeploy");
        assert!(output.status.success());
        assert!(String::from_utf8_lossy(&output.stdout).contains("my-vcluster-web"));
    }
}

mod hash_command {
    use super::*;

    #[test]
    fn test_hash_lists_every_chart() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, CONFIG);

        let output = vdeploy(&["hash", "--config", &config]);
        assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

        let stdout = String::from_utf8_lossy(&output.stdout);
        let lines: Vec<&str> = stdout.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].ends_with("  default/nginx"));
        assert!(lines[1].ends_with("  cert-manager/cert-manager"));
        for line in lines {
            let hash = line.split_whitespace().next().unwrap();
            assert_eq!(hash.len(), 32);
            assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        }
    }

    #[test]
    fn test_hash_is_stable_across_runs() {
        let dir = TempDir::new().unwrap();
        let config = write_config(&dir, CONFIG);

        let first = vdeploy(&["hash", "--config", &config]);
        let second = vdeploy(&["hash", "--config", &config]);
        assert_eq!(first.stdout, second.stdout);
    }

    #[test]
    fn test_hash_changes_with_values() {
        let dir = TempDir::new().unwrap();
        let before = vdeploy(&["hash", "--config", &write_config(&dir, CONFIG)]);
        let changed = CONFIG.replace("replicaCount: 2", "replicaCount: 3");
        let after = vdeploy(&["hash", "--config", &write_config(&dir, &changed)]);

        let first_line = |out: &std::process::Output| {
            String::from_utf8_lossy(&out.stdout)
                .lines()
                .next()
                .unwrap()
                .to_string()
        };
        assert_ne!(first_line(&before), first_line(&after));
        // Second chart is untouched
        assert_eq!(
            String::from_utf8_lossy(&before.stdout).lines().nth(1),
            String::from_utf8_lossy(&after.stdout).lines().nth(1)
        );
    }

    #[test]
    fn test_hash_rejects_duplicate_releases() {
        let dir = TempDir::new().unwrap();
        let config = write_config(
            &dir,
            "deploy:\n  charts:\n    - chart: { name: nginx }\n    - chart: { name: nginx }\n",
        );

        let output = vdeploy(&["hash", "--config", &config]);
        assert_eq!(output.status.code(), Some(2));
        let stderr = String::from_utf8_lossy(&output.stderr);
        assert!(stderr.contains("Duplicate"), "{}", stderr);
        assert!(stderr.contains("default/nginx"), "{}", stderr);
    }
}

mod usage {
    use super::*;

    #[test]
    fn test_help_lists_commands() {
        let output = vdeploy(&["--help"]);
        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        for command in ["run", "status", "render", "hash"] {
            assert!(stdout.contains(command), "missing {}", command);
        }
    }

    #[test]
    fn test_run_requires_config() {
        let output = vdeploy(&["run"]);
        assert!(!output.status.success());
    }
}
