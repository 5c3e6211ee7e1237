//! Render command - print the desired manifests without touching the cluster

use std::path::Path;
use vdeploy_core::{ParsedManifest, join_documents};
use vdeploy_engine::{Engine, TemplateEngine};

use crate::config::DeployConfig;
use crate::error::{CliError, Result};

/// Run the render command
pub fn run(config_path: &Path) -> Result<()> {
    let config = DeployConfig::load(config_path)?;
    let manifests = render_manifests(&config, &Engine::default())?;
    if !manifests.is_empty() {
        println!("{}", manifests);
    }
    Ok(())
}

/// Raw manifests followed by the rendered template, checked to parse
pub fn render_manifests<E: TemplateEngine>(config: &DeployConfig, engine: &E) -> Result<String> {
    let deploy = &config.deploy;
    let manifests = if deploy.manifests_template.trim().is_empty() {
        join_documents([deploy.manifests.as_str()])
    } else {
        let rendered = engine.render(&deploy.manifests_template, &config.context())?;
        join_documents([deploy.manifests.as_str(), rendered.as_str()])
    };

    ParsedManifest::parse(&manifests)
        .into_result()
        .map_err(|e| CliError::Template {
            message: e.to_string(),
            help: Some("every document needs apiVersion, kind and metadata.name".to_string()),
        })?;

    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(yaml: &str) -> DeployConfig {
        DeployConfig::from_yaml(yaml).unwrap()
    }

    #[test]
    fn test_render_joins_raw_and_template() {
        let config = config(
            r#"
release: { name: my-vcluster, namespace: vcluster-my-vcluster }
values: { tier: gold }
deploy:
  manifests: |
    apiVersion: v1
    kind: Namespace
    metadata:
      name: team-a
  manifestsTemplate: |
    apiVersion: v1
    kind: ConfigMap
    metadata:
      name: {{ release.name }}-info
      namespace: team-a
    data:
      tier: {{ values.tier | quote }}
"#,
        );

        let out = render_manifests(&config, &Engine::default()).unwrap();
        insta::assert_snapshot!(out, @r#"
        apiVersion: v1
        kind: Namespace
        metadata:
          name: team-a
        ---
        apiVersion: v1
        kind: ConfigMap
        metadata:
          name: my-vcluster-info
          namespace: team-a
        data:
          tier: "gold"
        "#);
    }

    #[test]
    fn test_render_undefined_value_is_template_error() {
        let config = config("deploy:\n  manifestsTemplate: \"name: {{ values.missing.key }}\"\n");
        let err = render_manifests(&config, &Engine::default()).unwrap_err();
        assert!(matches!(err, CliError::Template { .. }), "{:?}", err);
    }

    #[test]
    fn test_render_rejects_objects_without_kind() {
        let config = config("deploy:\n  manifests: |\n    apiVersion: v1\n    metadata:\n      name: x\n");
        let err = render_manifests(&config, &Engine::default()).unwrap_err();
        assert!(matches!(err, CliError::Template { help: Some(_), .. }));
    }

    #[test]
    fn test_render_empty_deploy() {
        let config = config("deploy: {}\n");
        assert_eq!(render_manifests(&config, &Engine::default()).unwrap(), "");
    }
}
