//! Template engine based on MiniJinja

use minijinja::Environment;
use vdeploy_core::ReleaseContext;

use crate::error::{EngineError, Result, TemplateError};
use crate::filters;

/// Name under which the manifests template is registered
pub const MANIFESTS_TEMPLATE_NAME: &str = "manifests-template.yaml";

/// Renders a manifest template against the release context
pub trait TemplateEngine: Send + Sync {
    fn render(&self, template: &str, context: &ReleaseContext) -> Result<String>;
}

/// Template engine builder
pub struct EngineBuilder {
    strict_mode: bool,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self { strict_mode: true }
    }

    /// Set strict mode (fail on undefined variables)
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict_mode = strict;
        self
    }

    pub fn build(self) -> Engine {
        Engine::new(self.strict_mode)
    }
}

/// The MiniJinja template engine
#[derive(Debug, Clone)]
pub struct Engine {
    strict_mode: bool,
}

impl Engine {
    pub fn new(strict_mode: bool) -> Self {
        Self { strict_mode }
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::new()
    }

    /// Create a configured MiniJinja environment
    fn create_environment(&self) -> Environment<'static> {
        let mut env = Environment::new();

        if self.strict_mode {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        } else {
            env.set_undefined_behavior(minijinja::UndefinedBehavior::Lenient);
        }
        // Rendered YAML must keep its final newline
        env.set_keep_trailing_newline(true);

        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("tojson", filters::tojson);
        env.add_filter("b64encode", filters::b64encode);
        env.add_filter("b64decode", filters::b64decode);
        env.add_filter("quote", filters::quote);
        env.add_filter("nindent", filters::nindent);
        env.add_filter("indent", filters::indent);
        env.add_filter("required", filters::required);
        env.add_filter("sha256", filters::sha256sum);
        env.add_filter("trunc", filters::trunc);

        env
    }

    /// Render a single named template string
    pub fn render_string(
        &self,
        template: &str,
        context: &ReleaseContext,
        template_name: &str,
    ) -> Result<String> {
        let mut env = self.create_environment();
        env.add_template_owned(template_name.to_string(), template.to_string())
            .map_err(|e| {
                EngineError::Template(TemplateError::from_minijinja(e, template_name, template))
            })?;

        let tmpl = env.get_template(template_name).map_err(|e| {
            EngineError::Template(TemplateError::from_minijinja(e, template_name, template))
        })?;

        let ctx = minijinja::context! {
            release => &context.release,
            values => &context.values,
        };

        tmpl.render(ctx).map_err(|e| {
            EngineError::Template(TemplateError::from_minijinja(e, template_name, template))
        })
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl TemplateEngine for Engine {
    fn render(&self, template: &str, context: &ReleaseContext) -> Result<String> {
        self.render_string(template, context, MANIFESTS_TEMPLATE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> ReleaseContext {
        ReleaseContext::new("my-vcluster", "team-a")
            .with_values(serde_json::json!({"replicas": 3, "labels": {"app": "web"}}))
    }

    #[test]
    fn test_render_release_and_values() {
        let engine = Engine::default();
        let out = engine
            .render(
                "name: {{ release.name }}\nnamespace: {{ release.namespace }}\nreplicas: {{ values.replicas }}\n",
                &context(),
            )
            .unwrap();
        assert_eq!(out, "name: my-vcluster\nnamespace: team-a\nreplicas: 3\n");
    }

    #[test]
    fn test_render_with_filters() {
        let engine = Engine::default();
        let out = engine
            .render("labels:{{ values.labels | toyaml | nindent(2) }}", &context())
            .unwrap();
        assert_eq!(out, "labels:\n  app: web");
    }

    #[test]
    fn test_strict_mode_rejects_undefined() {
        let engine = Engine::default();
        let err = engine.render("{{ values.missing.deep }}", &context()).unwrap_err();
        assert!(matches!(err, EngineError::Template(_)));
    }

    #[test]
    fn test_lenient_mode() {
        let engine = Engine::builder().strict(false).build();
        let out = engine.render("x: '{{ values.missing }}'", &context()).unwrap();
        assert_eq!(out, "x: ''");
    }

    #[test]
    fn test_syntax_error_reports_line() {
        let engine = Engine::default();
        let EngineError::Template(t) = engine.render("ok: 1\nbad: {{ oops(", &context()).unwrap_err();
        assert_eq!(t.line, Some(2));
    }

    #[test]
    fn test_filter_failure_is_template_error() {
        let engine = Engine::default();
        let EngineError::Template(t) = engine
            .render("data: {{ \"%%%\" | b64decode }}", &context())
            .unwrap_err();
        assert!(t.message.contains("base64"), "{}", t.message);
    }

    #[test]
    fn test_render_snapshot() {
        let engine = Engine::default();
        let template = r#"apiVersion: v1
kind: ConfigMap
metadata:
  name: {{ release.name }}-config
  namespace: {{ release.namespace }}
data:
  replicas: {{ values.replicas | quote }}
"#;
        insta::assert_snapshot!(engine.render(template, &context()).unwrap(), @r#"
        apiVersion: v1
        kind: ConfigMap
        metadata:
          name: my-vcluster-config
          namespace: team-a
        data:
          replicas: "3"
        "#);
    }
}
