//! Chart rendering
//!
//! A chart is a directory with a `values.yaml` holding the defaults and a
//! `templates/` directory of minijinja templates. Each template is rendered
//! against `{ Values, Release: { Name, Namespace } }`; the outputs are joined
//! into one multi-document stream and parsed into a [`ManifestSet`].

use std::path::Path;

use minijinja::{context, Environment, UndefinedBehavior, Value};
use tracing::debug;

#[cfg(test)]
use mockall::automock;

use nats_common::Error;

use super::filters;
use super::manifest::{parse_manifests, ManifestSet};
use super::release::{deep_merge, ReleaseInstance};

/// Renders the manifest set of a release
#[cfg_attr(test, automock)]
pub trait ManifestRenderer: Send + Sync {
    /// Render all templates for `release` and parse the result
    fn render(&self, release: &ReleaseInstance) -> Result<ManifestSet, Error>;
}

/// Renderer for a chart loaded from disk once at startup
pub struct ChartRenderer {
    env: Environment<'static>,
    defaults: serde_json::Value,
    templates: Vec<(String, String)>,
}

impl ChartRenderer {
    /// Load the chart in `dir`
    ///
    /// Templates are the `.yaml`/`.yml` files under `templates/`, rendered in
    /// file-name order.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, Error> {
        let dir = dir.as_ref();
        if !dir.is_dir() {
            return Err(Error::template(
                dir.display().to_string(),
                "chart directory not found",
            ));
        }

        let values_path = dir.join("values.yaml");
        let values = std::fs::read_to_string(&values_path)
            .map_err(|e| Error::template("values.yaml", e.to_string()))?;
        let defaults: serde_json::Value = serde_yaml::from_str(&values)
            .map_err(|e| Error::template("values.yaml", e.to_string()))?;

        let templates_dir = dir.join("templates");
        let entries = std::fs::read_dir(&templates_dir)
            .map_err(|e| Error::template("templates", e.to_string()))?;

        let mut templates = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| Error::template("templates", e.to_string()))?
                .path();
            let is_yaml = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "yaml" || ext == "yml");
            if !is_yaml {
                continue;
            }
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or_default()
                .to_string();
            let source = std::fs::read_to_string(&path)
                .map_err(|e| Error::template(name.clone(), e.to_string()))?;
            templates.push((name, source));
        }

        debug!(chart = %dir.display(), templates = templates.len(), "loaded chart");
        Self::from_parts(defaults, templates)
    }

    /// Build a renderer from defaults and `(file name, source)` templates
    pub fn from_parts(
        defaults: serde_json::Value,
        mut templates: Vec<(String, String)>,
    ) -> Result<Self, Error> {
        templates.sort_by(|a, b| a.0.cmp(&b.0));

        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Chainable);
        env.add_filter("toyaml", filters::toyaml);
        env.add_filter("b64enc", filters::b64enc);
        env.add_filter("quote", filters::quote);
        env.add_function("random_alphanumeric", filters::random_alphanumeric);

        let syntax_check = Environment::new();
        for (name, source) in &templates {
            syntax_check
                .template_from_named_str(name, source)
                .map(|_| ())
                .map_err(|e| Error::template(name.clone(), e.to_string()))?;
        }

        Ok(Self {
            env,
            defaults: if defaults.is_null() {
                serde_json::Value::Object(Default::default())
            } else {
                defaults
            },
            templates,
        })
    }

    /// Chart defaults with the release overrides merged on top
    pub fn values_for(&self, release: &ReleaseInstance) -> Result<serde_json::Value, Error> {
        let mut values = self.defaults.clone();
        deep_merge(&mut values, release.configuration()?);
        Ok(values)
    }

    /// Render all templates into one multi-document stream
    pub fn render_to_string(&self, release: &ReleaseInstance) -> Result<String, Error> {
        let values = self.values_for(release)?;
        let ctx = context! {
            Values => Value::from_serialize(&values),
            Release => context! {
                Name => release.name.as_str(),
                Namespace => release.namespace.as_str(),
            },
        };

        let mut out = String::new();
        for (name, source) in &self.templates {
            let rendered = self
                .env
                .render_named_str(name, source, &ctx)
                .map_err(|e| Error::template(name.clone(), e.to_string()))?;
            if rendered.trim().is_empty() {
                continue;
            }
            out.push_str("---\n");
            out.push_str(&format!("# Source: templates/{}\n", name));
            out.push_str(rendered.trim_end());
            out.push('\n');
        }
        Ok(out)
    }
}

impl ManifestRenderer for ChartRenderer {
    fn render(&self, release: &ReleaseInstance) -> Result<ManifestSet, Error> {
        let rendered = self.render_to_string(release)?;
        parse_manifests(&rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn renderer(templates: &[(&str, &str)]) -> ChartRenderer {
        ChartRenderer::from_parts(
            json!({"cluster": {"replicas": 1}, "istio": {"enabled": false}}),
            templates
                .iter()
                .map(|(n, s)| (n.to_string(), s.to_string()))
                .collect(),
        )
        .expect("chart should compile")
    }

    fn release(overrides: &[(&str, serde_json::Value)]) -> ReleaseInstance {
        ReleaseInstance::new(
            "eventing-nats",
            "kyma-system",
            false,
            overrides
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect::<BTreeMap<_, _>>(),
        )
    }

    const STATEFULSET: &str = "apiVersion: apps/v1\nkind: StatefulSet\nmetadata:\n  name: {{ Release.Name }}\n  namespace: {{ Release.Namespace }}\nspec:\n  replicas: {{ Values.cluster.replicas }}\n";

    #[test]
    fn overrides_reach_templates() {
        let r = renderer(&[("statefulset.yaml", STATEFULSET)]);
        let set = r
            .render(&release(&[("cluster.replicas", json!(3))]))
            .expect("render should succeed");

        assert_eq!(set.items.len(), 1);
        let sts = &set.items[0];
        assert_eq!(sts.metadata.name.as_deref(), Some("eventing-nats"));
        assert_eq!(sts.metadata.namespace.as_deref(), Some("kyma-system"));
        assert_eq!(sts.data["spec"]["replicas"], json!(3));
    }

    #[test]
    fn defaults_apply_without_overrides() {
        let r = renderer(&[("statefulset.yaml", STATEFULSET)]);
        let set = r.render(&release(&[])).expect("render should succeed");
        assert_eq!(set.items[0].data["spec"]["replicas"], json!(1));
    }

    #[test]
    fn blank_renders_are_skipped() {
        let r = renderer(&[
            (
                "destinationrule.yaml",
                "{% if Values.istio.enabled %}apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\n{% endif %}",
            ),
            ("statefulset.yaml", STATEFULSET),
        ]);
        let text = r.render_to_string(&release(&[])).expect("render should succeed");
        assert_eq!(text.matches("---").count(), 1);

        let set = r
            .render(&release(&[("istio.enabled", json!(true))]))
            .expect("render should succeed");
        assert_eq!(set.items.len(), 2);
    }

    #[test]
    fn templates_render_in_file_name_order() {
        let r = renderer(&[
            ("b.yaml", "apiVersion: v1\nkind: Service\nmetadata:\n  name: b\n"),
            ("a.yaml", "apiVersion: v1\nkind: Service\nmetadata:\n  name: a\n"),
        ]);
        let set = r.render(&release(&[])).expect("render should succeed");
        assert_eq!(set.items[0].metadata.name.as_deref(), Some("a"));
        assert_eq!(set.items[1].metadata.name.as_deref(), Some("b"));
    }

    #[test]
    fn undefined_values_chain_quietly() {
        let r = renderer(&[(
            "cm.yaml",
            "apiVersion: v1\nkind: ConfigMap\nmetadata:\n  name: x\ndata:\n  v: {{ Values.missing.deeper | quote }}\n",
        )]);
        let set = r.render(&release(&[])).expect("render should succeed");
        assert_eq!(set.items[0].data["data"]["v"], json!(""));
    }

    #[test]
    fn syntax_errors_name_the_template() {
        let err = ChartRenderer::from_parts(
            json!({}),
            vec![("broken.yaml".to_string(), "{% if %}".to_string())],
        )
        .err()
        .expect("broken template should fail to compile");
        assert_eq!(err.context(), Some("broken.yaml"));
    }

    #[test]
    fn missing_chart_directory_is_an_error() {
        assert!(ChartRenderer::load("/nonexistent/chart").is_err());
    }
}
