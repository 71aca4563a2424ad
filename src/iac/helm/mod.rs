//! Helm chart loader.
//!
//! Every directory holding a `Chart.yaml` is rendered in process with the
//! chart's values and the rendered manifests are normalized as Kubernetes
//! resources. Each chart also yields one `helm_chart` resource.

pub mod chart;
pub mod template;
pub mod values;

use log::{debug, warn};
use rayon::prelude::*;
use std::path::{Path, PathBuf};

use super::files::{self, relative_source};
use super::k8s::normalize::normalize_documents;
use super::output::{AllResourceConfigs, ResourceConfig};
use super::yaml;
use super::{DirScanErr, IacLoader, LoadOptions, LoadOutcome};
use crate::error::IacError;

pub use chart::{Chart, load_chart, parse_chart};
use template::{Engine, Node};

const IAC_TYPE: &str = "helm";
const CHART_TYPE: &str = "helm_chart";
const TEMPLATE_EXTENSIONS: &[&str] = &["yaml", "yml", "tpl"];

/// Loader for Helm v3 charts.
#[derive(Debug, Clone, Default)]
pub struct HelmLoader;

impl HelmLoader {
    pub fn new() -> Self {
        Self
    }
}

fn is_chart_file(path: &Path) -> bool {
    path.file_name().is_some_and(|n| n == chart::CHART_FILE)
}

/// Files under `templates/` that take part in rendering, skipping `tests/`.
fn template_files(chart: &Chart) -> Result<Vec<PathBuf>, IacError> {
    let dir = chart.templates_dir();
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let found = files::find_files_by_extension(&dir, TEMPLATE_EXTENSIONS, false)?;
    Ok(found
        .into_iter()
        .filter(|f| {
            !f.strip_prefix(&dir)
                .map(|rel| rel.components().any(|c| c.as_os_str() == "tests"))
                .unwrap_or(false)
        })
        .collect())
}

/// Partials contribute named templates only.
fn is_partial(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with('_'))
}

fn chart_resource(chart: &Chart, source: String) -> ResourceConfig {
    ResourceConfig {
        id: format!("{}.{}", CHART_TYPE, chart.name),
        name: chart.name.clone(),
        source,
        line: 1,
        resource_type: CHART_TYPE.to_string(),
        config: chart.metadata.clone(),
        ..Default::default()
    }
}

/// Render every template of the chart at `chart_file`.
fn load_chart_dir(root: &Path, chart_file: &Path, overlays: &[PathBuf]) -> LoadOutcome {
    let chart_dir = chart_file.parent().unwrap_or(root);
    let dir_name = chart_dir.display().to_string();
    let fail = |e: IacError| LoadOutcome::failed(DirScanErr::new(IAC_TYPE, dir_name.clone(), e));

    let chart = match load_chart(chart_dir) {
        Ok(chart) => chart,
        Err(e) => return fail(e),
    };
    let values = match values::load_values(chart_dir, overlays) {
        Ok(values) => values,
        Err(e) => return fail(e),
    };
    let templates = match template_files(&chart) {
        Ok(templates) => templates,
        Err(e) => return fail(e),
    };
    debug!("rendering chart {} with {} template(s)", chart.name, templates.len());

    let mut outcome = LoadOutcome::default();
    let mut engine = Engine::new();
    let mut parsed: Vec<(&PathBuf, Vec<Node>)> = Vec::new();
    for path in &templates {
        let result = std::fs::read_to_string(path)
            .map_err(IacError::from)
            .and_then(|src| engine.add(&src).map_err(|e| render_error(&chart, path, e)));
        match result {
            Ok(nodes) if !is_partial(path) => parsed.push((path, nodes)),
            Ok(_) => {}
            Err(e) => outcome.errors.push(DirScanErr::new(IAC_TYPE, dir_name.clone(), e)),
        }
    }

    for (path, nodes) in parsed {
        let name = template_name(&chart, path);
        let ctx = chart::render_context(&chart, &values, &name);
        let rendered = engine
            .render(&nodes, &ctx)
            .map_err(|e| render_error(&chart, path, e))
            .and_then(|text| {
                yaml::parse_documents(&text).map_err(|e| IacError::Render {
                    template: name.clone(),
                    message: e.to_string(),
                })
            });
        match rendered {
            Ok(documents) => {
                let source = relative_source(root, path);
                outcome
                    .resources
                    .merge(normalize_documents(&documents, &source, Some(1)));
            }
            Err(e) => {
                warn!("failed to render helm template {}: {}", path.display(), e);
                outcome.errors.push(DirScanErr::new(IAC_TYPE, dir_name.clone(), e));
            }
        }
    }

    outcome
        .resources
        .push(chart_resource(&chart, relative_source(root, chart_file)));
    outcome
}

fn template_name(chart: &Chart, path: &Path) -> String {
    let rel = path
        .strip_prefix(&chart.dir)
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_else(|_| path.display().to_string());
    format!("{}/{}", chart.name, rel)
}

fn render_error(chart: &Chart, path: &Path, e: template::TemplateError) -> IacError {
    IacError::Render {
        template: template_name(chart, path),
        message: e.to_string(),
    }
}

impl IacLoader for HelmLoader {
    fn load_iac_dir(&self, root: &Path, options: &LoadOptions) -> LoadOutcome {
        let charts = match files::find_files(root, options.non_recursive(), is_chart_file) {
            Ok(charts) => charts,
            Err(e) => return LoadOutcome::failed(DirScanErr::new(IAC_TYPE, root.display().to_string(), e)),
        };
        if charts.is_empty() {
            let err = IacError::NoHelmCharts(root.display().to_string());
            debug!("{}", err);
            return LoadOutcome::failed(DirScanErr::new(IAC_TYPE, root.display().to_string(), err));
        }

        let overlays = options.values_files();
        let results: Vec<LoadOutcome> = charts
            .par_iter()
            .map(|chart_file| load_chart_dir(root, chart_file, &overlays))
            .collect();

        let mut outcome = LoadOutcome::default();
        for result in results {
            outcome.merge(result);
        }
        outcome
    }

    fn load_iac_file(&self, _path: &Path, _options: &LoadOptions) -> Result<AllResourceConfigs, IacError> {
        Err(IacError::FileNotSupported(IAC_TYPE))
    }

    fn name(&self) -> &'static str {
        IAC_TYPE
    }
}
