//! Chart.yaml parsing and the render context built from it.

use serde_json::{Map, Value, json};
use std::path::{Path, PathBuf};

use crate::error::IacError;
use crate::iac::yaml;

/// File marking a chart root.
pub const CHART_FILE: &str = "Chart.yaml";

/// Release name used for every render.
pub const RELEASE_NAME: &str = "moniker";

/// Kubernetes version reported through `.Capabilities`.
const KUBE_VERSION: (&str, &str) = ("1", "20");

/// A chart found on disk.
#[derive(Debug, Clone)]
pub struct Chart {
    pub name: String,
    pub version: String,
    /// Chart.yaml content as JSON.
    pub metadata: Value,
    pub dir: PathBuf,
}

impl Chart {
    pub fn templates_dir(&self) -> PathBuf {
        self.dir.join("templates")
    }

    pub fn namespace(&self) -> String {
        format!("{}-namespace", self.name)
    }
}

/// Parse Chart.yaml content.
///
/// `name` and `version` must be strings; a YAML number in either is rejected.
pub fn parse_chart(content: &str, dir: &Path) -> Result<Chart, IacError> {
    let raw: serde_yaml::Value =
        serde_yaml::from_str(content).map_err(|e| IacError::parse(dir.join(CHART_FILE).display().to_string(), e))?;
    let metadata = yaml::to_json(&raw);

    let name = match raw.get("name") {
        Some(serde_yaml::Value::String(name)) if !name.is_empty() => name.clone(),
        _ => return Err(IacError::BadChartName),
    };
    let version = match raw.get("version") {
        Some(serde_yaml::Value::String(version)) => version.clone(),
        _ => return Err(IacError::BadChartVersion),
    };

    Ok(Chart {
        name,
        version,
        metadata,
        dir: dir.to_path_buf(),
    })
}

/// Read and parse `<dir>/Chart.yaml`.
pub fn load_chart(dir: &Path) -> Result<Chart, IacError> {
    let content = std::fs::read_to_string(dir.join(CHART_FILE))?;
    parse_chart(&content, dir)
}

/// Chart.yaml keys as exposed under `.Chart`.
fn chart_key(key: &str) -> String {
    match key {
        "apiVersion" => "APIVersion".to_string(),
        _ => {
            let mut chars = key.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        }
    }
}

/// The `.` passed to every template of `chart`.
pub fn render_context(chart: &Chart, values: &Value, template_name: &str) -> Value {
    let mut chart_ctx = Map::new();
    if let Value::Object(metadata) = &chart.metadata {
        for (key, value) in metadata {
            chart_ctx.insert(chart_key(key), value.clone());
        }
    }

    let (major, minor) = KUBE_VERSION;
    let version = format!("v{}.{}.0", major, minor);
    json!({
        "Values": values,
        "Chart": chart_ctx,
        "Release": {
            "Name": RELEASE_NAME,
            "Namespace": chart.namespace(),
            "Service": "Helm",
            "IsInstall": true,
            "IsUpgrade": false,
            "Revision": 1,
        },
        "Capabilities": {
            "KubeVersion": {
                "Version": version,
                "GitVersion": version,
                "Major": major,
                "Minor": minor,
            },
            "APIVersions": [],
        },
        "Template": {
            "Name": template_name,
            "BasePath": format!("{}/templates", chart.name),
        },
        "Files": {},
    })
}
