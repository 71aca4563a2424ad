//! Normalization of Kubernetes documents into canonical resources.
//!
//! This is the single mapping from a manifest document to a
//! [`ResourceConfig`]; the Helm and Kustomize loaders feed their rendered
//! output through it.

use log::debug;
use serde::Deserialize;

use super::images::extract_images;
use crate::error::IacError;
use crate::iac::annotations::{self, MAX_SEVERITY_KEY, MIN_SEVERITY_KEY};
use crate::iac::output::{AllResourceConfigs, ResourceConfig};
use crate::iac::yaml::{self, YamlDocument};

/// Prefix of every Kubernetes resource type.
pub const TYPE_PREFIX: &str = "kubernetes";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Metadata {
    name: Option<String>,
    #[serde(rename = "generateName")]
    generate_name: Option<String>,
    namespace: Option<String>,
    annotations: Option<serde_json::Map<String, serde_json::Value>>,
}

impl Metadata {
    fn name_or_generate_name(&self) -> &str {
        match self.name.as_deref() {
            Some(name) if !name.is_empty() => name,
            _ => self.generate_name.as_deref().unwrap_or_default(),
        }
    }
}

/// Minimal projection of a manifest; unknown fields are ignored.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Projection {
    #[serde(rename = "apiVersion")]
    api_version: Option<String>,
    kind: Option<String>,
    metadata: Option<Metadata>,
}

/// Canonical type of a kind, e.g. `Deployment` -> `kubernetes_deployment`.
pub fn normalized_type(kind: &str) -> String {
    match kind {
        "DaemonSet" => format!("{}_daemonset", TYPE_PREFIX),
        _ => format!("{}_{}", TYPE_PREFIX, to_snake_case(kind)),
    }
}

/// `ClusterRoleBinding` -> `cluster_role_binding`, `HTTPRoute` -> `http_route`.
pub fn to_snake_case(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 4);
    for (i, &c) in chars.iter().enumerate() {
        if c.is_uppercase() {
            let prev = i.checked_sub(1).map(|p| chars[p]);
            let next = chars.get(i + 1).copied();
            let boundary = match prev {
                Some(p) if p.is_lowercase() || p.is_ascii_digit() => true,
                Some(p) if p.is_uppercase() => next.is_some_and(|n| n.is_lowercase()),
                _ => false,
            };
            if boundary && !out.ends_with('_') {
                out.push('_');
            }
            out.extend(c.to_lowercase());
        } else if c == '-' || c == ' ' || c == '.' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// Normalize one manifest document (as JSON).
///
/// Returns [`IacError::NoKind`] for documents without a kind; callers skip those.
pub fn normalize(document: &serde_json::Value) -> Result<ResourceConfig, IacError> {
    let projection: Projection = serde_json::from_value(document.clone())
        .map_err(|e| IacError::parse("kubernetes document", e))?;

    let kind = match projection.kind.as_deref() {
        Some(kind) if !kind.is_empty() => kind,
        _ => return Err(IacError::NoKind),
    };
    debug!(
        "normalizing {} {}",
        projection.api_version.as_deref().unwrap_or_default(),
        kind
    );

    let resource_type = normalized_type(kind);
    let metadata = projection.metadata.unwrap_or_default();
    let namespace = match metadata.namespace.as_deref() {
        Some(ns) if !ns.is_empty() => ns,
        _ => "default",
    };
    let name = metadata.name_or_generate_name().to_string();
    let id = format!("{}.{}-{}", resource_type, name, namespace);

    let images = extract_images(kind, document);
    let annotations = metadata.annotations.clone().unwrap_or_default();

    let mut resource = ResourceConfig {
        id,
        name,
        line: 1,
        resource_type,
        config: document.clone(),
        container_images: images.containers,
        init_container_images: images.init_containers,
        ..Default::default()
    };

    if let Some(rules) = annotations::read_skip_rules(&annotations, &resource.id) {
        resource.skip_rules.extend(rules);
    }
    if let Some(max) = annotations::read_string(&annotations, MAX_SEVERITY_KEY) {
        resource.max_severity = max;
    }
    if let Some(min) = annotations::read_string(&annotations, MIN_SEVERITY_KEY) {
        resource.min_severity = min;
    }

    Ok(resource)
}

/// Normalize parsed YAML documents from one source.
///
/// `line` overrides every document's start line when set (rendered output has
/// no meaningful positions). Documents that fail to normalize are skipped.
pub fn normalize_documents(
    documents: &[YamlDocument],
    source: &str,
    line: Option<usize>,
) -> AllResourceConfigs {
    documents
        .iter()
        .filter_map(|doc| normalize_one(&yaml::to_json(&doc.value), source, line.unwrap_or(doc.start_line)))
        .collect()
}

/// Normalize documents that are already JSON, all reported at `line`.
pub fn normalize_values(documents: &[serde_json::Value], source: &str, line: usize) -> AllResourceConfigs {
    documents
        .iter()
        .filter_map(|doc| normalize_one(doc, source, line))
        .collect()
}

fn normalize_one(document: &serde_json::Value, source: &str, line: usize) -> Option<ResourceConfig> {
    match normalize(document) {
        Ok(mut resource) => {
            resource.source = source.to_string();
            resource.line = line;
            Some(resource)
        }
        Err(IacError::NoKind) => {
            debug!("skipping document without kind in {}", source);
            None
        }
        Err(e) => {
            debug!("unable to normalize document in {}: {}", source, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_normalized_type() {
        assert_eq!(normalized_type("Deployment"), "kubernetes_deployment");
        assert_eq!(normalized_type("DaemonSet"), "kubernetes_daemonset");
        assert_eq!(normalized_type("ClusterRoleBinding"), "kubernetes_cluster_role_binding");
        assert_eq!(normalized_type("PodSecurityPolicy"), "kubernetes_pod_security_policy");
        assert_eq!(normalized_type("HTTPRoute"), "kubernetes_http_route");
    }

    #[test]
    fn test_normalize_pod() {
        let doc = json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {
                "name": "web",
                "annotations": {
                    "runterrascan.io/skip": "[{\"rule\": \"AC_K8S_0001\", \"comment\": \"reviewed\"}]",
                    "runterrascan.io/maxseverity": "Low"
                }
            },
            "spec": {"containers": [{"name": "web", "image": "nginx"}]}
        });
        let resource = normalize(&doc).unwrap();
        assert_eq!(resource.resource_type, "kubernetes_pod");
        assert_eq!(resource.id, "kubernetes_pod.web-default");
        assert_eq!(resource.name, "web");
        assert_eq!(resource.skip_rules[0].rule, "AC_K8S_0001");
        assert_eq!(resource.max_severity, "Low");
        assert_eq!(resource.container_images[0].image, "nginx");
        assert_eq!(resource.config["spec"]["containers"][0]["name"], "web");
    }

    #[test]
    fn test_generate_name_and_namespace() {
        let doc = json!({
            "kind": "Job",
            "metadata": {"generateName": "migrate-", "namespace": "batch"}
        });
        let resource = normalize(&doc).unwrap();
        assert_eq!(resource.id, "kubernetes_job.migrate--batch");
    }

    #[test]
    fn test_missing_kind() {
        assert!(matches!(normalize(&json!({"apiVersion": "v1"})), Err(IacError::NoKind)));
        assert!(matches!(normalize(&json!({"kind": ""})), Err(IacError::NoKind)));
    }

    #[test]
    fn test_normalize_documents_skips_kindless() {
        let content = "apiVersion: v1\nkind: Service\nmetadata:\n  name: svc\n---\nfoo: bar\n";
        let docs = yaml::parse_documents(content).unwrap();
        let all = normalize_documents(&docs, "svc.yaml", None);
        assert_eq!(all.len(), 1);
        let svc = all.iter().next().unwrap();
        assert_eq!(svc.source, "svc.yaml");
        assert_eq!(svc.line, 1);
        assert!(svc.container_images.is_empty());
    }
}
