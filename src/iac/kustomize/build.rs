//! In-process kustomization builder.
//!
//! Expands a kustomization directory into a flat list of manifests:
//! resources and bases are accumulated (nested kustomizations are built
//! first), strategic-merge patches are applied, then the namespace, name
//! prefix/suffix, common labels/annotations and image transformers run.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::IacError;
use crate::iac::yaml;

/// Accepted kustomization file names.
pub const KUSTOMIZATION_FILES: &[&str] = &["kustomization.yaml", "kustomization.yml", "Kustomization"];

const MAX_DEPTH: usize = 16;

/// Kinds that carry no namespace.
const CLUSTER_SCOPED: &[&str] = &[
    "APIService",
    "ClusterRole",
    "ClusterRoleBinding",
    "CustomResourceDefinition",
    "IngressClass",
    "MutatingWebhookConfiguration",
    "Namespace",
    "PersistentVolume",
    "PodSecurityPolicy",
    "PriorityClass",
    "RuntimeClass",
    "StorageClass",
    "ValidatingWebhookConfiguration",
];

/// Workloads whose selector and pod template get the common labels.
const SELECTOR_KINDS: &[&str] = &["Deployment", "ReplicaSet", "StatefulSet", "DaemonSet"];

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Kustomization {
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub bases: Vec<String>,
    pub name_prefix: Option<String>,
    pub name_suffix: Option<String>,
    pub namespace: Option<String>,
    #[serde(default)]
    pub common_labels: BTreeMap<String, String>,
    #[serde(default)]
    pub common_annotations: BTreeMap<String, String>,
    #[serde(default)]
    pub patches_strategic_merge: Vec<String>,
    #[serde(default)]
    pub images: Vec<ImageOverride>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageOverride {
    pub name: String,
    pub new_name: Option<String>,
    pub new_tag: Option<String>,
    pub digest: Option<String>,
}

/// The single kustomization file of `dir`.
pub fn find_kustomization(dir: &Path) -> Result<PathBuf, IacError> {
    let found: Vec<PathBuf> = KUSTOMIZATION_FILES
        .iter()
        .map(|name| dir.join(name))
        .filter(|path| path.is_file())
        .collect();
    match found.as_slice() {
        [] => Err(IacError::KustomizationNotFound(dir.display().to_string())),
        [single] => Ok(single.clone()),
        _ => Err(IacError::MultipleKustomizations(dir.display().to_string())),
    }
}

/// Build `dir` into manifests.
pub fn build(dir: &Path) -> Result<Vec<Value>, IacError> {
    build_dir(dir, 0).map_err(IacError::Kustomize)
}

fn read_kustomization(dir: &Path) -> Result<Kustomization, String> {
    let path = find_kustomization(dir).map_err(|e| e.to_string())?;
    let content = std::fs::read_to_string(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
    serde_yaml::from_str::<Option<Kustomization>>(&content)
        .map(Option::unwrap_or_default)
        .map_err(|e| format!("invalid kustomization {}: {}", path.display(), e))
}

fn read_manifests(content: &str, origin: &str) -> Result<Vec<Value>, String> {
    yaml::parse_documents(content)
        .map(|docs| docs.iter().map(|d| yaml::to_json(&d.value)).collect())
        .map_err(|e| format!("{}: {}", origin, e))
}

fn is_remote(entry: &str) -> bool {
    entry.contains("://") || entry.starts_with("git@") || entry.starts_with("github.com/")
}

fn build_dir(dir: &Path, depth: usize) -> Result<Vec<Value>, String> {
    if depth > MAX_DEPTH {
        return Err(format!("kustomization nesting too deep at {}", dir.display()));
    }
    let kustomization = read_kustomization(dir)?;

    let mut manifests = Vec::new();
    for entry in kustomization.bases.iter().chain(&kustomization.resources) {
        if is_remote(entry) {
            return Err(format!("remote resource '{}' is not supported", entry));
        }
        let path = dir.join(entry);
        if path.is_dir() {
            manifests.extend(build_dir(&path, depth + 1)?);
        } else if path.is_file() {
            let content = std::fs::read_to_string(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
            manifests.extend(read_manifests(&content, &path.display().to_string())?);
        } else {
            return Err(format!(
                "accumulating resources: '{}' must resolve to a file or a directory",
                path.display()
            ));
        }
    }

    for patch in &kustomization.patches_strategic_merge {
        let path = dir.join(patch);
        let docs = if path.is_file() {
            let content = std::fs::read_to_string(&path).map_err(|e| format!("{}: {}", path.display(), e))?;
            read_manifests(&content, &path.display().to_string())?
        } else {
            read_manifests(patch, "inline patch")?
        };
        for doc in docs {
            apply_patch(&mut manifests, doc)?;
        }
    }

    for manifest in &mut manifests {
        transform(manifest, &kustomization);
    }
    Ok(manifests)
}

fn str_at<'v>(value: &'v Value, pointer: &str) -> &'v str {
    value.pointer(pointer).and_then(Value::as_str).unwrap_or_default()
}

fn apply_patch(manifests: &mut Vec<Value>, patch: Value) -> Result<(), String> {
    let kind = str_at(&patch, "/kind").to_string();
    let name = str_at(&patch, "/metadata/name").to_string();
    let namespace = str_at(&patch, "/metadata/namespace").to_string();

    let matches = |m: &Value| {
        str_at(m, "/kind") == kind
            && str_at(m, "/metadata/name") == name
            && (namespace.is_empty() || str_at(m, "/metadata/namespace") == namespace)
    };
    let Some(index) = manifests.iter().position(matches) else {
        return Err(format!("failed to find unique target for patch {}|{}", kind, name));
    };

    if patch.get("$patch").and_then(Value::as_str) == Some("delete") {
        manifests.remove(index);
    } else {
        strategic_merge(&mut manifests[index], patch);
    }
    Ok(())
}

fn is_delete_directive(value: &Value) -> bool {
    value.get("$patch").and_then(Value::as_str) == Some("delete")
}

/// Merge `patch` into `base`: maps merge per key, `null` deletes a key, and
/// lists of named objects merge element-wise by `name`.
pub fn strategic_merge(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                if key == "$patch" {
                    continue;
                }
                if value.is_null() {
                    base.remove(&key);
                    continue;
                }
                match base.get_mut(&key) {
                    Some(existing) => strategic_merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (Value::Array(base), Value::Array(patch)) if is_named_list(base) && is_named_list(&patch) => {
            for item in patch {
                let name = item.get("name").cloned();
                let position = base.iter().position(|b| b.get("name").cloned() == name);
                match (position, is_delete_directive(&item)) {
                    (Some(i), true) => {
                        base.remove(i);
                    }
                    (Some(i), false) => strategic_merge(&mut base[i], item),
                    (None, true) => {}
                    (None, false) => base.push(item),
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

fn is_named_list(items: &[Value]) -> bool {
    !items.is_empty() && items.iter().all(|i| i.get("name").is_some_and(Value::is_string))
}

fn object_at<'v>(value: &'v mut Value, path: &[&str]) -> Option<&'v mut Map<String, Value>> {
    let mut current = value;
    for key in path {
        let map = current.as_object_mut()?;
        current = map.entry(key.to_string()).or_insert_with(|| Value::Object(Map::new()));
    }
    current.as_object_mut()
}

fn add_entries(value: &mut Value, path: &[&str], entries: &BTreeMap<String, String>) {
    if let Some(map) = object_at(value, path) {
        for (k, v) in entries {
            map.insert(k.clone(), Value::String(v.clone()));
        }
    }
}

fn transform(manifest: &mut Value, kustomization: &Kustomization) {
    let kind = str_at(manifest, "/kind").to_string();
    if kind.is_empty() {
        return;
    }

    if let Some(namespace) = &kustomization.namespace {
        if !CLUSTER_SCOPED.contains(&kind.as_str()) {
            if let Some(metadata) = object_at(manifest, &["metadata"]) {
                metadata.insert("namespace".to_string(), Value::String(namespace.clone()));
            }
        }
    }

    if kind != "CustomResourceDefinition" && kind != "Namespace" {
        let prefix = kustomization.name_prefix.as_deref().unwrap_or_default();
        let suffix = kustomization.name_suffix.as_deref().unwrap_or_default();
        if !prefix.is_empty() || !suffix.is_empty() {
            if let Some(metadata) = object_at(manifest, &["metadata"]) {
                if let Some(Value::String(name)) = metadata.get("name") {
                    let renamed = format!("{}{}{}", prefix, name, suffix);
                    metadata.insert("name".to_string(), Value::String(renamed));
                }
            }
        }
    }

    let labels = &kustomization.common_labels;
    if !labels.is_empty() {
        add_entries(manifest, &["metadata", "labels"], labels);
        if SELECTOR_KINDS.contains(&kind.as_str()) {
            add_entries(manifest, &["spec", "selector", "matchLabels"], labels);
            add_entries(manifest, &["spec", "template", "metadata", "labels"], labels);
        } else if kind == "Job" {
            add_entries(manifest, &["spec", "template", "metadata", "labels"], labels);
        } else if kind == "CronJob" {
            add_entries(
                manifest,
                &["spec", "jobTemplate", "spec", "template", "metadata", "labels"],
                labels,
            );
        } else if kind == "Service" {
            add_entries(manifest, &["spec", "selector"], labels);
        }
    }

    let annotations = &kustomization.common_annotations;
    if !annotations.is_empty() {
        add_entries(manifest, &["metadata", "annotations"], annotations);
        if SELECTOR_KINDS.contains(&kind.as_str()) || kind == "Job" {
            add_entries(manifest, &["spec", "template", "metadata", "annotations"], annotations);
        }
    }

    if !kustomization.images.is_empty() {
        rewrite_images(manifest, &kustomization.images);
    }
}

/// Split an image reference into name, tag and digest.
pub fn split_image(image: &str) -> (&str, Option<&str>, Option<&str>) {
    let (rest, digest) = match image.split_once('@') {
        Some((rest, digest)) => (rest, Some(digest)),
        None => (image, None),
    };
    let slash = rest.rfind('/').unwrap_or(0);
    match rest.rfind(':') {
        Some(colon) if colon > slash => (&rest[..colon], Some(&rest[colon + 1..]), digest),
        _ => (rest, None, digest),
    }
}

fn override_image(image: &str, images: &[ImageOverride]) -> Option<String> {
    let (name, tag, digest) = split_image(image);
    let rule = images.iter().find(|i| i.name == name)?;
    let new_name = rule.new_name.as_deref().unwrap_or(name);
    Some(match (&rule.digest, &rule.new_tag) {
        (Some(d), _) => format!("{}@{}", new_name, d),
        (None, Some(t)) => format!("{}:{}", new_name, t),
        (None, None) => match (tag, digest) {
            (_, Some(d)) => format!("{}@{}", new_name, d),
            (Some(t), None) => format!("{}:{}", new_name, t),
            (None, None) => new_name.to_string(),
        },
    })
}

/// Rewrite every `image` of every `containers`/`initContainers` list.
fn rewrite_images(value: &mut Value, images: &[ImageOverride]) {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "containers" || key == "initContainers" {
                    for container in child.as_array_mut().into_iter().flatten() {
                        if let Some(Value::String(image)) = container.get_mut("image") {
                            if let Some(replaced) = override_image(image, images) {
                                *image = replaced;
                            }
                        }
                    }
                } else {
                    rewrite_images(child, images);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(|i| rewrite_images(i, images)),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
spec:
  selector:
    matchLabels:
      app: web
  template:
    metadata:
      labels:
        app: web
    spec:
      containers:
        - name: web
          image: nginx:1.24
        - name: sidecar
          image: envoy:1.0
---
apiVersion: v1
kind: Service
metadata:
  name: web
spec:
  selector:
    app: web
"#;

    fn write_base(dir: &Path) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("app.yaml"), DEPLOYMENT).unwrap();
        fs::write(dir.join("kustomization.yaml"), "resources:\n  - app.yaml\n").unwrap();
    }

    #[test]
    fn test_find_kustomization() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(find_kustomization(dir.path()), Err(IacError::KustomizationNotFound(_))));
        fs::write(dir.path().join("kustomization.yaml"), "").unwrap();
        assert!(find_kustomization(dir.path()).is_ok());
        fs::write(dir.path().join("kustomization.yml"), "").unwrap();
        assert!(matches!(find_kustomization(dir.path()), Err(IacError::MultipleKustomizations(_))));
    }

    #[test]
    fn test_overlay_build() {
        let dir = TempDir::new().unwrap();
        write_base(&dir.path().join("base"));
        let overlay = dir.path().join("prod");
        fs::create_dir_all(&overlay).unwrap();
        fs::write(
            overlay.join("kustomization.yaml"),
            r#"resources:
  - ../base
namePrefix: prod-
namespace: shop
commonLabels:
  env: prod
commonAnnotations:
  team: payments
patchesStrategicMerge:
  - replicas.yaml
images:
  - name: nginx
    newTag: "1.25"
"#,
        )
        .unwrap();
        fs::write(
            overlay.join("replicas.yaml"),
            "apiVersion: apps/v1\nkind: Deployment\nmetadata:\n  name: web\nspec:\n  replicas: 3\n  template:\n    spec:\n      containers:\n        - name: sidecar\n          $patch: delete\n",
        )
        .unwrap();

        let manifests = build(&overlay).unwrap();
        assert_eq!(manifests.len(), 2);

        let deployment = &manifests[0];
        assert_eq!(deployment["metadata"]["name"], "prod-web");
        assert_eq!(deployment["metadata"]["namespace"], "shop");
        assert_eq!(deployment["metadata"]["labels"]["env"], "prod");
        assert_eq!(deployment["metadata"]["annotations"]["team"], "payments");
        assert_eq!(deployment["spec"]["replicas"], 3);
        assert_eq!(deployment["spec"]["selector"]["matchLabels"], json!({"app": "web", "env": "prod"}));
        let containers = deployment["spec"]["template"]["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 1);
        assert_eq!(containers[0]["image"], "nginx:1.25");

        let service = &manifests[1];
        assert_eq!(service["metadata"]["name"], "prod-web");
        assert_eq!(service["spec"]["selector"], json!({"app": "web", "env": "prod"}));
    }

    #[test]
    fn test_build_errors() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("kustomization.yaml"), "resources:\n  - missing.yaml\n").unwrap();
        let err = build(dir.path()).unwrap_err();
        assert!(err.to_string().starts_with("error from kustomization. error : accumulating resources"));

        fs::write(
            dir.path().join("kustomization.yaml"),
            "resources:\n  - https://github.com/org/repo//base\n",
        )
        .unwrap();
        assert!(build(dir.path()).is_err());

        write_base(dir.path());
        fs::write(
            dir.path().join("kustomization.yaml"),
            "resources:\n  - app.yaml\npatchesStrategicMerge:\n  - |\n    kind: Deployment\n    metadata:\n      name: other\n",
        )
        .unwrap();
        assert!(build(dir.path()).unwrap_err().to_string().contains("failed to find unique target"));
    }

    #[test]
    fn test_split_and_override_image() {
        assert_eq!(split_image("nginx"), ("nginx", None, None));
        assert_eq!(split_image("nginx:1.25"), ("nginx", Some("1.25"), None));
        assert_eq!(split_image("localhost:5000/app"), ("localhost:5000/app", None, None));
        assert_eq!(split_image("repo/app@sha256:abc"), ("repo/app", None, Some("sha256:abc")));

        let rules = vec![ImageOverride {
            name: "nginx".into(),
            new_name: Some("registry/nginx".into()),
            ..Default::default()
        }];
        assert_eq!(override_image("nginx:1.0", &rules), Some("registry/nginx:1.0".into()));
        assert_eq!(override_image("redis:7", &rules), None);
    }

    #[test]
    fn test_strategic_merge_null_deletes() {
        let mut base = json!({"spec": {"replicas": 1, "paused": true}});
        strategic_merge(&mut base, json!({"spec": {"paused": null, "replicas": 2}}));
        assert_eq!(base, json!({"spec": {"replicas": 2}}));
    }
}
