//! Kubernetes manifest loader.

pub mod images;
pub mod normalize;

use log::debug;
use std::fs;
use std::path::Path;

use super::files::{self, base_name, relative_source};
use super::output::AllResourceConfigs;
use super::yaml::{self, YamlDocument};
use super::{IacLoader, LoadOptions, LoadOutcome};
use crate::error::IacError;

pub use normalize::{normalize, normalize_documents, normalized_type};

/// Manifest file extensions.
pub const EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Parse a manifest file's content into documents.
///
/// JSON files hold a single document starting at line 1.
pub fn parse_manifest(path: &Path, content: &str) -> Result<Vec<YamlDocument>, IacError> {
    if files::has_extension(path, &["json"]) {
        let value: serde_yaml::Value = serde_json::from_str(content)
            .map_err(|e| IacError::parse(path.display().to_string(), e))?;
        return Ok(vec![YamlDocument {
            start_line: 1,
            raw: content.to_string(),
            value,
        }]);
    }
    if !files::has_extension(path, &["yaml", "yml"]) {
        return Err(IacError::UnknownExtension(path.display().to_string()));
    }
    yaml::parse_documents(content).map_err(|e| IacError::parse(path.display().to_string(), e))
}

/// Loader for plain Kubernetes manifests.
#[derive(Debug, Clone, Default)]
pub struct K8sLoader;

impl K8sLoader {
    pub fn new() -> Self {
        Self
    }

    fn load_with_source(&self, path: &Path, source: &str) -> Result<AllResourceConfigs, IacError> {
        let content = fs::read_to_string(path)?;
        let documents = parse_manifest(path, &content)?;
        debug!("{} documents found in {}", documents.len(), path.display());
        Ok(normalize_documents(&documents, source, None))
    }
}

impl IacLoader for K8sLoader {
    fn load_iac_dir(&self, root: &Path, options: &LoadOptions) -> LoadOutcome {
        let found = match files::find_files_by_extension(root, EXTENSIONS, options.non_recursive()) {
            Ok(found) => found,
            Err(e) => return LoadOutcome::failed(super::DirScanErr::new("k8s", root.display().to_string(), e)),
        };

        files::load_each("k8s", "kubernetes", root, &found, |file| {
            self.load_with_source(file, &relative_source(root, file))
        })
    }

    fn load_iac_file(&self, path: &Path, _options: &LoadOptions) -> Result<AllResourceConfigs, IacError> {
        self.load_with_source(path, &base_name(path))
    }

    fn name(&self) -> &'static str {
        "k8s"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const DEPLOYMENT: &str = r#"apiVersion: apps/v1
kind: Deployment
metadata:
  name: web
  namespace: prod
spec:
  template:
    spec:
      containers:
        - name: web
          image: nginx:1.25
"#;

    #[test]
    fn test_load_file_uses_base_name_and_line() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deploy.yaml");
        fs::write(&path, format!("# header\n{}", DEPLOYMENT)).unwrap();

        let all = K8sLoader::new().load_iac_file(&path, &LoadOptions::default()).unwrap();
        let deployment = &all.get("kubernetes_deployment").unwrap()[0];
        assert_eq!(deployment.id, "kubernetes_deployment.web-prod");
        assert_eq!(deployment.source, "deploy.yaml");
        assert_eq!(deployment.line, 2);
        assert_eq!(deployment.container_images[0].image, "nginx:1.25");
    }

    #[test]
    fn test_load_dir_partial_failure() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("apps")).unwrap();
        fs::write(dir.path().join("apps/ok.yaml"), DEPLOYMENT).unwrap();
        fs::write(
            dir.path().join("svc.json"),
            r#"{"apiVersion": "v1", "kind": "Service", "metadata": {"name": "svc"}}"#,
        )
        .unwrap();
        fs::write(dir.path().join("broken.yaml"), "kind: [unclosed\n").unwrap();
        fs::write(dir.path().join("bad.json"), "{not json").unwrap();
        fs::write(dir.path().join("kindless.yaml"), "foo: bar\n").unwrap();

        let outcome = K8sLoader::new().load_iac_dir(dir.path(), &LoadOptions::default());
        assert_eq!(outcome.resources.len(), 2);
        assert_eq!(outcome.errors.len(), 2);

        let svc = &outcome.resources.get("kubernetes_service").unwrap()[0];
        assert_eq!(svc.source, "svc.json");
        let deployment = &outcome.resources.get("kubernetes_deployment").unwrap()[0];
        assert_eq!(deployment.source, "apps/ok.yaml");
    }

    #[test]
    fn test_empty_dir() {
        let dir = TempDir::new().unwrap();
        let outcome = K8sLoader::new().load_iac_dir(dir.path(), &LoadOptions::default());
        assert!(outcome.resources.is_empty());
        assert_eq!(outcome.errors.len(), 1);
    }
}
