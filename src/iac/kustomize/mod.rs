//! Kustomize loader.
//!
//! A scan directory must hold exactly one kustomization file. The descriptor
//! itself becomes a `kustomization` resource and the built manifests are
//! normalized as Kubernetes resources. v2 and v3 shell out to a pinned
//! `kustomize` binary named by `KUSTOMIZE_V2` / `KUSTOMIZE_V3`; v4 builds in
//! process.

pub mod build;

use log::{debug, error};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::files::{base_name, relative_source};
use super::k8s::normalize::{normalize_documents, normalize_values};
use super::output::{AllResourceConfigs, ResourceConfig};
use super::{DirScanErr, IacLoader, KustomizeVersion, LoadOptions, LoadOutcome, yaml};
use crate::error::IacError;

pub use build::{KUSTOMIZATION_FILES, find_kustomization};

const IAC_TYPE: &str = "kustomize";
const DESCRIPTOR_TYPE: &str = "kustomization";

/// Loader for kustomize directories.
#[derive(Debug, Clone)]
pub struct KustomizeLoader {
    version: KustomizeVersion,
    env_var: String,
    binary: Option<PathBuf>,
}

impl KustomizeLoader {
    pub fn new(version: KustomizeVersion) -> Self {
        Self {
            version,
            env_var: format!("KUSTOMIZE_{}", version.as_str().to_uppercase()),
            binary: None,
        }
    }

    /// Read the binary path from `name` instead of `KUSTOMIZE_<version>`.
    pub fn with_env_var(mut self, name: impl Into<String>) -> Self {
        self.env_var = name.into();
        self
    }

    /// Use `binary` directly, skipping the environment lookup.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = Some(binary.into());
        self
    }

    pub fn version(&self) -> KustomizeVersion {
        self.version
    }

    fn uses_binary(&self) -> bool {
        matches!(self.version, KustomizeVersion::V2 | KustomizeVersion::V3)
    }

    /// Run `<binary> build <dir>` and return its stdout.
    fn run_binary(&self, dir: &Path) -> Result<String, IacError> {
        let binary = match &self.binary {
            Some(binary) => binary.clone(),
            None => std::env::var_os(&self.env_var)
                .map(PathBuf::from)
                .ok_or_else(|| IacError::Kustomize(format!("Environment variable {} not set", self.env_var)))?,
        };
        debug!("running {} build {}", binary.display(), dir.display());

        let output = Command::new(&binary)
            .arg("build")
            .arg(dir)
            .output()
            .map_err(|e| IacError::Kustomize(e.to_string()))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            return Err(IacError::Kustomize(if stderr.is_empty() {
                output.status.to_string()
            } else {
                stderr
            }));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn build(&self, dir: &Path, source: &str) -> Result<AllResourceConfigs, IacError> {
        if self.uses_binary() {
            let stdout = self.run_binary(dir)?;
            let documents = yaml::parse_documents(&stdout).map_err(|e| IacError::Kustomize(e.to_string()))?;
            Ok(normalize_documents(&documents, source, Some(1)))
        } else {
            let manifests = build::build(dir)?;
            Ok(normalize_values(&manifests, source, 1))
        }
    }
}

fn descriptor_resource(dir: &Path, path: &Path, source: String) -> Result<ResourceConfig, IacError> {
    let content = std::fs::read_to_string(path)?;
    let raw: serde_yaml::Value = serde_yaml::from_str(&content).map_err(|e| {
        IacError::parse(
            path.display().to_string(),
            format!("unable to read the kustomization file in the directory {}, error: {}", dir.display(), e),
        )
    })?;
    let name = base_name(dir);
    Ok(ResourceConfig {
        id: format!("{}.{}", DESCRIPTOR_TYPE, name),
        name,
        source,
        line: 1,
        resource_type: DESCRIPTOR_TYPE.to_string(),
        config: yaml::to_json(&raw),
        ..Default::default()
    })
}

impl IacLoader for KustomizeLoader {
    fn load_iac_dir(&self, root: &Path, _options: &LoadOptions) -> LoadOutcome {
        let fail = |e: IacError| LoadOutcome::failed(DirScanErr::new(IAC_TYPE, root.display().to_string(), e));

        let descriptor = match find_kustomization(root) {
            Ok(path) => path,
            Err(e) => return fail(e),
        };
        let source = relative_source(root, &descriptor);
        let resource = match descriptor_resource(root, &descriptor, source.clone()) {
            Ok(resource) => resource,
            Err(e) => return fail(e),
        };

        match self.build(root, &source) {
            Ok(mut resources) => {
                resources.push(resource);
                LoadOutcome {
                    resources,
                    ..Default::default()
                }
            }
            Err(e) => {
                error!("error occurred while loading kustomize directory {}: {}", root.display(), e);
                fail(e)
            }
        }
    }

    fn load_iac_file(&self, _path: &Path, _options: &LoadOptions) -> Result<AllResourceConfigs, IacError> {
        Err(IacError::FileNotSupported(IAC_TYPE))
    }

    fn name(&self) -> &'static str {
        IAC_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const MANIFEST: &str = "apiVersion: v1\nkind: Pod\nmetadata:\n  name: api\nspec:\n  containers:\n    - name: api\n      image: api:1.0\n";

    fn write_kustomization(dir: &Path) {
        fs::write(dir.join("pod.yaml"), MANIFEST).unwrap();
        fs::write(dir.join("kustomization.yaml"), "resources:\n  - pod.yaml\nnamespace: team\n").unwrap();
    }

    #[test]
    fn test_v4_in_process() {
        let dir = TempDir::new().unwrap();
        write_kustomization(dir.path());

        let outcome = KustomizeLoader::new(KustomizeVersion::V4).load_iac_dir(dir.path(), &LoadOptions::default());
        assert!(outcome.errors.is_empty());

        let pod = &outcome.resources.get("kubernetes_pod").unwrap()[0];
        assert_eq!(pod.id, "kubernetes_pod.api-team");
        assert_eq!(pod.source, "kustomization.yaml");
        assert_eq!(pod.line, 1);

        let descriptor = &outcome.resources.get("kustomization").unwrap()[0];
        assert_eq!(descriptor.id, format!("kustomization.{}", base_name(dir.path())));
        assert_eq!(descriptor.config["namespace"], "team");
    }

    #[test]
    fn test_missing_env_var() {
        let dir = TempDir::new().unwrap();
        write_kustomization(dir.path());

        let loader = KustomizeLoader::new(KustomizeVersion::V3).with_env_var("SYNC_SCAN_TEST_UNSET_KUSTOMIZE");
        let outcome = loader.load_iac_dir(dir.path(), &LoadOptions::default());
        assert!(outcome.resources.is_empty());
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(
            outcome.errors.iter().next().unwrap().err_message,
            "error from kustomization. error : Environment variable SYNC_SCAN_TEST_UNSET_KUSTOMIZE not set"
        );
    }

    #[test]
    fn test_default_env_var_name() {
        assert_eq!(KustomizeLoader::new(KustomizeVersion::V2).env_var, "KUSTOMIZE_V2");
        assert_eq!(KustomizeLoader::new(KustomizeVersion::V3).env_var, "KUSTOMIZE_V3");
    }

    #[cfg(unix)]
    #[test]
    fn test_external_binary() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        write_kustomization(dir.path());
        let script = dir.path().join("fake-kustomize");
        fs::write(&script, "#!/bin/sh\ncat \"$2/pod.yaml\"\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let loader = KustomizeLoader::new(KustomizeVersion::V3).with_binary(&script);
        let outcome = loader.load_iac_dir(dir.path(), &LoadOptions::default());
        assert!(outcome.errors.is_empty());
        assert_eq!(outcome.resources.get("kubernetes_pod").unwrap()[0].id, "kubernetes_pod.api-default");

        let failing = dir.path().join("failing-kustomize");
        fs::write(&failing, "#!/bin/sh\necho 'boom' >&2\nexit 1\n").unwrap();
        fs::set_permissions(&failing, fs::Permissions::from_mode(0o755)).unwrap();
        let outcome = KustomizeLoader::new(KustomizeVersion::V3)
            .with_binary(&failing)
            .load_iac_dir(dir.path(), &LoadOptions::default());
        assert!(outcome.resources.is_empty());
        assert_eq!(outcome.errors.iter().next().unwrap().err_message, "error from kustomization. error : boom");
    }

    #[test]
    fn test_descriptor_errors_and_file_unsupported() {
        let dir = TempDir::new().unwrap();
        let loader = KustomizeLoader::new(KustomizeVersion::V4);
        let outcome = loader.load_iac_dir(dir.path(), &LoadOptions::default());
        assert!(outcome.errors.iter().next().unwrap().err_message.contains("kustomization.y(a)ml file not found"));

        fs::write(dir.path().join("kustomization.yaml"), "").unwrap();
        fs::write(dir.path().join("Kustomization"), "").unwrap();
        let outcome = loader.load_iac_dir(dir.path(), &LoadOptions::default());
        assert!(outcome.errors.iter().next().unwrap().err_message.contains("multiple kustomization.y(a)ml"));

        assert!(matches!(
            loader.load_iac_file(&dir.path().join("kustomization.yaml"), &LoadOptions::default()),
            Err(IacError::FileNotSupported("kustomize"))
        ));
    }
}
