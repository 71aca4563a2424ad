//! # IaC Module
//!
//! Loaders that turn Infrastructure-as-Code artifacts into the canonical
//! [`ResourceConfig`] model:
//! - CloudFormation templates (`cft`)
//! - Dockerfiles (`docker`)
//! - Kubernetes manifests (`k8s`)
//! - Helm charts (`helm`)
//! - Kustomize overlays (`kustomize`)
//! - Terraform plan JSON (`tfplan`)

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::IacError;

pub mod annotations;
pub mod cft;
pub mod docker;
pub mod errors;
pub mod files;
pub mod helm;
pub mod k8s;
pub mod kustomize;
pub mod output;
pub mod pragma;
pub mod tfplan;
pub mod yaml;

// Re-export the canonical model
pub use errors::{DirScanErr, LoadErrors, LoadOutcome};
pub use output::{AllResourceConfigs, ContainerDetails, ResourceConfig, SkipRule};

/// Option key listing Helm values files to merge.
pub const VALUES_FILES_KEY: &str = "useValuesFiles";
/// Option key disabling recursive directory walks.
pub const NON_RECURSIVE_KEY: &str = "nonRecursive";

/// Loader options, keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadOptions(BTreeMap<String, serde_json::Value>);

impl LoadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: serde_json::Value) {
        self.0.insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.0.get(key)
    }

    /// Values files to overlay, in merge order.
    pub fn values_files(&self) -> Vec<PathBuf> {
        self.0
            .get(VALUES_FILES_KEY)
            .and_then(|v| v.as_array())
            .map(|files| {
                files
                    .iter()
                    .filter_map(|f| f.as_str())
                    .map(PathBuf::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn with_values_files(mut self, files: &[PathBuf]) -> Self {
        let files = files
            .iter()
            .map(|f| serde_json::Value::String(f.display().to_string()))
            .collect();
        self.insert(VALUES_FILES_KEY, serde_json::Value::Array(files));
        self
    }

    pub fn non_recursive(&self) -> bool {
        self.0
            .get(NON_RECURSIVE_KEY)
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    pub fn with_non_recursive(mut self, non_recursive: bool) -> Self {
        self.insert(NON_RECURSIVE_KEY, serde_json::Value::Bool(non_recursive));
        self
    }
}

/// Common interface of every format loader.
pub trait IacLoader: Send + Sync {
    /// Load every matching file under `root`.
    ///
    /// Never fails outright: resources that loaded are returned together with
    /// one [`DirScanErr`] per failure.
    fn load_iac_dir(&self, root: &Path, options: &LoadOptions) -> LoadOutcome;

    /// Load a single file.
    fn load_iac_file(&self, path: &Path, options: &LoadOptions) -> Result<AllResourceConfigs, IacError>;

    /// The iac type served by this loader.
    fn name(&self) -> &'static str;
}

/// Kustomize flavours: v2 and v3 shell out, v4 builds in process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KustomizeVersion {
    V2,
    V3,
    V4,
}

impl KustomizeVersion {
    pub fn as_str(&self) -> &'static str {
        match self {
            KustomizeVersion::V2 => "v2",
            KustomizeVersion::V3 => "v3",
            KustomizeVersion::V4 => "v4",
        }
    }
}

/// Supported iac types and their versions; the first version is the default,
/// except where [`default_iac_version`] says otherwise.
pub const SUPPORTED_IAC: &[(&str, &[&str])] = &[
    ("cft", &["v1"]),
    ("docker", &["v1"]),
    ("k8s", &["v1"]),
    ("helm", &["v3"]),
    ("kustomize", &["v2", "v3", "v4"]),
    ("tfplan", &["v1"]),
];

/// Versions supported for an iac type, if the type is known.
pub fn supported_versions(iac_type: &str) -> Option<&'static [&'static str]> {
    SUPPORTED_IAC
        .iter()
        .find(|(t, _)| *t == iac_type)
        .map(|(_, versions)| *versions)
}

/// Default version of an iac type.
pub fn default_iac_version(iac_type: &str) -> &'static str {
    match iac_type {
        "helm" => "v3",
        "kustomize" => "v4",
        _ => "v1",
    }
}

/// True when `iac_type` is known and `version` (or its default when empty) is supported.
pub fn is_supported(iac_type: &str, version: &str) -> bool {
    let version = if version.is_empty() { default_iac_version(iac_type) } else { version };
    supported_versions(iac_type).is_some_and(|versions| versions.contains(&version))
}

/// Names of every supported iac type.
pub fn supported_iac_types() -> Vec<&'static str> {
    SUPPORTED_IAC.iter().map(|(t, _)| *t).collect()
}

/// The closed set of format loaders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IacProvider {
    Cft,
    Docker,
    K8s,
    Helm,
    Kustomize(KustomizeVersion),
    TfPlan,
}

impl IacProvider {
    /// Resolve a loader from its iac type and version (empty means default).
    pub fn new(iac_type: &str, version: &str) -> Result<Self, IacError> {
        let version = if version.is_empty() { default_iac_version(iac_type) } else { version };
        if !is_supported(iac_type, version) {
            return Err(IacError::Unsupported(iac_type.to_string(), version.to_string()));
        }

        let provider = match iac_type {
            "cft" => IacProvider::Cft,
            "docker" => IacProvider::Docker,
            "k8s" => IacProvider::K8s,
            "helm" => IacProvider::Helm,
            "tfplan" => IacProvider::TfPlan,
            "kustomize" => IacProvider::Kustomize(match version {
                "v2" => KustomizeVersion::V2,
                "v3" => KustomizeVersion::V3,
                _ => KustomizeVersion::V4,
            }),
            other => return Err(IacError::Unsupported(other.to_string(), version.to_string())),
        };
        Ok(provider)
    }

    /// Build the loader for this provider.
    pub fn loader(&self) -> Box<dyn IacLoader> {
        match self {
            IacProvider::Cft => Box::new(cft::CftLoader::new()),
            IacProvider::Docker => Box::new(docker::DockerLoader::new()),
            IacProvider::K8s => Box::new(k8s::K8sLoader::new()),
            IacProvider::Helm => Box::new(helm::HelmLoader::new()),
            IacProvider::Kustomize(version) => Box::new(kustomize::KustomizeLoader::new(*version)),
            IacProvider::TfPlan => Box::new(tfplan::TfPlanLoader::new()),
        }
    }

    pub fn iac_type(&self) -> &'static str {
        match self {
            IacProvider::Cft => "cft",
            IacProvider::Docker => "docker",
            IacProvider::K8s => "k8s",
            IacProvider::Helm => "helm",
            IacProvider::Kustomize(_) => "kustomize",
            IacProvider::TfPlan => "tfplan",
        }
    }

    pub fn version(&self) -> &'static str {
        match self {
            IacProvider::Kustomize(version) => version.as_str(),
            IacProvider::Helm => "v3",
            _ => "v1",
        }
    }
}

impl fmt::Display for IacProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.iac_type(), self.version())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_factory_defaults() {
        assert_eq!(IacProvider::new("k8s", "").unwrap(), IacProvider::K8s);
        assert_eq!(IacProvider::new("helm", "").unwrap(), IacProvider::Helm);
        assert_eq!(
            IacProvider::new("kustomize", "").unwrap(),
            IacProvider::Kustomize(KustomizeVersion::V4)
        );
        assert_eq!(
            IacProvider::new("kustomize", "v2").unwrap(),
            IacProvider::Kustomize(KustomizeVersion::V2)
        );
        assert_eq!(IacProvider::new("tfplan", "v1").unwrap().loader().name(), "tfplan");
    }

    #[test]
    fn test_unsupported() {
        assert!(matches!(IacProvider::new("arm", "v1"), Err(IacError::Unsupported(_, _))));
        assert!(matches!(IacProvider::new("helm", "v2"), Err(IacError::Unsupported(_, _))));
        assert!(!is_supported("docker", "v2"));
        assert!(is_supported("cft", ""));
    }

    #[test]
    fn test_load_options_accessors() {
        let options = LoadOptions::new()
            .with_values_files(&[PathBuf::from("a.yaml"), PathBuf::from("b.yaml")])
            .with_non_recursive(true);
        assert_eq!(options.values_files(), vec![PathBuf::from("a.yaml"), PathBuf::from("b.yaml")]);
        assert!(options.non_recursive());
        assert!(!LoadOptions::default().non_recursive());
        assert!(LoadOptions::default().values_files().is_empty());
    }
}
