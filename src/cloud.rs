//! Cloud providers and the per-cloud normalization pass.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::iac::AllResourceConfigs;

/// Clouds a scan may target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CloudProvider {
    Aws,
    Azure,
    Gcp,
    K8s,
    Docker,
    Github,
}

impl CloudProvider {
    /// Parse a cloud name (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "aws" => Some(Self::Aws),
            "azure" => Some(Self::Azure),
            "gcp" => Some(Self::Gcp),
            "k8s" => Some(Self::K8s),
            "docker" => Some(Self::Docker),
            "github" => Some(Self::Github),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Aws => "aws",
            Self::Azure => "azure",
            Self::Gcp => "gcp",
            Self::K8s => "k8s",
            Self::Docker => "docker",
            Self::Github => "github",
        }
    }

    pub fn all() -> [CloudProvider; 6] {
        [Self::Aws, Self::Azure, Self::Gcp, Self::K8s, Self::Docker, Self::Github]
    }

    /// Cloud-specific second pass over loaded resources.
    ///
    /// Every supported cloud currently consumes the canonical model as is.
    pub fn normalize(&self, resources: AllResourceConfigs) -> AllResourceConfigs {
        resources
    }
}

impl fmt::Display for CloudProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
