use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub policy: PolicyConfig,
    pub rules: RulesConfig,
    pub severity: SeverityConfig,
    pub category: CategoryConfig,
    pub notifications: BTreeMap<String, NotifierConfig>,
    #[serde(rename = "k8s-admission-control")]
    pub k8s_admission_control: K8sAdmissionControl,
}

/// Where policies come from
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    pub path: String,
    pub rego_subdir: String,
    pub repo_url: String,
    pub branch: String,
}

/// Rule allow and deny lists
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct RulesConfig {
    pub scan_rules: Vec<String>,
    pub skip_rules: Vec<String>,
}

/// Minimum severity to report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityConfig {
    pub level: String,
}

/// Categories to report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryConfig {
    pub list: Vec<String>,
}

/// One `[notifications.<name>]` entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierConfig {
    #[serde(rename = "type")]
    pub notifier_type: String,
    pub config: NotifierSettings,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifierSettings {
    pub url: String,
    pub token: String,
}

/// Admission webhook deny rules
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct K8sAdmissionControl {
    pub dashboard: bool,
    pub denied_severity: String,
    pub categories: Vec<String>,
    pub save_requests: bool,
}
