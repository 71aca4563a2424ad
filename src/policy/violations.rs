//! Findings of a scan: violations, skipped violations, passed rules and the summary.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::RuleMetadata;
use super::severity::Severity;
use crate::iac::DirScanErr;

/// A rule that failed for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub rule_name: String,
    pub description: String,
    #[serde(rename = "rule")]
    pub rule_id: String,
    pub severity: String,
    pub category: String,
    pub resource_name: String,
    pub resource_type: String,
    pub file: String,
    pub line: usize,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

/// A selected rule that produced no finding.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PassedRule {
    pub rule_name: String,
    pub description: String,
    #[serde(rename = "rule")]
    pub rule_id: String,
    pub severity: String,
    pub category: String,
}

impl From<&RuleMetadata> for PassedRule {
    fn from(rule: &RuleMetadata) -> Self {
        Self {
            rule_name: rule.name.clone(),
            description: rule.description.clone(),
            rule_id: rule.id.clone(),
            severity: rule.severity.to_string(),
            category: rule.category.clone(),
        }
    }
}

/// Counters describing one scan.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ScanSummary {
    #[serde(rename = "file/folder")]
    pub file_or_folder: String,
    pub iac_type: String,
    pub scanned_at: String,
    pub policies_validated: usize,
    pub violated_policies: usize,
    pub low: usize,
    pub medium: usize,
    pub high: usize,
}

/// Everything the policy stage reports.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ViolationStore {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scan_errors: Vec<DirScanErr>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub passed_rules: Vec<PassedRule>,
    pub violations: Vec<Violation>,
    pub skipped_violations: Vec<Violation>,
    pub scan_summary: ScanSummary,
}

impl ViolationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }

    /// Fill the summary from the collected violations.
    pub fn add_summary(&mut self, iac_type: &str, file_or_folder: &str, policies_validated: usize) {
        let count = |severity: Severity| {
            self.violations
                .iter()
                .filter(|v| Severity::parse(&v.severity) == Some(severity))
                .count()
        };
        self.scan_summary = ScanSummary {
            file_or_folder: file_or_folder.to_string(),
            iac_type: iac_type.to_string(),
            scanned_at: Utc::now().to_rfc3339(),
            policies_validated,
            violated_policies: self.violations.len(),
            low: count(Severity::Low),
            medium: count(Severity::Medium),
            high: count(Severity::High),
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn violation(rule_id: &str, severity: &str) -> Violation {
        Violation {
            rule_id: rule_id.to_string(),
            severity: severity.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_add_summary() {
        let mut store = ViolationStore::new();
        store.violations = vec![
            violation("AC_K8S_0001", "HIGH"),
            violation("AC_K8S_0002", "MEDIUM"),
            violation("AC_K8S_0004", "MEDIUM"),
        ];
        store.add_summary("k8s", "/deploy", 6);

        let summary = &store.scan_summary;
        assert_eq!(summary.iac_type, "k8s");
        assert_eq!(summary.file_or_folder, "/deploy");
        assert_eq!(summary.policies_validated, 6);
        assert_eq!(summary.violated_policies, 3);
        assert_eq!((summary.low, summary.medium, summary.high), (0, 2, 1));
        assert!(chrono::DateTime::parse_from_rfc3339(&summary.scanned_at).is_ok());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut v = violation("AC_AWS_0001", "HIGH");
        v.resource_name = "logs".to_string();
        let json = serde_json::to_value(&v).unwrap();
        assert_eq!(json["rule"], "AC_AWS_0001");
        assert_eq!(json["resourceName"], "logs");
        assert!(json.get("comment").is_none());

        let store = serde_json::to_value(ViolationStore::new()).unwrap();
        assert!(store.get("passed_rules").is_none());
        assert!(store["scan_summary"].get("file/folder").is_some());
    }
}
