//! Canonical resource model produced by every IaC loader.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A rule that should not be evaluated for one resource.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SkipRule {
    pub rule: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub comment: String,
}

impl SkipRule {
    pub fn new(rule: impl Into<String>, comment: impl Into<String>) -> Self {
        Self {
            rule: rule.into(),
            comment: comment.into(),
        }
    }
}

/// A container reference found in a workload manifest.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerDetails {
    pub name: String,
    pub image: String,
}

/// One normalized resource instance.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ResourceConfig {
    pub id: String,
    pub name: String,
    pub source: String,
    pub line: usize,
    #[serde(rename = "type")]
    pub resource_type: String,
    pub config: serde_json::Value,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub module_name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub plan_root: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skip_rules: Vec<SkipRule>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub max_severity: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub min_severity: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_images: Vec<ContainerDetails>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub init_container_images: Vec<ContainerDetails>,
}

impl ResourceConfig {
    /// True when the resource carries its own severity override.
    pub fn has_severity_override(&self) -> bool {
        !self.min_severity.is_empty() || !self.max_severity.is_empty()
    }

    /// Find the skip rule matching a rule id (case-insensitive).
    pub fn skip_rule_for(&self, rule_id: &str) -> Option<&SkipRule> {
        self.skip_rules
            .iter()
            .find(|r| r.rule.eq_ignore_ascii_case(rule_id))
    }
}

/// Resources of one scan keyed by resource type.
///
/// Order within a type follows insertion order.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllResourceConfigs(BTreeMap<String, Vec<ResourceConfig>>);

impl AllResourceConfigs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a resource under its own type.
    pub fn push(&mut self, resource: ResourceConfig) {
        self.0
            .entry(resource.resource_type.clone())
            .or_default()
            .push(resource);
    }

    /// Append every resource of `other`, keeping its order.
    pub fn merge(&mut self, other: AllResourceConfigs) {
        for (resource_type, mut resources) in other.0 {
            self.0.entry(resource_type).or_default().append(&mut resources);
        }
    }

    pub fn get(&self, resource_type: &str) -> Option<&Vec<ResourceConfig>> {
        self.0.get(resource_type)
    }

    /// Resource types present in this set.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    /// Iterate every resource, grouped by type.
    pub fn iter(&self) -> impl Iterator<Item = &ResourceConfig> {
        self.0.values().flatten()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ResourceConfig> {
        self.0.values_mut().flatten()
    }

    /// Total number of resources across all types.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look a resource up by its id.
    pub fn find_by_id(&self, id: &str) -> Option<&ResourceConfig> {
        self.iter().find(|r| r.id == id)
    }
}

impl FromIterator<ResourceConfig> for AllResourceConfigs {
    fn from_iter<I: IntoIterator<Item = ResourceConfig>>(iter: I) -> Self {
        let mut all = Self::new();
        for resource in iter {
            all.push(resource);
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(resource_type: &str, name: &str) -> ResourceConfig {
        ResourceConfig {
            id: format!("{}.{}", resource_type, name),
            name: name.to_string(),
            resource_type: resource_type.to_string(),
            line: 1,
            ..Default::default()
        }
    }

    #[test]
    fn test_push_preserves_insertion_order() {
        let mut all = AllResourceConfigs::new();
        all.push(resource("aws_s3_bucket", "b"));
        all.push(resource("aws_s3_bucket", "a"));
        all.push(resource("aws_iam_role", "r"));

        let buckets = all.get("aws_s3_bucket").unwrap();
        assert_eq!(buckets[0].name, "b");
        assert_eq!(buckets[1].name, "a");
        assert_eq!(all.len(), 3);
    }

    #[test]
    fn test_merge_appends() {
        let mut first: AllResourceConfigs = vec![resource("docker_from", "x")].into_iter().collect();
        let second: AllResourceConfigs = vec![resource("docker_from", "y")].into_iter().collect();
        first.merge(second);

        let names: Vec<_> = first.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_find_by_id_and_skip_rule() {
        let mut r = resource("kubernetes_pod", "web-default");
        r.skip_rules.push(SkipRule::new("AC_K8S_0001", "accepted"));
        let all: AllResourceConfigs = vec![r].into_iter().collect();

        let found = all.find_by_id("kubernetes_pod.web-default").unwrap();
        assert_eq!(found.skip_rule_for("ac_k8s_0001").unwrap().comment, "accepted");
        assert!(found.skip_rule_for("AC_K8S_0002").is_none());
    }

    #[test]
    fn test_serialized_shape() {
        let r = resource("aws_s3_bucket", "logs");
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["type"], "aws_s3_bucket");
        assert_eq!(json["id"], "aws_s3_bucket.logs");
        assert!(json.get("skip_rules").is_none());
        assert!(json.get("module_name").is_none());
    }
}
