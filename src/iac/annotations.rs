//! Structured annotation directives (Kubernetes annotations, CloudFormation `Metadata`).

use log::debug;

use super::output::SkipRule;

/// Annotation key holding a JSON array of `{"rule": ..., "comment": ...}`.
pub const SKIP_KEY: &str = "runterrascan.io/skip";
/// Annotation key capping reported severity.
pub const MAX_SEVERITY_KEY: &str = "runterrascan.io/maxseverity";
/// Annotation key raising reported severity.
pub const MIN_SEVERITY_KEY: &str = "runterrascan.io/minseverity";

/// Read skip rules from an annotation map.
///
/// A missing key, a non-string value or malformed JSON all yield `None`.
pub fn read_skip_rules(
    annotations: &serde_json::Map<String, serde_json::Value>,
    resource_id: &str,
) -> Option<Vec<SkipRule>> {
    let Some(value) = annotations.get(SKIP_KEY) else {
        debug!("{} not present for resource: {}", SKIP_KEY, resource_id);
        return None;
    };

    let Some(rules) = value.as_str() else {
        debug!(
            "{} must be a string containing a json array like [{{rule: ruleID, comment: reason for skipping}}]",
            SKIP_KEY
        );
        return None;
    };

    match serde_json::from_str::<Vec<SkipRule>>(rules) {
        Ok(rules) => Some(rules),
        Err(e) => {
            debug!(
                "json string {} cannot be unmarshalled to skip rules for resource {}: {}",
                rules, resource_id, e
            );
            None
        }
    }
}

/// Read a string annotation, e.g. a severity override.
pub fn read_string(
    annotations: &serde_json::Map<String, serde_json::Value>,
    key: &str,
) -> Option<String> {
    annotations
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: serde_json::Value) -> serde_json::Map<String, serde_json::Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_read_skip_rules() {
        let annotations = map(json!({
            SKIP_KEY: r#"[{"rule": "accurics.kubernetes.IAM.109", "comment": "reason to skip the rule"}, {"rule": "AC_K8S_0002"}]"#
        }));
        let rules = read_skip_rules(&annotations, "kubernetes_pod.x").unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].comment, "reason to skip the rule");
        assert_eq!(rules[1].rule, "AC_K8S_0002");
        assert!(rules[1].comment.is_empty());
    }

    #[test]
    fn test_malformed_json_is_silent() {
        let annotations = map(json!({ SKIP_KEY: "[{rule: broken" }));
        assert!(read_skip_rules(&annotations, "x").is_none());
    }

    #[test]
    fn test_non_string_value() {
        let annotations = map(json!({ SKIP_KEY: [{"rule": "AC_K8S_0002"}] }));
        assert!(read_skip_rules(&annotations, "x").is_none());
        assert!(read_skip_rules(&serde_json::Map::new(), "x").is_none());
    }

    #[test]
    fn test_read_severity() {
        let annotations = map(json!({ MAX_SEVERITY_KEY: " low ", MIN_SEVERITY_KEY: "" }));
        assert_eq!(read_string(&annotations, MAX_SEVERITY_KEY).as_deref(), Some("low"));
        assert!(read_string(&annotations, MIN_SEVERITY_KEY).is_none());
    }
}
