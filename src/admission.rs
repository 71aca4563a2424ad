//! Kubernetes validating admission webhook.
//!
//! The object under admission is scanned as a single Kubernetes file. It is
//! denied when any violation matches the `k8s-admission-control` deny rules:
//! a minimum severity OR a list of categories.

use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Write;
use std::sync::Arc;

use crate::config::{K8sAdmissionControl, ScanConfig};
use crate::error::AdmissionError;
use crate::notifications::Notifier;
use crate::policy::{PolicyEngine, Violation, ViolationStore, check_severity};
use crate::runtime::{Executor, ScanOptions, ScanOutput};

/// Environment variable holding the webhook API key.
pub const API_KEY_ENV: &str = "K8S_WEBHOOK_API_KEY";
const DENIED_CODE: u16 = 403;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionReview {
    #[serde(default)]
    pub api_version: String,
    #[serde(default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<AdmissionRequest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<AdmissionResponse>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionRequest {
    pub uid: String,
    #[serde(default)]
    pub operation: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub object: Option<Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdmissionResponse {
    pub uid: String,
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<AdmissionStatus>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdmissionStatus {
    pub code: u16,
    pub message: String,
}

/// True when `violation` hits a deny rule.
///
/// Nothing is denied unless a severity or a category list is configured.
pub fn matches(violation: &Violation, rules: &K8sAdmissionControl) -> bool {
    if rules.denied_severity.is_empty() && rules.categories.is_empty() {
        return false;
    }
    if !rules.denied_severity.is_empty() && check_severity(&violation.severity, &rules.denied_severity) {
        return true;
    }
    rules.categories.iter().any(|c| *c == violation.category)
}

/// Violations of `store` that hit a deny rule.
pub fn denied_violations(store: &ViolationStore, rules: &K8sAdmissionControl) -> Vec<Violation> {
    store
        .violations
        .iter()
        .filter(|v| matches(v, rules))
        .cloned()
        .collect()
}

/// Check the API key of a webhook call against the expected one.
pub fn authorize(api_key: &str, expected: Option<&str>) -> Result<(), AdmissionError> {
    if api_key.is_empty() {
        error!("{}", AdmissionError::ApiKeyMissing);
        return Err(AdmissionError::ApiKeyMissing);
    }
    let expected = expected.filter(|k| !k.is_empty()).ok_or_else(|| {
        error!("{}", AdmissionError::ApiKeyEnvNotSet);
        AdmissionError::ApiKeyEnvNotSet
    })?;
    if api_key != expected {
        error!("{}", AdmissionError::Unauthorized);
        return Err(AdmissionError::Unauthorized);
    }
    Ok(())
}

/// [`authorize`] against the key in [`API_KEY_ENV`].
pub fn authorize_from_env(api_key: &str) -> Result<(), AdmissionError> {
    authorize(api_key, std::env::var(API_KEY_ENV).ok().as_deref())
}

fn describe(v: &Violation) -> String {
    format!("{} ({}): {} [{} {}]", v.rule_id, v.severity, v.description, v.resource_type, v.resource_name)
}

fn is_empty_object(object: Option<&Value>) -> bool {
    match object {
        None | Some(Value::Null) => true,
        Some(Value::Object(map)) => map.is_empty(),
        Some(_) => false,
    }
}

/// Scan one admission object.
fn scan_object(
    object: &Value,
    config: Arc<ScanConfig>,
    engines: Vec<Box<dyn PolicyEngine>>,
    notifiers: Vec<Notifier>,
) -> Result<ScanOutput, AdmissionError> {
    let mut file = tempfile::Builder::new()
        .prefix("admission-")
        .suffix(".json")
        .tempfile()?;
    let body = serde_json::to_vec(object).map_err(|e| AdmissionError::Decode(e.to_string()))?;
    file.write_all(&body)?;
    file.flush()?;

    let options = ScanOptions::new("k8s")
        .with_iac_version("v1")
        .with_cloud_types(vec!["k8s".to_string()])
        .with_file(file.path().to_path_buf());
    match Executor::new(options, config, engines, notifiers).execute() {
        Ok(output) => Ok(output),
        // the scan finished, only a notifier failed
        Err(e) if e.output.is_some() => {
            error!("admission scan completed with error: {}", e);
            Ok(e.output.map(|o| *o).unwrap_or_default())
        }
        Err(e) => {
            error!("failed to scan admission object: {}", e);
            Err(AdmissionError::Scan(e.to_string()))
        }
    }
}

/// Decide an admission review request and build the response review.
pub fn review(
    payload: &[u8],
    config: Arc<ScanConfig>,
    engines: Vec<Box<dyn PolicyEngine>>,
    notifiers: Vec<Notifier>,
) -> Result<AdmissionReview, AdmissionError> {
    let requested: AdmissionReview = serde_json::from_slice(payload).map_err(|e| {
        error!("failed to decode validating admission webhook request body: {}", e);
        AdmissionError::Decode(e.to_string())
    })?;
    let request = requested
        .request
        .ok_or_else(|| AdmissionError::Decode("admission review has no request".to_string()))?;

    let mut response = AdmissionResponse {
        uid: request.uid.clone(),
        allowed: true,
        ..Default::default()
    };

    if is_empty_object(request.object.as_ref()) {
        // DELETE and friends carry no object; nothing to check
        info!("empty admission review request {}, allowing", request.uid);
    } else if let Some(object) = &request.object {
        let rules = config.k8s_admission_control.clone();
        let output = scan_object(object, config, engines, notifiers)?;
        let denied = denied_violations(&output.store, &rules);
        debug!(
            "admission request {}: {} violation(s), {} denied",
            request.uid,
            output.store.violations.len(),
            denied.len()
        );

        if denied.is_empty() {
            response.warnings = output.store.violations.iter().map(describe).collect();
        } else {
            response.allowed = false;
            response.status = Some(AdmissionStatus {
                code: DENIED_CODE,
                message: denied.iter().map(describe).collect::<Vec<_>>().join("; "),
            });
        }
    }

    Ok(AdmissionReview {
        api_version: requested.api_version,
        kind: requested.kind,
        request: None,
        response: Some(response),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::BuiltinEngine;
    use serde_json::json;

    fn violation(severity: &str, category: &str) -> Violation {
        Violation {
            rule_id: "AC_K8S_0001".to_string(),
            severity: severity.to_string(),
            category: category.to_string(),
            ..Default::default()
        }
    }

    fn rules(severity: &str, categories: &[&str]) -> K8sAdmissionControl {
        K8sAdmissionControl {
            denied_severity: severity.to_string(),
            categories: categories.iter().map(|c| c.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_match_needs_configuration() {
        assert!(!matches(&violation("HIGH", "DATA PROTECTION"), &rules("", &[])));
    }

    #[test]
    fn test_match_or_semantics() {
        let deny = rules("HIGH", &["DATA PROTECTION"]);
        assert!(matches(&violation("HIGH", "RESILIENCE"), &deny));
        assert!(matches(&violation("LOW", "DATA PROTECTION"), &deny));
        assert!(!matches(&violation("MEDIUM", "RESILIENCE"), &deny));
        // category match is exact
        assert!(!matches(&violation("LOW", "data protection"), &deny));
        assert!(matches(&violation("LOW", "RESILIENCE"), &rules("low", &[])));
    }

    #[test]
    fn test_denied_violations() {
        let mut store = ViolationStore::new();
        store.violations = vec![violation("HIGH", "RESILIENCE"), violation("LOW", "RESILIENCE")];
        assert_eq!(denied_violations(&store, &rules("MEDIUM", &[])).len(), 1);
    }

    #[test]
    fn test_authorize() {
        assert!(matches!(authorize("", Some("k")), Err(AdmissionError::ApiKeyMissing)));
        assert!(matches!(authorize("k", None), Err(AdmissionError::ApiKeyEnvNotSet)));
        assert!(matches!(authorize("k", Some("")), Err(AdmissionError::ApiKeyEnvNotSet)));
        assert!(matches!(authorize("wrong", Some("k")), Err(AdmissionError::Unauthorized)));
        assert!(authorize("k", Some("k")).is_ok());
    }

    fn payload(object: Value) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "apiVersion": "admission.k8s.io/v1",
            "kind": "AdmissionReview",
            "request": {"uid": "705ab4f5-6393-11e8-b7cc-42010a800002", "operation": "CREATE", "object": object}
        }))
        .unwrap()
    }

    fn privileged_pod() -> Value {
        json!({
            "apiVersion": "v1",
            "kind": "Pod",
            "metadata": {"name": "api"},
            "spec": {"containers": [{"name": "api", "image": "api:1.0", "securityContext": {"privileged": true}}]}
        })
    }

    fn run(object: Value, deny: K8sAdmissionControl) -> AdmissionResponse {
        let config = ScanConfig {
            k8s_admission_control: deny,
            ..Default::default()
        };
        let review = review(&payload(object), Arc::new(config), vec![Box::new(BuiltinEngine::new())], vec![]).unwrap();
        assert_eq!(review.api_version, "admission.k8s.io/v1");
        assert_eq!(review.kind, "AdmissionReview");
        review.response.unwrap()
    }

    #[test]
    fn test_review_denied() {
        let response = run(privileged_pod(), rules("HIGH", &[]));
        assert_eq!(response.uid, "705ab4f5-6393-11e8-b7cc-42010a800002");
        assert!(!response.allowed);
        let status = response.status.unwrap();
        assert_eq!(status.code, 403);
        assert!(status.message.contains("AC_K8S_0001"));
    }

    #[test]
    fn test_review_allowed_with_warnings() {
        let response = run(privileged_pod(), rules("", &[]));
        assert!(response.allowed);
        assert!(response.status.is_none());
        assert!(response.warnings.iter().any(|w| w.starts_with("AC_K8S_0001")));
    }

    #[test]
    fn test_review_empty_object() {
        let response = run(json!({}), rules("LOW", &[]));
        assert!(response.allowed);
        assert!(response.warnings.is_empty());
    }

    #[test]
    fn test_review_bad_payload() {
        let err = review(b"not json", Arc::new(ScanConfig::default()), vec![], vec![]).unwrap_err();
        assert!(matches!(err, AdmissionError::Decode(_)));
    }
}
