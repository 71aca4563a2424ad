//! # Policy Module
//!
//! The seam between normalized resources and rule evaluation. A
//! [`PolicyEngine`] publishes its rule catalogue and evaluates a selection of
//! it against a scan's resources; the executor turns the raw findings into
//! [`Violation`]s. A [`builtin::BuiltinEngine`] ships with a small rule set for
//! Kubernetes, Dockerfile and AWS resources.

pub mod builtin;
pub mod category;
pub mod severity;
pub mod violations;

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::iac::AllResourceConfigs;

pub use builtin::BuiltinEngine;
pub use category::{ACCEPTED_CATEGORIES, check_category, validate_category_input};
pub use severity::{
    Severity, check_severity, max_severity_applicable, min_severity_applicable, validate_severity_input,
};
pub use violations::{PassedRule, ScanSummary, Violation, ViolationStore};

/// Description of one rule in an engine's catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleMetadata {
    pub id: String,
    pub name: String,
    pub description: String,
    pub severity: Severity,
    pub category: String,
    /// Resource types the rule applies to.
    pub resource_types: Vec<String>,
}

/// A rule that matched a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Finding {
    pub rule_id: String,
    pub resource_type: String,
    pub resource_id: String,
}

impl Finding {
    pub fn new(rule_id: impl Into<String>, resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }
}

/// A rule evaluator.
pub trait PolicyEngine: Send + Sync {
    /// Engine name used in logs and errors.
    fn name(&self) -> &str;

    /// Every rule this engine can evaluate.
    fn rules(&self) -> Vec<RuleMetadata>;

    /// Evaluate `selected` rules against `resources`.
    ///
    /// Findings are reported in resource order, then rule order.
    fn evaluate(
        &self,
        resources: &AllResourceConfigs,
        selected: &[RuleMetadata],
    ) -> Result<Vec<Finding>, PolicyError>;
}

/// Engines used when the caller does not bring its own.
pub fn default_engines() -> Vec<Box<dyn PolicyEngine>> {
    vec![Box::new(BuiltinEngine::new())]
}
