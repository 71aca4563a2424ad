//! Rule selection and per-violation filtering.
//!
//! Rules are narrowed before evaluation: the scan-rules allow-list first,
//! then the skip-rules deny-list, then the category filter. Each violation is
//! then checked against its resource's skip rules and severity overrides and
//! finally against the global severity floor.

use log::debug;

use crate::iac::ResourceConfig;
use crate::policy::severity::{Severity, is_none_severity};
use crate::policy::{
    RuleMetadata, Violation, check_category, check_severity, max_severity_applicable, min_severity_applicable,
};

pub const MAX_SEVERITY_NONE_COMMENT: &str = "max severity set to None";

fn listed(rules: &[String], id: &str) -> bool {
    rules.iter().any(|r| r.trim().eq_ignore_ascii_case(id))
}

/// Narrow a rule catalogue down to the rules a scan evaluates.
pub fn select_rules(
    rules: Vec<RuleMetadata>,
    scan_rules: &[String],
    skip_rules: &[String],
    categories: &[String],
) -> Vec<RuleMetadata> {
    rules
        .into_iter()
        .filter(|rule| scan_rules.is_empty() || listed(scan_rules, &rule.id))
        .filter(|rule| {
            let skipped = listed(skip_rules, &rule.id);
            if skipped {
                debug!("skipping rule {} as requested", rule.id);
            }
            !skipped
        })
        .filter(|rule| categories.is_empty() || check_category(&rule.category, categories))
        .collect()
}

/// What happens to one violation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disposition {
    Report(Violation),
    Skip(Violation),
    Drop,
}

/// Apply the resource's directives and the global severity floor to a violation.
///
/// An empty `floor` reports every severity.
pub fn dispose(mut violation: Violation, resource: &ResourceConfig, floor: &str) -> Disposition {
    if let Some(skip) = resource.skip_rule_for(&violation.rule_id) {
        violation.comment = skip.comment.clone();
        return Disposition::Skip(violation);
    }

    if is_none_severity(&resource.max_severity) {
        violation.comment = MAX_SEVERITY_NONE_COMMENT.to_string();
        return Disposition::Skip(violation);
    }

    if max_severity_applicable(&violation.severity, &resource.max_severity) {
        if let Some(max) = Severity::parse(&resource.max_severity) {
            violation.severity = max.to_string();
        }
    } else if min_severity_applicable(&violation.severity, &resource.min_severity) {
        if let Some(min) = Severity::parse(&resource.min_severity) {
            violation.severity = min.to_string();
        }
    }

    if resource.has_severity_override() || floor.is_empty() || check_severity(&violation.severity, floor) {
        Disposition::Report(violation)
    } else {
        Disposition::Drop
    }
}
