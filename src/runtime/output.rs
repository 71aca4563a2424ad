//! Shaping and rendering scan output, and the process exit status.

use colored::Colorize;
use serde::Serialize;
use serde_json::{Value, json};
use std::fmt::Write as _;

use crate::error::ScanError;
use crate::iac::{AllResourceConfigs, LoadErrors};
use crate::policy::severity::Severity;
use crate::policy::{Violation, ViolationStore};

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILURE: i32 = 1;
pub const EXIT_VIOLATIONS: i32 = 3;
pub const EXIT_SCAN_ERRORS: i32 = 4;
pub const EXIT_VIOLATIONS_AND_ERRORS: i32 = 5;

/// What a scan reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum OutputMode {
    /// Normalized resources only; no policy evaluation.
    ConfigOnly,
    /// Normalized resources and the errors met while loading them.
    ConfigWithErrors,
    /// Policy results.
    #[default]
    Violations,
}

/// Rendering format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Human,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Parse from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "human" | "text" => Some(Self::Human),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Exit status for a finished scan.
pub fn exit_code(has_violations: bool, has_scan_errors: bool) -> i32 {
    match (has_violations, has_scan_errors) {
        (false, false) => EXIT_OK,
        (true, false) => EXIT_VIOLATIONS,
        (false, true) => EXIT_SCAN_ERRORS,
        (true, true) => EXIT_VIOLATIONS_AND_ERRORS,
    }
}

/// Everything a finished scan produced.
#[derive(Debug, Clone, Default)]
pub struct ScanOutput {
    pub mode: OutputMode,
    pub resources: AllResourceConfigs,
    pub errors: LoadErrors,
    pub store: ViolationStore,
}

impl ScanOutput {
    pub fn exit_code(&self) -> i32 {
        exit_code(self.store.has_violations(), !self.errors.is_empty())
    }

    /// The output document for the selected mode.
    pub fn to_value(&self) -> Result<Value, ScanError> {
        let value = match self.mode {
            OutputMode::ConfigOnly => serde_json::to_value(&self.resources),
            OutputMode::ConfigWithErrors => serde_json::to_value(&self.resources).and_then(|resources| {
                serde_json::to_value(&self.errors).map(|errors| json!({ "resource_config": resources, "scan_errors": errors }))
            }),
            OutputMode::Violations => serde_json::to_value(&self.store).map(|store| json!({ "results": store })),
        };
        value.map_err(|e| ScanError::Output(e.to_string()))
    }

    pub fn render(&self, format: OutputFormat) -> Result<String, ScanError> {
        match format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&self.to_value()?).map_err(|e| ScanError::Output(e.to_string()))
            }
            OutputFormat::Yaml => serde_yaml::to_string(&self.to_value()?).map_err(|e| ScanError::Output(e.to_string())),
            OutputFormat::Human => match self.mode {
                OutputMode::Violations => Ok(human(self)),
                // resources have no natural text form
                _ => serde_yaml::to_string(&self.to_value()?).map_err(|e| ScanError::Output(e.to_string())),
            },
        }
    }
}

fn colored_severity(severity: &str) -> String {
    match Severity::parse(severity) {
        Some(Severity::High) => severity.red().bold().to_string(),
        Some(Severity::Medium) => severity.yellow().to_string(),
        Some(Severity::Low) => severity.blue().to_string(),
        None => severity.to_string(),
    }
}

fn write_violation(out: &mut String, v: &Violation) {
    let _ = writeln!(
        out,
        "  {}:{} [{}] {} ({}) {}.{}",
        v.file,
        v.line,
        colored_severity(&v.severity),
        v.rule_id.bold(),
        v.category,
        v.resource_type,
        v.resource_name
    );
    let _ = writeln!(out, "      {}", v.description);
    if !v.comment.is_empty() {
        let _ = writeln!(out, "      {}", format!("skipped: {}", v.comment).dimmed());
    }
}

/// Plain text rendering of violation results.
fn human(output: &ScanOutput) -> String {
    let store = &output.store;
    let mut out = String::new();

    if !output.errors.is_empty() {
        let _ = writeln!(out, "{}", "Scan errors:".red().bold());
        for err in output.errors.iter() {
            let _ = writeln!(out, "  {}", err);
        }
        out.push('\n');
    }

    if store.violations.is_empty() {
        let _ = writeln!(out, "{}", "No violations found.".green());
    } else {
        let _ = writeln!(out, "{}", "Violations:".bold());
        for v in &store.violations {
            write_violation(&mut out, v);
        }
    }

    if !store.skipped_violations.is_empty() {
        let _ = writeln!(out, "\n{}", "Skipped violations:".bold());
        for v in &store.skipped_violations {
            write_violation(&mut out, v);
        }
    }

    if !store.passed_rules.is_empty() {
        let _ = writeln!(out, "\n{}", "Passed rules:".bold());
        for rule in &store.passed_rules {
            let _ = writeln!(out, "  {} {} [{}]", "✓".green(), rule.rule_id, rule.rule_name);
        }
    }

    let s = &store.scan_summary;
    let _ = writeln!(
        out,
        "\nScanned {} ({}) at {}: {} policies validated, {} violated (high: {}, medium: {}, low: {})",
        s.file_or_folder,
        s.iac_type,
        s.scanned_at,
        s.policies_validated,
        s.violated_policies,
        s.high,
        s.medium,
        s.low
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iac::{DirScanErr, ResourceConfig};
    use crate::policy::PassedRule;

    fn output(mode: OutputMode) -> ScanOutput {
        let mut out = ScanOutput {
            mode,
            ..Default::default()
        };
        out.resources.push(ResourceConfig {
            id: "kubernetes_pod.api-default".to_string(),
            name: "api".to_string(),
            resource_type: "kubernetes_pod".to_string(),
            line: 1,
            ..Default::default()
        });
        out.errors.push(DirScanErr::new("k8s", "/deploy", "bad yaml"));
        out.store.violations.push(Violation {
            rule_id: "AC_K8S_0001".to_string(),
            severity: "HIGH".to_string(),
            resource_name: "api".to_string(),
            ..Default::default()
        });
        out.store.passed_rules.push(PassedRule::default());
        out
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(exit_code(false, false), 0);
        assert_eq!(exit_code(true, false), 3);
        assert_eq!(exit_code(false, true), 4);
        assert_eq!(exit_code(true, true), 5);
        assert_eq!(output(OutputMode::Violations).exit_code(), 5);
    }

    #[test]
    fn test_shapes() {
        let config_only = output(OutputMode::ConfigOnly).to_value().unwrap();
        assert_eq!(config_only["kubernetes_pod"][0]["id"], "kubernetes_pod.api-default");

        let with_errors = output(OutputMode::ConfigWithErrors).to_value().unwrap();
        assert_eq!(with_errors["scan_errors"][0]["err_message"], "bad yaml");
        assert!(with_errors["resource_config"]["kubernetes_pod"].is_array());

        let results = output(OutputMode::Violations).to_value().unwrap();
        assert_eq!(results["results"]["violations"][0]["rule"], "AC_K8S_0001");
    }

    #[test]
    fn test_render_formats() {
        let out = output(OutputMode::Violations);
        let json = out.render(OutputFormat::Json).unwrap();
        assert!(serde_json::from_str::<Value>(&json).is_ok());
        let yaml = out.render(OutputFormat::Yaml).unwrap();
        assert!(yaml.contains("AC_K8S_0001"));

        colored::control::set_override(false);
        let human = out.render(OutputFormat::Human).unwrap();
        assert!(human.contains("Scan errors:"));
        assert!(human.contains("[HIGH] AC_K8S_0001"));
    }

    #[test]
    fn test_parse_format() {
        assert_eq!(OutputFormat::parse("JSON"), Some(OutputFormat::Json));
        assert_eq!(OutputFormat::parse("yml"), Some(OutputFormat::Yaml));
        assert_eq!(OutputFormat::parse("xml"), None);
    }
}
