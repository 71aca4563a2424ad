//! The scan state machine.

use log::{debug, error, info, warn};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::filter::{Disposition, dispose, select_rules};
use super::output::{OutputMode, ScanOutput};
use super::validate::validate;
use super::{ExecuteError, ScanOptions};
use crate::cloud::CloudProvider;
use crate::config::ScanConfig;
use crate::error::ValidationError;
use crate::iac::{AllResourceConfigs, IacLoader, IacProvider, LoadErrors, ResourceConfig};
use crate::notifications::Notifier;
use crate::policy::{Finding, PassedRule, PolicyEngine, RuleMetadata, Violation, ViolationStore, check_severity};

/// Cloud assumed when a scan names none.
fn default_cloud(iac_type: &str) -> CloudProvider {
    match iac_type {
        "k8s" | "helm" | "kustomize" => CloudProvider::K8s,
        "docker" => CloudProvider::Docker,
        _ => CloudProvider::Aws,
    }
}

fn find_resource<'a>(resources: &'a AllResourceConfigs, finding: &Finding) -> Option<&'a ResourceConfig> {
    resources
        .get(&finding.resource_type)?
        .iter()
        .find(|r| r.id == finding.resource_id)
}

/// Runs one scan.
pub struct Executor {
    options: ScanOptions,
    config: Arc<ScanConfig>,
    engines: Vec<Box<dyn PolicyEngine>>,
    notifiers: Vec<Notifier>,
}

impl Executor {
    pub fn new(
        options: ScanOptions,
        config: Arc<ScanConfig>,
        engines: Vec<Box<dyn PolicyEngine>>,
        notifiers: Vec<Notifier>,
    ) -> Self {
        Self {
            options,
            config,
            engines,
            notifiers,
        }
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan rules from the command line followed by those of the config file.
    fn scan_rules(&self) -> Vec<String> {
        let mut rules = self.options.scan_rules.clone();
        rules.extend(self.config.rules.scan_rules.iter().cloned());
        rules
    }

    fn skip_rules(&self) -> Vec<String> {
        let mut rules = self.options.skip_rules.clone();
        rules.extend(self.config.rules.skip_rules.iter().cloned());
        rules
    }

    /// The command line severity, else the config file's.
    fn severity(&self) -> &str {
        if self.options.severity.is_empty() {
            &self.config.severity.level
        } else {
            &self.options.severity
        }
    }

    fn categories(&self) -> &[String] {
        if self.options.categories.is_empty() {
            &self.config.category.list
        } else {
            &self.options.categories
        }
    }

    fn clouds(&self) -> Result<Vec<CloudProvider>, ValidationError> {
        if self.options.cloud_types.is_empty() {
            return Ok(vec![default_cloud(&self.options.iac_type)]);
        }
        self.options
            .cloud_types
            .iter()
            .map(|c| CloudProvider::parse(c).ok_or(ValidationError::CloudNotSupported))
            .collect()
    }

    /// Load the single file, or every root directory.
    ///
    /// A failing file aborts the scan; directory errors are collected and the
    /// remaining roots still load.
    fn load(&self, loader: &dyn IacLoader) -> Result<(AllResourceConfigs, LoadErrors), ExecuteError> {
        let options = self.options.load_options();
        if let Some(file) = &self.options.iac_file {
            let resources = loader.load_iac_file(file, &options).map_err(|e| {
                error!("error while loading iac file '{}': {}", file.display(), e);
                e
            })?;
            return Ok((resources, LoadErrors::new()));
        }

        let mut resources = AllResourceConfigs::new();
        let mut errors = LoadErrors::new();
        for dir in &self.options.iac_dirs {
            info!("loading {} directory {}", loader.name(), dir.display());
            let outcome = loader.load_iac_dir(dir, &options);
            if !outcome.errors.is_empty() {
                warn!("{}", outcome.errors);
            }
            resources.merge(outcome.resources);
            errors.extend(outcome.errors);
        }
        Ok((resources, errors))
    }

    fn violation(rule: &RuleMetadata, resource: &ResourceConfig) -> Violation {
        Violation {
            rule_name: rule.name.clone(),
            description: rule.description.clone(),
            rule_id: rule.id.clone(),
            severity: rule.severity.to_string(),
            category: rule.category.clone(),
            resource_name: resource.name.clone(),
            resource_type: resource.resource_type.clone(),
            file: resource.source.clone(),
            line: resource.line,
            comment: String::new(),
        }
    }

    /// Evaluate every engine and sort the findings into the store.
    fn evaluate(&self, resources: &AllResourceConfigs) -> Result<(ViolationStore, usize), ExecuteError> {
        let (scan_rules, skip_rules) = (self.scan_rules(), self.skip_rules());
        let floor = self.severity().to_string();
        let mut store = ViolationStore::new();
        let mut validated = 0;

        for engine in &self.engines {
            let selected = select_rules(engine.rules(), &scan_rules, &skip_rules, self.categories());
            debug!("engine {} selected {} rule(s)", engine.name(), selected.len());

            let findings = engine.evaluate(resources, &selected)?;
            let by_id: HashMap<&str, &RuleMetadata> = selected.iter().map(|r| (r.id.as_str(), r)).collect();
            let mut failed: HashSet<&str> = HashSet::new();
            let mut reported: HashSet<&str> = HashSet::new();

            for finding in &findings {
                let Some(rule) = by_id.get(finding.rule_id.as_str()) else {
                    debug!("engine {} reported unselected rule {}", engine.name(), finding.rule_id);
                    continue;
                };
                let Some(resource) = find_resource(resources, finding) else {
                    debug!("finding for unknown resource {}", finding.resource_id);
                    continue;
                };
                failed.insert(rule.id.as_str());

                match dispose(Self::violation(rule, resource), resource, &floor) {
                    Disposition::Report(v) => {
                        reported.insert(rule.id.as_str());
                        store.violations.push(v);
                    }
                    Disposition::Skip(v) => store.skipped_violations.push(v),
                    Disposition::Drop => {}
                }
            }

            // rules under the floor only count when a resource override surfaced them
            let applicable: Vec<&RuleMetadata> = selected
                .iter()
                .filter(|r| {
                    floor.is_empty() || check_severity(r.severity.as_str(), &floor) || reported.contains(r.id.as_str())
                })
                .collect();
            validated += applicable.len();

            store.passed_rules.extend(
                applicable
                    .into_iter()
                    .filter(|r| !failed.contains(r.id.as_str()))
                    .map(PassedRule::from),
            );
        }

        Ok((store, validated))
    }

    fn notify(&self, output: &ScanOutput) -> Result<(), ExecuteError> {
        if self.notifiers.is_empty() {
            return Ok(());
        }
        let payload = output.to_value()?;
        for notifier in &self.notifiers {
            if let Err(e) = notifier.notify(&payload) {
                error!("failed to send notification: {}", e);
                return Err(ExecuteError::with_output(e, output.clone()));
            }
        }
        Ok(())
    }

    /// Run the scan.
    pub fn execute(&self) -> Result<ScanOutput, ExecuteError> {
        validate(&self.options, self.severity(), self.categories())?;

        let provider = IacProvider::new(&self.options.iac_type, &self.options.iac_version)?;
        let loader = provider.loader();
        debug!("using iac provider {}", provider);
        if !self.config.policy.path.is_empty() {
            debug!("policy path {} configured", self.config.policy.path);
        }

        let (resources, errors) = self.load(loader.as_ref())?;
        let resources = self
            .clouds()?
            .iter()
            .fold(resources, |resources, cloud| cloud.normalize(resources));
        info!("loaded {} resource(s) with {} error(s)", resources.len(), errors.len());

        let mut output = ScanOutput {
            mode: self.options.output_mode,
            resources,
            errors,
            store: ViolationStore::new(),
        };
        if output.mode != OutputMode::Violations {
            return Ok(output);
        }

        let (mut store, validated) = self.evaluate(&output.resources)?;
        store.scan_errors = output.errors.iter().cloned().collect();
        store.add_summary(provider.iac_type(), &self.options.scanned_path(), validated);
        if !self.options.show_passed {
            store.passed_rules.clear();
        }
        output.store = store;

        self.notify(&output)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{PolicyError, ScanError};
    use crate::policy::{BuiltinEngine, Severity};
    use std::fs;
    use tempfile::TempDir;

    const PRIVILEGED_POD: &str = r#"apiVersion: v1
kind: Pod
metadata:
  name: api
  annotations:
    runterrascan.io/skip: '[{"rule": "AC_K8S_0005", "comment": "limits set by namespace quota"}]'
spec:
  hostNetwork: true
  securityContext:
    runAsNonRoot: true
  containers:
    - name: api
      image: api:1.0
      securityContext:
        privileged: true
        allowPrivilegeEscalation: false
"#;

    fn executor(options: ScanOptions) -> Executor {
        Executor::new(
            options,
            Arc::new(ScanConfig::default()),
            vec![Box::new(BuiltinEngine::new())],
            vec![],
        )
    }

    fn scan_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("pod.yaml"), PRIVILEGED_POD).unwrap();
        dir
    }

    fn rule_ids(violations: &[Violation]) -> Vec<&str> {
        violations.iter().map(|v| v.rule_id.as_str()).collect()
    }

    #[test]
    fn test_scan_reports_and_skips() {
        let dir = scan_dir();
        let output = executor(ScanOptions::new("k8s").with_dirs(vec![dir.path().to_path_buf()]))
            .execute()
            .unwrap();

        assert_eq!(rule_ids(&output.store.violations), vec!["AC_K8S_0001", "AC_K8S_0003"]);
        assert_eq!(rule_ids(&output.store.skipped_violations), vec!["AC_K8S_0005"]);
        assert_eq!(output.store.skipped_violations[0].comment, "limits set by namespace quota");

        let v = &output.store.violations[0];
        assert_eq!(v.resource_name, "api");
        assert_eq!(v.resource_type, "kubernetes_pod");
        assert_eq!(v.file, "pod.yaml");
        assert_eq!(v.line, 1);

        let summary = &output.store.scan_summary;
        assert_eq!(summary.iac_type, "k8s");
        assert_eq!(summary.violated_policies, 2);
        assert_eq!(summary.high, 2);
        assert!(output.store.passed_rules.is_empty());
        assert_eq!(output.exit_code(), 3);
    }

    #[test]
    fn test_rule_selection_and_floor() {
        let dir = scan_dir();
        let options = ScanOptions::new("k8s")
            .with_dirs(vec![dir.path().to_path_buf()])
            .with_skip_rules(vec!["AC_K8S_0003".to_string()])
            .with_show_passed(true);
        let output = executor(options).execute().unwrap();
        assert_eq!(rule_ids(&output.store.violations), vec!["AC_K8S_0001"]);
        assert!(output.store.passed_rules.iter().any(|r| r.rule_id == "AC_K8S_0002"));
        assert!(!output.store.passed_rules.iter().any(|r| r.rule_id == "AC_K8S_0003"));

        let options = ScanOptions::new("k8s")
            .with_dirs(vec![dir.path().to_path_buf()])
            .with_categories(vec!["infrastructure security".to_string()]);
        let output = executor(options).execute().unwrap();
        assert_eq!(rule_ids(&output.store.violations), vec!["AC_K8S_0003"]);
    }

    #[test]
    fn test_floor_limits_validated_rules() {
        let dir = scan_dir();
        let options = ScanOptions::new("k8s")
            .with_dirs(vec![dir.path().to_path_buf()])
            .with_severity("high")
            .with_show_passed(true);
        let output = executor(options).execute().unwrap();

        let high_rules = BuiltinEngine::new()
            .rules()
            .iter()
            .filter(|r| r.severity == Severity::High)
            .count();
        assert_eq!(output.store.scan_summary.policies_validated, high_rules);
        assert!(!output.store.passed_rules.iter().any(|r| r.rule_id == "AC_K8S_0002"));
        assert!(output.store.passed_rules.iter().all(|r| r.severity == "HIGH"));
    }

    #[test]
    fn test_override_counts_rule_under_floor() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("pod.yaml"),
            "apiVersion: v1\nkind: Pod\nmetadata:\n  name: api\n  annotations:\n    runterrascan.io/minseverity: High\nspec:\n  containers:\n    - name: api\n      image: api:latest\n",
        )
        .unwrap();
        let options = ScanOptions::new("k8s")
            .with_dirs(vec![dir.path().to_path_buf()])
            .with_scan_rules(vec!["AC_K8S_0004".to_string()])
            .with_severity("high");
        let output = executor(options).execute().unwrap();
        assert_eq!(rule_ids(&output.store.violations), vec!["AC_K8S_0004"]);
        assert_eq!(output.store.violations[0].severity, "HIGH");
        assert_eq!(output.store.scan_summary.policies_validated, 1);
    }

    #[test]
    fn test_config_rules_merge() {
        let dir = scan_dir();
        let mut config = ScanConfig::default();
        config.rules.scan_rules = vec!["AC_K8S_0003".to_string()];
        config.severity.level = "high".to_string();
        let executor = Executor::new(
            ScanOptions::new("k8s").with_dirs(vec![dir.path().to_path_buf()]),
            Arc::new(config),
            vec![Box::new(BuiltinEngine::new())],
            vec![],
        );
        let output = executor.execute().unwrap();
        assert_eq!(rule_ids(&output.store.violations), vec!["AC_K8S_0003"]);
        assert_eq!(output.store.scan_summary.policies_validated, 1);
    }

    #[test]
    fn test_partial_failure_across_roots() {
        let good = scan_dir();
        let bad = TempDir::new().unwrap();
        fs::write(bad.path().join("broken.yaml"), "kind: [unclosed").unwrap();

        let output = executor(
            ScanOptions::new("k8s").with_dirs(vec![bad.path().to_path_buf(), good.path().to_path_buf()]),
        )
        .execute()
        .unwrap();
        assert_eq!(output.errors.len(), 1);
        assert_eq!(output.store.scan_errors.len(), 1);
        assert!(output.store.has_violations());
        assert_eq!(output.exit_code(), 5);
    }

    #[test]
    fn test_config_only_skips_evaluation() {
        let dir = scan_dir();
        let output = executor(
            ScanOptions::new("k8s")
                .with_dirs(vec![dir.path().to_path_buf()])
                .with_output_mode(OutputMode::ConfigOnly),
        )
        .execute()
        .unwrap();
        assert_eq!(output.resources.len(), 1);
        assert!(output.store.violations.is_empty());
        assert_eq!(output.exit_code(), 0);
    }

    #[test]
    fn test_validation_and_file_errors() {
        let err = executor(ScanOptions::new("k8s")).execute().unwrap_err();
        assert!(matches!(err.error, ScanError::Validation(ValidationError::EmptyIacPath)));
        assert!(err.output.is_none());

        let dir = TempDir::new().unwrap();
        let file = dir.path().join("broken.yaml");
        fs::write(&file, "kind: [unclosed").unwrap();
        let err = executor(ScanOptions::new("k8s").with_file(file)).execute().unwrap_err();
        assert!(matches!(err.error, ScanError::Iac(_)));
    }

    struct FailingEngine;

    impl PolicyEngine for FailingEngine {
        fn name(&self) -> &str {
            "failing"
        }

        fn rules(&self) -> Vec<RuleMetadata> {
            Vec::new()
        }

        fn evaluate(&self, _: &AllResourceConfigs, _: &[RuleMetadata]) -> Result<Vec<Finding>, PolicyError> {
            Err(PolicyError::Evaluation {
                engine: "failing".to_string(),
                message: "boom".to_string(),
            })
        }
    }

    #[test]
    fn test_engine_failure() {
        let dir = scan_dir();
        let executor = Executor::new(
            ScanOptions::new("k8s").with_dirs(vec![dir.path().to_path_buf()]),
            Arc::new(ScanConfig::default()),
            vec![Box::new(FailingEngine)],
            vec![],
        );
        let err = executor.execute().unwrap_err();
        assert!(matches!(err.error, ScanError::Policy(_)));
    }

    #[test]
    fn test_notification_failure_keeps_output() {
        let dir = scan_dir();
        let executor = Executor::new(
            ScanOptions::new("k8s").with_dirs(vec![dir.path().to_path_buf()]),
            Arc::new(ScanConfig::default()),
            vec![Box::new(BuiltinEngine::new())],
            // nothing listens on the discard port
            vec![Notifier::Webhook {
                url: "http://127.0.0.1:9/hook".to_string(),
                token: String::new(),
            }],
        );
        let err = executor.execute().unwrap_err();
        assert!(matches!(err.error, ScanError::Notification(_)));
        let output = err.output.unwrap();
        assert!(output.store.has_violations());
    }
}
