//! Terraform plan loader.
//!
//! Reads the JSON produced by `terraform show -json <planfile>` and turns
//! every managed resource of the planned values into a resource.

use log::debug;
use serde::Deserialize;
use std::path::Path;

use super::output::{AllResourceConfigs, ResourceConfig};
use super::{DirScanErr, IacLoader, LoadOptions, LoadOutcome};
use crate::error::IacError;

const IAC_TYPE: &str = "tfplan";

#[derive(Debug, Deserialize)]
struct Plan {
    format_version: Option<serde_json::Value>,
    #[serde(default)]
    planned_values: Option<PlannedValues>,
}

#[derive(Debug, Deserialize)]
struct PlannedValues {
    root_module: Option<Module>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Module {
    address: Option<String>,
    resources: Vec<PlanResource>,
    child_modules: Vec<Module>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PlanResource {
    address: Option<String>,
    mode: Option<String>,
    #[serde(rename = "type")]
    resource_type: Option<String>,
    name: String,
    values: serde_json::Value,
}

/// Resource id from a plan address: the last two dot segments.
///
/// `module.vpc.aws_subnet.private` becomes `aws_subnet.private`.
pub fn tf_id(address: &str) -> String {
    let parts: Vec<&str> = address.split('.').collect();
    if parts.len() <= 2 {
        address.to_string()
    } else {
        parts[parts.len() - 2..].join(".")
    }
}

fn collect(module: Module, all: &mut AllResourceConfigs) {
    let module_name = module.address.unwrap_or_default();
    for resource in module.resources {
        let (Some(address), Some(resource_type)) = (resource.address, resource.resource_type) else {
            continue;
        };
        if resource.mode.as_deref() != Some("managed") {
            continue;
        }
        all.push(ResourceConfig {
            id: tf_id(&address),
            name: resource.name,
            source: String::new(),
            line: 1,
            resource_type,
            config: resource.values,
            module_name: module_name.clone(),
            ..Default::default()
        });
    }
    for child in module.child_modules {
        collect(child, all);
    }
}

/// Parse plan JSON into resources.
pub fn parse_plan(content: &str) -> Result<AllResourceConfigs, IacError> {
    let plan: Plan = serde_json::from_str(content).map_err(|e| IacError::InvalidPlan(format!("'{}'", e)))?;
    if plan.format_version.is_none() {
        return Err(IacError::InvalidPlan("'format_version' key not present".to_string()));
    }

    let mut all = AllResourceConfigs::new();
    if let Some(root) = plan.planned_values.and_then(|p| p.root_module) {
        collect(root, &mut all);
    }
    debug!("tfplan produced {} resource(s)", all.len());
    Ok(all)
}

/// Loader for Terraform plan JSON files.
#[derive(Debug, Clone, Default)]
pub struct TfPlanLoader;

impl TfPlanLoader {
    pub fn new() -> Self {
        Self
    }
}

impl IacLoader for TfPlanLoader {
    fn load_iac_dir(&self, root: &Path, _options: &LoadOptions) -> LoadOutcome {
        LoadOutcome::failed(DirScanErr::new(
            IAC_TYPE,
            root.display().to_string(),
            IacError::DirNotSupported,
        ))
    }

    fn load_iac_file(&self, path: &Path, _options: &LoadOptions) -> Result<AllResourceConfigs, IacError> {
        let content = std::fs::read_to_string(path)?;
        parse_plan(&content)
    }

    fn name(&self) -> &'static str {
        IAC_TYPE
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const PLAN: &str = r#"{
  "format_version": "1.2",
  "terraform_version": "1.6.0",
  "planned_values": {
    "root_module": {
      "resources": [
        {"address": "aws_s3_bucket.logs", "mode": "managed", "type": "aws_s3_bucket", "name": "logs",
         "values": {"bucket": "logs", "acl": "private"}},
        {"address": "data.aws_iam_policy_document.p", "mode": "data", "type": "aws_iam_policy_document", "name": "p",
         "values": {}}
      ],
      "child_modules": [
        {"address": "module.vpc", "resources": [
          {"address": "module.vpc.aws_vpc.main", "mode": "managed", "type": "aws_vpc", "name": "main",
           "values": {"cidr_block": "10.0.0.0/16"}}
        ], "child_modules": [
          {"address": "module.vpc.module.subnets", "resources": [
            {"address": "module.vpc.module.subnets.aws_subnet.private", "mode": "managed", "type": "aws_subnet",
             "name": "private", "values": {}}
          ]}
        ]}
      ]
    }
  }
}"#;

    #[test]
    fn test_tf_id() {
        assert_eq!(tf_id("aws_s3_bucket.logs"), "aws_s3_bucket.logs");
        assert_eq!(tf_id("module.vpc.aws_vpc.main"), "aws_vpc.main");
        assert_eq!(tf_id("single"), "single");
    }

    #[test]
    fn test_parse_plan() {
        let all = parse_plan(PLAN).unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.get("aws_iam_policy_document").is_none());

        let bucket = &all.get("aws_s3_bucket").unwrap()[0];
        assert_eq!(bucket.id, "aws_s3_bucket.logs");
        assert_eq!(bucket.line, 1);
        assert_eq!(bucket.source, "");
        assert_eq!(bucket.config["acl"], "private");
        assert_eq!(bucket.module_name, "");

        let vpc = &all.get("aws_vpc").unwrap()[0];
        assert_eq!(vpc.id, "aws_vpc.main");
        assert_eq!(vpc.module_name, "module.vpc");

        let subnet = &all.get("aws_subnet").unwrap()[0];
        assert_eq!(subnet.module_name, "module.vpc.module.subnets");
    }

    #[test]
    fn test_invalid_plans() {
        let err = parse_plan(r#"{"planned_values": {}}"#).unwrap_err();
        assert_eq!(
            err.to_string(),
            "invalid terraform json file; error: 'format_version' key not present"
        );
        assert!(matches!(parse_plan("not json"), Err(IacError::InvalidPlan(_))));
    }

    #[test]
    fn test_dir_not_supported() {
        let dir = TempDir::new().unwrap();
        let outcome = TfPlanLoader::new().load_iac_dir(dir.path(), &LoadOptions::default());
        assert_eq!(outcome.errors.len(), 1);
        assert!(outcome.errors.iter().next().unwrap().err_message.contains("tfplan should always be a file"));

        let path = dir.path().join("plan.json");
        std::fs::write(&path, PLAN).unwrap();
        let all = TfPlanLoader::new().load_iac_file(&path, &LoadOptions::default()).unwrap();
        assert_eq!(all.len(), 3);
    }
}
