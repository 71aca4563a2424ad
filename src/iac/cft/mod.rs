//! CloudFormation template loader.
//!
//! A template goes through four passes before it becomes canonical resources:
//! 1. YAML short tags are rewritten to long-form intrinsic maps
//! 2. intrinsic functions are resolved offline
//! 3. parameters and properties are coerced against the static schemas, and
//!    resources of unsupported types are dropped
//! 4. each remaining resource is mapped to one or more [`ResourceConfig`]s
//!
//! Nested stacks with inline `TemplateData` are expanded recursively.

pub mod intrinsics;
pub mod lines;
pub mod mapper;
pub mod sanitize;
pub mod schema;
pub mod tags;

use log::debug;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

use super::annotations::{self, MAX_SEVERITY_KEY, MIN_SEVERITY_KEY, SKIP_KEY};
use super::files::{self, base_name, relative_source};
use super::output::{AllResourceConfigs, ResourceConfig, SkipRule};
use super::{DirScanErr, IacLoader, LoadOptions, LoadOutcome};
use crate::error::IacError;

/// Template file extensions.
pub const EXTENSIONS: &[&str] = &["yaml", "yml", "json", "template", "txt"];

const STACK_TYPE: &str = "AWS::CloudFormation::Stack";
const MAX_NESTING: usize = 8;

/// Encoding of a template's text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Encoding {
    Json,
    Yaml,
}

/// A decoded template plus the line of each logical name.
struct Template {
    body: Map<String, Value>,
    lines: HashMap<String, usize>,
}

fn decode(content: &str, encoding: Encoding, path: &str) -> Result<Template, IacError> {
    let (body, lines) = match encoding {
        Encoding::Json => {
            let body: Value = serde_json::from_str(content).map_err(|e| IacError::parse(path, e))?;
            (body, lines::json_resource_lines(content))
        }
        Encoding::Yaml => {
            let yaml: serde_yaml::Value =
                serde_yaml::from_str(content).map_err(|e| IacError::parse(path, e))?;
            let body = tags::to_long_form(&yaml).map_err(|e| IacError::parse(path, e))?;
            (body, lines::yaml_resource_lines(content))
        }
    };

    match body {
        Value::Object(body) => Ok(Template { body, lines }),
        _ => Err(IacError::parse(path, "template is not a map")),
    }
}

/// Decode text of unknown encoding: JSON when it parses as JSON, YAML otherwise.
fn decode_sniffed(content: &str, path: &str) -> Result<Template, IacError> {
    if serde_json::from_str::<Value>(content).is_ok() {
        decode(content, Encoding::Json, path)
    } else {
        decode(content, Encoding::Yaml, path)
    }
}

fn decode_file(path: &Path, content: &str) -> Result<Template, IacError> {
    let display = path.display().to_string();
    if files::has_extension(path, &["json"]) {
        decode(content, Encoding::Json, &display)
    } else if files::has_extension(path, &["yaml", "yml"]) {
        decode(content, Encoding::Yaml, &display)
    } else if files::has_extension(path, &["template", "txt"]) {
        decode_sniffed(content, &display)
    } else {
        debug!("unknown extension found for {}", display);
        Err(IacError::UnknownExtension(display))
    }
}

/// Skip rules from a resource's `Metadata`, as a JSON string or an inline list.
fn metadata_skip_rules(metadata: &Map<String, Value>, resource_id: &str) -> Vec<SkipRule> {
    match metadata.get(SKIP_KEY) {
        Some(rules @ Value::Array(_)) => serde_json::from_value(rules.clone()).unwrap_or_else(|e| {
            debug!("skip rules of resource {} cannot be read: {}", resource_id, e);
            Vec::new()
        }),
        _ => annotations::read_skip_rules(metadata, resource_id).unwrap_or_default(),
    }
}

/// Run every pass over a decoded template and collect its resources.
fn process_template(mut template: Template, source: &str, depth: usize) -> AllResourceConfigs {
    let mut all = AllResourceConfigs::new();

    intrinsics::resolve_template(&mut template.body);
    let dropped = sanitize::sanitize_template(&mut template.body);
    if dropped > 0 {
        debug!("{} unsupported resources skipped in {}", dropped, source);
    }

    let Some(Value::Object(resources)) = template.body.get("Resources") else {
        return all;
    };

    for (logical_name, resource) in resources {
        let Some(resource) = resource.as_object() else {
            continue;
        };
        let Some(cft_type) = resource.get("Type").and_then(Value::as_str) else {
            continue;
        };
        let empty = Map::new();
        let metadata = resource.get("Metadata").and_then(Value::as_object).unwrap_or(&empty);
        let line = template.lines.get(logical_name).copied().unwrap_or(1);

        for mapped in mapper::map_resource(logical_name, cft_type, resource) {
            let id = format!("{}.{}", mapped.resource_type, mapped.name);
            let mut config = ResourceConfig {
                skip_rules: metadata_skip_rules(metadata, &id),
                id,
                name: mapped.name,
                source: source.to_string(),
                line,
                resource_type: mapped.resource_type.to_string(),
                config: mapped.config,
                ..Default::default()
            };
            if let Some(max) = annotations::read_string(metadata, MAX_SEVERITY_KEY) {
                config.max_severity = max;
            }
            if let Some(min) = annotations::read_string(metadata, MIN_SEVERITY_KEY) {
                config.min_severity = min;
            }
            all.push(config);
        }

        if cft_type == STACK_TYPE {
            all.merge(nested_stack(logical_name, resource, source, depth));
        }
    }

    all
}

/// Resources of a stack's inline `TemplateData`, sourced from its `TemplateURL`.
fn nested_stack(logical_name: &str, resource: &Map<String, Value>, parent_source: &str, depth: usize) -> AllResourceConfigs {
    let Some(properties) = resource.get("Properties").and_then(Value::as_object) else {
        return AllResourceConfigs::new();
    };
    let Some(data) = properties.get("TemplateData") else {
        return AllResourceConfigs::new();
    };
    if depth >= MAX_NESTING {
        debug!("nested stack '{}' exceeds the maximum nesting depth", logical_name);
        return AllResourceConfigs::new();
    }

    let source = properties
        .get("TemplateURL")
        .and_then(Value::as_str)
        .filter(|url| !url.is_empty())
        .unwrap_or(parent_source);

    let template = match data {
        Value::Object(body) => Ok(Template {
            body: body.clone(),
            lines: HashMap::new(),
        }),
        Value::String(text) => decode_sniffed(text, source),
        _ => Err(IacError::parse(source, "TemplateData must be a map or a string")),
    };

    match template {
        Ok(template) => process_template(template, source, depth + 1),
        Err(e) => {
            debug!("unable to load nested stack '{}': {}", logical_name, e);
            AllResourceConfigs::new()
        }
    }
}

/// Loader for CloudFormation templates.
#[derive(Debug, Clone, Default)]
pub struct CftLoader;

impl CftLoader {
    pub fn new() -> Self {
        Self
    }

    fn load_with_source(&self, path: &Path, source: &str) -> Result<AllResourceConfigs, IacError> {
        let content = fs::read_to_string(path)?;
        let template = decode_file(path, &content)?;
        Ok(process_template(template, source, 0))
    }
}

impl IacLoader for CftLoader {
    fn load_iac_dir(&self, root: &Path, options: &LoadOptions) -> LoadOutcome {
        let found = match files::find_files_by_extension(root, EXTENSIONS, options.non_recursive()) {
            Ok(found) => found,
            Err(e) => return LoadOutcome::failed(DirScanErr::new("cft", root.display().to_string(), e)),
        };

        files::load_each("cft", "cft", root, &found, |file| {
            self.load_with_source(file, &relative_source(root, file))
        })
    }

    fn load_iac_file(&self, path: &Path, _options: &LoadOptions) -> Result<AllResourceConfigs, IacError> {
        self.load_with_source(path, &base_name(path))
    }

    fn name(&self) -> &'static str {
        "cft"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const TEMPLATE: &str = r#"AWSTemplateFormatVersion: "2010-09-09"
Parameters:
  Env:
    Type: String
    Default: prod
Resources:
  LogBucket:
    Type: AWS::S3::Bucket
    Metadata:
      runterrascan.io/skip: '[{"rule": "AC_AWS_0214", "comment": "logs are public"}]'
    Properties:
      BucketName: !Sub "${Env}-logs"
      AccessControl: Private
  BucketPolicy:
    Type: AWS::S3::BucketPolicy
    Properties:
      Bucket: !Ref LogBucket
      PolicyDocument:
        Statement: []
  Custom:
    Type: Custom::Thing
"#;

    #[test]
    fn test_load_yaml_template() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.yaml");
        fs::write(&path, TEMPLATE).unwrap();

        let all = CftLoader::new().load_iac_file(&path, &LoadOptions::default()).unwrap();
        assert_eq!(all.len(), 2);

        let bucket = all.find_by_id("aws_s3_bucket.LogBucket").unwrap();
        assert_eq!(bucket.source, "stack.yaml");
        assert_eq!(bucket.line, 7);
        assert_eq!(bucket.config["bucket"], "prod-logs");
        assert_eq!(bucket.skip_rules, vec![SkipRule::new("AC_AWS_0214", "logs are public")]);

        let policy = all.find_by_id("aws_s3_bucket_policy.BucketPolicy").unwrap();
        assert_eq!(policy.config["bucket"], "LogBucket");
        assert_eq!(policy.line, 14);
    }

    #[test]
    fn test_template_extension_is_sniffed() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("a.template");
        fs::write(
            &json,
            r#"{"Resources": {"Key": {"Type": "AWS::KMS::Key", "Properties": {"EnableKeyRotation": "true"}}}}"#,
        )
        .unwrap();
        let all = CftLoader::new().load_iac_file(&json, &LoadOptions::default()).unwrap();
        let key = all.find_by_id("aws_kms_key.Key").unwrap();
        assert_eq!(key.config["enable_key_rotation"], true);
        assert_eq!(key.line, 1);

        let yaml = dir.path().join("b.txt");
        fs::write(&yaml, "Resources:\n  Topic:\n    Type: AWS::SNS::Topic\n").unwrap();
        let all = CftLoader::new().load_iac_file(&yaml, &LoadOptions::default()).unwrap();
        assert_eq!(all.find_by_id("aws_sns_topic.Topic").unwrap().line, 2);
    }

    #[test]
    fn test_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stack.cfn");
        fs::write(&path, "{}").unwrap();
        let err = CftLoader::new().load_iac_file(&path, &LoadOptions::default()).unwrap_err();
        assert!(err.to_string().starts_with("unknown file extension for file"));
    }

    #[test]
    fn test_nested_stack_template_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("parent.json");
        fs::write(
            &path,
            r#"{
  "Resources": {
    "Child": {
      "Type": "AWS::CloudFormation::Stack",
      "Properties": {
        "TemplateURL": "https://example.com/child.yaml",
        "TemplateData": "Resources:\n  Queue:\n    Type: AWS::SQS::Queue\n    Properties:\n      DelaySeconds: '5'\n"
      }
    }
  }
}"#,
        )
        .unwrap();

        let all = CftLoader::new().load_iac_file(&path, &LoadOptions::default()).unwrap();
        let stack = all.find_by_id("aws_cloudformation_stack.Child").unwrap();
        assert_eq!(stack.source, "parent.json");
        assert_eq!(stack.line, 3);

        let queue = all.find_by_id("aws_sqs_queue.Queue").unwrap();
        assert_eq!(queue.source, "https://example.com/child.yaml");
        assert_eq!(queue.config["delay_seconds"], 5);
        assert_eq!(queue.line, 2);
    }

    #[test]
    fn test_nested_stack_resolves_against_its_own_sections() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("parent.json");
        fs::write(
            &path,
            r#"{
  "Parameters": {"Env": {"Type": "String", "Default": "parent"}},
  "Resources": {
    "Bucket": {"Type": "AWS::S3::Bucket", "Properties": {"BucketName": {"Ref": "Env"}}},
    "Policy": {"Type": "AWS::S3::BucketPolicy", "Properties": {"Bucket": {"Ref": "Bucket"}}},
    "Child": {
      "Type": "AWS::CloudFormation::Stack",
      "Properties": {
        "TemplateURL": "https://example.com/child.json",
        "TemplateData": {
          "Parameters": {"Env": {"Type": "String", "Default": "child"}},
          "Resources": {
            "ChildBucket": {"Type": "AWS::S3::Bucket", "Properties": {"BucketName": {"Ref": "Env"}}},
            "ChildPolicy": {"Type": "AWS::S3::BucketPolicy", "Properties": {"Bucket": {"Ref": "ChildBucket"}}}
          }
        }
      }
    }
  }
}"#,
        )
        .unwrap();

        let all = CftLoader::new().load_iac_file(&path, &LoadOptions::default()).unwrap();
        let parent_bucket = all.find_by_id("aws_s3_bucket.Bucket").unwrap();
        assert_eq!(parent_bucket.config["bucket"], "parent");
        let parent_policy = all.find_by_id("aws_s3_bucket_policy.Policy").unwrap();
        assert_eq!(parent_policy.config["bucket"], "Bucket");

        let child_bucket = all.find_by_id("aws_s3_bucket.ChildBucket").unwrap();
        assert_eq!(child_bucket.config["bucket"], "child");
        assert_eq!(child_bucket.source, "https://example.com/child.json");
        let child_policy = all.find_by_id("aws_s3_bucket_policy.ChildPolicy").unwrap();
        assert_eq!(child_policy.config["bucket"], "ChildBucket");
    }

    #[test]
    fn test_load_dir_partial_failure() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.yaml"), TEMPLATE).unwrap();
        fs::write(dir.path().join("bad.json"), "{ not json").unwrap();
        fs::write(dir.path().join("bad.yaml"), "Resources: [unclosed").unwrap();

        let outcome = CftLoader::new().load_iac_dir(dir.path(), &LoadOptions::default());
        assert_eq!(outcome.resources.len(), 2);
        assert_eq!(outcome.errors.len(), 2);
    }
}
