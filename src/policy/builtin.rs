//! Built-in rules.
//!
//! A compact catalogue covering the most common misconfigurations of
//! Kubernetes workloads, Dockerfiles and AWS resources. Each rule is a plain
//! predicate over a normalized [`ResourceConfig`] returning `true` when the
//! resource violates it.

use log::debug;
use serde_json::Value;

use super::severity::Severity;
use super::{Finding, PolicyEngine, RuleMetadata};
use crate::error::PolicyError;
use crate::iac::k8s::images::pod_spec_pointer;
use crate::iac::{AllResourceConfigs, ResourceConfig};

const ENGINE_NAME: &str = "builtin";

type Check = fn(&ResourceConfig) -> bool;

struct BuiltinRule {
    id: &'static str,
    name: &'static str,
    description: &'static str,
    severity: Severity,
    category: &'static str,
    resource_types: &'static [&'static str],
    check: Check,
}

const WORKLOADS: &[&str] = &[
    "kubernetes_pod",
    "kubernetes_deployment",
    "kubernetes_replica_set",
    "kubernetes_replication_controller",
    "kubernetes_job",
    "kubernetes_cron_job",
    "kubernetes_stateful_set",
    "kubernetes_daemonset",
];

const IAM_POLICIES: &[&str] = &["aws_iam_policy", "aws_iam_role_policy"];

static RULES: &[BuiltinRule] = &[
    // Kubernetes
    BuiltinRule {
        id: "AC_K8S_0001",
        name: "privilegedContainersEnabled",
        description: "Containers should not run in privileged mode",
        severity: Severity::High,
        category: "IDENTITY AND ACCESS MANAGEMENT",
        resource_types: WORKLOADS,
        check: k8s::privileged,
    },
    BuiltinRule {
        id: "AC_K8S_0002",
        name: "allowPrivilegeEscalation",
        description: "Containers should set allowPrivilegeEscalation to false",
        severity: Severity::Medium,
        category: "IDENTITY AND ACCESS MANAGEMENT",
        resource_types: WORKLOADS,
        check: k8s::privilege_escalation,
    },
    BuiltinRule {
        id: "AC_K8S_0003",
        name: "hostNetworkShared",
        description: "Pods should not share the host network namespace",
        severity: Severity::High,
        category: "INFRASTRUCTURE SECURITY",
        resource_types: WORKLOADS,
        check: k8s::host_network,
    },
    BuiltinRule {
        id: "AC_K8S_0004",
        name: "imageWithoutDigestOrTag",
        description: "Container images should be pinned to a tag other than latest",
        severity: Severity::Medium,
        category: "CONFIGURATION AND VULNERABILITY ANALYSIS",
        resource_types: WORKLOADS,
        check: k8s::unpinned_image,
    },
    BuiltinRule {
        id: "AC_K8S_0005",
        name: "cpuMemoryLimitsNotSet",
        description: "Containers should declare CPU and memory limits",
        severity: Severity::Low,
        category: "RESILIENCE",
        resource_types: WORKLOADS,
        check: k8s::missing_limits,
    },
    BuiltinRule {
        id: "AC_K8S_0006",
        name: "runAsNonRootNotSet",
        description: "Pods should run as a non root user",
        severity: Severity::Medium,
        category: "SECURITY BEST PRACTICES",
        resource_types: WORKLOADS,
        check: k8s::run_as_root,
    },
    // Dockerfile
    BuiltinRule {
        id: "AC_DOCKER_0001",
        name: "baseImageLatestTag",
        description: "Base images should be pinned to a tag other than latest",
        severity: Severity::Medium,
        category: "CONFIGURATION AND VULNERABILITY ANALYSIS",
        resource_types: &["docker_from"],
        check: docker::latest_base_image,
    },
    BuiltinRule {
        id: "AC_DOCKER_0002",
        name: "addInsteadOfCopy",
        description: "COPY should be used instead of ADD for local files",
        severity: Severity::Low,
        category: "INFRASTRUCTURE SECURITY",
        resource_types: &["docker_add"],
        check: docker::add_local_files,
    },
    BuiltinRule {
        id: "AC_DOCKER_0003",
        name: "missingUserInstruction",
        description: "A USER instruction should drop root privileges",
        severity: Severity::Medium,
        category: "IDENTITY AND ACCESS MANAGEMENT",
        resource_types: &["docker_dockerfile"],
        check: docker::missing_user,
    },
    BuiltinRule {
        id: "AC_DOCKER_0004",
        name: "missingHealthcheck",
        description: "A HEALTHCHECK instruction should be defined",
        severity: Severity::Low,
        category: "RESILIENCE",
        resource_types: &["docker_dockerfile"],
        check: docker::missing_healthcheck,
    },
    BuiltinRule {
        id: "AC_DOCKER_0005",
        name: "sudoInRun",
        description: "RUN instructions should not use sudo",
        severity: Severity::Medium,
        category: "SECURITY BEST PRACTICES",
        resource_types: &["docker_run"],
        check: docker::uses_sudo,
    },
    // AWS
    BuiltinRule {
        id: "AC_AWS_0001",
        name: "s3BucketPublicAcl",
        description: "S3 buckets should not grant public or authenticated-users ACLs",
        severity: Severity::High,
        category: "INFRASTRUCTURE SECURITY",
        resource_types: &["aws_s3_bucket"],
        check: aws::public_bucket_acl,
    },
    BuiltinRule {
        id: "AC_AWS_0002",
        name: "s3BucketSseDisabled",
        description: "S3 buckets should enable server side encryption",
        severity: Severity::Medium,
        category: "DATA PROTECTION",
        resource_types: &["aws_s3_bucket"],
        check: aws::bucket_unencrypted,
    },
    BuiltinRule {
        id: "AC_AWS_0003",
        name: "s3VersioningDisabled",
        description: "S3 buckets should enable versioning",
        severity: Severity::Low,
        category: "RESILIENCE",
        resource_types: &["aws_s3_bucket"],
        check: aws::versioning_disabled,
    },
    BuiltinRule {
        id: "AC_AWS_0004",
        name: "s3AccessLoggingDisabled",
        description: "S3 buckets should enable access logging",
        severity: Severity::Low,
        category: "LOGGING AND MONITORING",
        resource_types: &["aws_s3_bucket"],
        check: aws::logging_disabled,
    },
    BuiltinRule {
        id: "AC_AWS_0005",
        name: "sshOpenToInternet",
        description: "Security groups should not allow SSH from the internet",
        severity: Severity::High,
        category: "INFRASTRUCTURE SECURITY",
        resource_types: &["aws_security_group"],
        check: aws::ssh_open,
    },
    BuiltinRule {
        id: "AC_AWS_0006",
        name: "rdsStorageNotEncrypted",
        description: "RDS instances should encrypt storage",
        severity: Severity::High,
        category: "DATA PROTECTION",
        resource_types: &["aws_db_instance"],
        check: aws::rds_unencrypted,
    },
    BuiltinRule {
        id: "AC_AWS_0007",
        name: "rdsPubliclyAccessible",
        description: "RDS instances should not be publicly accessible",
        severity: Severity::High,
        category: "INFRASTRUCTURE SECURITY",
        resource_types: &["aws_db_instance"],
        check: aws::rds_public,
    },
    BuiltinRule {
        id: "AC_AWS_0008",
        name: "kmsKeyRotationDisabled",
        description: "KMS keys should enable automatic rotation",
        severity: Severity::Medium,
        category: "DATA PROTECTION",
        resource_types: &["aws_kms_key"],
        check: aws::kms_rotation_disabled,
    },
    BuiltinRule {
        id: "AC_AWS_0009",
        name: "iamPolicyWildcardAction",
        description: "IAM policies should not allow every action",
        severity: Severity::High,
        category: "IDENTITY AND ACCESS MANAGEMENT",
        resource_types: IAM_POLICIES,
        check: aws::wildcard_action,
    },
];

impl BuiltinRule {
    fn metadata(&self) -> RuleMetadata {
        RuleMetadata {
            id: self.id.to_string(),
            name: self.name.to_string(),
            description: self.description.to_string(),
            severity: self.severity,
            category: self.category.to_string(),
            resource_types: self.resource_types.iter().map(|t| t.to_string()).collect(),
        }
    }

    fn applies_to(&self, resource: &ResourceConfig) -> bool {
        self.resource_types.contains(&resource.resource_type.as_str())
    }
}

/// Engine evaluating the built-in catalogue.
#[derive(Debug, Clone, Default)]
pub struct BuiltinEngine;

impl BuiltinEngine {
    pub fn new() -> Self {
        Self
    }
}

impl PolicyEngine for BuiltinEngine {
    fn name(&self) -> &str {
        ENGINE_NAME
    }

    fn rules(&self) -> Vec<RuleMetadata> {
        RULES.iter().map(BuiltinRule::metadata).collect()
    }

    fn evaluate(
        &self,
        resources: &AllResourceConfigs,
        selected: &[RuleMetadata],
    ) -> Result<Vec<Finding>, PolicyError> {
        let rules: Vec<&BuiltinRule> = RULES
            .iter()
            .filter(|rule| selected.iter().any(|s| s.id == rule.id))
            .collect();
        debug!("{} engine evaluating {} rule(s)", ENGINE_NAME, rules.len());

        let mut findings = Vec::new();
        for resource in resources.iter() {
            for rule in rules.iter().filter(|r| r.applies_to(resource)) {
                if (rule.check)(resource) {
                    findings.push(Finding::new(rule.id, &resource.resource_type, &resource.id));
                }
            }
        }
        Ok(findings)
    }
}

fn is_true(value: Option<&Value>) -> bool {
    value.and_then(Value::as_bool).unwrap_or(false)
}

/// Image reference without a tag, or tagged `latest`. Digests count as pinned.
fn unpinned(image: &str) -> bool {
    if image.contains('@') {
        return false;
    }
    let last = image.rsplit('/').next().unwrap_or(image);
    match last.split_once(':') {
        Some((_, tag)) => tag == "latest",
        None => true,
    }
}

mod k8s {
    use super::*;

    fn pod_spec(resource: &ResourceConfig) -> Option<&Value> {
        let kind = resource.config.get("kind")?.as_str()?;
        resource.config.pointer(pod_spec_pointer(kind)?)
    }

    fn containers(resource: &ResourceConfig) -> Vec<&Value> {
        let Some(spec) = pod_spec(resource) else {
            return Vec::new();
        };
        ["containers", "initContainers"]
            .iter()
            .filter_map(|key| spec.get(key).and_then(Value::as_array))
            .flatten()
            .collect()
    }

    pub(super) fn privileged(resource: &ResourceConfig) -> bool {
        containers(resource)
            .iter()
            .any(|c| is_true(c.pointer("/securityContext/privileged")))
    }

    pub(super) fn privilege_escalation(resource: &ResourceConfig) -> bool {
        containers(resource).iter().any(|c| {
            c.pointer("/securityContext/allowPrivilegeEscalation")
                .and_then(Value::as_bool)
                != Some(false)
        })
    }

    pub(super) fn host_network(resource: &ResourceConfig) -> bool {
        pod_spec(resource).is_some_and(|spec| is_true(spec.get("hostNetwork")))
    }

    pub(super) fn unpinned_image(resource: &ResourceConfig) -> bool {
        resource
            .container_images
            .iter()
            .chain(&resource.init_container_images)
            .any(|c| unpinned(&c.image))
    }

    pub(super) fn missing_limits(resource: &ResourceConfig) -> bool {
        containers(resource).iter().any(|c| {
            let limits = c.pointer("/resources/limits");
            limits.and_then(|l| l.get("cpu")).is_none() || limits.and_then(|l| l.get("memory")).is_none()
        })
    }

    pub(super) fn run_as_root(resource: &ResourceConfig) -> bool {
        let Some(spec) = pod_spec(resource) else {
            return false;
        };
        if is_true(spec.pointer("/securityContext/runAsNonRoot")) {
            return false;
        }
        let containers = containers(resource);
        containers.is_empty()
            || containers
                .iter()
                .any(|c| !is_true(c.pointer("/securityContext/runAsNonRoot")))
    }
}

mod docker {
    use super::*;

    fn value(resource: &ResourceConfig) -> &str {
        resource.config.as_str().unwrap_or_default()
    }

    fn commands(resource: &ResourceConfig) -> Vec<&str> {
        resource
            .config
            .as_array()
            .map(|cmds| cmds.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default()
    }

    pub(super) fn latest_base_image(resource: &ResourceConfig) -> bool {
        let Some(image) = value(resource).split_whitespace().find(|w| !w.starts_with("--")) else {
            return false;
        };
        // build args and scratch can't be judged
        image != "scratch" && !image.starts_with('$') && unpinned(image)
    }

    pub(super) fn add_local_files(resource: &ResourceConfig) -> bool {
        let sources: Vec<&str> = value(resource)
            .split_whitespace()
            .filter(|w| !w.starts_with("--"))
            .collect();
        let Some((_, sources)) = sources.split_last() else {
            return false;
        };
        sources.iter().any(|s| {
            !s.starts_with("http://")
                && !s.starts_with("https://")
                && ![".tar", ".tar.gz", ".tgz", ".tar.bz2", ".tar.xz"]
                    .iter()
                    .any(|ext| s.ends_with(ext))
        })
    }

    pub(super) fn missing_user(resource: &ResourceConfig) -> bool {
        !commands(resource).contains(&"user")
    }

    pub(super) fn missing_healthcheck(resource: &ResourceConfig) -> bool {
        !commands(resource).contains(&"healthcheck")
    }

    pub(super) fn uses_sudo(resource: &ResourceConfig) -> bool {
        value(resource)
            .split(|c: char| c.is_whitespace() || c == ';' || c == '&' || c == '|')
            .any(|w| w == "sudo")
    }
}

mod aws {
    use super::*;

    const PUBLIC_ACLS: &[&str] = &["publicread", "publicreadwrite", "authenticatedread"];
    const OPEN_CIDRS: &[&str] = &["0.0.0.0/0", "::/0"];
    const SSH_PORT: i64 = 22;

    fn first_block<'a>(resource: &'a ResourceConfig, key: &str) -> Option<&'a Value> {
        match resource.config.get(key)? {
            Value::Array(items) => items.first(),
            Value::Object(_) => resource.config.get(key),
            _ => None,
        }
    }

    fn non_empty(value: Option<&Value>) -> bool {
        match value {
            Some(Value::Array(items)) => !items.is_empty(),
            Some(Value::Object(map)) => !map.is_empty(),
            Some(Value::Null) | None => false,
            Some(_) => true,
        }
    }

    pub(super) fn public_bucket_acl(resource: &ResourceConfig) -> bool {
        let acl = resource
            .config
            .get("acl")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .replace('-', "")
            .to_lowercase();
        PUBLIC_ACLS.contains(&acl.as_str())
    }

    pub(super) fn bucket_unencrypted(resource: &ResourceConfig) -> bool {
        !non_empty(resource.config.get("server_side_encryption_configuration"))
    }

    pub(super) fn versioning_disabled(resource: &ResourceConfig) -> bool {
        !is_true(first_block(resource, "versioning").and_then(|v| v.get("enabled")))
    }

    pub(super) fn logging_disabled(resource: &ResourceConfig) -> bool {
        !non_empty(resource.config.get("logging"))
    }

    fn open_to_world(rule: &Value) -> bool {
        ["cidr_blocks", "ipv6_cidr_blocks"].iter().any(|key| {
            rule.get(key)
                .and_then(Value::as_array)
                .is_some_and(|cidrs| cidrs.iter().any(|c| c.as_str().is_some_and(|c| OPEN_CIDRS.contains(&c))))
        })
    }

    fn covers_ssh(rule: &Value) -> bool {
        let protocol = rule.get("protocol").and_then(Value::as_str).unwrap_or_default();
        if protocol == "-1" || protocol.eq_ignore_ascii_case("all") {
            return true;
        }
        let from = rule.get("from_port").and_then(Value::as_i64).unwrap_or(0);
        let to = rule.get("to_port").and_then(Value::as_i64).unwrap_or(0);
        from <= SSH_PORT && SSH_PORT <= to
    }

    pub(super) fn ssh_open(resource: &ResourceConfig) -> bool {
        resource
            .config
            .get("ingress")
            .and_then(Value::as_array)
            .is_some_and(|rules| rules.iter().any(|r| open_to_world(r) && covers_ssh(r)))
    }

    pub(super) fn rds_unencrypted(resource: &ResourceConfig) -> bool {
        !is_true(resource.config.get("storage_encrypted"))
    }

    pub(super) fn rds_public(resource: &ResourceConfig) -> bool {
        is_true(resource.config.get("publicly_accessible"))
    }

    pub(super) fn kms_rotation_disabled(resource: &ResourceConfig) -> bool {
        !is_true(resource.config.get("enable_key_rotation"))
    }

    fn allows_everything(statement: &Value) -> bool {
        if statement.get("Effect").and_then(Value::as_str) != Some("Allow") {
            return false;
        }
        match statement.get("Action") {
            Some(Value::String(action)) => action == "*",
            Some(Value::Array(actions)) => actions.iter().any(|a| a.as_str() == Some("*")),
            _ => false,
        }
    }

    pub(super) fn wildcard_action(resource: &ResourceConfig) -> bool {
        let document = match resource.config.get("policy") {
            Some(Value::String(text)) => match serde_json::from_str::<Value>(text) {
                Ok(document) => document,
                Err(e) => {
                    debug!("policy of {} is not valid json: {}", resource.id, e);
                    return false;
                }
            },
            Some(document @ Value::Object(_)) => document.clone(),
            _ => return false,
        };
        match document.get("Statement") {
            Some(Value::Array(statements)) => statements.iter().any(allows_everything),
            Some(statement @ Value::Object(_)) => allows_everything(statement),
            _ => false,
        }
    }
}
