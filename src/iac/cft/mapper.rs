//! Mapping of CloudFormation resources onto canonical resource configs.

use serde_json::{Map, Value, json};

use super::schema;
use crate::iac::k8s::normalize::to_snake_case;

/// One canonical resource produced from a template resource.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedResource {
    pub resource_type: &'static str,
    pub name: String,
    pub config: Value,
}

fn string(props: &Map<String, Value>, key: &str) -> String {
    match props.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn boolean(props: &Map<String, Value>, key: &str) -> bool {
    props.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn integer(props: &Map<String, Value>, key: &str) -> i64 {
    props.get(key).and_then(Value::as_i64).unwrap_or(0)
}

fn object<'a>(props: &'a Map<String, Value>, key: &str) -> Option<&'a Map<String, Value>> {
    props.get(key).and_then(Value::as_object)
}

fn list<'a>(props: &'a Map<String, Value>, key: &str) -> &'a [Value] {
    props.get(key).and_then(Value::as_array).map(Vec::as_slice).unwrap_or(&[])
}

fn tags(props: &Map<String, Value>) -> Value {
    props.get("Tags").cloned().unwrap_or(Value::Null)
}

/// Policy documents are carried as JSON strings.
fn policy_document(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(v) => serde_json::to_string(v).unwrap_or_default(),
        None => String::new(),
    }
}

/// Map a resource that survived sanitization.
///
/// Returns nothing for types without a canonical mapping.
pub fn map_resource(logical_name: &str, cft_type: &str, resource: &Map<String, Value>) -> Vec<MappedResource> {
    let Some((resource_type, _)) = schema::resource_type(cft_type) else {
        return Vec::new();
    };
    let empty = Map::new();
    let props = object(resource, "Properties").unwrap_or(&empty);

    let single = |config: Value| {
        vec![MappedResource {
            resource_type,
            name: logical_name.to_string(),
            config,
        }]
    };

    match cft_type {
        "AWS::S3::Bucket" => s3_bucket(logical_name, props),
        "AWS::S3::BucketPolicy" => single(json!({
            "bucket": string(props, "Bucket"),
            "policy": policy_document(props.get("PolicyDocument")),
        })),
        "AWS::EC2::SecurityGroup" => single(security_group(props)),
        "AWS::IAM::Role" => iam_role(logical_name, props),
        "AWS::IAM::Policy" => single(json!({
            "name": string(props, "PolicyName"),
            "policy": policy_document(props.get("PolicyDocument")),
            "roles": props.get("Roles").cloned().unwrap_or(Value::Null),
            "users": props.get("Users").cloned().unwrap_or(Value::Null),
            "groups": props.get("Groups").cloned().unwrap_or(Value::Null),
        })),
        "AWS::RDS::DBInstance" => single(db_instance(props)),
        "AWS::KMS::Key" => single(json!({
            "description": string(props, "Description"),
            "policy": policy_document(props.get("KeyPolicy")),
            "deletion_window_in_days": integer(props, "PendingWindowInDays"),
            "is_enabled": boolean(props, "Enabled"),
            "enable_key_rotation": boolean(props, "EnableKeyRotation"),
            "tags": tags(props),
        })),
        "AWS::CloudFormation::Stack" => single(json!({
            "template_url": props.get("TemplateURL").cloned().unwrap_or(Value::Null),
            "notification_arns": match list(props, "NotificationARNs") {
                [] => Value::Null,
                arns => Value::Array(arns.to_vec()),
            },
            "tags": tags(props),
        })),
        _ => single(generic(props)),
    }
}

/// Property map with snake_case keys.
fn generic(props: &Map<String, Value>) -> Value {
    Value::Object(
        props
            .iter()
            .map(|(k, v)| (to_snake_case(k), v.clone()))
            .collect(),
    )
}

fn s3_bucket(logical_name: &str, props: &Map<String, Value>) -> Vec<MappedResource> {
    let mut config = Map::new();
    config.insert("bucket".into(), Value::String(string(props, "BucketName")));
    config.insert("acl".into(), Value::String(string(props, "AccessControl").to_lowercase()));
    config.insert("tags".into(), tags(props));

    if let Some(encryption) = object(props, "BucketEncryption") {
        let rules: Vec<Value> = list(encryption, "ServerSideEncryptionConfiguration")
            .iter()
            .filter_map(Value::as_object)
            .filter_map(|rule| {
                let default = object(rule, "ServerSideEncryptionByDefault")?;
                Some(json!({
                    "apply_server_side_encryption_by_default": [{
                        "kms_master_key_id": string(default, "KMSMasterKeyID"),
                        "sse_algorithm": string(default, "SSEAlgorithm"),
                    }],
                    "bucket_key_enabled": boolean(rule, "BucketKeyEnabled"),
                }))
            })
            .collect();
        config.insert(
            "server_side_encryption_configuration".into(),
            json!([{ "rule": rules }]),
        );
    }

    let logging = match object(props, "LoggingConfiguration") {
        Some(logging) => json!([{
            "target_bucket": string(logging, "DestinationBucketName"),
            "target_prefix": string(logging, "LogFilePrefix"),
        }]),
        None => json!([]),
    };
    config.insert("logging".into(), logging);

    if let Some(website) = object(props, "WebsiteConfiguration") {
        config.insert(
            "website".into(),
            json!([{
                "index_document": string(website, "IndexDocument"),
                "error_document": string(website, "ErrorDocument"),
                "redirect_all_requests_to": website.get("RedirectAllRequestsTo").cloned().unwrap_or(Value::Null),
                "routing_rules": website.get("RoutingRules").cloned().unwrap_or(Value::Null),
            }]),
        );
    }

    if let Some(versioning) = object(props, "VersioningConfiguration") {
        config.insert(
            "versioning".into(),
            json!([{ "enabled": string(versioning, "Status") == "Enabled" }]),
        );
    }

    let mut mapped = vec![MappedResource {
        resource_type: "aws_s3_bucket",
        name: logical_name.to_string(),
        config: Value::Object(config),
    }];

    if let Some(block) = object(props, "PublicAccessBlockConfiguration") {
        mapped.push(MappedResource {
            resource_type: "aws_s3_bucket_public_access_block",
            name: logical_name.to_string(),
            config: json!({
                "bucket": format!("aws_s3_bucket.{}", logical_name),
                "block_public_acls": boolean(block, "BlockPublicAcls"),
                "block_public_policy": boolean(block, "BlockPublicPolicy"),
                "ignore_public_acls": boolean(block, "IgnorePublicAcls"),
                "restrict_public_buckets": boolean(block, "RestrictPublicBuckets"),
            }),
        });
    }

    mapped
}

fn ingress_egress(rules: &[Value]) -> Value {
    let non_empty = |s: String| if s.is_empty() { Vec::new() } else { vec![s] };
    Value::Array(
        rules
            .iter()
            .filter_map(Value::as_object)
            .map(|rule| {
                json!({
                    "protocol": string(rule, "IpProtocol"),
                    "description": string(rule, "Description"),
                    "cidr_blocks": non_empty(string(rule, "CidrIp")),
                    "ipv6_cidr_blocks": non_empty(string(rule, "CidrIpv6")),
                    "from_port": integer(rule, "FromPort"),
                    "to_port": integer(rule, "ToPort"),
                })
            })
            .collect(),
    )
}

fn security_group(props: &Map<String, Value>) -> Value {
    json!({
        "name": string(props, "GroupName"),
        "description": string(props, "GroupDescription"),
        "tags": tags(props),
        "ingress": ingress_egress(list(props, "SecurityGroupIngress")),
        "egress": ingress_egress(list(props, "SecurityGroupEgress")),
    })
}

fn iam_role(logical_name: &str, props: &Map<String, Value>) -> Vec<MappedResource> {
    let role_name = string(props, "RoleName");
    let mut mapped = vec![MappedResource {
        resource_type: "aws_iam_role",
        name: logical_name.to_string(),
        config: json!({
            "name": role_name,
            "assume_role_policy": policy_document(props.get("AssumeRolePolicyDocument")),
            "managed_policy_arns": props.get("ManagedPolicyArns").cloned().unwrap_or(Value::Null),
            "permissions_boundary": string(props, "PermissionsBoundary"),
            "tags": tags(props),
        }),
    }];

    // inline policies become their own resources
    for (i, policy) in list(props, "Policies").iter().filter_map(Value::as_object).enumerate() {
        let policy_name = string(policy, "PolicyName");
        let name = if policy_name.is_empty() {
            format!("{}_policy_{}", logical_name, i)
        } else {
            policy_name.clone()
        };
        mapped.push(MappedResource {
            resource_type: "aws_iam_role_policy",
            name,
            config: json!({
                "name": policy_name,
                "role": format!("aws_iam_role.{}", logical_name),
                "policy": policy_document(policy.get("PolicyDocument")),
            }),
        });
    }

    mapped
}

fn db_instance(props: &Map<String, Value>) -> Value {
    let mut config = json!({
        "name": string(props, "DBName"),
        "enabled_cloudwatch_logs_exports": props.get("EnableCloudwatchLogsExports").cloned().unwrap_or(json!([])),
        "auto_minor_version_upgrade": boolean(props, "AutoMinorVersionUpgrade"),
        "ca_cert_identifier": string(props, "CACertificateIdentifier"),
        "storage_encrypted": boolean(props, "StorageEncrypted"),
        "iam_database_authentication_enabled": boolean(props, "EnableIAMDatabaseAuthentication"),
        "publicly_accessible": boolean(props, "PubliclyAccessible"),
        "tags": tags(props),
    });
    let kms_key_id = string(props, "KmsKeyId");
    if !kms_key_id.is_empty() {
        config["kms_key_id"] = Value::String(kms_key_id);
    }
    config
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resource(value: Value) -> Map<String, Value> {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_s3_bucket_with_public_access_block() {
        let r = resource(json!({
            "Type": "AWS::S3::Bucket",
            "Properties": {
                "BucketName": "logs",
                "AccessControl": "PublicRead",
                "BucketEncryption": {"ServerSideEncryptionConfiguration": [
                    {"ServerSideEncryptionByDefault": {"SSEAlgorithm": "aws:kms"}}
                ]},
                "VersioningConfiguration": {"Status": "Enabled"},
                "PublicAccessBlockConfiguration": {"BlockPublicAcls": true}
            }
        }));
        let mapped = map_resource("LogBucket", "AWS::S3::Bucket", &r);
        assert_eq!(mapped.len(), 2);

        let bucket = &mapped[0];
        assert_eq!(bucket.resource_type, "aws_s3_bucket");
        assert_eq!(bucket.name, "LogBucket");
        assert_eq!(bucket.config["acl"], "publicread");
        assert_eq!(
            bucket.config["server_side_encryption_configuration"][0]["rule"][0]
                ["apply_server_side_encryption_by_default"][0]["sse_algorithm"],
            "aws:kms"
        );
        assert_eq!(bucket.config["versioning"][0]["enabled"], true);

        let block = &mapped[1];
        assert_eq!(block.resource_type, "aws_s3_bucket_public_access_block");
        assert_eq!(block.config["bucket"], "aws_s3_bucket.LogBucket");
        assert_eq!(block.config["block_public_acls"], true);
        assert_eq!(block.config["restrict_public_buckets"], false);
    }

    #[test]
    fn test_security_group() {
        let r = resource(json!({"Properties": {
            "GroupName": "web",
            "SecurityGroupIngress": [{"IpProtocol": "tcp", "CidrIp": "0.0.0.0/0", "FromPort": 22, "ToPort": 22}]
        }}));
        let mapped = map_resource("WebSg", "AWS::EC2::SecurityGroup", &r);
        let ingress = &mapped[0].config["ingress"][0];
        assert_eq!(ingress["cidr_blocks"], json!(["0.0.0.0/0"]));
        assert_eq!(ingress["ipv6_cidr_blocks"], json!([]));
        assert_eq!(ingress["from_port"], 22);
    }

    #[test]
    fn test_iam_role_inline_policies() {
        let r = resource(json!({"Properties": {
            "RoleName": "app",
            "AssumeRolePolicyDocument": {"Version": "2012-10-17"},
            "Policies": [{"PolicyName": "read", "PolicyDocument": {"Statement": []}}]
        }}));
        let mapped = map_resource("AppRole", "AWS::IAM::Role", &r);
        assert_eq!(mapped.len(), 2);
        assert_eq!(mapped[0].config["assume_role_policy"], r#"{"Version":"2012-10-17"}"#);
        assert_eq!(mapped[1].resource_type, "aws_iam_role_policy");
        assert_eq!(mapped[1].name, "read");
        assert_eq!(mapped[1].config["role"], "aws_iam_role.AppRole");
    }

    #[test]
    fn test_stack_and_generic() {
        let stack = resource(json!({"Properties": {"TemplateURL": "https://example.com/child.yaml"}}));
        let mapped = map_resource("Child", "AWS::CloudFormation::Stack", &stack);
        assert_eq!(mapped[0].config["template_url"], "https://example.com/child.yaml");
        assert!(mapped[0].config["notification_arns"].is_null());

        let queue = resource(json!({"Properties": {"QueueName": "q", "KmsMasterKeyId": "k"}}));
        let mapped = map_resource("Queue", "AWS::SQS::Queue", &queue);
        assert_eq!(mapped[0].config["queue_name"], "q");
        assert_eq!(mapped[0].config["kms_master_key_id"], "k");

        assert!(map_resource("X", "Custom::Thing", &queue).is_empty());
    }
}
