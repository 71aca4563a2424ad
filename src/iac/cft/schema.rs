//! Static field schemas of CloudFormation parameters and resource types.
//!
//! Each supported resource type maps to its canonical type and to the expected
//! shape of the properties we know about. Properties missing from a schema are
//! passed through untouched.

/// Expected shape of one field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Int,
    Float,
    Bool,
    /// Free-form document, never coerced.
    Json,
    List(&'static FieldKind),
    /// String-keyed map with uniform values.
    Map(&'static FieldKind),
    Object(&'static [(&'static str, FieldKind)]),
    Optional(&'static FieldKind),
}

pub type Fields = &'static [(&'static str, FieldKind)];

/// Look a field up in a schema.
pub fn field(fields: Fields, name: &str) -> Option<&'static FieldKind> {
    fields.iter().find(|(n, _)| *n == name).map(|(_, kind)| kind)
}

use FieldKind::*;

const TAGS: FieldKind = List(&Object(&[("Key", String), ("Value", String)]));
const STRINGS: FieldKind = List(&String);

pub static PARAMETER: Fields = &[
    ("Type", String),
    ("Description", String),
    ("Default", Json),
    ("AllowedPattern", String),
    ("AllowedValues", List(&Json)),
    ("ConstraintDescription", String),
    ("MaxLength", Optional(&Int)),
    ("MaxValue", Optional(&Float)),
    ("MinLength", Optional(&Int)),
    ("MinValue", Optional(&Float)),
    ("NoEcho", Optional(&Bool)),
];

pub static CREATION_POLICY: Fields = &[
    ("AutoScalingCreationPolicy", Object(&[("MinSuccessfulInstancesPercent", Optional(&Int))])),
    ("ResourceSignal", Object(&[("Count", Optional(&Int)), ("Timeout", Optional(&String))])),
];

pub static UPDATE_POLICY: Fields = &[
    ("AutoScalingReplacingUpdate", Object(&[("WillReplace", Bool)])),
    (
        "AutoScalingRollingUpdate",
        Object(&[
            ("MaxBatchSize", Int),
            ("MinInstancesInService", Int),
            ("MinSuccessfulInstancesPercent", Int),
            ("PauseTime", String),
            ("WaitOnResourceSignals", Bool),
        ]),
    ),
    ("EnableVersionUpgrade", Bool),
    ("UseOnlineResharding", Bool),
];

const INGRESS_EGRESS: FieldKind = Object(&[
    ("CidrIp", String),
    ("CidrIpv6", String),
    ("Description", String),
    ("FromPort", Int),
    ("ToPort", Int),
    ("IpProtocol", String),
    ("SourceSecurityGroupId", String),
    ("DestinationSecurityGroupId", String),
]);

static S3_BUCKET: Fields = &[
    ("BucketName", String),
    ("AccessControl", String),
    (
        "BucketEncryption",
        Object(&[(
            "ServerSideEncryptionConfiguration",
            List(&Object(&[
                ("BucketKeyEnabled", Optional(&Bool)),
                (
                    "ServerSideEncryptionByDefault",
                    Optional(&Object(&[("KMSMasterKeyID", String), ("SSEAlgorithm", String)])),
                ),
            ])),
        )]),
    ),
    ("LoggingConfiguration", Object(&[("DestinationBucketName", String), ("LogFilePrefix", String)])),
    (
        "PublicAccessBlockConfiguration",
        Object(&[
            ("BlockPublicAcls", Bool),
            ("BlockPublicPolicy", Bool),
            ("IgnorePublicAcls", Bool),
            ("RestrictPublicBuckets", Bool),
        ]),
    ),
    ("VersioningConfiguration", Object(&[("Status", String)])),
    (
        "WebsiteConfiguration",
        Object(&[
            ("IndexDocument", String),
            ("ErrorDocument", String),
            ("RedirectAllRequestsTo", Json),
            ("RoutingRules", Json),
        ]),
    ),
    ("Tags", TAGS),
];

static S3_BUCKET_POLICY: Fields = &[("Bucket", String), ("PolicyDocument", Json)];

static SECURITY_GROUP: Fields = &[
    ("GroupDescription", String),
    ("GroupName", String),
    ("VpcId", String),
    ("SecurityGroupIngress", List(&INGRESS_EGRESS)),
    ("SecurityGroupEgress", List(&INGRESS_EGRESS)),
    ("Tags", TAGS),
];

static IAM_ROLE: Fields = &[
    ("AssumeRolePolicyDocument", Json),
    ("Description", String),
    ("ManagedPolicyArns", STRINGS),
    ("MaxSessionDuration", Int),
    ("Path", String),
    ("PermissionsBoundary", String),
    ("Policies", List(&Object(&[("PolicyDocument", Json), ("PolicyName", String)]))),
    ("RoleName", String),
    ("Tags", TAGS),
];

static IAM_POLICY: Fields = &[
    ("Groups", STRINGS),
    ("PolicyDocument", Json),
    ("PolicyName", String),
    ("Roles", STRINGS),
    ("Users", STRINGS),
];

static DB_INSTANCE: Fields = &[
    ("AllocatedStorage", String),
    ("AutoMinorVersionUpgrade", Bool),
    ("BackupRetentionPeriod", Int),
    ("CACertificateIdentifier", String),
    ("CopyTagsToSnapshot", Bool),
    ("DBInstanceClass", String),
    ("DBInstanceIdentifier", String),
    ("DBName", String),
    ("DeletionProtection", Bool),
    ("EnableCloudwatchLogsExports", STRINGS),
    ("EnableIAMDatabaseAuthentication", Bool),
    ("Engine", String),
    ("EngineVersion", String),
    ("Iops", Int),
    ("KmsKeyId", String),
    ("MasterUsername", String),
    ("MasterUserPassword", String),
    ("MonitoringInterval", Int),
    ("MultiAZ", Bool),
    ("Port", String),
    ("PubliclyAccessible", Bool),
    ("StorageEncrypted", Bool),
    ("StorageType", String),
    ("Tags", TAGS),
];

static KMS_KEY: Fields = &[
    ("Description", String),
    ("Enabled", Bool),
    ("EnableKeyRotation", Bool),
    ("KeyPolicy", Json),
    ("KeyUsage", String),
    ("PendingWindowInDays", Int),
    ("Tags", TAGS),
];

static STACK: Fields = &[
    ("NotificationARNs", STRINGS),
    ("Parameters", Map(&String)),
    ("TemplateURL", String),
    ("TemplateData", Json),
    ("TimeoutInMinutes", Int),
    ("Tags", TAGS),
];

static SQS_QUEUE: Fields = &[
    ("DelaySeconds", Int),
    ("FifoQueue", Bool),
    ("KmsMasterKeyId", String),
    ("MaximumMessageSize", Int),
    ("MessageRetentionPeriod", Int),
    ("QueueName", String),
    ("VisibilityTimeout", Int),
    ("Tags", TAGS),
];

static SNS_TOPIC: Fields = &[
    ("DisplayName", String),
    ("KmsMasterKeyId", String),
    ("TopicName", String),
    ("Tags", TAGS),
];

static LAMBDA_FUNCTION: Fields = &[
    ("FunctionName", String),
    ("Handler", String),
    ("KmsKeyArn", String),
    ("MemorySize", Int),
    ("Role", String),
    ("Runtime", String),
    ("Timeout", Int),
    ("TracingConfig", Object(&[("Mode", String)])),
    ("VpcConfig", Object(&[("SecurityGroupIds", STRINGS), ("SubnetIds", STRINGS)])),
    ("Environment", Object(&[("Variables", Map(&String))])),
    ("Tags", TAGS),
];

static DYNAMODB_TABLE: Fields = &[
    ("BillingMode", String),
    ("TableName", String),
    (
        "PointInTimeRecoverySpecification",
        Object(&[("PointInTimeRecoveryEnabled", Bool)]),
    ),
    (
        "SSESpecification",
        Object(&[("KMSMasterKeyId", String), ("SSEEnabled", Bool), ("SSEType", String)]),
    ),
    ("Tags", TAGS),
];

static EC2_INSTANCE: Fields = &[
    ("EbsOptimized", Bool),
    ("IamInstanceProfile", String),
    ("ImageId", String),
    ("InstanceType", String),
    ("Monitoring", Bool),
    ("SecurityGroupIds", STRINGS),
    ("SubnetId", String),
    ("UserData", String),
    ("Tags", TAGS),
];

static EBS_VOLUME: Fields = &[
    ("AvailabilityZone", String),
    ("Encrypted", Bool),
    ("Iops", Int),
    ("KmsKeyId", String),
    ("Size", Int),
    ("VolumeType", String),
    ("Tags", TAGS),
];

static LOG_GROUP: Fields = &[
    ("KmsKeyId", String),
    ("LogGroupName", String),
    ("RetentionInDays", Int),
];

static CLOUDTRAIL: Fields = &[
    ("EnableLogFileValidation", Bool),
    ("IncludeGlobalServiceEvents", Bool),
    ("IsLogging", Bool),
    ("IsMultiRegionTrail", Bool),
    ("KMSKeyId", String),
    ("S3BucketName", String),
    ("TrailName", String),
    ("Tags", TAGS),
];

static ECR_REPOSITORY: Fields = &[
    ("ImageScanningConfiguration", Object(&[("ScanOnPush", Bool)])),
    ("ImageTagMutability", String),
    ("RepositoryName", String),
    ("RepositoryPolicyText", Json),
    ("Tags", TAGS),
];

static EFS_FILE_SYSTEM: Fields = &[
    ("Encrypted", Bool),
    ("FileSystemPolicy", Json),
    ("KmsKeyId", String),
    ("PerformanceMode", String),
];

static EKS_CLUSTER: Fields = &[
    ("Name", String),
    ("RoleArn", String),
    ("Version", String),
    (
        "ResourcesVpcConfig",
        Object(&[
            ("EndpointPrivateAccess", Bool),
            ("EndpointPublicAccess", Bool),
            ("PublicAccessCidrs", STRINGS),
            ("SecurityGroupIds", STRINGS),
            ("SubnetIds", STRINGS),
        ]),
    ),
];

static ELASTICACHE_REPLICATION_GROUP: Fields = &[
    ("AtRestEncryptionEnabled", Bool),
    ("AuthToken", String),
    ("NumCacheClusters", Int),
    ("ReplicationGroupDescription", String),
    ("TransitEncryptionEnabled", Bool),
];

static SECRETS_MANAGER_SECRET: Fields = &[("Description", String), ("KmsKeyId", String), ("Name", String)];

/// Supported CloudFormation types, their canonical type and property schema.
pub static RESOURCE_TYPES: &[(&str, &str, Fields)] = &[
    ("AWS::S3::Bucket", "aws_s3_bucket", S3_BUCKET),
    ("AWS::S3::BucketPolicy", "aws_s3_bucket_policy", S3_BUCKET_POLICY),
    ("AWS::EC2::SecurityGroup", "aws_security_group", SECURITY_GROUP),
    ("AWS::IAM::Role", "aws_iam_role", IAM_ROLE),
    ("AWS::IAM::Policy", "aws_iam_policy", IAM_POLICY),
    ("AWS::RDS::DBInstance", "aws_db_instance", DB_INSTANCE),
    ("AWS::KMS::Key", "aws_kms_key", KMS_KEY),
    ("AWS::CloudFormation::Stack", "aws_cloudformation_stack", STACK),
    ("AWS::SQS::Queue", "aws_sqs_queue", SQS_QUEUE),
    ("AWS::SNS::Topic", "aws_sns_topic", SNS_TOPIC),
    ("AWS::Lambda::Function", "aws_lambda_function", LAMBDA_FUNCTION),
    ("AWS::DynamoDB::Table", "aws_dynamodb_table", DYNAMODB_TABLE),
    ("AWS::EC2::Instance", "aws_instance", EC2_INSTANCE),
    ("AWS::EC2::Volume", "aws_ebs_volume", EBS_VOLUME),
    ("AWS::Logs::LogGroup", "aws_cloudwatch_log_group", LOG_GROUP),
    ("AWS::CloudTrail::Trail", "aws_cloudtrail", CLOUDTRAIL),
    ("AWS::ECR::Repository", "aws_ecr_repository", ECR_REPOSITORY),
    ("AWS::EFS::FileSystem", "aws_efs_file_system", EFS_FILE_SYSTEM),
    ("AWS::EKS::Cluster", "aws_eks_cluster", EKS_CLUSTER),
    (
        "AWS::ElastiCache::ReplicationGroup",
        "aws_elasticache_replication_group",
        ELASTICACHE_REPLICATION_GROUP,
    ),
    ("AWS::SecretsManager::Secret", "aws_secretsmanager_secret", SECRETS_MANAGER_SECRET),
    ("AWS::ApiGateway::RestApi", "aws_api_gateway_rest_api", &[]),
    ("AWS::ApiGateway::Stage", "aws_api_gateway_stage", &[]),
    ("AWS::ApiGatewayV2::Stage", "aws_apigatewayv2_stage", &[]),
    ("AWS::AutoScaling::LaunchConfiguration", "aws_launch_configuration", &[]),
    ("AWS::CertificateManager::Certificate", "aws_acm_certificate", &[]),
    ("AWS::CloudFront::Distribution", "aws_cloudfront_distribution", &[]),
    ("AWS::CodeBuild::Project", "aws_codebuild_project", &[]),
    ("AWS::Cognito::UserPool", "aws_cognito_user_pool", &[]),
    ("AWS::Config::ConfigRule", "aws_config_config_rule", &[]),
    ("AWS::DAX::Cluster", "aws_dax_cluster", &[]),
    ("AWS::DMS::ReplicationInstance", "aws_dms_replication_instance", &[]),
    ("AWS::DocDB::DBCluster", "aws_docdb_cluster", &[]),
    ("AWS::EC2::VPC", "aws_vpc", &[]),
    ("AWS::EC2::Subnet", "aws_subnet", &[]),
    ("AWS::ECS::Service", "aws_ecs_service", &[]),
    ("AWS::ECS::TaskDefinition", "aws_ecs_task_definition", &[]),
    ("AWS::EKS::Nodegroup", "aws_eks_node_group", &[]),
    ("AWS::ElastiCache::CacheCluster", "aws_elasticache_cluster", &[]),
    ("AWS::ElasticLoadBalancing::LoadBalancer", "aws_elb", &[]),
    ("AWS::ElasticLoadBalancingV2::Listener", "aws_lb_listener", &[]),
    ("AWS::ElasticLoadBalancingV2::TargetGroup", "aws_lb_target_group", &[]),
    ("AWS::Elasticsearch::Domain", "aws_elasticsearch_domain", &[]),
    ("AWS::EMR::Cluster", "aws_emr_cluster", &[]),
    ("AWS::GuardDuty::Detector", "aws_guardduty_detector", &[]),
    ("AWS::IAM::AccessKey", "aws_iam_access_key", &[]),
    ("AWS::IAM::Group", "aws_iam_group", &[]),
    ("AWS::IAM::User", "aws_iam_user", &[]),
    ("AWS::Kinesis::Stream", "aws_kinesis_stream", &[]),
    ("AWS::KinesisFirehose::DeliveryStream", "aws_kinesis_firehose_delivery_stream", &[]),
    ("AWS::AmazonMQ::Broker", "aws_mq_broker", &[]),
    ("AWS::MSK::Cluster", "aws_msk_cluster", &[]),
    ("AWS::Neptune::DBCluster", "aws_neptune_cluster", &[]),
    ("AWS::RDS::DBCluster", "aws_rds_cluster", &[]),
    ("AWS::RDS::DBSecurityGroup", "aws_db_security_group", &[]),
    ("AWS::Redshift::Cluster", "aws_redshift_cluster", &[]),
    ("AWS::Route53::RecordSet", "aws_route53_record", &[]),
    ("AWS::SageMaker::NotebookInstance", "aws_sagemaker_notebook_instance", &[]),
    ("AWS::SecretsManager::RotationSchedule", "aws_secretsmanager_secret_rotation", &[]),
    ("AWS::SNS::TopicPolicy", "aws_sns_topic_policy", &[]),
    ("AWS::SQS::QueuePolicy", "aws_sqs_queue_policy", &[]),
    ("AWS::SSM::Parameter", "aws_ssm_parameter", &[]),
    ("AWS::WorkSpaces::Workspace", "aws_workspaces_workspace", &[]),
];

/// Canonical type and property schema of a CloudFormation type.
pub fn resource_type(cft_type: &str) -> Option<(&'static str, Fields)> {
    RESOURCE_TYPES
        .iter()
        .find(|(t, _, _)| *t == cft_type)
        .map(|(_, canonical, fields)| (*canonical, *fields))
}
