//! Error types shared across the scanner.

use thiserror::Error;

use crate::iac::LoadErrors;

/// Errors raised while loading a single IaC file or directory.
#[derive(Error, Debug)]
pub enum IacError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unknown file extension for file {0}")]
    UnknownExtension(String),

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("load iac file is not supported for {0}")]
    FileNotSupported(&'static str),

    #[error(
        "tfplan should always be a file, not a directory. Please specify path to tfplan file with '-f' option"
    )]
    DirNotSupported,

    #[error("{0} files not found in the directory {1}")]
    NoFilesFound(&'static str, String),

    #[error("kind not found in the document")]
    NoKind,

    #[error("bad chart name in Chart.yaml")]
    BadChartName,

    #[error("bad chart version in Chart.yaml")]
    BadChartVersion,

    #[error("no helm charts found in directory {0}")]
    NoHelmCharts(String),

    #[error("failed to render template {template}: {message}")]
    Render { template: String, message: String },

    #[error("kustomization.y(a)ml file not found in the directory {0}")]
    KustomizationNotFound(String),

    #[error("multiple kustomization.y(a)ml found in the directory {0}")]
    MultipleKustomizations(String),

    #[error("error from kustomization. error : {0}")]
    Kustomize(String),

    #[error("invalid terraform json file; error: {0}")]
    InvalidPlan(String),

    #[error("iac type or version not supported: {0} {1}")]
    Unsupported(String, String),
}

impl IacError {
    /// Shorthand for a parse failure on a file.
    pub fn parse(path: impl Into<String>, message: impl ToString) -> Self {
        Self::Parse {
            path: path.into(),
            message: message.to_string(),
        }
    }
}

/// Input validation failures. These abort a scan before any work starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("empty iac path, either use '-f' or '-d' option")]
    EmptyIacPath,
    #[error("use either '-f' or '-d' option, not both")]
    BothPaths,
    #[error("directory does not exist")]
    DirNotExists,
    #[error("file does not exist")]
    FileNotExists,
    #[error("not a valid file")]
    NotValidFile,
    #[error("not a valid directory")]
    NotValidDir,
    #[error("iac type or version not supported")]
    IacNotSupported,
    #[error("cloud type not supported")]
    CloudNotSupported,
    #[error("severity level not supported")]
    SeverityNotSupported,
    #[error("category not supported")]
    CategoryNotSupported,
}

/// Configuration file errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),
    #[error("config file extension not supported: {0}")]
    UnsupportedFormat(String),
    #[error("failed to parse config file: {0}")]
    ParsingFailed(String),
    #[error("notifier type '{0}' not supported")]
    UnknownNotifier(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Policy engine failures.
#[derive(Error, Debug)]
pub enum PolicyError {
    #[error("policy engine '{engine}' failed: {message}")]
    Evaluation { engine: String, message: String },
}

/// Notification delivery failures.
#[derive(Error, Debug)]
pub enum NotificationError {
    #[error("failed to send webhook notification: {0}")]
    Request(#[from] reqwest::Error),
    #[error("webhook notification failed with status code {0}")]
    Status(u16),
    #[error("failed to serialize notification payload: {0}")]
    Payload(#[from] serde_json::Error),
}

/// Top level error returned by the executor and the CLI handlers.
#[derive(Error, Debug)]
pub enum ScanError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Iac(#[from] IacError),

    #[error(transparent)]
    Load(#[from] LoadErrors),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Policy(#[from] PolicyError),

    #[error(transparent)]
    Notification(#[from] NotificationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("output error: {0}")]
    Output(String),
}

pub type Result<T> = std::result::Result<T, ScanError>;

/// Admission webhook failures.
#[derive(Error, Debug)]
pub enum AdmissionError {
    #[error("apiKey is missing in validating admission webhook url")]
    ApiKeyMissing,
    #[error("variable K8S_WEBHOOK_API_KEY not set in server environment")]
    ApiKeyEnvNotSet,
    #[error("invalid API key in validating admission webhook url")]
    Unauthorized,
    #[error("failed to decode validating admission webhook request body, error: {0}")]
    Decode(String),
    #[error("failed to create temp file for validating admission review request; error: {0}")]
    TempFile(#[from] std::io::Error),
    #[error("failed to evaluate policies; error: {0}")]
    Scan(String),
}
