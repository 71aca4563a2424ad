//! HTTP routes of the scan server
//!
//! - `/health` - Health check endpoint
//! - `/v1/{iac}/{iac_version}/{cloud}/local/file/scan` - Scan an uploaded file
//! - `/v1/k8s/webhooks/{api_key}/scan/validate` - Validating admission webhook

use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::{debug, error, warn};
use serde_json::{Value, json};

use super::ServerState;
use crate::admission::{self, AdmissionReview};
use crate::error::{AdmissionError, ScanError};
use crate::notifications;
use crate::policy::default_engines;
use crate::runtime::{Executor, ExecuteError, OutputMode, ScanOptions};

/// An error answered as `{"message": ...}`.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

impl From<AdmissionError> for ApiError {
    fn from(e: AdmissionError) -> Self {
        let status = match e {
            AdmissionError::ApiKeyMissing | AdmissionError::Decode(_) => StatusCode::BAD_REQUEST,
            AdmissionError::Unauthorized => StatusCode::UNAUTHORIZED,
            AdmissionError::ApiKeyEnvNotSet | AdmissionError::TempFile(_) | AdmissionError::Scan(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        Self::new(status, e.to_string())
    }
}

/// Health check endpoint.
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "sync-scan"
    }))
}

/// Form fields of a file scan request.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ScanForm {
    pub file_name: String,
    pub content: Vec<u8>,
    pub scan_rules: Vec<String>,
    pub skip_rules: Vec<String>,
    pub categories: Vec<String>,
    pub severity: String,
    pub show_passed: bool,
    pub config_only: bool,
    pub config_with_error: bool,
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_flag(name: &str, value: &str) -> Result<bool, ApiError> {
    value
        .trim()
        .parse::<bool>()
        .map_err(|_| ApiError::bad_request(format!("invalid value '{}' for form field '{}'", value, name)))
}

impl ScanForm {
    /// Read the multipart form.
    pub async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = ScanForm::default();
        let mut has_file = false;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("failed to read multipart form: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            if name == "file" {
                form.file_name = field.file_name().unwrap_or("upload").to_string();
                form.content = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to retrieve uploaded file: {}", e)))?
                    .to_vec();
                has_file = true;
                continue;
            }

            let value = field
                .text()
                .await
                .map_err(|e| ApiError::bad_request(format!("failed to read form field '{}': {}", name, e)))?;
            match name.as_str() {
                "scan_rules" => form.scan_rules = split_list(&value),
                "skip_rules" => form.skip_rules = split_list(&value),
                "categories" => form.categories = split_list(&value),
                "severity" => form.severity = value.trim().to_string(),
                "show_passed" => form.show_passed = parse_flag(&name, &value)?,
                "config_only" => form.config_only = parse_flag(&name, &value)?,
                "config_with_error" => form.config_with_error = parse_flag(&name, &value)?,
                other => debug!("ignoring unknown form field '{}'", other),
            }
        }

        if !has_file {
            return Err(ApiError::bad_request("failed to retrieve uploaded file"));
        }
        if form.config_only && form.config_with_error {
            return Err(ApiError::bad_request("use either config_only or config_with_error, not both"));
        }
        Ok(form)
    }

    fn output_mode(&self) -> OutputMode {
        if self.config_only {
            OutputMode::ConfigOnly
        } else if self.config_with_error {
            OutputMode::ConfigWithErrors
        } else {
            OutputMode::Violations
        }
    }

    /// Upload name reduced to its last component so it stays inside the scan dir.
    fn safe_file_name(&self) -> PathBuf {
        FsPath::new(&self.file_name)
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("upload"))
    }
}

fn status_for(error: &ScanError) -> StatusCode {
    match error {
        ScanError::Validation(_) | ScanError::Iac(_) | ScanError::Load(_) => StatusCode::BAD_REQUEST,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Scan one uploaded file and return the output document.
pub fn scan_upload(
    state: &ServerState,
    iac: &str,
    iac_version: &str,
    cloud: &str,
    form: &ScanForm,
) -> Result<Value, ApiError> {
    let dir = tempfile::tempdir().map_err(|e| ApiError::internal(format!("failed to create scan directory: {}", e)))?;
    let path = dir.path().join(form.safe_file_name());
    std::fs::write(&path, &form.content)
        .map_err(|e| ApiError::internal(format!("failed to save uploaded file: {}", e)))?;

    let notifiers = notifications::from_config(&state.config).map_err(|e| ApiError::internal(e.to_string()))?;
    let options = ScanOptions::new(iac)
        .with_iac_version(iac_version)
        .with_cloud_types(vec![cloud.to_string()])
        .with_file(path)
        .with_scan_rules(form.scan_rules.clone())
        .with_skip_rules(form.skip_rules.clone())
        .with_categories(form.categories.clone())
        .with_severity(form.severity.clone())
        .with_output_mode(form.output_mode())
        .with_show_passed(form.show_passed);

    let output = match Executor::new(options, Arc::clone(&state.config), default_engines(), notifiers).execute() {
        Ok(output) => output,
        Err(ExecuteError {
            error: e,
            output: Some(output),
        }) => {
            warn!("scan completed with error: {}", e);
            *output
        }
        Err(ExecuteError { error: e, output: None }) => {
            error!("scan failed: {}", e);
            return Err(ApiError::new(status_for(&e), e.to_string()));
        }
    };
    output.to_value().map_err(|e| ApiError::internal(e.to_string()))
}

/// Scan an uploaded IaC file.
pub async fn scan_file(
    State(state): State<Arc<ServerState>>,
    Path((iac, iac_version, cloud)): Path<(String, String, String)>,
    multipart: Multipart,
) -> Result<Json<Value>, ApiError> {
    let form = ScanForm::read(multipart).await?;
    debug!("scanning uploaded file '{}' as {} {}", form.file_name, iac, iac_version);

    // the executor and its notifiers block
    let value = tokio::task::spawn_blocking(move || scan_upload(&state, &iac, &iac_version, &cloud, &form))
        .await
        .map_err(|e| ApiError::internal(format!("scan task failed: {}", e)))??;
    Ok(Json(value))
}

/// Validating admission webhook.
pub async fn validate_webhook(
    State(state): State<Arc<ServerState>>,
    Path(api_key): Path<String>,
    body: Bytes,
) -> Result<Json<AdmissionReview>, ApiError> {
    admission::authorize(&api_key, state.webhook_api_key.as_deref())?;

    let review = tokio::task::spawn_blocking(move || {
        let notifiers = notifications::from_config(&state.config).map_err(|e| AdmissionError::Scan(e.to_string()))?;
        admission::review(&body, Arc::clone(&state.config), default_engines(), notifiers)
    })
    .await
    .map_err(|e| ApiError::internal(format!("admission task failed: {}", e)))??;
    Ok(Json(review))
}
