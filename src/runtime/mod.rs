//! # Runtime Module
//!
//! Orchestrates a scan: validate inputs, resolve the loader, load, apply the
//! cloud pass, evaluate policies, filter, notify and shape the output.

pub mod executor;
pub mod filter;
pub mod output;
pub mod validate;

use std::fmt;
use std::path::PathBuf;

use crate::error::{IacError, PolicyError, ScanError, ValidationError};
use crate::iac::LoadOptions;

pub use executor::Executor;
pub use output::{OutputFormat, OutputMode, ScanOutput, exit_code};

/// User inputs of one scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOptions {
    pub iac_type: String,
    /// Empty selects the iac type's default version.
    pub iac_version: String,
    /// Empty selects the cloud matching the iac type.
    pub cloud_types: Vec<String>,
    pub iac_file: Option<PathBuf>,
    pub iac_dirs: Vec<PathBuf>,
    pub scan_rules: Vec<String>,
    pub skip_rules: Vec<String>,
    pub categories: Vec<String>,
    pub severity: String,
    pub values_files: Vec<PathBuf>,
    pub non_recursive: bool,
    pub output_mode: OutputMode,
    pub show_passed: bool,
}

impl ScanOptions {
    pub fn new(iac_type: impl Into<String>) -> Self {
        Self {
            iac_type: iac_type.into(),
            ..Default::default()
        }
    }

    pub fn with_iac_version(mut self, version: impl Into<String>) -> Self {
        self.iac_version = version.into();
        self
    }

    pub fn with_cloud_types(mut self, clouds: Vec<String>) -> Self {
        self.cloud_types = clouds;
        self
    }

    pub fn with_file(mut self, file: PathBuf) -> Self {
        self.iac_file = Some(file);
        self
    }

    pub fn with_dirs(mut self, dirs: Vec<PathBuf>) -> Self {
        self.iac_dirs = dirs;
        self
    }

    pub fn with_scan_rules(mut self, rules: Vec<String>) -> Self {
        self.scan_rules = rules;
        self
    }

    pub fn with_skip_rules(mut self, rules: Vec<String>) -> Self {
        self.skip_rules = rules;
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_severity(mut self, severity: impl Into<String>) -> Self {
        self.severity = severity.into();
        self
    }

    pub fn with_values_files(mut self, files: Vec<PathBuf>) -> Self {
        self.values_files = files;
        self
    }

    pub fn with_non_recursive(mut self, non_recursive: bool) -> Self {
        self.non_recursive = non_recursive;
        self
    }

    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.output_mode = mode;
        self
    }

    pub fn with_show_passed(mut self, show_passed: bool) -> Self {
        self.show_passed = show_passed;
        self
    }

    /// Loader options derived from these inputs.
    pub fn load_options(&self) -> LoadOptions {
        let mut options = LoadOptions::new();
        if !self.values_files.is_empty() {
            options = options.with_values_files(&self.values_files);
        }
        if self.non_recursive {
            options = options.with_non_recursive(true);
        }
        options
    }

    /// The scanned path as shown in the summary.
    pub fn scanned_path(&self) -> String {
        match &self.iac_file {
            Some(file) => file.display().to_string(),
            None => self
                .iac_dirs
                .iter()
                .map(|d| d.display().to_string())
                .collect::<Vec<_>>()
                .join(","),
        }
    }
}

/// A failed scan, carrying any output computed before the failure.
///
/// Notification failures happen after the output is complete, so it is
/// always present for [`ScanError::Notification`].
#[derive(Debug)]
pub struct ExecuteError {
    pub error: ScanError,
    pub output: Option<Box<ScanOutput>>,
}

impl ExecuteError {
    pub fn with_output(error: impl Into<ScanError>, output: ScanOutput) -> Self {
        Self {
            error: error.into(),
            output: Some(Box::new(output)),
        }
    }
}

impl From<ScanError> for ExecuteError {
    fn from(error: ScanError) -> Self {
        Self { error, output: None }
    }
}

impl From<ValidationError> for ExecuteError {
    fn from(error: ValidationError) -> Self {
        ScanError::from(error).into()
    }
}

impl From<IacError> for ExecuteError {
    fn from(error: IacError) -> Self {
        ScanError::from(error).into()
    }
}

impl From<PolicyError> for ExecuteError {
    fn from(error: PolicyError) -> Self {
        ScanError::from(error).into()
    }
}

impl fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)
    }
}

impl std::error::Error for ExecuteError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
