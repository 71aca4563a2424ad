//! Recoverable directory scan errors and their aggregate.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::output::AllResourceConfigs;

/// One recoverable failure while scanning a directory tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirScanErr {
    pub iac_type: String,
    pub directory: String,
    pub err_message: String,
}

impl DirScanErr {
    pub fn new(iac_type: &str, directory: impl Into<String>, err_message: impl ToString) -> Self {
        Self {
            iac_type: iac_type.to_string(),
            directory: directory.into(),
            err_message: err_message.to_string(),
        }
    }
}

impl fmt::Display for DirScanErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "directory: {}, iac type: {}, error: {}",
            self.directory, self.iac_type, self.err_message
        )
    }
}

/// Aggregate of every [`DirScanErr`] collected during one scan.
///
/// Returned next to the resources that did load, never instead of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LoadErrors(Vec<DirScanErr>);

impl LoadErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: DirScanErr) {
        self.0.push(err);
    }

    pub fn extend(&mut self, other: LoadErrors) {
        self.0.extend(other.0);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirScanErr> {
        self.0.iter()
    }

    /// `Ok(())` when nothing was recorded.
    pub fn into_result(self) -> Result<(), LoadErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl From<DirScanErr> for LoadErrors {
    fn from(err: DirScanErr) -> Self {
        Self(vec![err])
    }
}

impl fmt::Display for LoadErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} error(s) occurred:", self.0.len())?;
        for err in &self.0 {
            write!(f, "\n\t* {}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for LoadErrors {}

/// Result of loading a directory: partial resources plus the errors met on the way.
#[derive(Debug, Clone, Default)]
pub struct LoadOutcome {
    pub resources: AllResourceConfigs,
    pub errors: LoadErrors,
}

impl LoadOutcome {
    /// An outcome with no resources and a single error.
    pub fn failed(err: DirScanErr) -> Self {
        Self {
            resources: AllResourceConfigs::new(),
            errors: err.into(),
        }
    }

    pub fn merge(&mut self, other: LoadOutcome) {
        self.resources.merge(other.resources);
        self.errors.extend(other.errors);
    }
}
