//! Input validation, run before any file is touched.

use log::error;
use std::path::Path;

use super::ScanOptions;
use crate::cloud::CloudProvider;
use crate::error::ValidationError;
use crate::iac;
use crate::policy::{validate_category_input, validate_severity_input};

fn validate_file(path: &Path) -> Result<(), ValidationError> {
    if !path.exists() {
        error!("file {} does not exist", path.display());
        return Err(ValidationError::FileNotExists);
    }
    if !path.is_file() {
        error!("input path {} is not a valid file", path.display());
        return Err(ValidationError::NotValidFile);
    }
    Ok(())
}

fn validate_dir(path: &Path) -> Result<(), ValidationError> {
    if !path.exists() {
        error!("directory {} does not exist", path.display());
        return Err(ValidationError::DirNotExists);
    }
    if !path.is_dir() {
        error!("input path {} is not a valid directory", path.display());
        return Err(ValidationError::NotValidDir);
    }
    Ok(())
}

/// Check every user input of a scan.
///
/// `severity` and `categories` are the effective values after merging the
/// config file.
pub fn validate(options: &ScanOptions, severity: &str, categories: &[String]) -> Result<(), ValidationError> {
    match (&options.iac_file, options.iac_dirs.is_empty()) {
        (None, true) => return Err(ValidationError::EmptyIacPath),
        (Some(_), false) => return Err(ValidationError::BothPaths),
        (Some(file), true) => validate_file(file)?,
        (None, false) => {
            for dir in &options.iac_dirs {
                validate_dir(dir)?;
            }
        }
    }

    if !iac::is_supported(&options.iac_type, &options.iac_version) {
        error!(
            "iac type '{}' with version '{}' is not supported, supported types are {:?}",
            options.iac_type,
            options.iac_version,
            iac::supported_iac_types()
        );
        return Err(ValidationError::IacNotSupported);
    }

    for cloud in &options.cloud_types {
        if CloudProvider::parse(cloud).is_none() {
            error!("cloud type '{}' not supported", cloud);
            return Err(ValidationError::CloudNotSupported);
        }
    }

    if !severity.is_empty() && !validate_severity_input(severity) {
        error!("severity level '{}' not supported", severity);
        return Err(ValidationError::SeverityNotSupported);
    }

    if let Err(invalid) = validate_category_input(categories) {
        error!("category not supported: {:?}", invalid);
        return Err(ValidationError::CategoryNotSupported);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn options(dir: &TempDir) -> ScanOptions {
        ScanOptions::new("k8s").with_dirs(vec![dir.path().to_path_buf()])
    }

    #[test]
    fn test_paths() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("pod.yaml");
        fs::write(&file, "kind: Pod").unwrap();

        assert_eq!(
            validate(&ScanOptions::new("k8s"), "", &[]),
            Err(ValidationError::EmptyIacPath)
        );
        assert_eq!(
            validate(&options(&dir).with_file(file.clone()), "", &[]),
            Err(ValidationError::BothPaths)
        );
        assert_eq!(
            validate(&ScanOptions::new("k8s").with_file(dir.path().join("nope.yaml")), "", &[]),
            Err(ValidationError::FileNotExists)
        );
        assert_eq!(
            validate(&ScanOptions::new("k8s").with_file(dir.path().to_path_buf()), "", &[]),
            Err(ValidationError::NotValidFile)
        );
        assert_eq!(
            validate(&ScanOptions::new("k8s").with_dirs(vec![PathBuf::from("/no/such/dir")]), "", &[]),
            Err(ValidationError::DirNotExists)
        );
        assert_eq!(
            validate(&ScanOptions::new("k8s").with_dirs(vec![file.clone()]), "", &[]),
            Err(ValidationError::NotValidDir)
        );
        assert!(validate(&ScanOptions::new("k8s").with_file(file), "", &[]).is_ok());
    }

    #[test]
    fn test_types_and_filters() {
        let dir = TempDir::new().unwrap();
        assert_eq!(
            validate(&ScanOptions::new("arm").with_dirs(vec![dir.path().to_path_buf()]), "", &[]),
            Err(ValidationError::IacNotSupported)
        );
        assert_eq!(
            validate(&options(&dir).with_iac_version("v9"), "", &[]),
            Err(ValidationError::IacNotSupported)
        );
        assert_eq!(
            validate(&options(&dir).with_cloud_types(vec!["oracle".to_string()]), "", &[]),
            Err(ValidationError::CloudNotSupported)
        );
        assert_eq!(
            validate(&options(&dir), "critical", &[]),
            Err(ValidationError::SeverityNotSupported)
        );
        assert_eq!(
            validate(&options(&dir), "high", &["cost".to_string()]),
            Err(ValidationError::CategoryNotSupported)
        );
        assert!(validate(&options(&dir), "high", &["resilience".to_string()]).is_ok());
    }
}
