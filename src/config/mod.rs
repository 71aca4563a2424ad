pub mod types;

use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ConfigError;

pub use types::{
    CategoryConfig, K8sAdmissionControl, NotifierConfig, NotifierSettings, PolicyConfig, RulesConfig, ScanConfig,
    SeverityConfig,
};

const CONFIG_FILE_NAME: &str = ".syncable-scan.toml";

/// Get the global config file path (~/.syncable-scan.toml)
pub fn global_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|h| h.join(CONFIG_FILE_NAME))
}

/// Parse config text, picking the format from the file extension.
pub fn parse_config(content: &str, path: &Path) -> Result<ScanConfig, ConfigError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();
    match extension.as_str() {
        "toml" => toml::from_str(content).map_err(|e| ConfigError::ParsingFailed(e.to_string())),
        "yaml" | "yml" => serde_yaml::from_str::<Option<ScanConfig>>(content)
            .map(Option::unwrap_or_default)
            .map_err(|e| ConfigError::ParsingFailed(e.to_string())),
        _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
    }
}

/// Load configuration from file or use defaults
///
/// An explicit path must exist and parse. Without one the global config is
/// used when present; a broken global config is reported and ignored.
pub fn load_config(path: Option<&Path>) -> Result<ScanConfig, ConfigError> {
    if let Some(path) = path {
        if !path.is_file() {
            return Err(ConfigError::NotFound(path.display().to_string()));
        }
        let content = fs::read_to_string(path)?;
        let config = parse_config(&content, path)?;
        debug!("loaded config file {}", path.display());
        return Ok(config);
    }

    if let Some(global) = global_config_path() {
        if global.exists() {
            match fs::read_to_string(&global).map_err(ConfigError::from).and_then(|c| parse_config(&c, &global)) {
                Ok(config) => return Ok(config),
                Err(e) => warn!("ignoring global config {}: {}", global.display(), e),
            }
        }
    }

    Ok(ScanConfig::default())
}
