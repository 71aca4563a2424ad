//! Chart values: the chart's values.yaml or user supplied overlays.

use log::debug;
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::IacError;
use crate::iac::yaml;

pub const VALUES_FILE: &str = "values.yaml";

/// Merge `overlay` into `base`; maps merge key by key, anything else is replaced.
pub fn merge(base: &mut Value, overlay: Value) {
    match (base, overlay) {
        (Value::Object(base), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

fn parse_values_file(path: &Path) -> Result<Value, IacError> {
    let content = std::fs::read_to_string(path)?;
    let raw: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|e| IacError::parse(path.display().to_string(), e))?;
    Ok(match yaml::to_json(&raw) {
        Value::Null => Value::Object(Default::default()),
        value => value,
    })
}

/// Values for a chart in `chart_dir`.
///
/// Overlays are merged in order, later files winning; relative overlay paths
/// resolve against the chart directory. Without overlays the chart's own
/// values.yaml is used, and a chart without one renders with empty values.
pub fn load_values(chart_dir: &Path, overlays: &[PathBuf]) -> Result<Value, IacError> {
    let mut values = Value::Object(Default::default());

    if overlays.is_empty() {
        let path = chart_dir.join(VALUES_FILE);
        if path.is_file() {
            values = parse_values_file(&path)?;
        } else {
            debug!("no {} in {}", VALUES_FILE, chart_dir.display());
        }
        return Ok(values);
    }

    for overlay in overlays {
        let path = if overlay.is_absolute() {
            overlay.clone()
        } else {
            chart_dir.join(overlay)
        };
        debug!("merging values file {}", path.display());
        merge(&mut values, parse_values_file(&path)?);
    }
    Ok(values)
}
