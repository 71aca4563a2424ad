//! Rule severities and the comparisons used to filter and clamp findings.
//!
//! Severities travel as strings through resources and violations (they come
//! from comments and annotations), so the helpers here accept `&str` and are
//! case and whitespace insensitive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Sentinel accepted only as a maximum severity: never report.
pub const NONE_SEVERITY: &str = "NONE";

/// Severity of a policy rule.
///
/// Ordered from least to most severe: `Low < Medium < High`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
}

impl Severity {
    /// Parse a severity from a string (case-insensitive, surrounding spaces ignored).
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Some(Self::Low),
            "MEDIUM" => Some(Self::Medium),
            "HIGH" => Some(Self::High),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
        }
    }

    pub fn all() -> [Severity; 3] {
        [Self::Low, Self::Medium, Self::High]
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// True for `LOW`, `MEDIUM` and `HIGH` in any case.
pub fn validate_severity_input(severity: &str) -> bool {
    Severity::parse(severity).is_some()
}

/// True when `severity` is the `None` sentinel.
pub fn is_none_severity(severity: &str) -> bool {
    severity.trim().eq_ignore_ascii_case(NONE_SEVERITY)
}

/// True when a rule of `rule_severity` is at or above `desired`.
///
/// A `LOW` floor accepts everything; an unrecognised floor only lets `HIGH` through.
pub fn check_severity(rule_severity: &str, desired: &str) -> bool {
    let desired = Severity::parse(desired).unwrap_or(Severity::High);
    if desired == Severity::Low {
        return true;
    }
    Severity::parse(rule_severity).is_some_and(|rule| rule >= desired)
}

/// True when a rule of `rule_severity` must be raised to `min_severity`.
pub fn min_severity_applicable(rule_severity: &str, min_severity: &str) -> bool {
    let Some(min) = Severity::parse(min_severity) else {
        return false;
    };
    Severity::parse(rule_severity).is_some_and(|rule| rule < min)
}

/// True when a rule of `rule_severity` must be lowered to `max_severity`.
pub fn max_severity_applicable(rule_severity: &str, max_severity: &str) -> bool {
    let Some(max) = Severity::parse(max_severity) else {
        return false;
    };
    Severity::parse(rule_severity).is_some_and(|rule| rule > max)
}
