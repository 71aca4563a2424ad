//! Inline comment directives.
//!
//! Authors can tune findings per resource with comments:
//! - `#ts:skip=AWS.S3Bucket.DS.High.1041 reason` - Skip a rule for this resource
//! - `#ts:skip=AC_AWS_1111` - Skip a rule using its coded id
//! - `#ts:minseverity=High` - Raise reported severity to at least this level
//! - `#ts:maxseverity=None` - Cap reported severity (`None` suppresses reporting)

use regex::Regex;
use std::sync::LazyLock;

use super::output::{ResourceConfig, SkipRule};

const SKIP_PREFIX: &str = "#ts:skip=";

static SKIP_RULE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"#ts:skip=[ \t]*(?:AC_[A-Za-z0-9]+_\d{4}|(?:[A-Za-z0-9]+[.-]){3,5}\d+)(?:[ \t]+.*)?")
        .unwrap()
});

static MAX_SEVERITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#ts:maxseverity=((?i:none|high|low|medium))").unwrap());

static MIN_SEVERITY_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"#ts:minseverity=((?i:high|low|medium))").unwrap());

/// Directives collected from a block of text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directives {
    pub skip_rules: Vec<SkipRule>,
    pub min_severity: Option<String>,
    pub max_severity: Option<String>,
}

impl Directives {
    pub fn is_empty(&self) -> bool {
        self.skip_rules.is_empty() && self.min_severity.is_none() && self.max_severity.is_none()
    }

    /// Copy the directives onto a resource.
    pub fn apply(&self, resource: &mut ResourceConfig) {
        resource.skip_rules.extend(self.skip_rules.iter().cloned());
        if let Some(min) = &self.min_severity {
            resource.min_severity = min.clone();
        }
        if let Some(max) = &self.max_severity {
            resource.max_severity = max.clone();
        }
    }
}

/// Parse every directive found in `body`.
pub fn parse_directives(body: &str) -> Directives {
    let (min_severity, max_severity) = get_min_max_severity(body);
    Directives {
        skip_rules: get_skip_rules(body),
        min_severity,
        max_severity,
    }
}

/// Extract skip rules, one per `#ts:skip=` comment.
pub fn get_skip_rules(body: &str) -> Vec<SkipRule> {
    SKIP_RULE_PATTERN
        .find_iter(body)
        .filter_map(|m| skip_rule_from_comment(m.as_str().trim_start_matches(SKIP_PREFIX)))
        .collect()
}

fn skip_rule_from_comment(s: &str) -> Option<SkipRule> {
    let mut fields = s.split_whitespace();
    let rule = fields.next()?;
    let comment = fields.collect::<Vec<_>>().join(" ");
    Some(SkipRule::new(rule, comment))
}

/// Extract the first `minseverity` and `maxseverity` directives.
pub fn get_min_max_severity(body: &str) -> (Option<String>, Option<String>) {
    let first = |pattern: &Regex| {
        pattern
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };
    (first(&MIN_SEVERITY_PATTERN), first(&MAX_SEVERITY_PATTERN))
}
