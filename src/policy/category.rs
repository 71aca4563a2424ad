//! Policy categories.

/// Every category a rule may belong to.
pub const ACCEPTED_CATEGORIES: &[&str] = &[
    "LOGGING AND MONITORING",
    "COMPLIANCE VALIDATION",
    "RESILIENCE",
    "SECURITY BEST PRACTICES",
    "INFRASTRUCTURE SECURITY",
    "IDENTITY AND ACCESS MANAGEMENT",
    "CONFIGURATION AND VULNERABILITY ANALYSIS",
    "DATA PROTECTION",
];

fn normalize(category: &str) -> String {
    category.trim().to_uppercase()
}

/// Validate user supplied categories, returning the invalid ones on failure.
pub fn validate_category_input<S: AsRef<str>>(categories: &[S]) -> Result<(), Vec<String>> {
    let invalid: Vec<String> = categories
        .iter()
        .map(|c| normalize(c.as_ref()))
        .filter(|c| !ACCEPTED_CATEGORIES.contains(&c.as_str()))
        .collect();
    if invalid.is_empty() { Ok(()) } else { Err(invalid) }
}

/// True when `rule_category` is one of `desired` (case-insensitive).
pub fn check_category<S: AsRef<str>>(rule_category: &str, desired: &[S]) -> bool {
    let rule_category = normalize(rule_category);
    desired.iter().any(|c| normalize(c.as_ref()) == rule_category)
}
