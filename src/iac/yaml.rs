//! Multi-document YAML loading with start-line tracking.

use serde_yaml::Value;

/// One document of a YAML stream.
#[derive(Debug, Clone)]
pub struct YamlDocument {
    /// 1-based line of the first content line of the document.
    pub start_line: usize,
    /// Raw document text, including comments.
    pub raw: String,
    pub value: Value,
}

/// Error raised when a document is not valid YAML.
#[derive(Debug, Clone)]
pub struct YamlParseError {
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for YamlParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "yaml syntax error at line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for YamlParseError {}

fn is_separator(line: &str) -> bool {
    let trimmed = line.trim_end();
    trimmed == "---" || trimmed.starts_with("--- ")
}

fn is_content(line: &str) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with('#')
}

fn push_document(
    lines: &[&str],
    first_line: usize,
    documents: &mut Vec<YamlDocument>,
) -> Result<(), YamlParseError> {
    let Some(offset) = lines.iter().position(|l| is_content(l)) else {
        return Ok(());
    };
    let raw = lines.join("\n");
    let start_line = first_line + offset;
    let value: Value = serde_yaml::from_str(&raw).map_err(|e| YamlParseError {
        line: e
            .location()
            .map(|l| first_line + l.line().saturating_sub(1))
            .unwrap_or(start_line),
        message: e.to_string(),
    })?;
    if !value.is_null() {
        documents.push(YamlDocument {
            start_line,
            raw,
            value,
        });
    }
    Ok(())
}

/// Split a YAML stream into documents and parse each one.
///
/// Empty and comment-only documents are dropped.
pub fn parse_documents(content: &str) -> Result<Vec<YamlDocument>, YamlParseError> {
    let mut documents = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut first_line = 1usize;

    for (idx, line) in content.lines().enumerate() {
        if is_separator(line) {
            push_document(&current, first_line, &mut documents)?;
            current.clear();
            first_line = idx + 2;
            continue;
        }
        current.push(line);
    }
    push_document(&current, first_line, &mut documents)?;

    Ok(documents)
}

/// Convert a YAML value into JSON, dropping tags and stringifying non-string keys.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Number(n) => number_to_json(n),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Sequence(seq) => serde_json::Value::Array(seq.iter().map(to_json).collect()),
        Value::Mapping(map) => {
            let mut out = serde_json::Map::new();
            for (k, v) in map {
                out.insert(key_to_string(k), to_json(v));
            }
            serde_json::Value::Object(out)
        }
        Value::Tagged(tagged) => to_json(&tagged.value),
    }
}

/// Convert a YAML number, preferring integers.
pub fn number_to_json(n: &serde_yaml::Number) -> serde_json::Value {
    if let Some(i) = n.as_i64() {
        serde_json::Value::from(i)
    } else if let Some(u) = n.as_u64() {
        serde_json::Value::from(u)
    } else {
        n.as_f64()
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null)
    }
}

/// Render a mapping key as a string.
pub fn key_to_string(key: &Value) -> String {
    match key {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Null => "null".to_string(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}
