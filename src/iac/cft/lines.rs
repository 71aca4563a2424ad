//! Best-effort line numbers of resource logical names.
//!
//! Both scans report the 1-based line of the logical-name key inside the
//! top-level `Resources` section.

use std::collections::HashMap;

fn unquote(key: &str) -> &str {
    let key = key.trim();
    key.strip_prefix('"')
        .and_then(|k| k.strip_suffix('"'))
        .or_else(|| key.strip_prefix('\'').and_then(|k| k.strip_suffix('\'')))
        .unwrap_or(key)
}

/// Lines of the keys directly under `Resources:` in a YAML template.
pub fn yaml_resource_lines(content: &str) -> HashMap<String, usize> {
    let mut lines = HashMap::new();
    let mut in_resources = false;
    let mut child_indent: Option<usize> = None;

    for (idx, line) in content.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let indent = line.len() - line.trim_start().len();

        if indent == 0 {
            in_resources = trimmed.starts_with("Resources:")
                || trimmed.starts_with("\"Resources\":")
                || trimmed.starts_with("'Resources':");
            child_indent = None;
            continue;
        }
        if !in_resources {
            continue;
        }

        let level = *child_indent.get_or_insert(indent);
        if indent != level {
            continue;
        }
        if let Some((key, _)) = trimmed.split_once(':') {
            lines.entry(unquote(key).to_string()).or_insert(idx + 1);
        }
    }

    lines
}

/// Lines of the keys directly inside the `"Resources"` object of a JSON template.
pub fn json_resource_lines(content: &str) -> HashMap<String, usize> {
    let mut lines = HashMap::new();
    let bytes = content.as_bytes();
    let mut line = 1usize;
    let mut depth = 0usize;
    let mut i = 0usize;
    let mut resources_depth: Option<usize> = None;
    let mut pending_key: Option<(String, usize)> = None;

    while i < bytes.len() {
        match bytes[i] {
            b'\n' => line += 1,
            b'{' | b'[' => {
                if bytes[i] == b'{' {
                    if let Some((key, _)) = &pending_key {
                        if key == "Resources" && depth == 1 {
                            resources_depth = Some(depth + 1);
                        }
                    }
                }
                pending_key = None;
                depth += 1;
            }
            b'}' | b']' => {
                if resources_depth == Some(depth) {
                    resources_depth = None;
                }
                depth = depth.saturating_sub(1);
            }
            b'"' => {
                let start = i + 1;
                let mut end = start;
                while end < bytes.len() && bytes[end] != b'"' {
                    if bytes[end] == b'\\' {
                        end += 1;
                    } else if bytes[end] == b'\n' {
                        line += 1;
                    }
                    end += 1;
                }
                let text = content.get(start..end.min(bytes.len())).unwrap_or_default();
                pending_key = Some((text.to_string(), line));
                i = end;
            }
            b':' => {
                if let Some((key, key_line)) = pending_key.take() {
                    if resources_depth == Some(depth) {
                        lines.entry(key.clone()).or_insert(key_line);
                    }
                    pending_key = Some((key, key_line));
                }
                i += 1;
                continue;
            }
            b',' => pending_key = None,
            _ => {}
        }
        i += 1;
    }

    lines
}
