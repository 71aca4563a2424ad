//! Type coercion of template values against the static field schemas.

use log::debug;
use serde_json::{Map, Value};

use super::schema::{self, FieldKind, Fields};

/// Coerce `value` to `kind`.
///
/// Returns `None` when the value already fits (or cannot be converted), so
/// applying it twice is a no-op.
pub fn fix_with_type(value: &Value, kind: &FieldKind) -> Option<Value> {
    if let FieldKind::Optional(inner) = kind {
        return fix_with_type(value, inner);
    }

    match value {
        Value::Number(n) if n.is_i64() || n.is_u64() => match kind {
            FieldKind::Float => n.as_f64().and_then(serde_json::Number::from_f64).map(Value::Number),
            FieldKind::String => Some(Value::String(n.to_string())),
            _ => None,
        },
        Value::Number(n) => {
            let f = n.as_f64()?;
            match kind {
                FieldKind::Int => Some(Value::from(f.trunc() as i64)),
                FieldKind::String => Some(Value::String(f.to_string())),
                _ => None,
            }
        }
        Value::String(s) => match kind {
            FieldKind::Int => s.parse::<i64>().ok().map(Value::from),
            FieldKind::Float => s
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number),
            FieldKind::Bool => parse_bool(s).map(Value::Bool),
            _ => None,
        },
        Value::Bool(b) => match kind {
            FieldKind::String => Some(Value::String(b.to_string())),
            _ => None,
        },
        Value::Array(items) => match kind {
            FieldKind::List(inner) => {
                let mut changed = false;
                let fixed = items
                    .iter()
                    .map(|item| match fix_with_type(item, inner) {
                        Some(v) => {
                            changed = true;
                            v
                        }
                        None => item.clone(),
                    })
                    .collect();
                changed.then_some(Value::Array(fixed))
            }
            _ => None,
        },
        Value::Object(map) => match kind {
            FieldKind::Object(fields) => fix_object(map, |key| schema::field(fields, key)),
            FieldKind::Map(inner) => fix_object(map, |_| Some(*inner)),
            _ => None,
        },
        Value::Null => None,
    }
}

fn fix_object<'a, F>(map: &Map<String, Value>, kind_of: F) -> Option<Value>
where
    F: Fn(&str) -> Option<&'a FieldKind>,
{
    let mut out = map.clone();
    let mut changed = false;
    for (key, value) in map {
        let Some(kind) = kind_of(key) else {
            debug!("attribute '{}' not present in schema", key);
            continue;
        };
        if let Some(fixed) = fix_with_type(value, kind) {
            out.insert(key.clone(), fixed);
            changed = true;
        }
    }
    changed.then_some(Value::Object(out))
}

/// Boolean spellings accepted in templates.
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}

/// Coerce every known attribute of a map in place.
fn sanitize_fields(map: &mut Map<String, Value>, fields: Fields, owner: &str) {
    for (key, value) in map.iter_mut() {
        let Some(kind) = schema::field(fields, key) else {
            debug!("attribute '{}' not present in '{}' schema", key, owner);
            continue;
        };
        if let Some(fixed) = fix_with_type(value, kind) {
            *value = fixed;
        }
    }
}

/// Sanitize parameters and resources of a template in place.
///
/// Resources of unsupported types are removed. Returns the number removed.
pub fn sanitize_template(template: &mut Map<String, Value>) -> usize {
    if let Some(Value::Object(parameters)) = template.get_mut("Parameters") {
        for (name, parameter) in parameters.iter_mut() {
            debug!("inspecting parameter '{}'", name);
            match parameter {
                Value::Object(attributes) => sanitize_fields(attributes, schema::PARAMETER, "Parameter"),
                _ => debug!("invalid data for parameter '{}', should be a map", name),
            }
        }
    }

    let Some(Value::Object(resources)) = template.get_mut("Resources") else {
        return 0;
    };

    let before = resources.len();
    resources.retain(|name, resource| {
        debug!("inspecting resource '{}'", name);
        sanitize_resource(name, resource)
    });
    before - resources.len()
}

/// Returns false when the resource should be dropped.
fn sanitize_resource(name: &str, resource: &mut Value) -> bool {
    let Value::Object(resource) = resource else {
        debug!("invalid data for resource '{}', should be a map", name);
        return true;
    };
    let Some(cft_type) = resource.get("Type").and_then(Value::as_str).map(str::to_string) else {
        debug!("resource '{}' must have a string attribute 'Type'", name);
        return true;
    };
    let Some((_, fields)) = schema::resource_type(&cft_type) else {
        debug!("resource type '{}' of '{}' is not supported, skipping", cft_type, name);
        return false;
    };

    match resource.get_mut("Properties") {
        Some(Value::Object(properties)) => sanitize_fields(properties, fields, &cft_type),
        Some(_) => debug!("'Properties' of '{}' should be a map", name),
        None => debug!("resource '{}' doesn't have 'Properties'", name),
    }

    if let Some(Value::Object(policy)) = resource.get_mut("CreationPolicy") {
        sanitize_fields(policy, schema::CREATION_POLICY, "CreationPolicy");
    }
    if let Some(Value::Object(policy)) = resource.get_mut("UpdatePolicy") {
        sanitize_fields(policy, schema::UPDATE_POLICY, "UpdatePolicy");
    }
    if let Some(depends_on) = resource.get_mut("DependsOn") {
        if !depends_on.is_array() {
            let single = depends_on.take();
            *depends_on = Value::Array(vec![single]);
        }
    }
    true
}
