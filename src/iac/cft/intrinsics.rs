//! Offline resolution of intrinsic functions.
//!
//! Nothing here talks to a cloud account: parameters resolve to their
//! defaults, pseudo parameters to fixed placeholders, and anything that
//! cannot be decided statically is left in place.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use log::{debug, warn};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use std::fmt;

const MAX_DEPTH: usize = 64;

const STACK_TYPE: &str = "AWS::CloudFormation::Stack";

/// Sections of a template that get resolved.
const RESOLVED_SECTIONS: &[&str] = &["Resources", "Outputs"];

/// Placeholder values of pseudo parameters.
const PSEUDO_PARAMETERS: &[(&str, &str)] = &[
    ("AWS::AccountId", "123456789012"),
    ("AWS::Partition", "aws"),
    ("AWS::Region", "us-east-1"),
    ("AWS::StackId", "arn:aws:cloudformation:us-east-1:123456789012:stack/stack-name/guid"),
    ("AWS::StackName", "stack-name"),
    ("AWS::URLSuffix", "amazonaws.com"),
];

const AVAILABILITY_ZONES: &[&str] = &["us-east-1a", "us-east-1b", "us-east-1c"];

/// How `Ref`s to resource logical names are treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefMode {
    /// A `Ref` to a resource becomes its logical name; any dangling or
    /// cyclic `Ref` fails the pass.
    Indirect,
    /// Only parameter and pseudo-parameter refs resolve; the rest stay intact.
    Conservative,
}

/// Failure of the indirect pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    Dangling(String),
    Cycle(String),
    TooDeep,
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolveError::Dangling(name) => write!(f, "unresolved reference to '{}'", name),
            ResolveError::Cycle(name) => write!(f, "reference cycle through parameter '{}'", name),
            ResolveError::TooDeep => write!(f, "intrinsic functions nested too deeply"),
        }
    }
}

impl std::error::Error for ResolveError {}

type Resolved = Result<Value, ResolveError>;

/// Resolve intrinsic functions of a whole template in place.
///
/// The indirect pass runs first; if it fails the conservative pass is used
/// instead.
///
/// Inline templates of nested stacks are left untouched; they are resolved
/// against their own sections when the stack is expanded.
pub fn resolve_template(template: &mut Map<String, Value>) {
    let nested = detach_nested_templates(template);
    if let Some(resolved) = resolve_sections_with_fallback(template) {
        for (section, value) in resolved {
            template.insert(section, value);
        }
    }
    attach_nested_templates(template, nested);
}

fn resolve_sections_with_fallback(template: &Map<String, Value>) -> Option<Vec<(String, Value)>> {
    let resolver = Resolver::new(template, RefMode::Indirect);
    match resolver.resolve_sections(template) {
        Ok(sections) => Some(sections),
        Err(e) => {
            warn!(
                "indirect Ref resolution failed ({}), falling back to parameter-only resolution",
                e
            );
            let fallback = Resolver::new(template, RefMode::Conservative);
            match fallback.resolve_sections(template) {
                Ok(sections) => Some(sections),
                Err(e) => {
                    warn!("intrinsic resolution skipped: {}", e);
                    None
                }
            }
        }
    }
}

/// Take the inline `TemplateData` maps out of the nested stacks of `template`.
fn detach_nested_templates(template: &mut Map<String, Value>) -> Vec<(String, Value)> {
    let Some(Value::Object(resources)) = template.get_mut("Resources") else {
        return Vec::new();
    };

    let mut detached = Vec::new();
    for (name, resource) in resources.iter_mut() {
        if resource.get("Type").and_then(Value::as_str) != Some(STACK_TYPE) {
            continue;
        }
        let Some(Value::Object(properties)) = resource.get_mut("Properties") else {
            continue;
        };
        let inline = properties
            .get("TemplateData")
            .is_some_and(|data| data.is_object() && !is_intrinsic(data));
        if inline {
            if let Some(data) = properties.remove("TemplateData") {
                detached.push((name.clone(), data));
            }
        }
    }
    detached
}

fn attach_nested_templates(template: &mut Map<String, Value>, nested: Vec<(String, Value)>) {
    let Some(Value::Object(resources)) = template.get_mut("Resources") else {
        return;
    };
    for (name, data) in nested {
        if let Some(Value::Object(properties)) = resources.get_mut(&name).and_then(|r| r.get_mut("Properties")) {
            properties.insert("TemplateData".to_string(), data);
        }
    }
}

/// Resolves intrinsic functions against one template.
pub struct Resolver {
    parameters: Map<String, Value>,
    mappings: Map<String, Value>,
    conditions: Map<String, Value>,
    resources: BTreeSet<String>,
    mode: RefMode,
}

fn section(template: &Map<String, Value>, name: &str) -> Map<String, Value> {
    template
        .get(name)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// True when `value` is a single-key intrinsic call.
pub fn is_intrinsic(value: &Value) -> bool {
    match value.as_object() {
        Some(map) if map.len() == 1 => map
            .keys()
            .next()
            .is_some_and(|k| k == "Ref" || k == "Condition" || k.starts_with("Fn::")),
        _ => false,
    }
}

fn contains_intrinsic(value: &Value) -> bool {
    if is_intrinsic(value) {
        return true;
    }
    match value {
        Value::Array(items) => items.iter().any(contains_intrinsic),
        Value::Object(map) => map.values().any(contains_intrinsic),
        _ => false,
    }
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn intrinsic(name: &str, args: Value) -> Value {
    let mut map = Map::new();
    map.insert(name.to_string(), args);
    Value::Object(map)
}

impl Resolver {
    pub fn new(template: &Map<String, Value>, mode: RefMode) -> Self {
        Self {
            parameters: section(template, "Parameters"),
            mappings: section(template, "Mappings"),
            conditions: section(template, "Conditions"),
            resources: section(template, "Resources").keys().cloned().collect(),
            mode,
        }
    }

    fn resolve_sections(&self, template: &Map<String, Value>) -> Result<Vec<(String, Value)>, ResolveError> {
        let mut out = Vec::new();
        for name in RESOLVED_SECTIONS {
            if let Some(value) = template.get(*name) {
                let mut stack = Vec::new();
                out.push((name.to_string(), self.resolve(value, &mut stack, 0)?));
            }
        }
        Ok(out)
    }

    /// Resolve every intrinsic call inside `value`.
    pub fn resolve_value(&self, value: &Value) -> Resolved {
        self.resolve(value, &mut Vec::new(), 0)
    }

    fn resolve(&self, value: &Value, stack: &mut Vec<String>, depth: usize) -> Resolved {
        if depth > MAX_DEPTH {
            return match self.mode {
                RefMode::Indirect => Err(ResolveError::TooDeep),
                RefMode::Conservative => Ok(value.clone()),
            };
        }

        match value {
            Value::Array(items) => items
                .iter()
                .map(|item| self.resolve(item, stack, depth + 1))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
            Value::Object(map) if is_intrinsic(value) => {
                let Some((name, args)) = map.iter().next() else {
                    return Ok(value.clone());
                };
                self.call(name, args, stack, depth + 1)
            }
            Value::Object(map) => {
                let mut out = Map::new();
                for (k, v) in map {
                    out.insert(k.clone(), self.resolve(v, stack, depth + 1)?);
                }
                Ok(Value::Object(out))
            }
            other => Ok(other.clone()),
        }
    }

    fn call(&self, name: &str, args: &Value, stack: &mut Vec<String>, depth: usize) -> Resolved {
        if name == "Ref" {
            return self.resolve_ref(args, stack, depth);
        }

        let args = self.resolve(args, stack, depth)?;
        let resolved = match name {
            "Fn::Join" => self.join(&args),
            "Fn::Sub" => self.sub(&args, stack, depth)?,
            "Fn::If" => self.if_branch(&args, stack, depth)?,
            "Fn::Select" => select(&args),
            "Fn::Split" => split(&args),
            "Fn::FindInMap" => self.find_in_map(&args),
            "Fn::Base64" => scalar_string(&args).map(|s| Value::String(STANDARD.encode(s))),
            "Fn::GetAZs" => Some(Value::Array(
                AVAILABILITY_ZONES.iter().map(|z| Value::String(z.to_string())).collect(),
            )),
            _ => None,
        };

        Ok(resolved.unwrap_or_else(|| intrinsic(name, args)))
    }

    fn resolve_ref(&self, args: &Value, stack: &mut Vec<String>, depth: usize) -> Resolved {
        let Some(target) = args.as_str() else {
            return Ok(intrinsic("Ref", args.clone()));
        };

        if let Some(value) = self.pseudo_parameter(target) {
            return Ok(value);
        }

        if let Some(parameter) = self.parameters.get(target) {
            let Some(default) = parameter.get("Default") else {
                return Ok(intrinsic("Ref", args.clone()));
            };
            return match self.mode {
                RefMode::Indirect => {
                    if stack.iter().any(|s| s == target) {
                        return Err(ResolveError::Cycle(target.to_string()));
                    }
                    stack.push(target.to_string());
                    let resolved = self.resolve(default, stack, depth + 1);
                    stack.pop();
                    resolved
                }
                RefMode::Conservative if !contains_intrinsic(default) => Ok(default.clone()),
                RefMode::Conservative => Ok(intrinsic("Ref", args.clone())),
            };
        }

        match self.mode {
            RefMode::Indirect if self.resources.contains(target) => {
                debug!("resolving indirect Ref to resource '{}'", target);
                Ok(Value::String(target.to_string()))
            }
            RefMode::Indirect => Err(ResolveError::Dangling(target.to_string())),
            RefMode::Conservative => Ok(intrinsic("Ref", args.clone())),
        }
    }

    fn pseudo_parameter(&self, name: &str) -> Option<Value> {
        match name {
            "AWS::NoValue" => Some(Value::Null),
            "AWS::NotificationARNs" => Some(Value::Array(Vec::new())),
            _ => PSEUDO_PARAMETERS
                .iter()
                .find(|(n, _)| *n == name)
                .map(|(_, v)| Value::String(v.to_string())),
        }
    }

    fn join(&self, args: &Value) -> Option<Value> {
        let [delimiter, items] = args.as_array()?.as_slice() else {
            return None;
        };
        let delimiter = delimiter.as_str()?;
        let parts = items
            .as_array()?
            .iter()
            .map(scalar_string)
            .collect::<Option<Vec<_>>>()?;
        Some(Value::String(parts.join(delimiter)))
    }

    fn sub(&self, args: &Value, stack: &mut Vec<String>, depth: usize) -> Result<Option<Value>, ResolveError> {
        let (template, variables) = match args {
            Value::String(s) => (s.as_str(), Map::new()),
            Value::Array(items) => match items.as_slice() {
                [Value::String(s)] => (s.as_str(), Map::new()),
                [Value::String(s), Value::Object(vars)] => (s.as_str(), vars.clone()),
                _ => return Ok(None),
            },
            _ => return Ok(None),
        };

        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                rest = "";
                break;
            };
            let name = &after[..end];
            rest = &after[end + 1..];

            // ${!Literal} escapes the substitution
            if let Some(literal) = name.strip_prefix('!') {
                out.push_str("${");
                out.push_str(literal);
                out.push('}');
                continue;
            }

            let replacement = match variables.get(name) {
                Some(value) => scalar_string(value),
                None if name.contains('.') => None,
                None => {
                    let resolved = self.resolve_ref(&Value::String(name.to_string()), stack, depth + 1)?;
                    scalar_string(&resolved)
                }
            };
            match replacement {
                Some(value) => out.push_str(&value),
                None => {
                    out.push_str("${");
                    out.push_str(name);
                    out.push('}');
                }
            }
        }
        out.push_str(rest);

        Ok(Some(Value::String(out)))
    }

    fn if_branch(&self, args: &Value, stack: &mut Vec<String>, depth: usize) -> Result<Option<Value>, ResolveError> {
        let Some([condition, when_true, when_false]) = args.as_array().map(Vec::as_slice) else {
            return Ok(None);
        };
        let Some(condition) = condition.as_str() else {
            return Ok(None);
        };

        let mut visiting = Vec::new();
        let branch = match self.condition(condition, stack, depth, &mut visiting)? {
            Some(false) => when_false,
            // undecidable conditions take the first branch
            _ => when_true,
        };
        Ok(Some(branch.clone()))
    }

    fn condition(
        &self,
        name: &str,
        stack: &mut Vec<String>,
        depth: usize,
        visiting: &mut Vec<String>,
    ) -> Result<Option<bool>, ResolveError> {
        if visiting.iter().any(|v| v == name) {
            return Ok(None);
        }
        let Some(expr) = self.conditions.get(name) else {
            return Ok(None);
        };
        visiting.push(name.to_string());
        let result = self.evaluate(expr, stack, depth + 1, visiting);
        visiting.pop();
        result
    }

    /// Evaluate a condition expression when it is statically decidable.
    fn evaluate(
        &self,
        expr: &Value,
        stack: &mut Vec<String>,
        depth: usize,
        visiting: &mut Vec<String>,
    ) -> Result<Option<bool>, ResolveError> {
        if depth > MAX_DEPTH {
            return Ok(None);
        }
        if let Value::Bool(b) = expr {
            return Ok(Some(*b));
        }
        let Some((name, args)) = expr.as_object().filter(|m| m.len() == 1).and_then(|m| m.iter().next())
        else {
            return Ok(None);
        };

        match name.as_str() {
            "Condition" => match args.as_str() {
                Some(other) => self.condition(other, stack, depth, visiting),
                None => Ok(None),
            },
            "Fn::Equals" => {
                let Some([left, right]) = args.as_array().map(Vec::as_slice) else {
                    return Ok(None);
                };
                let left = self.resolve(left, stack, depth + 1)?;
                let right = self.resolve(right, stack, depth + 1)?;
                if contains_intrinsic(&left) || contains_intrinsic(&right) {
                    return Ok(None);
                }
                Ok(Some(match (scalar_string(&left), scalar_string(&right)) {
                    (Some(l), Some(r)) => l == r,
                    _ => left == right,
                }))
            }
            "Fn::Not" => {
                let inner = args.as_array().and_then(|a| a.first()).unwrap_or(args);
                Ok(self.evaluate(inner, stack, depth + 1, visiting)?.map(|b| !b))
            }
            "Fn::And" | "Fn::Or" => {
                let Some(items) = args.as_array() else {
                    return Ok(None);
                };
                let is_and = name == "Fn::And";
                let mut undecided = false;
                for item in items {
                    match self.evaluate(item, stack, depth + 1, visiting)? {
                        Some(b) if b != is_and => return Ok(Some(b)),
                        Some(_) => {}
                        None => undecided = true,
                    }
                }
                Ok(if undecided { None } else { Some(is_and) })
            }
            _ => Ok(None),
        }
    }

    fn find_in_map(&self, args: &Value) -> Option<Value> {
        let [map, top, second] = args.as_array()?.as_slice() else {
            return None;
        };
        self.mappings
            .get(map.as_str()?)?
            .get(scalar_string(top)?)?
            .get(scalar_string(second)?)
            .cloned()
    }
}

fn select(args: &Value) -> Option<Value> {
    let [index, items] = args.as_array()?.as_slice() else {
        return None;
    };
    let index = match index {
        Value::Number(n) => usize::try_from(n.as_u64()?).ok()?,
        Value::String(s) => s.trim().parse().ok()?,
        _ => return None,
    };
    items.as_array()?.get(index).cloned()
}

fn split(args: &Value) -> Option<Value> {
    let [delimiter, source] = args.as_array()?.as_slice() else {
        return None;
    };
    let delimiter = delimiter.as_str()?;
    let source = source.as_str()?;
    Some(Value::Array(
        source.split(delimiter).map(|s| Value::String(s.to_string())).collect(),
    ))
}
