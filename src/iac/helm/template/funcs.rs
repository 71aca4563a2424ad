//! Template function library: the Go builtins plus the Sprig subset charts
//! commonly rely on.

use base64::Engine as _;
use serde_json::{Map, Value};

pub type FuncResult = Result<Value, String>;

/// Largest string `repeat` may build.
const MAX_REPEAT_LEN: usize = 1 << 20;
/// Widest padding `indent` and `nindent` accept.
const MAX_INDENT: i64 = 1024;
/// Widths and precisions of `printf` verbs are clamped to this.
const MAX_FORMAT_WIDTH: usize = 1024;

/// Go truthiness: false, 0, nil and empty collections are false.
pub fn truthy(v: &Value) -> bool {
    match v {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

/// Text form of a value as printed by an action.
pub fn to_text(v: &Value) -> String {
    match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => format!("[{}]", items.iter().map(to_text).collect::<Vec<_>>().join(" ")),
        Value::Object(map) => format!(
            "map[{}]",
            sorted(map)
                .into_iter()
                .map(|(k, v)| format!("{}:{}", k, to_text(v)))
                .collect::<Vec<_>>()
                .join(" ")
        ),
    }
}

/// Entries of a map in key order.
pub fn sorted(map: &Map<String, Value>) -> Vec<(&String, &Value)> {
    let mut entries: Vec<_> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
}

pub fn as_i64(v: &Value) -> i64 {
    match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)).unwrap_or_default(),
        Value::String(s) => s.trim().parse::<f64>().map(|f| f as i64).unwrap_or_default(),
        Value::Bool(b) => i64::from(*b),
        _ => 0,
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        _ => None,
    }
}

fn arg(args: &[Value], i: usize, name: &str) -> Result<Value, String> {
    args.get(i)
        .cloned()
        .ok_or_else(|| format!("wrong number of args for {}: want at least {} got {}", name, i + 1, args.len()))
}

fn text_arg(args: &[Value], i: usize, name: &str) -> Result<String, String> {
    arg(args, i, name).map(|v| to_text(&v))
}

/// Go `%q` quoting.
fn go_quote(s: &str) -> String {
    serde_json::to_string(s).unwrap_or_else(|_| format!("\"{}\"", s))
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (as_f64(a), as_f64(b)) {
        (Some(x), Some(y)) => x == y,
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Result<std::cmp::Ordering, String> {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => as_f64(a)
            .zip(as_f64(b))
            .and_then(|(x, y)| x.partial_cmp(&y))
            .ok_or_else(|| "invalid number comparison".to_string()),
        (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
        _ => Err("incompatible types for comparison".to_string()),
    }
}

fn indent(spaces: i64, s: &str) -> Result<String, String> {
    if spaces > MAX_INDENT {
        return Err(format!("indent of {} exceeds the limit of {}", spaces, MAX_INDENT));
    }
    let pad = " ".repeat(spaces.max(0) as usize);
    Ok(format!("{}{}", pad, s.replace('\n', &format!("\n{}", pad))))
}

fn repeat(count: i64, s: &str) -> Result<String, String> {
    let count = count.max(0) as usize;
    match count.checked_mul(s.len()) {
        Some(len) if len <= MAX_REPEAT_LEN => Ok(s.repeat(count)),
        _ => Err(format!("repeat of {} copies exceeds the limit of {} bytes", count, MAX_REPEAT_LEN)),
    }
}

fn title(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut start = true;
    for c in s.chars() {
        if start && c.is_alphabetic() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        start = c.is_whitespace();
    }
    out
}

fn trunc(n: i64, s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let len = chars.len() as i64;
    if n >= 0 {
        chars[..n.min(len) as usize].iter().collect()
    } else {
        let keep = (-n).min(len);
        chars[(len - keep) as usize..].iter().collect()
    }
}

fn to_yaml(v: &Value) -> Result<String, String> {
    serde_yaml::to_string(v)
        .map(|s| s.trim_end_matches('\n').to_string())
        .map_err(|e| e.to_string())
}

/// Go `fmt.Sprint`: spaces are added between operands when neither is a string.
fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, v) in args.iter().enumerate() {
        if i > 0 && !args[i - 1].is_string() && !v.is_string() {
            out.push(' ');
        }
        out.push_str(&to_text(v));
    }
    out
}

/// Subset of Go `fmt.Sprintf`.
pub fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::new();
    let mut chars = format.chars().peekable();
    let mut next = args.iter();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = String::new();
        while let Some(&p) = chars.peek() {
            if p.is_ascii_digit() || p == '.' || p == '-' || p == '+' || p == '#' {
                spec.push(p);
                chars.next();
            } else {
                break;
            }
        }
        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(value) = next.next() else {
            out.push_str(&format!("%!{}(MISSING)", verb));
            continue;
        };
        let rendered = match verb {
            'd' => as_i64(value).to_string(),
            'f' | 'F' => {
                let precision = spec
                    .split_once('.')
                    .and_then(|(_, p)| p.parse::<usize>().ok())
                    .unwrap_or(6)
                    .min(MAX_FORMAT_WIDTH);
                format!("{:.*}", precision, as_f64(value).unwrap_or_default())
            }
            'q' => go_quote(&to_text(value)),
            't' => truthy(value).to_string(),
            _ => to_text(value),
        };
        let width = spec
            .split('.')
            .next()
            .map(|w| w.trim_start_matches(['-', '+', '#']))
            .and_then(|w| w.trim_start_matches('0').parse::<usize>().ok())
            .unwrap_or(0)
            .min(MAX_FORMAT_WIDTH);
        if rendered.chars().count() < width {
            let pad = width - rendered.chars().count();
            if spec.starts_with('-') {
                out.push_str(&rendered);
                out.push_str(&" ".repeat(pad));
            } else {
                let fill = if spec.starts_with('0') { "0" } else { " " };
                out.push_str(&fill.repeat(pad));
                out.push_str(&rendered);
            }
        } else {
            out.push_str(&rendered);
        }
    }
    out
}

fn index(args: &[Value]) -> FuncResult {
    let mut current = arg(args, 0, "index")?;
    for key in &args[1..] {
        current = match (&current, key) {
            (Value::Object(map), k) => map.get(&to_text(k)).cloned().unwrap_or(Value::Null),
            (Value::Array(items), k) => {
                let i = as_i64(k);
                if i < 0 || i as usize >= items.len() {
                    return Err(format!("index out of range: {}", i));
                }
                items[i as usize].clone()
            }
            (Value::Null, _) => Value::Null,
            _ => return Err(format!("can't index item of type {}", type_name(&current))),
        };
    }
    Ok(current)
}

fn type_name(v: &Value) -> &'static str {
    match v {
        Value::Null => "nil",
        Value::Bool(_) => "bool",
        Value::Number(n) if n.is_f64() => "float64",
        Value::Number(_) => "int64",
        Value::String(_) => "string",
        Value::Array(_) => "[]interface {}",
        Value::Object(_) => "map[string]interface {}",
    }
}

/// Call a function that needs no access to the executing template.
pub fn call(name: &str, args: &[Value]) -> FuncResult {
    let s = |i: usize| text_arg(args, i, name);
    let last = || args.last().cloned().unwrap_or(Value::Null);

    let value = match name {
        "default" => {
            let given = args.get(1).cloned().unwrap_or(Value::Null);
            if truthy(&given) { given } else { arg(args, 0, name)? }
        }
        "empty" => Value::Bool(!truthy(&last())),
        "not" => Value::Bool(!truthy(&arg(args, 0, name)?)),
        "and" => args
            .iter()
            .find(|v| !truthy(v))
            .cloned()
            .unwrap_or_else(last),
        "or" => args
            .iter()
            .find(|v| truthy(v))
            .cloned()
            .unwrap_or_else(last),
        "coalesce" => args.iter().find(|v| truthy(v)).cloned().unwrap_or(Value::Null),
        "ternary" => {
            if truthy(&arg(args, 2, name)?) { arg(args, 0, name)? } else { arg(args, 1, name)? }
        }
        "eq" => {
            let first = arg(args, 0, name)?;
            Value::Bool(args[1..].iter().any(|v| values_equal(&first, v)))
        }
        "ne" => Value::Bool(!values_equal(&arg(args, 0, name)?, &arg(args, 1, name)?)),
        "lt" => Value::Bool(compare(&arg(args, 0, name)?, &arg(args, 1, name)?)?.is_lt()),
        "le" => Value::Bool(compare(&arg(args, 0, name)?, &arg(args, 1, name)?)?.is_le()),
        "gt" => Value::Bool(compare(&arg(args, 0, name)?, &arg(args, 1, name)?)?.is_gt()),
        "ge" => Value::Bool(compare(&arg(args, 0, name)?, &arg(args, 1, name)?)?.is_ge()),
        "len" => Value::from(match arg(args, 0, name)? {
            Value::String(s) => s.len(),
            Value::Array(a) => a.len(),
            Value::Object(o) => o.len(),
            Value::Null => 0,
            other => return Err(format!("len of type {}", type_name(&other))),
        }),
        "quote" => Value::String(
            args.iter()
                .filter(|v| !v.is_null())
                .map(|v| go_quote(&to_text(v)))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "squote" => Value::String(
            args.iter()
                .filter(|v| !v.is_null())
                .map(|v| format!("'{}'", to_text(v)))
                .collect::<Vec<_>>()
                .join(" "),
        ),
        "upper" => Value::String(s(0)?.to_uppercase()),
        "lower" => Value::String(s(0)?.to_lowercase()),
        "title" => Value::String(title(&s(0)?)),
        "trim" => Value::String(s(0)?.trim().to_string()),
        "trimPrefix" => {
            let text = s(1)?;
            Value::String(text.strip_prefix(s(0)?.as_str()).unwrap_or(&text).to_string())
        }
        "trimSuffix" => {
            let text = s(1)?;
            Value::String(text.strip_suffix(s(0)?.as_str()).unwrap_or(&text).to_string())
        }
        "trunc" => Value::String(trunc(as_i64(&arg(args, 0, name)?), &s(1)?)),
        "replace" => Value::String(s(2)?.replace(&s(0)?, &s(1)?)),
        "repeat" => Value::String(repeat(as_i64(&arg(args, 0, name)?), &s(1)?)?),
        "contains" => Value::Bool(s(1)?.contains(&s(0)?)),
        "hasPrefix" => Value::Bool(s(1)?.starts_with(&s(0)?)),
        "hasSuffix" => Value::Bool(s(1)?.ends_with(&s(0)?)),
        "indent" => Value::String(indent(as_i64(&arg(args, 0, name)?), &s(1)?)?),
        "nindent" => Value::String(format!("\n{}", indent(as_i64(&arg(args, 0, name)?), &s(1)?)?)),
        "b64enc" => Value::String(base64::engine::general_purpose::STANDARD.encode(s(0)?)),
        "toYaml" => Value::String(to_yaml(&arg(args, 0, name)?)?),
        "toJson" => Value::String(serde_json::to_string(&arg(args, 0, name)?).map_err(|e| e.to_string())?),
        "toString" => Value::String(s(0)?),
        "int" | "int64" => Value::from(as_i64(&arg(args, 0, name)?)),
        "print" => Value::String(sprint(args)),
        "println" => Value::String(format!("{}\n", args.iter().map(to_text).collect::<Vec<_>>().join(" "))),
        "printf" => Value::String(sprintf(&s(0)?, &args[1..])),
        "list" => Value::Array(args.to_vec()),
        "dict" => {
            let mut map = Map::new();
            for pair in args.chunks(2) {
                map.insert(to_text(&pair[0]), pair.get(1).cloned().unwrap_or(Value::Null));
            }
            Value::Object(map)
        }
        "hasKey" => match arg(args, 0, name)? {
            Value::Object(map) => Value::Bool(map.contains_key(&s(1)?)),
            _ => Value::Bool(false),
        },
        "join" => match arg(args, 1, name)? {
            Value::Array(items) => Value::String(items.iter().map(to_text).collect::<Vec<_>>().join(&s(0)?)),
            other => Value::String(to_text(&other)),
        },
        "index" => index(args)?,
        // no cluster to query while scanning
        "lookup" => Value::Object(Map::new()),
        _ => return Err(format!("function \"{}\" not defined", name)),
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_and_truthiness() {
        assert_eq!(call("default", &[json!("a"), json!(null)]).unwrap(), "a");
        assert_eq!(call("default", &[json!("a"), json!("")]).unwrap(), "a");
        assert_eq!(call("default", &[json!("a"), json!(0)]).unwrap(), "a");
        assert_eq!(call("default", &[json!("a"), json!("b")]).unwrap(), "b");
        assert_eq!(call("default", &[json!("a")]).unwrap(), "a");
        assert_eq!(call("empty", &[json!({})]).unwrap(), true);
    }

    #[test]
    fn test_string_functions() {
        assert_eq!(call("quote", &[json!("a\"b")]).unwrap(), "\"a\\\"b\"");
        assert_eq!(call("squote", &[json!(3)]).unwrap(), "'3'");
        assert_eq!(call("trunc", &[json!(3), json!("abcdef")]).unwrap(), "abc");
        assert_eq!(call("trunc", &[json!(-2), json!("abcdef")]).unwrap(), "ef");
        assert_eq!(call("trimSuffix", &[json!("-"), json!("name-")]).unwrap(), "name");
        assert_eq!(call("replace", &[json!("."), json!("-"), json!("a.b")]).unwrap(), "a-b");
        assert_eq!(call("title", &[json!("hello world")]).unwrap(), "Hello World");
        assert_eq!(call("nindent", &[json!(2), json!("a: 1\nb: 2")]).unwrap(), "\n  a: 1\n  b: 2");
        assert_eq!(call("b64enc", &[json!("admin")]).unwrap(), "YWRtaW4=");
    }

    #[test]
    fn test_repeat_and_indent_limits() {
        assert_eq!(call("repeat", &[json!(3), json!("ab")]).unwrap(), "ababab");
        assert_eq!(call("repeat", &[json!(-1), json!("ab")]).unwrap(), "");
        assert!(call("repeat", &[json!(i64::MAX), json!("ab")]).is_err());
        assert!(call("repeat", &[json!(MAX_REPEAT_LEN + 1), json!("a")]).is_err());
        assert!(call("indent", &[json!(1_000_000_000), json!("a")]).is_err());
        assert!(call("nindent", &[json!(MAX_INDENT + 1), json!("a")]).is_err());
        assert_eq!(call("indent", &[json!(2), json!("a")]).unwrap(), "  a");
        assert_eq!(sprintf("%99999999d", &[json!(1)]).len(), MAX_FORMAT_WIDTH);
        assert_eq!(sprintf("%5d", &[json!(1)]), "    1");
    }

    #[test]
    fn test_to_yaml() {
        let out = call("toYaml", &[json!({"limits": {"cpu": "100m"}})]).unwrap();
        assert_eq!(out, "limits:\n  cpu: 100m");
    }

    #[test]
    fn test_printf_and_print() {
        assert_eq!(sprintf("%s-%d", &[json!("web"), json!(3)]), "web-3");
        assert_eq!(sprintf("%q %v%%", &[json!("x"), json!(true)]), "\"x\" true%");
        assert_eq!(sprintf("%.2f", &[json!(1.5)]), "1.50");
        assert_eq!(sprintf("%03d", &[json!(7)]), "007");
        assert_eq!(call("print", &[json!("a"), json!(1), json!(2)]).unwrap(), "a1 2");
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(call("eq", &[json!(1), json!(1.0)]).unwrap(), true);
        assert_eq!(call("eq", &[json!("a"), json!("b"), json!("a")]).unwrap(), true);
        assert_eq!(call("lt", &[json!(1), json!(2)]).unwrap(), true);
        assert!(call("lt", &[json!(1), json!("2")]).is_err());
        assert_eq!(call("and", &[json!(1), json!(""), json!(2)]).unwrap(), "");
        assert_eq!(call("or", &[json!(null), json!("x")]).unwrap(), "x");
    }

    #[test]
    fn test_collections() {
        let d = call("dict", &[json!("a"), json!(1), json!("b")]).unwrap();
        assert_eq!(d, json!({"a": 1, "b": null}));
        assert_eq!(call("index", &[json!({"a": [1, 2]}), json!("a"), json!(1)]).unwrap(), 2);
        assert_eq!(call("len", &[json!([1, 2, 3])]).unwrap(), 3);
        assert_eq!(call("hasKey", &[json!({"a": 1}), json!("a")]).unwrap(), true);
        assert!(call("nope", &[]).is_err());
    }
}
