//! Short-form intrinsic tags (`!Ref`, `!GetAtt`, ...) rewritten to long form.

use serde_json::{Map, Value as JsonValue};
use serde_yaml::Value;

use crate::iac::yaml::{key_to_string, number_to_json};

/// YAML short tags and the intrinsic they stand for.
const TAGS: &[(&str, &str)] = &[
    ("And", "Fn::And"),
    ("Base64", "Fn::Base64"),
    ("Cidr", "Fn::Cidr"),
    ("Equals", "Fn::Equals"),
    ("FindInMap", "Fn::FindInMap"),
    ("GetAZs", "Fn::GetAZs"),
    ("GetAtt", "Fn::GetAtt"),
    ("If", "Fn::If"),
    ("ImportValue", "Fn::ImportValue"),
    ("Join", "Fn::Join"),
    ("Not", "Fn::Not"),
    ("Or", "Fn::Or"),
    ("Select", "Fn::Select"),
    ("Split", "Fn::Split"),
    ("Sub", "Fn::Sub"),
    ("Ref", "Ref"),
    ("Condition", "Condition"),
];

fn intrinsic_for_tag(tag: &str) -> Option<&'static str> {
    let name = tag.trim_start_matches('!');
    TAGS.iter().find(|(short, _)| *short == name).map(|(_, long)| *long)
}

/// Convert a YAML template into JSON, rewriting short tags into
/// single-key intrinsic maps.
///
/// Fails only when a `GetAtt` string has no attribute part.
pub fn to_long_form(value: &Value) -> Result<JsonValue, String> {
    match value {
        Value::Null => Ok(JsonValue::Null),
        Value::Bool(b) => Ok(JsonValue::Bool(*b)),
        Value::Number(n) => Ok(number_to_json(n)),
        Value::String(s) => Ok(JsonValue::String(s.clone())),
        Value::Sequence(seq) => seq
            .iter()
            .map(to_long_form)
            .collect::<Result<Vec<_>, _>>()
            .map(JsonValue::Array),
        Value::Mapping(mapping) => {
            let mut out = Map::new();
            for (k, v) in mapping {
                let key = key_to_string(k);
                let body = to_long_form(v)?;
                let body = if key == "Fn::GetAtt" { split_get_att(body)? } else { body };
                out.insert(key, body);
            }
            Ok(JsonValue::Object(out))
        }
        Value::Tagged(tagged) => {
            let tag = tagged.tag.to_string();
            let Some(function) = intrinsic_for_tag(&tag) else {
                return to_long_form(&tagged.value);
            };

            // an intrinsic body is never null
            let body = match to_long_form(&tagged.value)? {
                JsonValue::Null => JsonValue::String(String::new()),
                body => body,
            };
            let body = if function == "Fn::GetAtt" { split_get_att(body)? } else { body };

            let mut out = Map::new();
            out.insert(function.to_string(), body);
            Ok(JsonValue::Object(out))
        }
    }
}

/// `"Resource.Attribute"` becomes `["Resource", "Attribute"]`.
fn split_get_att(body: JsonValue) -> Result<JsonValue, String> {
    match body {
        JsonValue::String(s) => match s.split_once('.') {
            Some((resource, attribute)) => Ok(JsonValue::Array(vec![
                JsonValue::String(resource.to_string()),
                JsonValue::String(attribute.to_string()),
            ])),
            None => Err("GetAtt requires two parameters".to_string()),
        },
        other => Ok(other),
    }
}
