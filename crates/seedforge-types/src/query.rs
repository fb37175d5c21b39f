//! Query-string helpers shared by the planner and the `query` binding.

use serde_json::Value;
use url::form_urlencoded;

/// Keys owned by the partitioning algorithm; caller-supplied values are dropped.
pub const RESERVED_KEYS: [&str; 2] = ["start", "end"];

pub fn is_reserved(key: &str) -> bool {
    RESERVED_KEYS.contains(&key)
}

/// Form-urlencode `pairs` in iteration order.
pub fn encode_pairs<'a, I>(pairs: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in pairs {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// String form of a JSON scalar used as a parameter value.
///
/// Strings are taken verbatim, `null` becomes empty, containers are
/// serialized as JSON.
pub fn param_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Encode a JSON object's entries, skipping `skip` keys.
///
/// Non-object values encode to an empty string.
pub fn encode_object(object: &Value, skip: &[String]) -> String {
    let Some(map) = object.as_object() else {
        return String::new();
    };
    let values: Vec<(&str, String)> = map
        .iter()
        .filter(|(k, _)| !skip.iter().any(|s| s == *k))
        .map(|(k, v)| (k.as_str(), param_value(v)))
        .collect();
    encode_pairs(values.iter().map(|(k, v)| (*k, v.as_str())))
}
