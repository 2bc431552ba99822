use serde_json::Value;

/// One decoded line of the index. Field names on disk are abbreviated
/// (`liid`, `n`, `a`, `t`, `e`, `linkedin`); anything else on the line is ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexRecord {
    /// Trimmed identifier; empty when the line has no usable `liid`.
    pub key: String,
    pub full_name: String,
    pub location: String,
    pub phones: Vec<String>,
    pub emails: Vec<String>,
    pub linkedin_url: String,
}

impl IndexRecord {
    /// Builds a record from a decoded JSON line. Returns `None` when the line is not an object.
    pub fn from_value(value: Value) -> Option<Self> {
        let Value::Object(mut map) = value else {
            return None;
        };

        let key = map
            .remove("liid")
            .map(scalar_text)
            .unwrap_or_default()
            .trim()
            .to_string();

        Some(Self {
            key,
            full_name: map.remove("n").map(scalar_text).unwrap_or_default(),
            location: map.remove("a").map(scalar_text).unwrap_or_default(),
            phones: map.remove("t").map(string_list).unwrap_or_default(),
            emails: map.remove("e").map(string_list).unwrap_or_default(),
            linkedin_url: map.remove("linkedin").map(scalar_text).unwrap_or_default(),
        })
    }
}

/// Strings pass through, numbers and booleans keep their JSON spelling,
/// null and containers collapse to empty.
fn scalar_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null | Value::Array(_) | Value::Object(_) => String::new(),
    }
}

/// A field that is not an array is treated as an empty list.
fn string_list(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
