use serde_json::{Map, Value};
use std::collections::BTreeMap;

///
/// Coerces data values to strings as required by FCM data maps.
///
/// - strings are kept
/// - `null` becomes an empty string
/// - booleans and numbers use their display form
/// - arrays and objects are encoded as compact JSON
///
pub fn normalize_data(data: &Map<String, Value>) -> BTreeMap<String, String> {
    data.iter()
        .map(|(key, value)| {
            let value = match value {
                Value::String(value) => value.clone(),
                Value::Null => String::new(),
                Value::Bool(value) => value.to_string(),
                Value::Number(value) => value.to_string(),
                Value::Array(_) | Value::Object(_) => value.to_string(),
            };
            (key.clone(), value)
        })
        .collect()
}

///
/// Truncates to `max_chars` characters, appending `…` when anything was cut.
///
pub fn truncate_string(input: &str, max_chars: usize) -> String {
    let mut chars = input.chars();
    let mut output: String = chars.by_ref().take(max_chars).collect();
    if chars.next().is_some() {
        output.push('…');
    }

    output
}
