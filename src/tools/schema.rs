//! Parameter schema sanitation for Gemini function declarations.
//!
//! Gemini rejects declarations whose `required` names are missing from
//! `properties` and enums containing empty strings. Rejected declarations
//! fail the whole call, so the schema is loosened rather than validated.

use serde_json::{Map, Value};

/// Return a copy of `schema` that Gemini will accept.
pub fn sanitize_schema(schema: &Value) -> Value {
    let Value::Object(original) = schema else {
        return schema.clone();
    };

    let mut sanitized = original.clone();
    let property_names: Vec<String> = match original.get("properties") {
        Some(Value::Object(props)) => props.keys().cloned().collect(),
        _ => Vec::new(),
    };

    if let Some(required) = sanitized.remove("required") {
        let kept: Vec<Value> = required
            .as_array()
            .map(|names| {
                names
                    .iter()
                    .filter(|n| n.as_str().is_some_and(|n| property_names.iter().any(|p| p == n)))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if !kept.is_empty() {
            sanitized.insert("required".to_string(), Value::Array(kept));
        }
    }

    if let Some(Value::Object(props)) = sanitized.get_mut("properties") {
        for prop in props.values_mut() {
            if let Value::Object(prop) = prop {
                strip_empty_enum_values(prop);
            }
        }
    }

    Value::Object(sanitized)
}

fn strip_empty_enum_values(prop: &mut Map<String, Value>) {
    let Some(Value::Array(values)) = prop.get_mut("enum") else {
        return;
    };

    values.retain(|v| v.as_str() != Some(""));
    if values.is_empty() {
        prop.remove("enum");
    }
}
