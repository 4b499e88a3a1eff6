//! Minimal JSON Schema validation for tool arguments.
//!
//! Covers the subset tool schemas actually use: `type`, `properties`,
//! `required`, `additionalProperties: false`, `items` and `enum`.
//! Unknown keywords are ignored.

use serde_json::Value;

/// Validate `value` against `schema`. The error names the offending path.
pub fn validate(schema: &Value, value: &Value) -> Result<(), String> {
    check(schema, value, "$")
}

fn check(schema: &Value, value: &Value, path: &str) -> Result<(), String> {
    let Some(schema) = schema.as_object() else {
        return Ok(());
    };

    if let Some(expected) = schema.get("type").and_then(Value::as_str) {
        if !matches_type(expected, value) {
            return Err(format!(
                "{path}: expected {expected}, got {}",
                type_name(value)
            ));
        }
    }

    if let Some(allowed) = schema.get("enum").and_then(Value::as_array) {
        if !allowed.contains(value) {
            return Err(format!("{path}: value {value} is not one of {}", Value::Array(allowed.clone())));
        }
    }

    if let Some(object) = value.as_object() {
        let properties = schema.get("properties").and_then(Value::as_object);

        if let Some(required) = schema.get("required").and_then(Value::as_array) {
            for key in required.iter().filter_map(Value::as_str) {
                if !object.contains_key(key) {
                    return Err(format!("{path}: missing required property '{key}'"));
                }
            }
        }

        let closed = schema.get("additionalProperties") == Some(&Value::Bool(false));
        for (key, field) in object {
            match properties.and_then(|p| p.get(key)) {
                Some(field_schema) => check(field_schema, field, &format!("{path}.{key}"))?,
                None if closed => {
                    return Err(format!("{path}: unexpected property '{key}'"));
                }
                None => {}
            }
        }
    }

    if let (Some(items), Some(array)) = (schema.get("items"), value.as_array()) {
        for (i, item) in array.iter().enumerate() {
            check(items, item, &format!("{path}[{i}]"))?;
        }
    }

    Ok(())
}

fn matches_type(expected: &str, value: &Value) -> bool {
    match expected {
        "object" => value.is_object(),
        "array" => value.is_array(),
        "string" => value.is_string(),
        "boolean" => value.is_boolean(),
        "null" => value.is_null(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        // Unsupported type keywords don't reject anything
        _ => true,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(n) if n.is_f64() => "number",
        Value::Number(_) => "integer",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn shell_schema() -> Value {
        json!({
            "type": "object",
            "properties": {
                "command": { "type": "string" },
                "working_dir": { "type": "string" },
                "timeout_secs": { "type": "integer" }
            },
            "required": ["command"],
            "additionalProperties": false
        })
    }

    #[test]
    fn accepts_valid_arguments() {
        assert!(validate(&shell_schema(), &json!({"command": "ls"})).is_ok());
        assert!(
            validate(
                &shell_schema(),
                &json!({"command": "ls", "working_dir": "/tmp", "timeout_secs": 5})
            )
            .is_ok()
        );
    }

    #[test]
    fn rejects_missing_required() {
        let err = validate(&shell_schema(), &json!({})).unwrap_err();
        assert!(err.contains("command"));
    }

    #[test]
    fn rejects_wrong_type() {
        let err = validate(&shell_schema(), &json!({"command": ["ls"]})).unwrap_err();
        assert!(err.contains("$.command"));
        assert!(err.contains("expected string"));

        let err = validate(&shell_schema(), &json!({"command": "ls", "timeout_secs": 1.5}))
            .unwrap_err();
        assert!(err.contains("expected integer"));
    }

    #[test]
    fn rejects_additional_properties_when_closed() {
        let err = validate(&shell_schema(), &json!({"command": "ls", "user": "root"})).unwrap_err();
        assert!(err.contains("user"));
    }

    #[test]
    fn open_schema_allows_extra_properties() {
        let schema = json!({"type": "object", "properties": {}});
        assert!(validate(&schema, &json!({"anything": 1})).is_ok());
    }

    #[test]
    fn checks_enum_and_items() {
        let schema = json!({
            "type": "object",
            "properties": {
                "mode": { "type": "string", "enum": ["fast", "safe"] },
                "paths": { "type": "array", "items": { "type": "string" } }
            }
        });
        assert!(validate(&schema, &json!({"mode": "fast", "paths": ["a", "b"]})).is_ok());
        assert!(validate(&schema, &json!({"mode": "reckless"})).is_err());
        let err = validate(&schema, &json!({"paths": ["a", 2]})).unwrap_err();
        assert!(err.contains("$.paths[1]"));
    }
}
