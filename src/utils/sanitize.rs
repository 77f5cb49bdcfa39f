use serde_json::Value;

/// Sanitizes sensitive fields in JSON payloads for logging
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut sanitized = serde_json::Map::new();
            for (key, val) in map {
                let sanitized_val = if is_sensitive_field(key) {
                    mask_value(key, val)
                } else {
                    sanitize_json(val)
                };
                sanitized.insert(key.clone(), sanitized_val);
            }
            Value::Object(sanitized)
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sanitize_json).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_field(key: &str) -> bool {
    matches!(
        key.to_lowercase().as_str(),
        "otp" | "password" | "secret" | "token" | "api_key" | "authorization" | "email"
    )
}

fn mask_value(key: &str, value: &Value) -> Value {
    match value {
        // Keep the domain so support can still tell providers apart.
        Value::String(s) if key.eq_ignore_ascii_case("email") => match s.split_once('@') {
            Some((_, domain)) => Value::String(format!("****@{}", domain)),
            None => Value::String("****".to_string()),
        },
        _ => Value::String("****".to_string()),
    }
}
