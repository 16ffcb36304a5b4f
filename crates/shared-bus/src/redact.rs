//! Credential redaction for logged payloads.

use serde::Serialize;
use serde_json::Value;
use shared_crypto::REDACTED;

/// Field names whose values never reach a log sink.
pub const REDACTED_FIELDS: &[&str] = &["jwt", "authModuleSecret", "token", "refreshToken"];

/// Replace every credential field, at any depth, with the placeholder.
pub fn redact_value(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                if REDACTED_FIELDS.contains(&key.as_str()) {
                    if !field.is_null() {
                        *field = Value::String(REDACTED.to_string());
                    }
                } else {
                    redact_value(field);
                }
            }
        }
        Value::Array(items) => items.iter_mut().for_each(redact_value),
        _ => {}
    }
}

/// Serialise `payload` and redact it. Unserialisable payloads log as the
/// placeholder.
pub fn redact_for_log<T: Serialize>(payload: &T) -> Value {
    match serde_json::to_value(payload) {
        Ok(mut value) => {
            redact_value(&mut value);
            value
        }
        Err(_) => Value::String(REDACTED.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calls::{Call, CallEnvelope, RefreshTokenRequest};
    use serde_json::json;

    #[test]
    fn test_nested_fields_are_redacted() {
        let mut value = json!({
            "moduleName": "auth",
            "jwt": "eyJ...",
            "authModuleSecret": "s3cret",
            "call": {
                "data": {"token": "abc", "refreshToken": "def", "userId": "42"}
            },
            "list": [{"token": "x"}]
        });
        redact_value(&mut value);

        assert_eq!(value["moduleName"], "auth");
        assert_eq!(value["jwt"], REDACTED);
        assert_eq!(value["authModuleSecret"], REDACTED);
        assert_eq!(value["call"]["data"]["token"], REDACTED);
        assert_eq!(value["call"]["data"]["refreshToken"], REDACTED);
        assert_eq!(value["call"]["data"]["userId"], "42");
        assert_eq!(value["list"][0]["token"], REDACTED);
    }

    #[test]
    fn test_envelope_redaction() {
        let envelope = CallEnvelope::new(
            "auth",
            Call::RefreshAccessToken(RefreshTokenRequest {
                refresh_token: "deadbeef".into(),
            }),
        )
        .skip_jwt("bootstrap-secret");

        let logged = redact_for_log(&envelope).to_string();
        assert!(!logged.contains("deadbeef"));
        assert!(!logged.contains("bootstrap-secret"));
        assert!(logged.contains(REDACTED));
    }
}
