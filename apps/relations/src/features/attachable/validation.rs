use serde_json::Value;

use super::error::AttachError;
use crate::core::naming::humanize_key;

/// Reads a request body. Empty or malformed bodies behave like `{}` so that
/// the item-set check reports the missing key.
pub fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Object(Default::default());
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::Object(Default::default()))
}

/// Looks `key` up in the body; dots address nested objects.
pub fn input<'a>(body: &'a Value, key: &str) -> Option<&'a Value> {
    if let Some(value) = body.get(key) {
        return Some(value);
    }
    key.split('.').try_fold(body, |node, segment| node.get(segment))
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// `required|array`: the key must hold a non-empty JSON array.
pub fn item_set(body: &Value, key: &str) -> Result<Vec<Value>, AttachError> {
    let attribute = humanize_key(key);
    match input(body, key) {
        None => Err(AttachError::validation(
            key,
            format!("The {attribute} field is required."),
        )),
        Some(value) if is_blank(value) => Err(AttachError::validation(
            key,
            format!("The {attribute} field is required."),
        )),
        Some(Value::Array(items)) => Ok(items.clone()),
        Some(_) => Err(AttachError::validation(
            key,
            format!("The {attribute} must be an array."),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(err: AttachError) -> String {
        match err {
            AttachError::Validation { errors, .. } => errors.into_values().flatten().collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn accepts_a_non_empty_array() {
        let items = item_set(&json!({"roles": [1, "2"]}), "roles").unwrap();
        assert_eq!(items, vec![json!(1), json!("2")]);
    }

    #[test]
    fn missing_null_and_empty_are_required_errors() {
        for body in [json!({}), json!({"roles": null}), json!({"roles": []}), json!({"roles": " "})] {
            assert_eq!(message(item_set(&body, "roles").unwrap_err()), "The roles field is required.");
        }
    }

    #[test]
    fn scalars_and_objects_are_not_arrays() {
        for value in [json!("not-an-array"), json!(5), json!({"a": 1}), json!(true)] {
            let err = item_set(&json!({"user_roles": value}), "user_roles").unwrap_err();
            assert_eq!(message(err), "The user roles must be an array.");
        }
    }

    #[test]
    fn dotted_keys_reach_nested_objects() {
        let body = json!({"data": {"tags": [3]}});
        assert_eq!(item_set(&body, "data.tags").unwrap(), vec![json!(3)]);
        assert!(input(&body, "data.missing").is_none());
    }

    #[test]
    fn unparseable_bodies_read_as_empty() {
        assert_eq!(parse_body(b""), json!({}));
        assert_eq!(parse_body(b"  \n"), json!({}));
        assert_eq!(parse_body(b"roles=1"), json!({}));
        assert_eq!(parse_body(br#"{"roles":[1]}"#), json!({"roles": [1]}));
    }
}
