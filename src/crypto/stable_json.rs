// stable_json.rs
//
// Canonical JSON serialization: object keys sorted ascending by code point,
// compact separators, no trailing whitespace. Every signed artifact in the
// protocol is a stable-JSON string, so this output must be identical across
// implementations.

use serde::Serialize;
use serde_json::Value;

use crate::error::{DatastoreError, Result};

// `serde_json::Value` is a tree and cannot cycle; the depth bound is the
// refusal path for pathological nesting.
const MAX_DEPTH: usize = 128;

/// Serialize any `Serialize` value to its canonical JSON string
pub fn stable_json<T: Serialize>(value: &T) -> Result<String> {
    let value = serde_json::to_value(value)?;
    stable_stringify(&value)
}

/// Canonical JSON string of an already-parsed value
pub fn stable_stringify(value: &Value) -> Result<String> {
    let mut out = String::new();
    write_value(value, &mut out, 0)?;
    Ok(out)
}

fn write_value(value: &Value, out: &mut String, depth: usize) -> Result<()> {
    if depth > MAX_DEPTH {
        return Err(DatastoreError::serialization(
            "Refusing to serialize: nesting depth limit exceeded",
        ));
    }

    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => out.push_str(&serde_json::to_string(s)?),
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out, depth + 1)?;
            }
            out.push(']');
        }
        Value::Object(map) => {
            // String Ord is byte order over UTF-8, which equals code-point order
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&serde_json::to_string(key)?);
                out.push(':');
                write_value(&map[key.as_str()], out, depth + 1)?;
            }
            out.push('}');
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keys_sorted_by_code_point() {
        let value = json!({"zebra": 1, "alpha": 2, "Zulu": 3, "beta": [1, 2]});
        assert_eq!(
            stable_stringify(&value).unwrap(),
            r#"{"Zulu":3,"alpha":2,"beta":[1,2],"zebra":1}"#
        );
    }

    #[test]
    fn test_independent_of_insertion_order() {
        let a: Value = serde_json::from_str(r#"{"b":1,"a":{"d":4,"c":3}}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a":{"c":3,"d":4},"b":1}"#).unwrap();
        assert_eq!(
            stable_stringify(&a).unwrap(),
            stable_stringify(&b).unwrap()
        );
    }

    #[test]
    fn test_compact_separators() {
        let value = json!({"a": [1, "two", null, true]});
        assert_eq!(
            stable_stringify(&value).unwrap(),
            r#"{"a":[1,"two",null,true]}"#
        );
    }

    #[test]
    fn test_string_escaping() {
        let value = json!({"k": "line\nbreak \"quoted\" \\slash"});
        assert_eq!(
            stable_stringify(&value).unwrap(),
            r#"{"k":"line\nbreak \"quoted\" \\slash"}"#
        );
    }

    #[test]
    fn test_depth_limit_refused() {
        let mut value = json!(1);
        for _ in 0..200 {
            value = json!([value]);
        }
        assert!(matches!(
            stable_stringify(&value),
            Err(DatastoreError::Serialization(_))
        ));
    }

    #[test]
    fn test_struct_serialization() {
        #[derive(serde::Serialize)]
        struct Envelope {
            version: u64,
            fq_data_id: String,
            data: String,
            timestamp: u64,
        }
        let env = Envelope {
            version: 1,
            fq_data_id: "dev:id".into(),
            data: "payload".into(),
            timestamp: 1000,
        };
        // Field declaration order does not leak into the output
        assert_eq!(
            stable_json(&env).unwrap(),
            r#"{"data":"payload","fq_data_id":"dev:id","timestamp":1000,"version":1}"#
        );
    }
}
