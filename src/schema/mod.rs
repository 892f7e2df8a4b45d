//! Schema registry: declarative validators for every wire structure.
//!
//! The higher layers depend on this module alone for "what the gateway
//! accepts"; a response that fails its schema is a remote I/O failure, not
//! data.

use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{DatastoreError, Result};

/// A declarative wire-shape validator
#[derive(Debug, Clone)]
pub enum Schema {
    /// Anything goes
    Any,
    Bool,
    /// Non-negative integer (timestamps, versions, counters)
    Integer,
    Str,
    /// Lowercase or uppercase hex string
    HexStr,
    /// Base64 (standard alphabet) string
    Base64Str,
    /// UUID in hyphenated form
    UuidStr,
    /// One of a fixed set of string literals
    EnumStr(&'static [&'static str]),
    Array(Box<Schema>),
    /// Object with arbitrary string keys, values all matching one schema
    Map(Box<Schema>),
    Object {
        required: Vec<(&'static str, Schema)>,
        optional: Vec<(&'static str, Schema)>,
    },
}

impl Schema {
    pub fn validate(&self, value: &Value) -> Result<()> {
        self.validate_at(value, "$")
    }

    fn validate_at(&self, value: &Value, path: &str) -> Result<()> {
        let fail = |expected: &str| {
            Err(DatastoreError::validation(format!(
                "{path}: expected {expected}, got {value}"
            )))
        };

        match self {
            Schema::Any => Ok(()),
            Schema::Bool => {
                if value.is_boolean() {
                    Ok(())
                } else {
                    fail("boolean")
                }
            }
            Schema::Integer => {
                if value.is_u64() {
                    Ok(())
                } else {
                    fail("non-negative integer")
                }
            }
            Schema::Str => {
                if value.is_string() {
                    Ok(())
                } else {
                    fail("string")
                }
            }
            Schema::HexStr => match value.as_str() {
                Some(s)
                    if !s.is_empty()
                        && s.len() % 2 == 0
                        && s.bytes().all(|b| b.is_ascii_hexdigit()) =>
                {
                    Ok(())
                }
                _ => fail("hex string"),
            },
            Schema::Base64Str => match value.as_str() {
                Some(s)
                    if s.bytes().all(|b| {
                        b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'='
                    }) =>
                {
                    Ok(())
                }
                _ => fail("base64 string"),
            },
            Schema::UuidStr => match value.as_str() {
                Some(s) if uuid::Uuid::parse_str(s).is_ok() => Ok(()),
                _ => fail("uuid string"),
            },
            Schema::EnumStr(allowed) => match value.as_str() {
                Some(s) if allowed.iter().any(|a| *a == s) => Ok(()),
                _ => fail(&format!("one of {allowed:?}")),
            },
            Schema::Array(item) => match value.as_array() {
                Some(items) => {
                    for (i, v) in items.iter().enumerate() {
                        item.validate_at(v, &format!("{path}[{i}]"))?;
                    }
                    Ok(())
                }
                None => fail("array"),
            },
            Schema::Map(entry) => match value.as_object() {
                Some(map) => {
                    for (k, v) in map {
                        entry.validate_at(v, &format!("{path}.{k}"))?;
                    }
                    Ok(())
                }
                None => fail("object"),
            },
            Schema::Object { required, optional } => match value.as_object() {
                Some(map) => {
                    for (field, schema) in required {
                        match map.get(*field) {
                            Some(v) => schema.validate_at(v, &format!("{path}.{field}"))?,
                            None => {
                                return Err(DatastoreError::validation(format!(
                                    "{path}: missing required field '{field}'"
                                )))
                            }
                        }
                    }
                    for (field, schema) in optional {
                        if let Some(v) = map.get(*field) {
                            schema.validate_at(v, &format!("{path}.{field}"))?;
                        }
                    }
                    Ok(())
                }
                None => fail("object"),
            },
        }
    }
}

/// The mutable-data envelope
pub static MUTABLE_DATA_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::Object {
    required: vec![
        ("fq_data_id", Schema::Str),
        ("data", Schema::Str),
        ("version", Schema::Integer),
        ("timestamp", Schema::Integer),
    ],
    optional: vec![],
});

/// Datastore descriptor
pub static DATASTORE_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::Object {
    required: vec![
        ("type", Schema::EnumStr(&["datastore", "collection"])),
        ("pubkey", Schema::HexStr),
        ("drivers", Schema::Array(Box::new(Schema::Str))),
        ("device_ids", Schema::Array(Box::new(Schema::Str))),
        ("root_uuid", Schema::UuidStr),
    ],
    optional: vec![],
});

/// A single file entry inside a device root
pub static FILE_ENTRY_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::Object {
    required: vec![
        ("proto_version", Schema::Integer),
        ("urls", Schema::Array(Box::new(Schema::Str))),
        ("data_hash", Schema::HexStr),
        ("timestamp", Schema::Integer),
    ],
    optional: vec![],
});

/// A device root page
pub static DEVICE_ROOT_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::Object {
    required: vec![
        ("proto_version", Schema::Integer),
        ("type", Schema::Integer),
        ("owner", Schema::Str),
        ("readers", Schema::Array(Box::new(Schema::Str))),
        ("timestamp", Schema::Integer),
        ("files", Schema::Map(Box::new(FILE_ENTRY_SCHEMA.clone()))),
        ("tombstones", Schema::Map(Box::new(Schema::Str))),
    ],
    optional: vec![],
});

/// Response of `GET /v1/stores/<id>`
pub static GET_DATASTORE_RESPONSE_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::Object {
    required: vec![("datastore", DATASTORE_SCHEMA.clone())],
    optional: vec![],
});

/// Response of `POST /v1/stores`
pub static PUT_DATASTORE_RESPONSE_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::Object {
    required: vec![("status", Schema::Bool)],
    optional: vec![
        ("datastore_urls", Schema::Array(Box::new(Schema::Str))),
        ("root_urls", Schema::Array(Box::new(Schema::Str))),
    ],
});

/// Response of file and device-root mutations
pub static PUT_FILE_RESPONSE_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::Object {
    required: vec![("status", Schema::Bool)],
    optional: vec![("urls", Schema::Array(Box::new(Schema::Str)))],
});

/// Bare acknowledgement (`DELETE` endpoints)
pub static ACK_RESPONSE_SCHEMA: Lazy<Schema> = Lazy::new(|| Schema::Object {
    required: vec![("status", Schema::Bool)],
    optional: vec![],
});

/// Aggregate root listing: file name -> entry
pub static LISTING_RESPONSE_SCHEMA: Lazy<Schema> =
    Lazy::new(|| Schema::Map(Box::new(FILE_ENTRY_SCHEMA.clone())));

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_mutable_data_schema() {
        let good = json!({"fq_data_id": "d%3Aid", "data": "x", "version": 1, "timestamp": 5});
        assert!(MUTABLE_DATA_SCHEMA.validate(&good).is_ok());

        let missing = json!({"fq_data_id": "d%3Aid", "data": "x", "version": 1});
        assert!(MUTABLE_DATA_SCHEMA.validate(&missing).is_err());

        let wrong_type = json!({"fq_data_id": 7, "data": "x", "version": 1, "timestamp": 5});
        assert!(MUTABLE_DATA_SCHEMA.validate(&wrong_type).is_err());
    }

    #[test]
    fn test_datastore_schema() {
        let good = json!({
            "type": "datastore",
            "pubkey": "04ab",
            "drivers": ["disk"],
            "device_ids": ["dev-1"],
            "root_uuid": "11111111-2222-4333-8444-555555555555"
        });
        assert!(DATASTORE_SCHEMA.validate(&good).is_ok());

        let bad_kind = json!({
            "type": "bucket",
            "pubkey": "04ab",
            "drivers": [],
            "device_ids": [],
            "root_uuid": "11111111-2222-4333-8444-555555555555"
        });
        assert!(DATASTORE_SCHEMA.validate(&bad_kind).is_err());

        let bad_uuid = json!({
            "type": "datastore",
            "pubkey": "04ab",
            "drivers": [],
            "device_ids": [],
            "root_uuid": "not-a-uuid"
        });
        assert!(DATASTORE_SCHEMA.validate(&bad_uuid).is_err());
    }

    #[test]
    fn test_device_root_schema_accepts_serialized_root() {
        let root = crate::inode::make_empty_device_root("1Ds", &[]);
        let value = serde_json::to_value(root).unwrap();
        assert!(DEVICE_ROOT_SCHEMA.validate(&value).is_ok());
    }

    #[test]
    fn test_listing_schema() {
        let good = json!({
            "a": {"proto_version": 2, "urls": [], "data_hash": "ab", "timestamp": 1},
            "b": {"proto_version": 2, "urls": ["u"], "data_hash": "cd", "timestamp": 2}
        });
        assert!(LISTING_RESPONSE_SCHEMA.validate(&good).is_ok());

        let bad = json!({"a": {"urls": []}});
        assert!(LISTING_RESPONSE_SCHEMA.validate(&bad).is_err());
    }

    #[test]
    fn test_put_responses() {
        assert!(PUT_DATASTORE_RESPONSE_SCHEMA
            .validate(&json!({"status": true, "root_urls": ["u"]}))
            .is_ok());
        assert!(PUT_DATASTORE_RESPONSE_SCHEMA
            .validate(&json!({"root_urls": ["u"]}))
            .is_err());
        assert!(PUT_FILE_RESPONSE_SCHEMA
            .validate(&json!({"status": true, "urls": []}))
            .is_ok());
    }

    #[test]
    fn test_validation_error_paths() {
        let bad = json!({"status": true, "urls": [1]});
        let err = PUT_FILE_RESPONSE_SCHEMA.validate(&bad).unwrap_err();
        assert!(err.to_string().contains("$.urls[0]"));
    }
}
