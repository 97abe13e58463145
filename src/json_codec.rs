//! JSON encode/decode helpers for `Document`, ported from
//! `reldatasync.json` (`JsonEncoder`/`JsonDecoder`). Dates and datetimes
//! serialize as ISO-8601 strings; decoding revives typed values when a
//! `Schema` is supplied, otherwise numbers/bools/strings pass through and
//! date-shaped strings stay plain text (matching the Python original, which
//! does a bare `json.loads` without a schema).

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{Map, Number, Value};

use crate::document::{DocValue, Document, FieldType, Schema, DELETED, ID, REV, SEQ};
use crate::error::{DatastoreError, DatastoreResult};

pub(crate) fn value_to_json(v: &DocValue) -> Value {
    match v {
        DocValue::Null => Value::Null,
        DocValue::Bool(b) => Value::Bool(*b),
        DocValue::Int(n) => Value::Number((*n).into()),
        DocValue::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        DocValue::Text(s) => Value::String(s.clone()),
        DocValue::Date(d) => Value::String(d.to_string()),
        DocValue::DateTime(dt) => Value::String(dt.to_rfc3339()),
    }
}

pub fn encode_document(doc: &Document) -> String {
    let mut map = Map::new();
    for (k, v) in doc.iter() {
        map.insert(k.clone(), value_to_json(v));
    }
    serde_json::to_string(&Value::Object(map)).expect("document JSON is always serializable")
}

/// Encodes a single scalar as JSON text, for relational backends that store
/// untyped user columns as JSON-encoded text (see `datastore::postgres`,
/// `datastore::sqlite`).
pub fn encode_scalar(v: &DocValue) -> String {
    serde_json::to_string(&value_to_json(v)).expect("scalar JSON is always serializable")
}

/// Decodes a single JSON-text column value back into a typed scalar, the
/// inverse of `encode_scalar`, reusing the same schema-aware revival rules
/// `decode_document` uses for whole documents.
pub fn decode_scalar(field: &str, text: &str, schema: Option<&Schema>) -> DatastoreResult<DocValue> {
    let value: Value = serde_json::from_str(text)
        .map_err(|e| DatastoreError::InvalidDocument(format!("{field}: invalid JSON {text:?}: {e}")))?;
    revive_scalar(field, value, schema)
}

fn revive_scalar(field: &str, value: Value, schema: Option<&Schema>) -> DatastoreResult<DocValue> {
    // Reserved fields always carry a fixed type regardless of schema.
    match field {
        ID | REV => {
            return match value {
                Value::String(s) => Ok(DocValue::Text(s)),
                Value::Null => Err(DatastoreError::InvalidDocument(format!(
                    "{field} must be a string"
                ))),
                other => Ok(DocValue::Text(other.to_string())),
            }
        }
        SEQ => {
            return match value.as_i64() {
                Some(n) => Ok(DocValue::Int(n)),
                None => Err(DatastoreError::InvalidDocument(format!(
                    "{field} must be an integer"
                ))),
            }
        }
        DELETED => {
            return match value {
                Value::Bool(b) => Ok(DocValue::Bool(b)),
                other => Err(DatastoreError::InvalidDocument(format!(
                    "{field} must be a boolean, got {other}"
                ))),
            }
        }
        _ => {}
    }

    let declared = schema.and_then(|s| s.field_type(field));
    match (declared, value) {
        (_, Value::Null) => Ok(DocValue::Null),
        (Some(FieldType::Integer), v) => v
            .as_i64()
            .map(DocValue::Int)
            .ok_or_else(|| DatastoreError::InvalidDocument(format!("{field} is not an integer"))),
        (Some(FieldType::Real), v) => v
            .as_f64()
            .map(DocValue::Float)
            .ok_or_else(|| DatastoreError::InvalidDocument(format!("{field} is not a number"))),
        (Some(FieldType::Boolean), Value::Bool(b)) => Ok(DocValue::Bool(b)),
        (Some(FieldType::Boolean), v) => {
            Err(DatastoreError::InvalidDocument(format!("{field} is not a boolean: {v}")))
        }
        (Some(FieldType::Text), Value::String(s)) => Ok(DocValue::Text(s)),
        (Some(FieldType::Text), v) => Ok(DocValue::Text(v.to_string())),
        (Some(FieldType::Date), Value::String(s)) => s
            .parse::<NaiveDate>()
            .map(DocValue::Date)
            .map_err(|e| DatastoreError::InvalidDocument(format!("{field}: bad date {s:?}: {e}"))),
        (Some(FieldType::DateTime), Value::String(s)) => DateTime::parse_from_rfc3339(&s)
            .map(|dt| DocValue::DateTime(dt.with_timezone(&Utc)))
            .map_err(|e| {
                DatastoreError::InvalidDocument(format!("{field}: bad datetime {s:?}: {e}"))
            }),
        (Some(other), v) => Err(DatastoreError::InvalidDocument(format!(
            "{field}: value {v} does not match declared type {other:?}"
        ))),
        // No schema entry: pass scalars through by their own JSON shape.
        (None, Value::Bool(b)) => Ok(DocValue::Bool(b)),
        (None, Value::Number(n)) => {
            if let Some(i) = n.as_i64() {
                Ok(DocValue::Int(i))
            } else {
                n.as_f64()
                    .map(DocValue::Float)
                    .ok_or_else(|| DatastoreError::InvalidDocument(format!("{field}: bad number")))
            }
        }
        (None, Value::String(s)) => Ok(DocValue::Text(s)),
        (None, other) => Err(DatastoreError::InvalidDocument(format!(
            "{field}: unsupported JSON shape {other}"
        ))),
    }
}

pub fn decode_document(json_str: &str, schema: Option<&Schema>) -> DatastoreResult<Document> {
    let value: Value = serde_json::from_str(json_str)
        .map_err(|e| DatastoreError::InvalidDocument(format!("invalid JSON: {e}")))?;
    decode_document_value(value, schema)
}

pub fn decode_document_value(value: Value, schema: Option<&Schema>) -> DatastoreResult<Document> {
    let obj = match value {
        Value::Object(obj) => obj,
        other => {
            return Err(DatastoreError::InvalidDocument(format!(
                "expected a JSON object, got {other}"
            )))
        }
    };

    let mut fields = BTreeMap::new();
    for (k, v) in obj {
        let revived = revive_scalar(&k, v, schema)?;
        fields.insert(k, revived);
    }

    Document::from_fields(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_plain_fields() {
        let mut doc = Document::new("a");
        doc.set("count", DocValue::Int(3));
        doc.set("name", DocValue::Text("hi".to_string()));
        let json = encode_document(&doc);
        let decoded = decode_document(&json, None).unwrap();
        assert_eq!(decoded.id(), "a");
        assert_eq!(decoded.get("count"), Some(&DocValue::Int(3)));
    }

    #[test]
    fn schema_revives_date_fields() {
        let schema = Schema::new().with_field("born", FieldType::Date);
        let json = r#"{"_id":"a","born":"2020-01-02"}"#;
        let decoded = decode_document(json, Some(&schema)).unwrap();
        match decoded.get("born") {
            Some(DocValue::Date(d)) => assert_eq!(d.to_string(), "2020-01-02"),
            other => panic!("expected Date, got {other:?}"),
        }
    }

    #[test]
    fn missing_id_fails_to_decode() {
        assert!(decode_document(r#"{"x":1}"#, None).is_err());
    }
}
