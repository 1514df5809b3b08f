//! External contact records.
//!
//! A record is a flat field map, the same shape as a document's front
//! matter. The JSON codec reads an array of objects (or a single object)
//! and writes an array.

use std::fmt;

use kinship_core::FieldMap;
use serde::de::{Deserializer, MapAccess, Visitor};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RecordError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Expected an object or an array of objects, found {0}")]
    UnexpectedShape(&'static str),
}

/// Reads and writes batches of contact records.
pub trait RecordCodec {
    fn parse(&self, text: &str) -> Result<Vec<FieldMap>, RecordError>;

    fn serialize(&self, records: &[FieldMap]) -> Result<String, RecordError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonRecordCodec {
    pub pretty: bool,
}

impl JsonRecordCodec {
    pub fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl RecordCodec for JsonRecordCodec {
    fn parse(&self, text: &str) -> Result<Vec<FieldMap>, RecordError> {
        match serde_json::from_str::<Batch>(text) {
            Ok(Batch::Many(records)) => Ok(records.into_iter().map(|r| r.0).collect()),
            Ok(Batch::One(record)) => Ok(vec![record.0]),
            Err(e) => match serde_json::from_str::<Value>(text) {
                Ok(value) => Err(RecordError::UnexpectedShape(shape_of(&value))),
                Err(_) => Err(RecordError::Json(e)),
            },
        }
    }

    fn serialize(&self, records: &[FieldMap]) -> Result<String, RecordError> {
        let text = if self.pretty {
            serde_json::to_string_pretty(records)?
        } else {
            serde_json::to_string(records)?
        };
        Ok(text)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Batch {
    Many(Vec<RawRecord>),
    One(RawRecord),
}

/// One record in document order. Scalars become strings; nulls and nested
/// values are dropped.
struct RawRecord(FieldMap);

impl<'de> Deserialize<'de> for RawRecord {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct RecordVisitor;

        impl<'de> Visitor<'de> for RecordVisitor {
            type Value = RawRecord;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a contact record object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<RawRecord, A::Error> {
                let mut record = FieldMap::new();
                while let Some((key, value)) = access.next_entry::<String, Value>()? {
                    let text = match value {
                        Value::String(s) => s,
                        Value::Number(n) => n.to_string(),
                        Value::Bool(b) => b.to_string(),
                        Value::Null => continue,
                        nested => {
                            tracing::debug!(field = %key, kind = kind_of(&nested), "Dropping nested record field");
                            continue;
                        }
                    };
                    record.insert(key, text);
                }
                Ok(RawRecord(record))
            }
        }

        deserializer.deserialize_map(RecordVisitor)
    }
}

/// What made a document something other than a record batch.
fn shape_of(value: &Value) -> &'static str {
    match value {
        Value::Array(items) => items
            .iter()
            .find(|item| !item.is_object())
            .map(|item| kind_of(item))
            .unwrap_or("array"),
        other => kind_of(other),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_array_and_single_object() {
        let codec = JsonRecordCodec::default();
        let records = codec
            .parse(r#"[{"UID": "u-1", "FN": "Jane"}, {"FN": "Bob", "AGE": 40, "VIP": true, "X": null}]"#)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get("UID"), Some("u-1"));
        assert_eq!(records[1].get("AGE"), Some("40"));
        assert_eq!(records[1].get("VIP"), Some("true"));
        assert!(!records[1].contains_key("X"));

        let single = codec.parse(r#"{"FN": "Solo"}"#).unwrap();
        assert_eq!(single[0].get("FN"), Some("Solo"));
    }

    #[test]
    fn test_rejects_other_shapes() {
        let codec = JsonRecordCodec::default();
        assert!(matches!(codec.parse("42"), Err(RecordError::UnexpectedShape("number"))));
        assert!(matches!(codec.parse("[1]"), Err(RecordError::UnexpectedShape("number"))));
        assert!(matches!(codec.parse("{"), Err(RecordError::Json(_))));
    }

    #[test]
    fn test_serialize_keeps_field_order() {
        let record: FieldMap = [("UID", "u-1"), ("FN", "Jane"), ("RELATED[friend]", "name:Bob")]
            .into_iter()
            .collect();
        let text = JsonRecordCodec::default().serialize(&[record.clone()]).unwrap();
        assert_eq!(text, r#"[{"UID":"u-1","FN":"Jane","RELATED[friend]":"name:Bob"}]"#);
        assert_eq!(JsonRecordCodec::pretty().parse(&text).unwrap(), vec![record]);
    }
}
