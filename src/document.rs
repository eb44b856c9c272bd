//! Values as the document store sees them.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One document: field name → value, in deterministic key order.
pub type Document = BTreeMap<String, FieldValue>;

/// A stored field. Plain JSON, or the store's native temporal type.
///
/// On the wire a timestamp is exactly `{"$timestamp": "<RFC 3339>"}`, so that
/// shape is reserved: a domain object holding only a `$timestamp` key with
/// RFC 3339 text reads back as a `Timestamp`. Any other key, or text that is
/// not RFC 3339, keeps the object as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Timestamp(Timestamp),
    Json(Value),
}

/// Serialized as `{"$timestamp": "<RFC 3339>"}` so it survives a JSON round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Timestamp {
    #[serde(rename = "$timestamp")]
    pub at: DateTime<Utc>,
}

#[allow(dead_code)]
impl FieldValue {
    pub fn timestamp(at: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(Timestamp { at })
    }

    pub fn as_json(&self) -> Option<&Value> {
        match self {
            FieldValue::Json(v) => Some(v),
            FieldValue::Timestamp(_) => None,
        }
    }

    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            FieldValue::Timestamp(t) => Some(t.at),
            FieldValue::Json(_) => None,
        }
    }
}

impl From<Value> for FieldValue {
    fn from(v: Value) -> Self {
        FieldValue::Json(v)
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Json(Value::String(s.to_string()))
    }
}

/// Lift a JSON object into a document without touching any value.
pub fn document_from_json(map: &Map<String, Value>) -> Document {
    map.iter()
        .map(|(k, v)| (k.clone(), FieldValue::Json(v.clone())))
        .collect()
}

/// Merge-write semantics: nested objects merge key by key, everything else
/// is replaced. Fields of `existing` absent from `incoming` are kept.
pub fn merge_documents(existing: &mut Document, incoming: &Document) {
    for (key, value) in incoming {
        match (existing.get_mut(key), value) {
            (Some(FieldValue::Json(Value::Object(old))), FieldValue::Json(Value::Object(new))) => {
                merge_objects(old, new);
            }
            _ => {
                existing.insert(key.clone(), value.clone());
            }
        }
    }
}

fn merge_objects(existing: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        match (existing.get_mut(key), value) {
            (Some(Value::Object(old)), Value::Object(new)) => merge_objects(old, new),
            _ => {
                existing.insert(key.clone(), value.clone());
            }
        }
    }
}

/// Document key of a write. `Generated` is resolved by the store at
/// execution time so mapping stays deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocumentId {
    Fixed(String),
    Generated,
}

impl DocumentId {
    pub fn fixed(id: impl Into<String>) -> Self {
        DocumentId::Fixed(id.into())
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentId::Fixed(id) => f.write_str(id),
            DocumentId::Generated => f.write_str("<generated>"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        document_from_json(v.as_object().unwrap())
    }

    #[test]
    fn timestamp_round_trips_through_json() {
        let at = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let mut d = Document::new();
        d.insert("createdAt".into(), FieldValue::timestamp(at));
        d.insert("name".into(), "Acme".into());

        let text = serde_json::to_string(&d).unwrap();
        assert!(text.contains("\"$timestamp\""));
        let back: Document = serde_json::from_str(&text).unwrap();
        assert_eq!(back, d);
        assert_eq!(back["createdAt"].as_timestamp(), Some(at));
    }

    #[test]
    fn object_with_extra_keys_is_not_a_timestamp() {
        let v: FieldValue =
            serde_json::from_value(json!({"$timestamp": "2024-01-01T00:00:00Z", "x": 1})).unwrap();
        assert!(v.as_json().is_some());
    }

    #[test]
    fn reserved_timestamp_shape() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let lone: FieldValue =
            serde_json::from_value(json!({"$timestamp": "2024-01-01T00:00:00Z"})).unwrap();
        assert_eq!(lone.as_timestamp(), Some(at));

        let not_a_date: FieldValue =
            serde_json::from_value(json!({"$timestamp": "yesterday"})).unwrap();
        assert_eq!(not_a_date.as_json(), Some(&json!({"$timestamp": "yesterday"})));
    }

    #[test]
    fn merge_keeps_untouched_fields_and_merges_nested_maps() {
        let mut existing = doc(json!({
            "name": "Old",
            "keep": true,
            "address": {"city": "Paris", "zip": "75001"}
        }));
        let incoming = doc(json!({
            "name": "New",
            "address": {"city": "Lyon"}
        }));
        merge_documents(&mut existing, &incoming);

        assert_eq!(
            existing,
            doc(json!({
                "name": "New",
                "keep": true,
                "address": {"city": "Lyon", "zip": "75001"}
            }))
        );
    }

    #[test]
    fn merge_replaces_non_object_with_object() {
        let mut existing = doc(json!({"tags": ["a"]}));
        merge_documents(&mut existing, &doc(json!({"tags": {"a": 1}})));
        assert_eq!(existing, doc(json!({"tags": {"a": 1}})));
    }

    #[test]
    fn document_id_display() {
        assert_eq!(DocumentId::fixed("c1").to_string(), "c1");
        assert_eq!(DocumentId::Generated.to_string(), "<generated>");
    }
}
