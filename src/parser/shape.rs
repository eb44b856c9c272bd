use serde_json::{Map, Value};

/// Placement-relevant shape of a payload field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    /// Non-empty array whose first element is an object.
    ArrayOfObjects,
    SingleObject,
    Scalar,
}

#[derive(Debug, Clone, Copy)]
pub struct ClassifiedField<'a> {
    pub name: &'a str,
    pub value: &'a Value,
    pub shape: Shape,
}

/// Only the first array element is inspected; mixed arrays are not detected.
pub fn classify(value: &Value) -> Shape {
    match value {
        Value::Array(items) if matches!(items.first(), Some(Value::Object(_))) => {
            Shape::ArrayOfObjects
        }
        Value::Object(_) => Shape::SingleObject,
        _ => Shape::Scalar,
    }
}

pub fn classify_payload(payload: &Map<String, Value>) -> Vec<ClassifiedField<'_>> {
    payload
        .iter()
        .map(|(name, value)| ClassifiedField {
            name,
            value,
            shape: classify(value),
        })
        .collect()
}
