use std::fmt;

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::warn;

use super::dates::{self, DateWarning};
use super::model::{ParsedModel, DEFAULT_DOCUMENT_ID};
use super::shape::{classify_payload, ClassifiedField, Shape};
use crate::document::{Document, DocumentId, FieldValue};

pub const SOURCE_MARKER: &str = "model-injector";

/// Array field name → canonical top-level collection.
const COLLECTION_ALIASES: &[(&str, &str)] = &[
    ("clients", "clients"),
    ("assessments", "assessments"),
    ("questionnaires", "questionnaireTemplates"),
    ("installations", "installations"),
    ("layouts", "layouts"),
    ("recentClients", "clients"),
];

/// Bookkeeping appended to every write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provenance {
    pub injected_at: DateTime<Utc>,
    pub injected_by: String,
    pub source: String,
}

impl Provenance {
    pub fn new(injected_by: impl Into<String>) -> Self {
        Provenance {
            injected_at: Utc::now(),
            injected_by: injected_by.into(),
            source: SOURCE_MARKER.to_string(),
        }
    }

    fn stamp(&self, data: &mut Document) {
        data.insert("_injectedAt".into(), self.injected_at.to_rfc3339().as_str().into());
        data.insert("_injectedBy".into(), self.injected_by.as_str().into());
        data.insert("_source".into(), self.source.as_str().into());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteKind {
    Shared { entity: String },
    ArrayItem { field: String },
    Page,
}

/// One document write, ready for the store.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetWrite {
    pub collection: Vec<String>,
    pub document_id: DocumentId,
    pub data: Document,
    pub merge: bool,
    pub kind: WriteKind,
}

impl TargetWrite {
    pub fn is_shared(&self) -> bool {
        matches!(self.kind, WriteKind::Shared { .. })
    }

    pub fn collection_path(&self) -> String {
        self.collection.join("/")
    }
}

impl fmt::Display for TargetWrite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection_path(), self.document_id)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MappedModel {
    pub writes: Vec<TargetWrite>,
    pub warnings: Vec<DateWarning>,
}

/// Turn a parsed model into ordered writes: shared entities first (merge,
/// under `root`), then either one replace write per array item, or a
/// single page document.
pub fn map_model(model: &ParsedModel, root: &str, provenance: &Provenance) -> MappedModel {
    let mut out = MappedModel::default();

    for entity in &model.shared_entities {
        let mut collection = vec![root.to_string()];
        collection.extend(entity.path_segments());
        let mut data = json_document(&entity.data, false, &mut out.warnings);
        provenance.stamp(&mut data);
        out.writes.push(TargetWrite {
            collection,
            document_id: DocumentId::fixed(DEFAULT_DOCUMENT_ID),
            data,
            merge: true,
            kind: WriteKind::Shared {
                entity: entity.name.clone(),
            },
        });
    }

    let fields = classify_payload(&model.payload);
    let arrays: Vec<&ClassifiedField> = fields
        .iter()
        .filter(|f| f.shape == Shape::ArrayOfObjects)
        .collect();

    if !arrays.is_empty() {
        // Scalar and object siblings are derived values; only arrays are written.
        for field in arrays {
            let collection = array_collection(field.name, &model.collection_name);
            let Value::Array(items) = field.value else {
                continue;
            };
            for item in items.iter().filter_map(Value::as_object) {
                let mut data = json_document(item, true, &mut out.warnings);
                data.remove("id");
                provenance.stamp(&mut data);
                out.writes.push(TargetWrite {
                    collection: vec![collection.clone()],
                    document_id: item_id(item),
                    data,
                    merge: false,
                    kind: WriteKind::ArrayItem {
                        field: field.name.to_string(),
                    },
                });
            }
        }
        return out;
    }

    let has_object = fields.iter().any(|f| f.shape == Shape::SingleObject);
    let mut data = json_document(&model.payload, has_object, &mut out.warnings);
    provenance.stamp(&mut data);
    out.writes.push(TargetWrite {
        collection: vec![model.collection_name.clone()],
        document_id: DocumentId::fixed(model.document_id.clone()),
        data,
        merge: false,
        kind: WriteKind::Page,
    });
    out
}

/// Alias table first, else the field name minus one trailing `s`. A declared
/// collection that is itself an alias target wins over both.
pub fn array_collection(field: &str, declared: &str) -> String {
    let derived = COLLECTION_ALIASES
        .iter()
        .find(|(alias, _)| *alias == field)
        .map(|(_, target)| target.to_string())
        .unwrap_or_else(|| field.strip_suffix('s').unwrap_or(field).to_string());

    if COLLECTION_ALIASES.iter().any(|(_, target)| *target == declared) {
        if declared != derived {
            warn!(
                field,
                derived = %derived,
                declared,
                "declared collection overrides the collection derived for this array field"
            );
        }
        return declared.to_string();
    }
    derived
}

fn item_id(item: &Map<String, Value>) -> DocumentId {
    match item.get("id") {
        Some(Value::String(s)) if !s.is_empty() => DocumentId::fixed(s.clone()),
        Some(Value::Number(n)) if n.as_f64() != Some(0.0) => DocumentId::fixed(n.to_string()),
        _ => DocumentId::Generated,
    }
}

fn json_document(
    source: &Map<String, Value>,
    parse_dates: bool,
    warnings: &mut Vec<DateWarning>,
) -> Document {
    source
        .iter()
        .map(|(key, value)| {
            let field = match value {
                Value::String(raw) if parse_dates && dates::is_date_field(key) => {
                    match dates::parse_datetime(raw) {
                        Some(at) => FieldValue::timestamp(at),
                        None => {
                            warnings.push(DateWarning {
                                field: key.clone(),
                                raw: raw.clone(),
                            });
                            FieldValue::Json(value.clone())
                        }
                    }
                }
                _ => FieldValue::Json(value.clone()),
            };
            (key.clone(), field)
        })
        .collect()
}
