use std::collections::{BTreeSet, HashSet};

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::ParseError;

pub const METADATA_KEY: &str = "_metadata";
pub const DEFAULT_DOCUMENT_ID: &str = "main";
const DEFAULT_SHARED_PREFIX: &str = "_shared";

/// One model file after metadata and shared-data extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedModel {
    pub collection_name: String,
    pub document_id: String,
    /// Declared in metadata, carried through untouched.
    pub nested_collections: Map<String, Value>,
    pub shared_entities: Vec<SharedEntity>,
    pub payload: Map<String, Value>,
}

/// A payload fragment routed to a collection shared between models.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedEntity {
    pub name: String,
    pub target_path: String,
    /// Empty means every field of the entity's own object.
    pub fields: BTreeSet<String>,
    pub data: Map<String, Value>,
}

impl SharedEntity {
    /// `_shared/orgs` → `["_shared", "orgs"]`; empty segments are dropped.
    pub fn path_segments(&self) -> Vec<String> {
        self.target_path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Metadata {
    collection_name: Option<String>,
    document_id: Option<DocumentIdValue>,
    #[serde(default)]
    nested_collections: Map<String, Value>,
    #[serde(default)]
    shared_data: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DocumentIdValue {
    Text(String),
    Number(serde_json::Number),
}

impl DocumentIdValue {
    fn into_string(self) -> String {
        match self {
            DocumentIdValue::Text(s) => s,
            DocumentIdValue::Number(n) => n.to_string(),
        }
    }
}

struct SharedDeclaration {
    name: String,
    collection: String,
    fields: BTreeSet<String>,
}

impl Metadata {
    fn read(value: Option<&Value>) -> Result<Self, ParseError> {
        match value {
            None => Ok(Metadata::default()),
            Some(v @ Value::Object(_)) => {
                Metadata::deserialize(v).map_err(|e| ParseError::Metadata(e.to_string()))
            }
            Some(_) => Err(ParseError::Metadata("expected an object".into())),
        }
    }

    /// Entity configs that are not objects are ignored, as are non-string
    /// entries in `fields`.
    fn shared_declarations(&self) -> Vec<SharedDeclaration> {
        self.shared_data
            .iter()
            .filter_map(|(name, config)| {
                let config = config.as_object()?;
                let collection = config
                    .get("collection")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| format!("{}/{}", DEFAULT_SHARED_PREFIX, name));
                let fields = config
                    .get("fields")
                    .and_then(Value::as_array)
                    .map(|items| {
                        items
                            .iter()
                            .filter_map(Value::as_str)
                            .map(str::to_string)
                            .collect()
                    })
                    .unwrap_or_default();
                Some(SharedDeclaration {
                    name: name.clone(),
                    collection,
                    fields,
                })
            })
            .collect()
    }
}

/// Parse raw model JSON. `default_collection` comes from the file's
/// directory and is replaced by `_metadata.collectionName` when present.
///
/// The input object is only read: shared entities and the payload are
/// built as new maps, and a field claimed by one entity is never claimed
/// again nor left in the payload.
pub fn parse_model(raw: &[u8], default_collection: &str) -> Result<ParsedModel, ParseError> {
    let value: Value = serde_json::from_slice(raw)?;
    let Value::Object(root) = value else {
        return Err(ParseError::NotAnObject);
    };

    let metadata = Metadata::read(root.get(METADATA_KEY))?;

    let collection_name = match &metadata.collection_name {
        Some(name) if name.trim().is_empty() => {
            return Err(ParseError::Metadata("collectionName is empty".into()));
        }
        Some(name) => name.clone(),
        None => default_collection.to_string(),
    };

    let mut claimed: HashSet<&str> = HashSet::new();
    claimed.insert(METADATA_KEY);

    let mut shared_entities = Vec::new();
    for decl in metadata.shared_declarations() {
        let mut data = Map::new();

        for field in &decl.fields {
            if claimed.contains(field.as_str()) {
                continue;
            }
            if let Some((key, value)) = root.get_key_value(field.as_str()) {
                data.insert(key.clone(), value.clone());
                claimed.insert(key.as_str());
            }
        }

        if !claimed.contains(decl.name.as_str()) {
            if let Some((key, Value::Object(object))) = root.get_key_value(decl.name.as_str()) {
                for (k, v) in object {
                    if decl.fields.is_empty() || decl.fields.contains(k) {
                        data.insert(k.clone(), v.clone());
                    }
                }
                claimed.insert(key.as_str());
            }
        }

        if data.is_empty() {
            debug!(entity = %decl.name, "shared entity declared but no data matched");
            continue;
        }

        shared_entities.push(SharedEntity {
            name: decl.name,
            target_path: decl.collection,
            fields: decl.fields,
            data,
        });
    }

    let payload = root
        .iter()
        .filter(|(key, _)| !claimed.contains(key.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    Ok(ParsedModel {
        collection_name,
        document_id: metadata
            .document_id
            .map(DocumentIdValue::into_string)
            .unwrap_or_else(|| DEFAULT_DOCUMENT_ID.to_string()),
        nested_collections: metadata.nested_collections,
        shared_entities,
        payload,
    })
}
