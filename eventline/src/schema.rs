//! Event schema documents.
//!
//! Each document describes one event type and optionally contributes shared
//! sub-schema definitions:
//!
//! ```json
//! {
//!   "event": {
//!     "type": "user:created",
//!     "data": { "type": "object", "properties": { "name": { "$ref": "#/definitions/name" } } },
//!     "meta": { "type": "object" }
//!   },
//!   "definitions": {
//!     "name": { "type": "object" }
//!   }
//! }
//! ```
//!
//! `data` and `meta` follow JSON Schema Draft-04 but are carried here as raw
//! values: compiling them into validators is the schema-compiler
//! collaborator's job. [`SchemaSet`] parses a collection of documents into
//! the declared event set and per-type schemas with the shared definitions
//! resolved across all files. Duplicate event types and duplicate definition
//! keys are fatal configuration errors.

use std::collections::{BTreeMap, BTreeSet};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::{ConfigError, ConfigResult};
use crate::types::EventType;

#[derive(Debug, Deserialize)]
struct SchemaDocument {
    event: EventSchema,
    #[serde(default)]
    definitions: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct EventSchema {
    #[serde(rename = "type")]
    event_type: String,
    data: Option<Value>,
    meta: Option<Value>,
}

/// The parsed union of a set of event schema documents.
///
/// Holds the closed event set and, per type, the raw data/meta schemas with
/// all shared definitions injected under their `definitions` key, ready to be
/// handed to a schema compiler.
#[derive(Debug, Clone, Default)]
pub struct SchemaSet {
    types: BTreeSet<EventType>,
    data: BTreeMap<EventType, Value>,
    meta: BTreeMap<EventType, Value>,
    definitions: Map<String, Value>,
}

impl SchemaSet {
    /// Parses a collection of schema documents.
    ///
    /// Definitions are collected across all documents first, then injected
    /// into every schema, so a `$ref` in one file may point at a definition
    /// contributed by another.
    ///
    /// # Errors
    ///
    /// - [`ConfigError::MalformedSchema`] if a document does not have the
    ///   `{ event: { type, data?, meta? }, definitions? }` shape or its type
    ///   tag is not a valid [`EventType`].
    /// - [`ConfigError::DuplicateEventType`] if two documents declare the
    ///   same type.
    /// - [`ConfigError::DuplicateDefinition`] if two documents contribute
    ///   the same definition key.
    pub fn from_documents<I>(documents: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = Value>,
    {
        let mut parsed = Vec::new();
        let mut definitions = Map::new();

        for document in documents {
            let document: SchemaDocument = serde_json::from_value(document)
                .map_err(|e| ConfigError::MalformedSchema(e.to_string()))?;
            for (key, value) in document.definitions.clone() {
                if definitions.insert(key.clone(), value).is_some() {
                    return Err(ConfigError::DuplicateDefinition(key));
                }
            }
            parsed.push(document);
        }

        let mut set = Self {
            definitions,
            ..Self::default()
        };

        for document in parsed {
            let event_type = EventType::try_new(&document.event.event_type)
                .map_err(|e| ConfigError::MalformedSchema(e.to_string()))?;
            if !set.types.insert(event_type.clone()) {
                return Err(ConfigError::DuplicateEventType(event_type));
            }
            if let Some(schema) = document.event.data {
                let schema = set.with_definitions(schema);
                set.data.insert(event_type.clone(), schema);
            }
            if let Some(schema) = document.event.meta {
                let schema = set.with_definitions(schema);
                set.meta.insert(event_type.clone(), schema);
            }
        }

        Ok(set)
    }

    fn with_definitions(&self, schema: Value) -> Value {
        if self.definitions.is_empty() {
            return schema;
        }
        match schema {
            Value::Object(mut object) => {
                let target = object
                    .entry("definitions")
                    .or_insert_with(|| Value::Object(Map::new()));
                if let Value::Object(existing) = target {
                    for (key, value) in &self.definitions {
                        existing.entry(key.clone()).or_insert_with(|| value.clone());
                    }
                }
                Value::Object(object)
            }
            other => other,
        }
    }

    /// The declared event types, in sorted order.
    pub fn event_types(&self) -> impl Iterator<Item = &EventType> {
        self.types.iter()
    }

    /// Whether a type is declared by this set.
    pub fn contains(&self, event_type: &EventType) -> bool {
        self.types.contains(event_type)
    }

    /// The data schema for a type, with shared definitions injected.
    pub fn data_schema(&self, event_type: &EventType) -> Option<&Value> {
        self.data.get(event_type)
    }

    /// The meta schema for a type, with shared definitions injected.
    pub fn meta_schema(&self, event_type: &EventType) -> Option<&Value> {
        self.meta.get(event_type)
    }

    /// The shared definitions merged from all documents.
    pub fn definitions(&self) -> &Map<String, Value> {
        &self.definitions
    }
}
