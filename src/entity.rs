//! The entity-graph data model surface this crate needs: entities, the
//! row-shaped bridge type, continuation tokens and namespace contexts.
//!
//! A real deployment would pull these from the host's wire-format crate;
//! here they are small, self-contained stand-ins with just the shape the
//! read/write pipelines require.

use std::collections::HashMap;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A URI-identified entity with typed properties and references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Entity {
    pub id: String,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
    #[serde(default)]
    pub references: HashMap<String, String>,
    #[serde(default)]
    pub deleted: bool,
    #[serde(default)]
    pub recorded: Option<u64>,
}

impl Entity {
    pub fn new(id: impl Into<String>) -> Self {
        Entity {
            id: id.into(),
            ..Default::default()
        }
    }
}

/// An ordered column/value bridge between SQL rows and entities.
///
/// Used both as the scan target for a read (columns populated up front,
/// values filled in by the row decoder) and as the formatting source for a
/// write (columns/values appended by the incoming mapper).
#[derive(Debug, Clone, Default)]
pub struct RowItem {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
    pub map: HashMap<String, Value>,
    pub deleted: bool,
}

impl RowItem {
    pub fn new() -> Self {
        RowItem::default()
    }

    pub fn get_value(&self, name: &str) -> Option<&Value> {
        self.map.get(name)
    }

    pub fn set_value(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        self.columns.push(name.clone());
        self.values.push(value.clone());
        self.map.insert(name, value);
    }
}

/// An opaque, URL-safe-base64-encoded snapshot of `MAX(since_column)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Continuation {
    pub token: String,
}

impl Continuation {
    pub fn empty() -> Self {
        Continuation::default()
    }

    pub fn encode(raw_max_since: &str) -> Self {
        Continuation {
            token: URL_SAFE_NO_PAD.encode(raw_max_since.as_bytes()),
        }
    }

    pub fn decode(&self) -> Result<String, base64::DecodeError> {
        let bytes = URL_SAFE_NO_PAD.decode(&self.token)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    pub fn is_empty(&self) -> bool {
        self.token.is_empty()
    }
}

/// The mapper has already expanded every URI before producing entities, so
/// the namespace context handed back to a caller is always empty.
#[derive(Debug, Clone, Default)]
pub struct NamespaceContext;
