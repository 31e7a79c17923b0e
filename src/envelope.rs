//! Metadata wrapper written around every persisted payload.
//!
//! Persisted form: `{"envelope": {"trace_id": <int>, ...}, "content": <payload>}`.
//! The envelope is attached once at persistence time and stripped once at
//! load time, where its keys become constant columns on every row.

use crate::error::Result;
use crate::trace::TraceId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A table row: column name to JSON value, in column order.
pub type Row = Map<String, Value>;

/// Column used when a content item is not itself a JSON object
pub const SCALAR_COLUMN: &str = "value";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct EnvelopeMeta {
    pub trace_id: TraceId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    pub envelope: EnvelopeMeta,
    pub content: Value,
}

impl Envelope {
    pub fn with_fetched_at(mut self, fetched_at: DateTime<Utc>) -> Self {
        self.envelope.fetched_at = Some(fetched_at);
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.envelope.source = Some(source.into());
        self
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }
}

pub fn wrap(trace_id: TraceId, content: Value) -> Envelope {
    Envelope {
        envelope: EnvelopeMeta {
            trace_id,
            fetched_at: None,
            source: None,
        },
        content,
    }
}

/// An object read back from the blob store.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredObject {
    Enveloped { envelope: Map<String, Value>, content: Value },
    Raw(Value),
}

impl StoredObject {
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value))
    }

    /// Objects with exactly an `envelope` object and a `content` key are
    /// treated as enveloped; anything else is a raw API payload.
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(mut map)
                if map.len() == 2
                    && map.get("envelope").map_or(false, Value::is_object)
                    && map.contains_key("content") =>
            {
                let envelope = match map.remove("envelope") {
                    Some(Value::Object(envelope)) => envelope,
                    _ => Map::new(),
                };
                let content = map.remove("content").unwrap_or(Value::Null);
                StoredObject::Enveloped { envelope, content }
            }
            other => StoredObject::Raw(other),
        }
    }
}

impl From<Envelope> for StoredObject {
    fn from(envelope: Envelope) -> Self {
        let meta = match serde_json::to_value(&envelope.envelope) {
            Ok(Value::Object(meta)) => meta,
            _ => Map::new(),
        };
        StoredObject::Enveloped {
            envelope: meta,
            content: envelope.content,
        }
    }
}

/// Tabular form of a stored object.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Unwrapped {
    pub metadata: Map<String, Value>,
    pub rows: Vec<Row>,
}

/// Turns a stored object into rows, broadcasting every envelope key as a
/// constant column. Envelope columns overwrite same-named payload fields.
pub fn unwrap(stored: StoredObject) -> Unwrapped {
    match stored {
        StoredObject::Enveloped { envelope, content } => {
            let mut rows = rows_from_content(content);
            for row in &mut rows {
                for (key, value) in &envelope {
                    row.insert(key.clone(), value.clone());
                }
            }
            Unwrapped {
                metadata: envelope,
                rows,
            }
        }
        StoredObject::Raw(content) => Unwrapped {
            metadata: Map::new(),
            rows: rows_from_content(content),
        },
    }
}

fn rows_from_content(content: Value) -> Vec<Row> {
    match content {
        Value::Null => Vec::new(),
        Value::Array(items) => items.into_iter().map(row_from_item).collect(),
        other => vec![row_from_item(other)],
    }
}

fn row_from_item(item: Value) -> Row {
    match item {
        Value::Object(map) => map,
        other => {
            let mut row = Map::new();
            row.insert(SCALAR_COLUMN.to_string(), other);
            row
        }
    }
}
