//! Record to message transformation.
//!
//! [`MessageEncoder`] turns one [`Record`] into an [`OutgoingMessage`]: a JSON
//! object payload keyed by the configured column names, and an optional
//! partition key taken from one column. Null columns are written as explicit
//! `null` members, consumers rely on every configured name being present.

use crate::record::Record;
use crate::{Error, Result};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use tracing::trace;

/// A message ready to be published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub key: Option<String>,
    pub payload: String,
}

/// How the partition key of a message is derived from its record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyStrategy {
    /// JSON rendering of the raw value at this column position.
    ColumnIndex(usize),
    #[default]
    None,
}

impl KeyStrategy {
    pub fn from_index(index: Option<usize>) -> Self {
        index.map_or(KeyStrategy::None, KeyStrategy::ColumnIndex)
    }

    pub fn extract_key(&self, record: &Record) -> Result<Option<String>> {
        match self {
            KeyStrategy::ColumnIndex(index) => match record.column(*index) {
                Some(column) if column.is_null() => {
                    trace!("Key column {} is null, sending without key", index);
                    Ok(None)
                }
                Some(column) => Ok(Some(serde_json::to_string(&column.raw_value())?)),
                None => Err(Error::Encoding {
                    index: *index,
                    arity: record.len(),
                }),
            },
            KeyStrategy::None => Ok(None),
        }
    }
}

/// Pure record encoder, owns only the column layout and key strategy.
#[derive(Debug, Clone)]
pub struct MessageEncoder {
    columns: Vec<String>,
    key_strategy: KeyStrategy,
}

impl MessageEncoder {
    /// `key_index` is used as-is when it addresses a configured column and
    /// ignored otherwise.
    pub fn new(columns: Vec<String>, key_index: Option<usize>) -> Self {
        let key_index = key_index.filter(|index| *index < columns.len());
        Self {
            columns,
            key_strategy: KeyStrategy::from_index(key_index),
        }
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.key_strategy
    }

    pub fn encode(&self, record: &Record) -> Result<OutgoingMessage> {
        if record.len() < self.columns.len() {
            return Err(Error::Encoding {
                index: record.len(),
                arity: record.len(),
            });
        }

        let payload = serde_json::to_string(&Payload {
            columns: &self.columns,
            record,
        })?;
        let key = self.key_strategy.extract_key(record)?;

        Ok(OutgoingMessage { key, payload })
    }
}

/// Encodes a single record without keeping an encoder around.
pub fn encode(record: &Record, columns: &[String], key_index: Option<usize>) -> Result<OutgoingMessage> {
    MessageEncoder::new(columns.to_vec(), key_index).encode(record)
}

/// Streams `name: value` pairs in column order, so the output keeps the
/// configured order and never drops null members.
struct Payload<'a> {
    columns: &'a [String],
    record: &'a Record,
}

impl Serialize for Payload<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len()))?;
        for (index, name) in self.columns.iter().enumerate() {
            let value = self.record.column(index).and_then(|column| column.as_string());
            map.serialize_entry(name, &value)?;
        }
        map.end()
    }
}
