//! The block document persisted on a branch and mirrored into chat.
//!
//! The on-disk form is a bare JSON array of blocks, no envelope. Blocks and
//! fields carry rendering metadata this crate does not model (`"type"`,
//! `"accessory"`, `"emoji"`, ...). Each block and field keeps its whole JSON
//! object, so keys come back in the order they were read, explicit `null`s
//! included, and a mutation diff touches only the rewritten text.

use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::selector::{BlockSelector, FieldIndex};

const BLOCK_ID: &str = "block_id";
const FIELDS: &str = "fields";
const TEXT: &str = "text";

/// Errors from parsing or serializing a [`Document`].
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("malformed document: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("failed to serialize document: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// One text slot within a block.
///
/// Slots alternate label/value: even indices are labels, odd indices are the
/// values that updates rewrite.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Field(Map<String, Value>);

impl Field {
    /// A field with text and no other keys.
    pub fn new(text: impl Into<String>) -> Self {
        let mut map = Map::new();
        map.insert(TEXT.to_string(), Value::String(text.into()));
        Self(map)
    }

    /// The `text` key when it holds a string.
    pub fn text(&self) -> Option<&str> {
        self.0.get(TEXT).and_then(Value::as_str)
    }

    /// Current text, or `""` when the slot has none.
    pub fn text_or_empty(&self) -> &str {
        self.text().unwrap_or("")
    }

    /// Replace the text, keeping the key where it was.
    pub fn set_text(&mut self, text: impl Into<String>) {
        self.0.insert(TEXT.to_string(), Value::String(text.into()));
    }

    /// Raw value of any key, e.g. `"type"`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }
}

/// A named group of label/value field pairs.
///
/// `fields` is parsed out of `entries` so mutations can work on typed
/// slots. While it is `Some`, the `"fields"` entry is a placeholder that
/// marks where the array is written back.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(try_from = "Map<String, Value>")]
pub struct Block {
    entries: Map<String, Value>,
    fields: Option<Vec<Field>>,
}

impl Block {
    /// A block with an id and the given fields.
    pub fn new(block_id: impl Into<String>, fields: Vec<Field>) -> Self {
        Self::with_id(block_id).with_fields(fields)
    }

    /// A block with only an id.
    pub fn with_id(block_id: impl Into<String>) -> Self {
        let mut entries = Map::new();
        entries.insert(BLOCK_ID.to_string(), Value::String(block_id.into()));
        Self {
            entries,
            fields: None,
        }
    }

    /// Build a block from alternating label/value pairs.
    pub fn with_pairs<'a>(
        block_id: impl Into<String>,
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
    ) -> Self {
        let fields = pairs
            .into_iter()
            .flat_map(|(label, value)| [Field::new(label), Field::new(value)])
            .collect();
        Self::new(block_id, fields)
    }

    /// Replace the field list.
    pub fn with_fields(mut self, fields: Vec<Field>) -> Self {
        if !self.entries.contains_key(FIELDS) {
            self.entries.insert(FIELDS.to_string(), Value::Null);
        }
        self.fields = Some(fields);
        self
    }

    /// Set an uninterpreted key, e.g. `"type"`.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        let key = key.into();
        if key == FIELDS {
            self.fields = None;
        }
        self.entries.insert(key, value);
        self
    }

    /// The block id, if any.
    pub fn id(&self) -> Option<&str> {
        self.entries.get(BLOCK_ID).and_then(Value::as_str)
    }

    pub fn fields(&self) -> Option<&[Field]> {
        self.fields.as_deref()
    }

    pub fn fields_mut(&mut self) -> Option<&mut [Field]> {
        self.fields.as_deref_mut()
    }

    /// Raw value of any key other than `"fields"`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match key {
            FIELDS if self.fields.is_some() => None,
            _ => self.entries.get(key),
        }
    }

    /// Text of the value slot for field pair `pair`, if present.
    pub fn value(&self, pair: usize) -> Option<&str> {
        self.fields()?
            .get(FieldIndex::value_slot(pair)?)
            .and_then(Field::text)
    }
}

impl TryFrom<Map<String, Value>> for Block {
    type Error = serde_json::Error;

    fn try_from(mut entries: Map<String, Value>) -> Result<Self, Self::Error> {
        match entries.get(BLOCK_ID) {
            None | Some(Value::Null | Value::String(_)) => {}
            Some(other) => {
                return Err(serde_json::Error::custom(format!(
                    "block_id must be a string, got {other}"
                )));
            }
        }

        let fields = match entries.get_mut(FIELDS) {
            Some(slot @ Value::Array(_)) => Some(serde_json::from_value(slot.take())?),
            None | Some(Value::Null) => None,
            Some(other) => {
                return Err(serde_json::Error::custom(format!(
                    "fields must be an array, got {other}"
                )));
            }
        };
        Ok(Self { entries, fields })
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            match &self.fields {
                Some(fields) if key == FIELDS => map.serialize_entry(key, fields)?,
                _ => map.serialize_entry(key, value)?,
            }
        }
        map.end()
    }
}

/// An ordered sequence of blocks.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document {
    blocks: Vec<Block>,
}

impl Document {
    pub fn new(blocks: Vec<Block>) -> Self {
        Self { blocks }
    }

    /// Parse the persisted JSON form.
    pub fn from_json(json: &str) -> Result<Self, DocumentError> {
        serde_json::from_str(json).map_err(DocumentError::Parse)
    }

    /// Convert an already-parsed JSON value (e.g. a chat API response).
    pub fn from_value(value: Value) -> Result<Self, DocumentError> {
        serde_json::from_value(value).map_err(DocumentError::Parse)
    }

    /// Pretty-printed JSON with two-space indentation (the on-disk format).
    pub fn to_json_pretty(&self) -> Result<String, DocumentError> {
        serde_json::to_string_pretty(self).map_err(DocumentError::Serialize)
    }

    /// The document as a JSON value, for embedding in API payloads.
    pub fn to_value(&self) -> Result<Value, DocumentError> {
        serde_json::to_value(self).map_err(DocumentError::Serialize)
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn blocks_mut(&mut self) -> &mut [Block] {
        &mut self.blocks
    }

    pub fn into_blocks(self) -> Vec<Block> {
        self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// First block whose id equals `block_id`.
    pub fn find(&self, block_id: &str) -> Option<&Block> {
        self.blocks.iter().find(|b| b.id() == Some(block_id))
    }

    /// Indices of every block the selector matches, in document order.
    ///
    /// Blocks without an id never match.
    pub fn select(&self, selector: &BlockSelector) -> Vec<usize> {
        self.blocks
            .iter()
            .enumerate()
            .filter_map(|(i, block)| match block.id() {
                Some(id) if selector.matches(id) => Some(i),
                _ => None,
            })
            .collect()
    }
}

impl From<Vec<Block>> for Document {
    fn from(blocks: Vec<Block>) -> Self {
        Self::new(blocks)
    }
}
