//! Front-matter block reader/writer.
//!
//! Contact documents open with a `---` delimited YAML mapping. Its entries
//! are exposed as a flat, ordered [`FieldMap`]: scalars as their text, nested
//! values (lists, maps) as their YAML rendering. Entries whose text is left
//! alone are written back with their original YAML value, so a `tags:` list
//! stays a list when only the relationship fields change.

use std::collections::HashMap;

use kinship_core::FieldMap;
use serde_yaml::{Mapping, Value};

use crate::error::{CodecError, Result};

const DELIMITER: &str = "---";

/// A document split into its front-matter fields and the remaining body.
#[derive(Debug, Clone, PartialEq)]
pub struct FrontMatter {
    pub fields: FieldMap,
    /// Everything after the closing delimiter line.
    pub body: String,
    /// Whether the document had a front-matter block at all.
    pub present: bool,
    /// Parsed values by key, reused on render while their text is unchanged.
    original: HashMap<String, Value>,
}

impl FrontMatter {
    /// A fresh block with no parsed history.
    pub fn new(fields: FieldMap, body: impl Into<String>) -> Self {
        Self {
            fields,
            body: body.into(),
            present: true,
            original: HashMap::new(),
        }
    }

    /// Split a document. Text without a closed block is all body.
    pub fn parse(text: &str) -> Result<Self> {
        let Some((inner, body)) = split_block(text) else {
            return Ok(Self {
                fields: FieldMap::new(),
                body: text.to_string(),
                present: false,
                original: HashMap::new(),
            });
        };

        let mut fields = FieldMap::new();
        let mut original = HashMap::new();
        for (key, value) in parse_mapping(inner)? {
            let key = match scalar_text(&key) {
                Ok(key) if !key.trim().is_empty() => key,
                _ => {
                    tracing::debug!(?key, "Skipping front-matter entry with a non-scalar key");
                    continue;
                }
            };
            fields.insert(key.clone(), scalar_text(&value)?);
            original.insert(key, value);
        }

        Ok(Self {
            fields,
            body: body.to_string(),
            present: true,
            original,
        })
    }

    /// Render fields and body back into document text.
    pub fn render(&self) -> Result<String> {
        if !self.present && self.fields.is_empty() {
            return Ok(self.body.clone());
        }

        let mut mapping = Mapping::new();
        for (key, text) in self.fields.iter() {
            let value = match self.original.get(key) {
                Some(value) if matches!(scalar_text(value), Ok(ref t) if t == text) => value.clone(),
                _ => Value::String(text.to_string()),
            };
            mapping.insert(Value::String(key.to_string()), value);
        }
        let inner = if mapping.is_empty() {
            String::new()
        } else {
            serde_yaml::to_string(&mapping).map_err(|e| CodecError::YamlSerialize(e.to_string()))?
        };

        let mut out = String::with_capacity(inner.len() + self.body.len() + 8);
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&inner);
        out.push_str(DELIMITER);
        out.push('\n');
        out.push_str(&self.body);
        Ok(out)
    }

    /// Replace every field, keeping the body.
    pub fn with_fields(mut self, fields: FieldMap) -> Self {
        self.fields = fields;
        self
    }

    /// Replace the body, keeping the fields.
    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }
}

/// Split `text` into the block's inner text and the body after it.
fn split_block(text: &str) -> Option<(&str, &str)> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let first_end = text.find('\n')?;
    if text[..first_end].trim_end() != DELIMITER {
        return None;
    }
    let inner_start = first_end + 1;
    let mut offset = inner_start;
    for line in text[inner_start..].split_inclusive('\n') {
        let trimmed = line.trim_end();
        if trimmed == DELIMITER || trimmed == "..." {
            return Some((&text[inner_start..offset], &text[offset + line.len()..]));
        }
        offset += line.len();
    }
    None
}

fn parse_mapping(inner: &str) -> Result<Mapping> {
    if inner.trim().is_empty() {
        return Ok(Mapping::new());
    }
    match serde_yaml::from_str::<Value>(inner).map_err(|e| CodecError::YamlParse(e.to_string()))? {
        Value::Mapping(mapping) => Ok(mapping),
        Value::Null => Ok(Mapping::new()),
        _ => Err(CodecError::YamlParse("front matter is not a mapping".to_string())),
    }
}

/// The flat text of a YAML value.
fn scalar_text(value: &Value) -> Result<String> {
    match value {
        Value::Null => Ok(String::new()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(s.clone()),
        nested => serde_yaml::to_string(nested)
            .map(|yaml| yaml.trim_end().to_string())
            .map_err(|e| CodecError::YamlSerialize(e.to_string())),
    }
}
