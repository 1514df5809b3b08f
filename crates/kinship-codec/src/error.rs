//! Error types for the kinship-codec crate.
//!
//! Most describe a single malformed entry, which whole-document decoders
//! skip and carry on from. A front-matter block that is not valid YAML
//! fails the whole document.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("Not a relationship field: {key}")]
    NotRelationshipKey { key: String },

    #[error("Malformed relationship key: {key}")]
    MalformedKey { key: String },

    #[error("Malformed relationship reference '{value}': {reason}")]
    MalformedReference { value: String, reason: String },

    #[error("Invalid revision timestamp: {0}")]
    InvalidRevision(String),

    #[error("Front matter is not valid YAML: {0}")]
    YamlParse(String),

    #[error("Cannot write front matter: {0}")]
    YamlSerialize(String),
}

pub type Result<T> = std::result::Result<T, CodecError>;
