//! Core domain types for the contact relationship graph.
//!
//! These types are shared by the graph, the codecs and the sync coordinator.
//! Relationship kinds are always stored in canonical, genderless form
//! ("parent", "auncle"); gendered terms exist only at the edges of the system.

use std::fmt;
use std::str::FromStr;

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::KinshipError;

// ── Contacts ──────────────────────────────────────────────────────

const NAME_ID_PREFIX: &str = "name:";

/// Identifier of a contact node.
///
/// Either a stable UID taken from a contact document, or a synthetic id
/// derived from a display name (`name:<display name>`) for contacts that are
/// only known by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContactId(pub String);

impl ContactId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Id from a document's UID field.
    ///
    /// A leading `urn:uuid:` is stripped and UUIDs are lowercased so the same
    /// contact is keyed identically however its UID was spelled.
    pub fn from_uid(raw: &str) -> Self {
        let raw = raw.trim();
        let bare = match raw.get(..9) {
            Some(prefix) if prefix.eq_ignore_ascii_case("urn:uuid:") => &raw[9..],
            _ => raw,
        };
        match Uuid::parse_str(bare) {
            Ok(uuid) => Self(uuid.hyphenated().to_string()),
            Err(_) => Self(bare.to_string()),
        }
    }

    /// Synthetic id for a contact addressed only by display name.
    pub fn from_name(name: &str) -> Self {
        Self(format!("{NAME_ID_PREFIX}{}", name.trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether this id was derived from a display name.
    pub fn is_name_based(&self) -> bool {
        self.0.starts_with(NAME_ID_PREFIX)
    }

    /// The display name a name-derived id was built from.
    pub fn name_part(&self) -> Option<&str> {
        self.0.strip_prefix(NAME_ID_PREFIX)
    }

    /// Whether the id has UUID syntax.
    pub fn is_uuid(&self) -> bool {
        Uuid::parse_str(&self.0).is_ok()
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Gender of a contact, used to render gendered relationship terms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Gender {
    #[serde(rename = "M")]
    Male,
    #[serde(rename = "F")]
    Female,
    #[serde(rename = "NB")]
    NonBinary,
}

impl Gender {
    /// Short code as written in front matter.
    pub fn code(&self) -> &'static str {
        match self {
            Gender::Male => "M",
            Gender::Female => "F",
            Gender::NonBinary => "NB",
        }
    }
}

impl FromStr for Gender {
    type Err = KinshipError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "m" | "male" => Ok(Gender::Male),
            "f" | "female" => Ok(Gender::Female),
            "nb" | "n" | "o" | "nonbinary" | "non-binary" => Ok(Gender::NonBinary),
            _ => Err(KinshipError::InvalidGender(s.to_string())),
        }
    }
}

impl fmt::Display for Gender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// A contact in the relationship graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContactNode {
    pub id: ContactId,
    pub display_name: String,
    pub gender: Option<Gender>,
}

// ── Edges ─────────────────────────────────────────────────────────

/// A typed, directed relationship. `kind` is always canonical.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RelationshipEdge {
    pub source_id: ContactId,
    pub target_id: ContactId,
    pub kind: String,
}

/// How a relationship target is addressed in front matter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "kebab-case")]
pub enum RefNamespace {
    Uuid,
    OpaqueId,
    Name,
}

/// A relationship target reference: `urn:uuid:<v>`, `uid:<v>` or `name:<v>`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Reference {
    pub namespace: RefNamespace,
    pub value: String,
}

impl Reference {
    pub fn uuid(value: impl Into<String>) -> Self {
        Self {
            namespace: RefNamespace::Uuid,
            value: value.into(),
        }
    }

    pub fn opaque(value: impl Into<String>) -> Self {
        Self {
            namespace: RefNamespace::OpaqueId,
            value: value.into(),
        }
    }

    pub fn name(value: impl Into<String>) -> Self {
        Self {
            namespace: RefNamespace::Name,
            value: value.into(),
        }
    }

    /// The value as written in a `RELATED` field.
    pub fn encode(&self) -> String {
        match self.namespace {
            RefNamespace::Uuid => format!("urn:uuid:{}", self.value),
            RefNamespace::OpaqueId => format!("uid:{}", self.value),
            RefNamespace::Name => format!("name:{}", self.value),
        }
    }

    pub fn is_name(&self) -> bool {
        self.namespace == RefNamespace::Name
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

/// An outgoing relationship rendered for display and encoding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Relationship {
    pub target_id: ContactId,
    pub target_name: String,
    /// Canonical genderless kind.
    pub kind: String,
    /// Kind rendered against the target's gender ("mother", "aunt/uncle").
    pub display_kind: String,
    pub reference: Reference,
}

// ── Sync operations ───────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Add,
    Remove,
}

/// One edge change produced by diffing a decoded representation against the graph.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct SyncOperation {
    pub kind: OperationKind,
    pub source_id: ContactId,
    /// A contact id, or a display name when `is_name_based`.
    pub target: String,
    /// Relationship term as decoded; may be gendered.
    pub relationship_kind: String,
    pub is_name_based: bool,
}

impl SyncOperation {
    pub fn add(source_id: ContactId, target: &Reference, relationship_kind: &str) -> Self {
        Self {
            kind: OperationKind::Add,
            source_id,
            target: target.value.clone(),
            relationship_kind: relationship_kind.to_string(),
            is_name_based: target.is_name(),
        }
    }

    pub fn remove(source_id: ContactId, target_id: &ContactId, relationship_kind: &str) -> Self {
        Self {
            kind: OperationKind::Remove,
            source_id,
            target: target_id.0.clone(),
            relationship_kind: relationship_kind.to_string(),
            is_name_based: false,
        }
    }
}

// ── Field maps ────────────────────────────────────────────────────

/// Insertion-ordered map of front-matter fields with unique keys.
///
/// Order is preserved because it becomes document text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldMap {
    entries: Vec<(String, String)>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Case-insensitive lookup, used for vCard-style property names.
    pub fn get_ignore_case(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.iter().any(|(k, _)| k == key)
    }

    /// Insert or replace in place. Returns the previous value.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, existing)) => Some(std::mem::replace(existing, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.entries.retain(|(k, v)| keep(k, v));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.entries.iter().position(|(k, _)| k == key)
    }

    /// Insert entries at `index`, replacing any existing entries with the same keys.
    pub fn splice_at(&mut self, index: usize, entries: impl IntoIterator<Item = (String, String)>) {
        let incoming: Vec<(String, String)> = entries.into_iter().collect();
        let mut index = index.min(self.entries.len());
        for (key, _) in &incoming {
            if let Some(pos) = self.position(key) {
                self.entries.remove(pos);
                if pos < index {
                    index -= 1;
                }
            }
        }
        for (offset, entry) in incoming.into_iter().enumerate() {
            self.entries.insert(index + offset, entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for FieldMap {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = FieldMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}

impl Serialize for FieldMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for FieldMap {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct FieldMapVisitor;

        impl<'de> Visitor<'de> for FieldMapVisitor {
            type Value = FieldMap;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of string fields")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<FieldMap, A::Error> {
                let mut map = FieldMap::new();
                while let Some((key, value)) = access.next_entry::<String, String>()? {
                    map.insert(key, value);
                }
                Ok(map)
            }
        }

        deserializer.deserialize_map(FieldMapVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_based_ids() {
        let id = ContactId::from_name(" Bob ");
        assert_eq!(id.as_str(), "name:Bob");
        assert!(id.is_name_based());
        assert_eq!(id.name_part(), Some("Bob"));
        assert!(!ContactId::new("abc-123").is_name_based());
    }

    #[test]
    fn uid_normalization() {
        assert_eq!(
            ContactId::from_uid("urn:uuid:7D3C5B1E-4F2A-4C9E-8B1D-2A6F0E9C3B7A").as_str(),
            "7d3c5b1e-4f2a-4c9e-8b1d-2a6f0e9c3b7a"
        );
        assert_eq!(ContactId::from_uid(" abc-123 ").as_str(), "abc-123");
    }

    #[test]
    fn uuid_detection() {
        assert!(ContactId::new("7d3c5b1e-4f2a-4c9e-8b1d-2a6f0e9c3b7a").is_uuid());
        assert!(!ContactId::new("abc-123").is_uuid());
    }

    #[test]
    fn gender_codes() {
        assert_eq!("F".parse::<Gender>().unwrap(), Gender::Female);
        assert_eq!("male".parse::<Gender>().unwrap(), Gender::Male);
        assert_eq!("nb".parse::<Gender>().unwrap(), Gender::NonBinary);
        assert!("x".parse::<Gender>().is_err());
        assert_eq!(Gender::Female.to_string(), "F");
    }

    #[test]
    fn reference_encoding() {
        assert_eq!(Reference::name("Bob").encode(), "name:Bob");
        assert_eq!(Reference::opaque("abc").encode(), "uid:abc");
        assert_eq!(
            Reference::uuid("7d3c5b1e-4f2a-4c9e-8b1d-2a6f0e9c3b7a").encode(),
            "urn:uuid:7d3c5b1e-4f2a-4c9e-8b1d-2a6f0e9c3b7a"
        );
    }

    #[test]
    fn field_map_preserves_order_and_replaces_in_place() {
        let mut map = FieldMap::new();
        map.insert("FN", "Alice");
        map.insert("UID", "a-1");
        map.insert("FN", "Alice Smith");
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["FN", "UID"]);
        assert_eq!(map.get("FN"), Some("Alice Smith"));
        assert_eq!(map.get_ignore_case("uid"), Some("a-1"));
    }

    #[test]
    fn field_map_splice() {
        let mut map: FieldMap = vec![("FN", "A"), ("X", "1"), ("REV", "r")].into_iter().collect();
        map.splice_at(1, vec![("R1".to_string(), "v".to_string()), ("X".to_string(), "2".to_string())]);
        let keys: Vec<&str> = map.keys().collect();
        assert_eq!(keys, vec!["FN", "R1", "X", "REV"]);
        assert_eq!(map.get("X"), Some("2"));
    }

    #[test]
    fn field_map_json_keeps_document_order() {
        let map: FieldMap = vec![("UID", "u"), ("FN", "Zed"), ("EMAIL", "z@x")]
            .into_iter()
            .collect();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"UID":"u","FN":"Zed","EMAIL":"z@x"}"#);
        let back: FieldMap = serde_json::from_str(&json).unwrap();
        assert_eq!(back, map);
    }

    #[test]
    fn operation_serialization() {
        let op = SyncOperation::add(ContactId::new("a"), &Reference::name("Bob"), "friend");
        let json = serde_json::to_string(&op).unwrap();
        assert!(json.contains("\"kind\":\"add\""));
        assert!(json.contains("\"is_name_based\":true"));
    }
}
