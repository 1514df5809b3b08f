//! Structured relationship fields.
//!
//! Grammar:
//! ```text
//! key   := RELATED | RELATED[kind] | RELATED[n:kind]     (n >= 1)
//! value := urn:uuid:<uuid> | uid:<opaque-id> | name:<display text>
//! ```
//! The first target of a kind is written under `RELATED[kind]`, later ones
//! under `RELATED[1:kind]`, `RELATED[2:kind]`, ... ordered by encoded value.

use std::collections::{BTreeMap, BTreeSet};

use kinship_core::{ContactId, FieldMap, Reference, Relationship, SyncOperation};
use kinship_graph::ContactGraph;
use once_cell::sync::Lazy;
use regex::Regex;
use uuid::Uuid;

use crate::diff::{diff_relations, DecodedRelation};
use crate::error::{CodecError, Result};

/// Kind used for a bare `RELATED` key.
pub const DEFAULT_KIND: &str = "contact";

static KEY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^RELATED(?:\[(?:(\d+):)?([^\[\]:]*)\])?$").expect("valid RELATED key pattern")
});

/// A parsed `RELATED` key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedKey {
    pub index: Option<u32>,
    pub kind: String,
}

/// Codec between `RELATED` fields and graph relationships.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrontMatterCodec;

impl FrontMatterCodec {
    /// Whether a field key belongs to the relationship grammar at all.
    pub fn is_relationship_key(key: &str) -> bool {
        key.get(..7).is_some_and(|head| head.eq_ignore_ascii_case("RELATED"))
    }

    pub fn parse_key(key: &str) -> Result<RelatedKey> {
        if !Self::is_relationship_key(key) {
            return Err(CodecError::NotRelationshipKey {
                key: key.to_string(),
            });
        }
        let caps = KEY_RE
            .captures(key.trim())
            .ok_or_else(|| CodecError::MalformedKey {
                key: key.to_string(),
            })?;
        let index = match caps.get(1) {
            Some(m) => Some(m.as_str().parse::<u32>().map_err(|_| CodecError::MalformedKey {
                key: key.to_string(),
            })?),
            None => None,
        };
        let kind = match caps.get(2) {
            Some(m) => {
                let kind = m.as_str().trim().to_lowercase();
                if kind.is_empty() {
                    return Err(CodecError::MalformedKey {
                        key: key.to_string(),
                    });
                }
                kind
            }
            None => DEFAULT_KIND.to_string(),
        };
        Ok(RelatedKey { index, kind })
    }

    pub fn parse_reference(value: &str) -> Result<Reference> {
        let value = value.trim();
        let malformed = |reason: &str| CodecError::MalformedReference {
            value: value.to_string(),
            reason: reason.to_string(),
        };

        if let Some(rest) = strip_prefix_ignore_case(value, "urn:uuid:") {
            let uuid = Uuid::parse_str(rest.trim()).map_err(|_| malformed("not a UUID"))?;
            return Ok(Reference::uuid(uuid.hyphenated().to_string()));
        }
        if let Some(rest) = strip_prefix_ignore_case(value, "uid:") {
            let rest = rest.trim();
            if rest.is_empty() {
                return Err(malformed("empty uid"));
            }
            return Ok(Reference::opaque(rest));
        }
        if let Some(rest) = strip_prefix_ignore_case(value, "name:") {
            let rest = rest.trim();
            if rest.is_empty() {
                return Err(malformed("empty name"));
            }
            return Ok(Reference::name(rest));
        }
        Err(malformed("unknown namespace"))
    }

    /// Decode every well-formed relationship field. Malformed entries are skipped.
    pub fn decode(fields: &FieldMap) -> Vec<DecodedRelation> {
        let mut decoded = Vec::new();
        for (key, value) in fields.iter() {
            if !Self::is_relationship_key(key) {
                continue;
            }
            let parsed = Self::parse_key(key).and_then(|k| Ok((k, Self::parse_reference(value)?)));
            match parsed {
                Ok((key, target)) => decoded.push(DecodedRelation {
                    kind: key.kind,
                    target,
                }),
                Err(e) => tracing::debug!(key, value, error = %e, "Skipping relationship field"),
            }
        }
        decoded
    }

    /// Encode relationships into ordered `RELATED` fields.
    pub fn encode(relationships: &[Relationship]) -> FieldMap {
        let mut by_kind: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for rel in relationships {
            by_kind
                .entry(rel.kind.as_str())
                .or_default()
                .insert(rel.reference.encode());
        }

        let mut fields = FieldMap::new();
        for (kind, values) in by_kind {
            for (n, value) in values.into_iter().enumerate() {
                let key = if n == 0 {
                    format!("RELATED[{kind}]")
                } else {
                    format!("RELATED[{n}:{kind}]")
                };
                fields.insert(key, value);
            }
        }
        fields
    }

    /// Operations that bring the graph in line with `fields` for `source_id`.
    pub fn diff(
        source_id: &ContactId,
        fields: &FieldMap,
        current: &[Relationship],
        graph: &ContactGraph,
    ) -> Vec<SyncOperation> {
        diff_relations(source_id, &Self::decode(fields), current, graph)
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    match value.get(..prefix.len()) {
        Some(head) if head.eq_ignore_ascii_case(prefix) => Some(&value[prefix.len()..]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kinship_core::{OperationKind, RefNamespace};

    const UUID_A: &str = "7d3c5b1e-4f2a-4c9e-8b1d-2a6f0e9c3b7a";

    fn fields(pairs: &[(&str, &str)]) -> FieldMap {
        pairs.iter().map(|(k, v)| (*k, *v)).collect()
    }

    #[test]
    fn test_parse_key_forms() {
        assert_eq!(
            FrontMatterCodec::parse_key("RELATED").unwrap(),
            RelatedKey { index: None, kind: "contact".to_string() }
        );
        assert_eq!(
            FrontMatterCodec::parse_key("RELATED[Friend]").unwrap(),
            RelatedKey { index: None, kind: "friend".to_string() }
        );
        assert_eq!(
            FrontMatterCodec::parse_key("RELATED[2:parent]").unwrap(),
            RelatedKey { index: Some(2), kind: "parent".to_string() }
        );
        assert!(FrontMatterCodec::parse_key("RELATED[]").is_err());
        assert!(FrontMatterCodec::parse_key("RELATED[x:parent]").is_err());
        assert!(FrontMatterCodec::parse_key("RELATEDNESS").is_err());
        assert_eq!(
            FrontMatterCodec::parse_key("RELATED[Best Friend]").unwrap().kind,
            "best friend"
        );
        assert!(matches!(
            FrontMatterCodec::parse_key("FN"),
            Err(CodecError::NotRelationshipKey { .. })
        ));
    }

    #[test]
    fn test_parse_reference_forms() {
        let r = FrontMatterCodec::parse_reference(&format!("urn:uuid:{}", UUID_A.to_uppercase())).unwrap();
        assert_eq!(r.namespace, RefNamespace::Uuid);
        assert_eq!(r.value, UUID_A);

        let r = FrontMatterCodec::parse_reference("uid:abc-123").unwrap();
        assert_eq!(r, Reference::opaque("abc-123"));

        let r = FrontMatterCodec::parse_reference("name: Bob Smith ").unwrap();
        assert_eq!(r, Reference::name("Bob Smith"));

        assert!(FrontMatterCodec::parse_reference("urn:uuid:not-a-uuid").is_err());
        assert!(FrontMatterCodec::parse_reference("name:").is_err());
        assert!(FrontMatterCodec::parse_reference("Bob").is_err());
    }

    #[test]
    fn test_decode_skips_malformed_entries() {
        let decoded = FrontMatterCodec::decode(&fields(&[
            ("FN", "Alice"),
            ("RELATED[friend]", "name:Bob"),
            ("RELATED[]", "name:Nobody"),
            ("RELATED[parent]", "mailto:someone"),
            ("RELATED[1:friend]", "uid:c-1"),
        ]));
        assert_eq!(
            decoded,
            vec![
                DecodedRelation { kind: "friend".to_string(), target: Reference::name("Bob") },
                DecodedRelation { kind: "friend".to_string(), target: Reference::opaque("c-1") },
            ]
        );
    }

    #[test]
    fn test_non_ascii_keys_are_not_relationships() {
        assert!(!FrontMatterCodec::is_relationship_key("関係者"));
        assert!(!FrontMatterCodec::is_relationship_key("RELATé"));
        assert!(FrontMatterCodec::is_relationship_key("related[friend]"));

        let decoded = FrontMatterCodec::decode(&fields(&[
            ("関係者", "x"),
            ("RELATED[friend]", "name:Bob"),
        ]));
        assert_eq!(
            decoded,
            vec![DecodedRelation { kind: "friend".to_string(), target: Reference::name("Bob") }]
        );
    }

    fn rel(kind: &str, target: &str, reference: Reference) -> Relationship {
        Relationship {
            target_id: ContactId::new(target),
            target_name: target.to_string(),
            kind: kind.to_string(),
            display_kind: kind.to_string(),
            reference,
        }
    }

    #[test]
    fn test_encode_indexes_repeated_kinds() {
        let encoded = FrontMatterCodec::encode(&[
            rel("parent", "Carol", Reference::name("Carol")),
            rel("friend", "Bob", Reference::name("Bob")),
            rel("parent", "Alice", Reference::name("Alice")),
            rel("parent", "Zed", Reference::opaque("z-1")),
        ]);
        let pairs: Vec<(&str, &str)> = encoded.iter().collect();
        assert_eq!(
            pairs,
            vec![
                ("RELATED[friend]", "name:Bob"),
                ("RELATED[parent]", "name:Alice"),
                ("RELATED[1:parent]", "name:Carol"),
                ("RELATED[2:parent]", "uid:z-1"),
            ]
        );
    }

    #[test]
    fn test_roundtrip_preserves_edge_set() {
        let rels = vec![
            rel("sibling", UUID_A, Reference::uuid(UUID_A)),
            rel("sibling", "o-1", Reference::opaque("o-1")),
            rel("auncle", "Nan", Reference::name("Nan")),
        ];
        let decoded: BTreeSet<(String, Reference)> = FrontMatterCodec::decode(&FrontMatterCodec::encode(&rels))
            .into_iter()
            .map(|d| (d.kind, d.target))
            .collect();
        let expected: BTreeSet<(String, Reference)> =
            rels.into_iter().map(|r| (r.kind, r.reference)).collect();
        assert_eq!(decoded, expected);
    }

    #[test]
    fn test_diff_against_graph() {
        let mut graph = ContactGraph::new();
        let alice = ContactId::new("a");
        graph.add_contact(alice.clone(), "Alice", None);
        graph.add_contact(ContactId::new("b"), "Bob", None);
        graph.add_relationship(&alice, &ContactId::new("b"), "colleague");

        let current = graph.get_contact_relationships(&alice);
        let ops = FrontMatterCodec::diff(
            &alice,
            &fields(&[("RELATED[friend]", "name:Bob"), ("RELATED[colleague]", "uid:b")]),
            &current,
            &graph,
        );
        assert_eq!(ops.len(), 1);
        assert_eq!(ops[0].kind, OperationKind::Add);
        assert_eq!(ops[0].target, "Bob");
        assert!(ops[0].is_name_based);

        let ops = FrontMatterCodec::diff(&alice, &FieldMap::new(), &current, &graph);
        assert_eq!(ops, vec![SyncOperation::remove(alice.clone(), &ContactId::new("b"), "colleague")]);
    }

    #[test]
    fn test_name_reference_matches_known_contact() {
        let mut graph = ContactGraph::new();
        let alice = ContactId::new("a");
        graph.add_contact(alice.clone(), "Alice", None);
        graph.add_contact(ContactId::new("b"), "Bob", None);
        graph.add_relationship(&alice, &ContactId::new("b"), "friend");

        let current = graph.get_contact_relationships(&alice);
        let ops = FrontMatterCodec::diff(&alice, &fields(&[("RELATED[friend]", "name:bob")]), &current, &graph);
        assert!(ops.is_empty());
    }
}
