//! Reciprocity checks over the contact graph.
//!
//! Every edge `(A, B, kind)` whose kind has a reciprocal implies an edge
//! `(B, A, reciprocal)`. Kinds without a reciprocal are never reported.

use std::collections::{BTreeSet, HashSet};

use kinship_core::ContactId;
use serde::{Deserialize, Serialize};

use crate::gender::GenderTables;
use crate::graph::ContactGraph;

/// An edge implied by reciprocity that the graph does not contain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MissingReciprocal {
    pub source_id: ContactId,
    pub target_id: ContactId,
    pub kind: String,
}

impl ContactGraph {
    /// List missing reciprocal edges, sorted and without duplicates.
    pub fn check_consistency(&self) -> Vec<MissingReciprocal> {
        let tables = GenderTables::get();
        let mut missing = BTreeSet::new();

        for edge in self.edges() {
            let Some(reciprocal) = tables.reciprocal(&edge.kind) else {
                continue;
            };
            if !self.has_relationship(&edge.target_id, &edge.source_id, reciprocal) {
                missing.insert(MissingReciprocal {
                    source_id: edge.target_id,
                    target_id: edge.source_id,
                    kind: reciprocal.to_string(),
                });
            }
        }

        missing.into_iter().collect()
    }

    /// Add every missing reciprocal edge.
    ///
    /// Returns the contacts that gained an outgoing edge.
    pub fn repair_consistency(&mut self) -> HashSet<ContactId> {
        let mut changed = HashSet::new();
        for gap in self.check_consistency() {
            if self.add_relationship(&gap.source_id, &gap.target_id, &gap.kind) {
                changed.insert(gap.source_id);
            }
        }
        if !changed.is_empty() {
            tracing::info!(contacts = changed.len(), "Repaired missing reciprocal relationships");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(s: &str) -> ContactId {
        ContactId::new(s)
    }

    fn graph() -> ContactGraph {
        let mut graph = ContactGraph::new();
        graph.add_contact(id("a"), "Alice", None);
        graph.add_contact(id("b"), "Bob", None);
        graph
    }

    #[test]
    fn test_parent_requires_child() {
        let mut graph = graph();
        graph.add_relationship(&id("a"), &id("b"), "parent");

        let missing = graph.check_consistency();
        assert_eq!(
            missing,
            vec![MissingReciprocal {
                source_id: id("b"),
                target_id: id("a"),
                kind: "child".to_string(),
            }]
        );

        graph.add_relationship(&id("b"), &id("a"), "child");
        assert!(graph.check_consistency().is_empty());
    }

    #[test]
    fn test_gendered_reciprocal_satisfies_check() {
        let mut graph = graph();
        graph.add_relationship(&id("a"), &id("b"), "uncle");
        graph.add_relationship(&id("b"), &id("a"), "niece");
        assert!(graph.check_consistency().is_empty());
    }

    #[test]
    fn test_symmetric_kinds_reciprocate_to_themselves() {
        let mut graph = graph();
        graph.add_relationship(&id("a"), &id("b"), "friend");
        let missing = graph.check_consistency();
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].kind, "friend");
        assert_eq!(missing[0].source_id, id("b"));
    }

    #[test]
    fn test_kinds_without_reciprocal_never_flagged() {
        let mut graph = graph();
        graph.add_relationship(&id("a"), &id("b"), "mentor");
        graph.add_relationship(&id("a"), &id("b"), "colleague");
        graph.add_relationship(&id("a"), &id("b"), "bandmate");
        assert!(graph.check_consistency().is_empty());
    }

    #[test]
    fn test_repair_adds_reciprocals() {
        let mut graph = graph();
        graph.add_relationship(&id("a"), &id("b"), "parent");
        graph.add_relationship(&id("a"), &id("b"), "friend");

        let changed = graph.repair_consistency();
        assert_eq!(changed, HashSet::from([id("b")]));
        assert!(graph.has_relationship(&id("b"), &id("a"), "child"));
        assert!(graph.has_relationship(&id("b"), &id("a"), "friend"));
        assert!(graph.check_consistency().is_empty());
    }

    #[test]
    fn test_missing_reciprocal_serializes() {
        let gap = MissingReciprocal {
            source_id: id("b"),
            target_id: id("a"),
            kind: "child".to_string(),
        };
        let json = serde_json::to_string(&gap).unwrap();
        assert_eq!(json, r#"{"source_id":"b","target_id":"a","kind":"child"}"#);
    }
}
