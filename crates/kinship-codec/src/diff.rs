//! Edge-set diffing shared by both codecs.
//!
//! A decoded representation is compared against the graph's current
//! outgoing edges of one contact. Edges are keyed by `(target id, canonical
//! kind)`, so "mother" in text and "parent" in the graph are the same edge.

use std::collections::BTreeSet;

use kinship_core::{ContactId, Reference, Relationship, SyncOperation};
use kinship_graph::{ContactGraph, GenderTables};

/// One relationship as read from a document, before graph resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRelation {
    /// Relationship term as written, lowercased. May be gendered.
    pub kind: String,
    pub target: Reference,
}

/// Operations that make `source_id`'s outgoing edges match `decoded`.
///
/// Adds come first, in document order; removes follow in graph order.
/// Relations pointing back at `source_id` are ignored.
pub fn diff_relations(
    source_id: &ContactId,
    decoded: &[DecodedRelation],
    current: &[Relationship],
    graph: &ContactGraph,
) -> Vec<SyncOperation> {
    let tables = GenderTables::get();
    let existing: BTreeSet<(ContactId, String)> = current
        .iter()
        .map(|rel| (rel.target_id.clone(), rel.kind.clone()))
        .collect();

    let mut wanted: BTreeSet<(ContactId, String)> = BTreeSet::new();
    let mut ops = Vec::new();
    for rel in decoded {
        let target_id = graph.resolve_reference(&rel.target);
        if &target_id == source_id {
            continue;
        }
        let kind = tables.normalize(&rel.kind).kind;
        if kind.is_empty() {
            continue;
        }
        let key = (target_id, kind);
        if !wanted.insert(key.clone()) {
            continue;
        }
        if !existing.contains(&key) {
            ops.push(SyncOperation::add(source_id.clone(), &rel.target, &rel.kind));
        }
    }

    for (target_id, kind) in &existing {
        if !wanted.contains(&(target_id.clone(), kind.clone())) {
            ops.push(SyncOperation::remove(source_id.clone(), target_id, kind));
        }
    }
    ops
}
