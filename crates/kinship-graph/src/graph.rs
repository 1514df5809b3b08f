//! In-memory contact relationship graph.
//!
//! A directed multigraph: nodes are contacts keyed by [`ContactId`], edges are
//! `(source, target, canonical kind)` triples stored in per-source adjacency
//! sets, with a reverse index so removing a node can find every incident edge.

use std::collections::{BTreeSet, HashMap, HashSet};

use kinship_core::{
    ContactId, ContactNode, Gender, OperationKind, Reference, Relationship, RelationshipEdge,
    SyncOperation,
};

use crate::gender::GenderTables;

/// The contact graph. One instance per vault session.
#[derive(Debug, Default)]
pub struct ContactGraph {
    nodes: HashMap<ContactId, ContactNode>,
    /// `outgoing[a]` = set of `(target, canonical kind)`.
    outgoing: HashMap<ContactId, BTreeSet<(ContactId, String)>>,
    /// `incoming[b]` = sources with at least one edge to `b`.
    incoming: HashMap<ContactId, HashSet<ContactId>>,
    /// Lowercased display name → id.
    names: HashMap<String, ContactId>,
    /// Contacts whose gender came from a gendered term, not a document.
    inferred: HashSet<ContactId>,
}

impl ContactGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every node and edge.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.names.clear();
        self.inferred.clear();
    }

    // ── Nodes ─────────────────────────────────────────────────

    /// Upsert a contact. A supplied gender is only taken when none is set.
    pub fn add_contact(&mut self, id: ContactId, name: &str, gender: Option<Gender>) {
        let name = name.trim();
        match self.nodes.get_mut(&id) {
            Some(node) => {
                if node.gender.is_none() && gender.is_some() {
                    node.gender = gender;
                }
                if !name.is_empty() && node.display_name != name {
                    let old = std::mem::replace(&mut node.display_name, name.to_string());
                    self.unindex_name(&old, &id);
                    self.index_name(name, &id);
                }
            }
            None => {
                let display_name = if name.is_empty() {
                    default_name(&id)
                } else {
                    name.to_string()
                };
                self.index_name(&display_name, &id);
                self.nodes.insert(
                    id.clone(),
                    ContactNode {
                        id,
                        display_name,
                        gender,
                    },
                );
            }
        }
    }

    /// Set or clear a contact's gender unconditionally. Returns whether it changed.
    pub fn set_gender(&mut self, id: &ContactId, gender: Option<Gender>) -> bool {
        self.inferred.remove(id);
        match self.nodes.get_mut(id) {
            Some(node) if node.gender != gender => {
                node.gender = gender;
                true
            }
            _ => false,
        }
    }

    /// Whether the contact's gender was inferred from a relationship term.
    pub fn gender_inferred(&self, id: &ContactId) -> bool {
        self.inferred.contains(id)
    }

    pub fn contact(&self, id: &ContactId) -> Option<&ContactNode> {
        self.nodes.get(id)
    }

    pub fn contains(&self, id: &ContactId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn contacts(&self) -> impl Iterator<Item = &ContactNode> {
        self.nodes.values()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.outgoing.values().map(|edges| edges.len()).sum()
    }

    /// Find a contact by display name, case-insensitively.
    pub fn resolve_name(&self, name: &str) -> Option<ContactId> {
        self.names.get(&name.trim().to_lowercase()).cloned()
    }

    /// The contact id a front-matter or link reference points at.
    ///
    /// Name references resolve to a known contact with that display name,
    /// otherwise to the name-derived id.
    pub fn resolve_reference(&self, reference: &Reference) -> ContactId {
        if reference.is_name() {
            self.resolve_name(&reference.value)
                .unwrap_or_else(|| ContactId::from_name(&reference.value))
        } else {
            ContactId::new(reference.value.clone())
        }
    }

    /// How a contact should be referenced from another contact's fields.
    pub fn reference_for(&self, id: &ContactId) -> Reference {
        if id.is_name_based() {
            let name = self
                .nodes
                .get(id)
                .map(|n| n.display_name.clone())
                .or_else(|| id.name_part().map(str::to_string))
                .unwrap_or_default();
            Reference::name(name)
        } else if id.is_uuid() {
            Reference::uuid(id.as_str())
        } else {
            Reference::opaque(id.as_str())
        }
    }

    // ── Edges ─────────────────────────────────────────────────

    /// Add an edge, normalizing the kind and inferring the target's gender.
    ///
    /// Both nodes are created if missing. Returns `true` if the edge is new.
    pub fn add_relationship(
        &mut self,
        source_id: &ContactId,
        target_id: &ContactId,
        raw_kind: &str,
    ) -> bool {
        if source_id == target_id {
            tracing::debug!(contact = %source_id, kind = raw_kind, "Ignoring self relationship");
            return false;
        }
        let normalized = GenderTables::get().normalize(raw_kind);
        if normalized.kind.is_empty() {
            return false;
        }
        self.ensure_node(source_id);
        self.ensure_node(target_id);

        if let Some(gender) = normalized.implied_gender {
            if let Some(target) = self.nodes.get_mut(target_id) {
                if target.gender.is_none() {
                    target.gender = Some(gender);
                    self.inferred.insert(target_id.clone());
                    tracing::debug!(contact = %target_id, gender = %gender, "Inferred gender");
                }
            }
        }

        let inserted = self
            .outgoing
            .entry(source_id.clone())
            .or_default()
            .insert((target_id.clone(), normalized.kind));
        if inserted {
            self.incoming
                .entry(target_id.clone())
                .or_default()
                .insert(source_id.clone());
        }
        inserted
    }

    /// Remove an edge. Returns `true` if it existed.
    pub fn remove_relationship(
        &mut self,
        source_id: &ContactId,
        target_id: &ContactId,
        raw_kind: &str,
    ) -> bool {
        let kind = GenderTables::get().normalize(raw_kind).kind;
        let Some(edges) = self.outgoing.get_mut(source_id) else {
            return false;
        };
        let removed = edges.remove(&(target_id.clone(), kind));
        if removed && !edges.iter().any(|(t, _)| t == target_id) {
            if let Some(sources) = self.incoming.get_mut(target_id) {
                sources.remove(source_id);
            }
        }
        removed
    }

    pub fn has_relationship(&self, source_id: &ContactId, target_id: &ContactId, kind: &str) -> bool {
        self.outgoing
            .get(source_id)
            .is_some_and(|edges| edges.contains(&(target_id.clone(), kind.to_string())))
    }

    /// Apply one diff operation. Returns `true` if the edge set changed.
    pub fn apply(&mut self, op: &SyncOperation) -> bool {
        let target_id = if op.is_name_based {
            match self.resolve_name(&op.target) {
                Some(id) => id,
                None => {
                    let id = ContactId::from_name(&op.target);
                    self.add_contact(id.clone(), &op.target, None);
                    id
                }
            }
        } else {
            ContactId::new(op.target.clone())
        };
        match op.kind {
            OperationKind::Add => self.add_relationship(&op.source_id, &target_id, &op.relationship_kind),
            OperationKind::Remove => {
                self.remove_relationship(&op.source_id, &target_id, &op.relationship_kind)
            }
        }
    }

    /// All edges leaving `id`, in `(target, kind)` order.
    pub fn edges_from(&self, id: &ContactId) -> Vec<RelationshipEdge> {
        self.outgoing
            .get(id)
            .map(|edges| {
                edges
                    .iter()
                    .map(|(target, kind)| RelationshipEdge {
                        source_id: id.clone(),
                        target_id: target.clone(),
                        kind: kind.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Every edge in the graph, sorted.
    pub fn edges(&self) -> Vec<RelationshipEdge> {
        let mut all: Vec<RelationshipEdge> = self
            .outgoing
            .keys()
            .flat_map(|source| self.edges_from(source))
            .collect();
        all.sort();
        all
    }

    /// Distinct targets of edges leaving `id`.
    pub fn targets_of(&self, id: &ContactId) -> BTreeSet<ContactId> {
        self.outgoing
            .get(id)
            .map(|edges| edges.iter().map(|(t, _)| t.clone()).collect())
            .unwrap_or_default()
    }

    /// Distinct sources of edges arriving at `id`.
    pub fn sources_of(&self, id: &ContactId) -> BTreeSet<ContactId> {
        self.incoming
            .get(id)
            .map(|sources| sources.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Outgoing relationships rendered for display, sorted by display kind
    /// then target name.
    pub fn get_contact_relationships(&self, id: &ContactId) -> Vec<Relationship> {
        let tables = GenderTables::get();
        let mut rendered: Vec<Relationship> = self
            .outgoing
            .get(id)
            .into_iter()
            .flatten()
            .map(|(target_id, kind)| {
                let target = self.nodes.get(target_id);
                Relationship {
                    target_id: target_id.clone(),
                    target_name: target
                        .map(|n| n.display_name.clone())
                        .unwrap_or_else(|| default_name(target_id)),
                    kind: kind.clone(),
                    display_kind: tables.render(kind, target.and_then(|n| n.gender)),
                    reference: self.reference_for(target_id),
                }
            })
            .collect();
        rendered.sort_by(|a, b| {
            a.display_kind
                .cmp(&b.display_kind)
                .then_with(|| a.target_name.cmp(&b.target_name))
                .then_with(|| a.target_id.cmp(&b.target_id))
        });
        rendered
    }

    // ── Structural changes ────────────────────────────────────

    /// Remove a node and every incident edge.
    ///
    /// Returns the contacts that lost an edge to or from it.
    pub fn drop_node(&mut self, id: &ContactId) -> HashSet<ContactId> {
        let mut neighbors = HashSet::new();

        if let Some(edges) = self.outgoing.remove(id) {
            for (target, _) in edges {
                if let Some(sources) = self.incoming.get_mut(&target) {
                    sources.remove(id);
                }
                neighbors.insert(target);
            }
        }
        if let Some(sources) = self.incoming.remove(id) {
            for source in sources {
                if let Some(edges) = self.outgoing.get_mut(&source) {
                    edges.retain(|(t, _)| t != id);
                }
                neighbors.insert(source);
            }
        }
        if let Some(node) = self.nodes.remove(id) {
            self.unindex_name(&node.display_name, id);
        }
        self.inferred.remove(id);
        neighbors.remove(id);

        tracing::debug!(contact = %id, neighbors = neighbors.len(), "Dropped contact");
        neighbors
    }

    /// Move every edge of `old` onto `new` and remove `old`.
    ///
    /// Used when a name-only contact turns out to be a document with a UID.
    /// Returns the contacts whose edges were re-pointed.
    pub fn rekey(&mut self, old: &ContactId, new: &ContactId) -> HashSet<ContactId> {
        let mut neighbors = HashSet::new();
        if old == new || !self.nodes.contains_key(old) {
            return neighbors;
        }
        let old_node = self.nodes.get(old).cloned();
        let old_inferred = self.inferred.contains(old);
        let outgoing: Vec<(ContactId, String)> = self
            .outgoing
            .get(old)
            .map(|edges| edges.iter().cloned().collect())
            .unwrap_or_default();
        let sources: Vec<ContactId> = self.sources_of(old).into_iter().collect();
        let incoming: Vec<(ContactId, String)> = sources
            .iter()
            .flat_map(|source| {
                self.outgoing
                    .get(source)
                    .into_iter()
                    .flatten()
                    .filter(|(t, _)| t == old)
                    .map(|(_, kind)| (source.clone(), kind.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        self.drop_node(old);

        if let Some(node) = old_node {
            self.add_contact(new.clone(), "", None);
            if let Some(existing) = self.nodes.get_mut(new) {
                if existing.gender.is_none() && node.gender.is_some() {
                    existing.gender = node.gender;
                    if old_inferred {
                        self.inferred.insert(new.clone());
                    }
                }
            }
        }
        for (target, kind) in outgoing {
            if self.add_relationship(new, &target, &kind) {
                neighbors.insert(target);
            }
        }
        for (source, kind) in incoming {
            if self.add_relationship(&source, new, &kind) {
                neighbors.insert(source);
            }
        }
        neighbors.remove(new);

        tracing::debug!(from = %old, to = %new, neighbors = neighbors.len(), "Re-keyed contact");
        neighbors
    }

    fn ensure_node(&mut self, id: &ContactId) {
        if !self.nodes.contains_key(id) {
            self.add_contact(id.clone(), "", None);
        }
    }

    fn index_name(&mut self, name: &str, id: &ContactId) {
        let key = name.trim().to_lowercase();
        match self.names.get(&key) {
            // A document-backed contact wins over a name-only one.
            Some(existing) if existing != id && !(existing.is_name_based() && !id.is_name_based()) => {
                tracing::debug!(name, kept = %existing, ignored = %id, "Duplicate display name");
            }
            _ => {
                self.names.insert(key, id.clone());
            }
        }
    }

    fn unindex_name(&mut self, name: &str, id: &ContactId) {
        let key = name.trim().to_lowercase();
        if self.names.get(&key) == Some(id) {
            self.names.remove(&key);
            // Hand the name to another contact that still carries it.
            if let Some(other) = self
                .nodes
                .values()
                .find(|n| &n.id != id && n.display_name.trim().to_lowercase() == key)
                .map(|n| n.id.clone())
            {
                self.names.insert(key, other);
            }
        }
    }
}

fn default_name(id: &ContactId) -> String {
    id.name_part().unwrap_or(id.as_str()).to_string()
}
