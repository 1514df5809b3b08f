//! The sync coordinator.
//!
//! Front matter and the Related section never update each other directly.
//! Each is decoded into graph operations and the other is re-encoded from
//! the graph. Per document the flow is lock, read, decode, apply, encode,
//! write if the text changed, unlock, then propagate to the contacts whose
//! documents render this one.
//!
//! Lock order is document lock, then graph, then index. Graph and index
//! guards are never held across a store call.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::{RwLock, RwLockReadGuard};

use kinship_codec::{format_revision, FrontMatter, FrontMatterCodec, MarkdownCodec};
use kinship_core::{ContactId, DocumentEvent, FieldMap, Gender, SyncConfig, SyncOperation};
use kinship_graph::{ContactGraph, MissingReciprocal};

use crate::debounce::Debouncer;
use crate::error::{Result, SyncError};
use crate::lock::{LockGuard, LockRegistry};
use crate::result::SyncResult;
use crate::store::{in_folder, is_document, DocumentStore};

/// A document as read from the store.
pub(crate) struct Document {
    pub path: String,
    pub text: String,
    pub front: FrontMatter,
}

impl Document {
    fn parse(path: &str, text: String) -> Result<Self> {
        let front = FrontMatter::parse(&text).map_err(|e| SyncError::parse(path, e))?;
        Ok(Self {
            path: path.to_string(),
            text,
            front,
        })
    }

    /// The front-matter block exactly as written.
    fn head(&self) -> &str {
        &self.text[..self.text.len() - self.front.body.len()]
    }

    /// Document text with replaced fields and/or body. Parts left as `None`
    /// are kept verbatim.
    fn rebuild(&self, fields: Option<&FieldMap>, body: Option<&str>) -> Result<String> {
        let body = body.unwrap_or(&self.front.body);
        match fields {
            Some(fields) => self
                .front
                .clone()
                .with_fields(fields.clone())
                .with_body(body)
                .render()
                .map_err(|e| SyncError::parse(&self.path, e)),
            None => Ok(format!("{}{}", self.head(), body)),
        }
    }
}

#[derive(Debug, Clone)]
struct Identity {
    id: ContactId,
    name: String,
    gender: Option<Gender>,
}

/// Two-way map between document paths and contact ids.
#[derive(Debug, Default)]
struct DocumentIndex {
    by_path: HashMap<String, ContactId>,
    by_id: HashMap<ContactId, String>,
}

impl DocumentIndex {
    /// Map `path` to `id`. Returns the id the path had before.
    fn insert(&mut self, path: &str, id: ContactId) -> Option<ContactId> {
        let previous = self.by_path.insert(path.to_string(), id.clone());
        if let Some(prev) = &previous {
            if self.by_id.get(prev).is_some_and(|p| p == path) {
                self.by_id.remove(prev);
            }
        }
        if let Some(other) = self.by_id.insert(id.clone(), path.to_string()) {
            if other != path {
                tracing::warn!(contact = %id, path, other = %other, "Two documents share a contact id");
            }
        }
        previous
    }

    fn remove_path(&mut self, path: &str) -> Option<ContactId> {
        let id = self.by_path.remove(path)?;
        if self.by_id.get(&id).is_some_and(|p| p == path) {
            self.by_id.remove(&id);
        }
        Some(id)
    }

    fn move_path(&mut self, from: &str, to: &str) {
        if let Some(id) = self.remove_path(from) {
            self.insert(to, id);
        }
    }

    fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.by_path.keys().cloned().collect();
        paths.sort();
        paths
    }

    fn clear(&mut self) {
        self.by_path.clear();
        self.by_id.clear();
    }
}

/// Keeps front matter, Related sections and the contact graph consistent.
///
/// One instance per vault. Independent instances share nothing.
pub struct SyncCoordinator {
    pub(crate) store: Arc<dyn DocumentStore>,
    pub(crate) config: SyncConfig,
    graph: RwLock<ContactGraph>,
    index: RwLock<DocumentIndex>,
    locks: LockRegistry,
    debouncer: Debouncer,
    markdown: MarkdownCodec,
}

impl SyncCoordinator {
    pub fn new(store: Arc<dyn DocumentStore>, config: SyncConfig) -> Self {
        Self {
            locks: LockRegistry::new(config.lock_timeout()),
            debouncer: Debouncer::new(config.debounce()),
            markdown: MarkdownCodec::new(config.section_heading_level),
            graph: RwLock::new(ContactGraph::new()),
            index: RwLock::new(DocumentIndex::default()),
            store,
            config,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn locks(&self) -> &LockRegistry {
        &self.locks
    }

    /// Read access to the graph. Do not hold across an await.
    pub fn graph(&self) -> RwLockReadGuard<'_, ContactGraph> {
        self.graph.read()
    }

    pub fn path_of(&self, id: &ContactId) -> Option<String> {
        self.index.read().by_id.get(id).cloned()
    }

    pub fn id_of(&self, path: &str) -> Option<ContactId> {
        self.index.read().by_path.get(path).cloned()
    }

    pub fn has_pending_edit(&self, path: &str) -> bool {
        self.debouncer.is_pending(path)
    }

    /// Whether `path` is a contact document this coordinator manages.
    pub fn is_contact_path(&self, path: &str) -> bool {
        in_folder(path, &self.config.contacts_folder) && is_document(path)
    }

    // ── Lifecycle ─────────────────────────────────────────────

    pub async fn init(&self) -> SyncResult {
        self.rebuild().await
    }

    /// Rebuild the graph from every contact document's front matter.
    ///
    /// All documents are registered before any is decoded, so name
    /// references resolve to documents rather than creating phantoms.
    /// Nothing is written.
    pub async fn rebuild(&self) -> SyncResult {
        let mut result = SyncResult::new();
        {
            self.graph.write().clear();
            self.index.write().clear();
        }

        let folder = self.config.contacts_folder.clone();
        let listed = match self.store.list(&folder).await {
            Ok(listed) => listed,
            Err(e) => return SyncResult::failed(SyncError::store(&folder, e)),
        };

        let mut docs = Vec::with_capacity(listed.len());
        for meta in listed {
            match self.load(&meta.path).await {
                Ok(doc) => docs.push(doc),
                Err(e) => result.record_error(e),
            }
        }

        for doc in &docs {
            let identity = self.identify(&doc.path, &doc.front.fields);
            self.register(&doc.path, &identity);
        }

        for doc in &docs {
            let Some(id) = self.id_of(&doc.path) else {
                continue;
            };
            let ops = {
                let mut graph = self.graph.write();
                let current = graph.get_contact_relationships(&id);
                let ops = FrontMatterCodec::diff(&id, &doc.front.fields, &current, &graph);
                apply_all(&mut graph, &ops);
                ops
            };
            result.record_operations(ops);
        }

        {
            let graph = self.graph.read();
            tracing::info!(
                documents = docs.len(),
                contacts = graph.node_count(),
                edges = graph.edge_count(),
                "Contact graph rebuilt"
            );
        }
        result
    }

    /// Rebuild, then re-encode both representations of every document.
    pub async fn resync_all(&self) -> SyncResult {
        let mut result = self.rebuild().await;
        let paths = self.index.read().paths();
        for path in &paths {
            result.merge(self.reencode(path, true, true).await);
        }
        tracing::info!(
            documents = paths.len(),
            updated = result.documents_updated.len(),
            errors = result.errors.len(),
            "Full resync complete"
        );
        result
    }

    /// Forget all state and cancel pending edits.
    pub fn clear(&self) {
        self.debouncer.cancel_all();
        self.graph.write().clear();
        self.index.write().clear();
    }

    // ── Events ────────────────────────────────────────────────

    /// Route a change notification.
    ///
    /// `Modified` only schedules a debounced pass and returns an empty result.
    pub async fn handle_event(self: &Arc<Self>, event: DocumentEvent) -> SyncResult {
        let result = match event {
            DocumentEvent::Renamed { from, to } => {
                match (self.is_contact_path(&from), self.is_contact_path(&to)) {
                    (false, false) => return SyncResult::new(),
                    (true, false) => self.on_delete(&from).await,
                    (_, true) => self.on_rename(&from, &to).await,
                }
            }
            DocumentEvent::ExternalRecord { fields } => self.apply_record(fields).await,
            DocumentEvent::Created { path }
            | DocumentEvent::Opened { path }
            | DocumentEvent::Modified { path }
            | DocumentEvent::Closed { path }
            | DocumentEvent::Deleted { path }
                if !self.is_contact_path(&path) =>
            {
                tracing::debug!(path, "Ignoring event outside the contacts folder");
                return SyncResult::new();
            }
            DocumentEvent::Created { path } | DocumentEvent::Opened { path } => {
                self.sync_open(&path).await
            }
            DocumentEvent::Modified { path } => {
                self.schedule_modify(&path);
                return SyncResult::new();
            }
            DocumentEvent::Closed { path } => self.on_close(&path).await,
            DocumentEvent::Deleted { path } => self.on_delete(&path).await,
        };
        log_summary(&result);
        result
    }

    /// Debounce a markdown edit; the last edit in a burst is synced.
    pub fn schedule_modify(self: &Arc<Self>, path: &str) {
        let this = Arc::clone(self);
        let owned = path.to_string();
        self.debouncer.schedule(path, move || async move {
            let result = this.sync_from_markdown(&owned, false).await;
            log_summary(&result);
        });
    }

    /// Front matter is authoritative: decode it into the graph and
    /// re-render the Related section.
    pub async fn sync_open(&self, path: &str) -> SyncResult {
        let mut result = SyncResult::new();
        let guard = self.locks.acquire(path).await;
        note_reclaim(&guard, &mut result);

        let doc = match self.load(path).await {
            Ok(doc) => doc,
            Err(e) => {
                result.record_error(e);
                return result;
            }
        };
        let identity = self.identify(path, &doc.front.fields);
        let mut neighbors = self.register(path, &identity);
        let id = identity.id;

        let (ops, text) = {
            let mut graph = self.graph.write();
            let before = graph.targets_of(&id);
            let current = graph.get_contact_relationships(&id);
            let ops = FrontMatterCodec::diff(&id, &doc.front.fields, &current, &graph);
            if apply_all(&mut graph, &ops) {
                neighbors.extend(before);
                neighbors.extend(graph.targets_of(&id));
            }
            let body = self.render_markdown(&graph, &id, &doc.front.body);
            (ops, doc.rebuild(None, Some(&body)))
        };
        result.record_operations(ops);
        match text {
            Ok(text) => {
                self.write_if_changed(&doc, text, &mut result).await;
            }
            Err(e) => result.record_error(e),
        }
        drop(guard);

        result.merge(self.propagate(&id, neighbors).await);
        result
    }

    /// The Related section is authoritative: decode it into the graph and
    /// re-encode front matter.
    ///
    /// Front matter is rewritten when the edge set changed, or always when
    /// `flush` is set (leaving the document). A document without a Related
    /// section changes nothing.
    pub async fn sync_from_markdown(&self, path: &str, flush: bool) -> SyncResult {
        let mut result = SyncResult::new();
        let guard = self.locks.acquire(path).await;
        note_reclaim(&guard, &mut result);

        let doc = match self.load(path).await {
            Ok(doc) => doc,
            Err(e) => {
                result.record_error(e);
                return result;
            }
        };
        let identity = self.identify(path, &doc.front.fields);
        let mut neighbors = self.register(path, &identity);
        let id = identity.id;

        let outcome = {
            let mut graph = self.graph.write();
            let before = graph.targets_of(&id);
            let current = graph.get_contact_relationships(&id);
            MarkdownCodec::diff(&id, &doc.front.body, &current, &graph).map(|ops| {
                let changed = apply_all(&mut graph, &ops);
                if changed {
                    neighbors.extend(before);
                    neighbors.extend(graph.targets_of(&id));
                }
                let text = (changed || flush).then(|| {
                    let fields = self.encode_fields(&graph, &id, &doc.front.fields);
                    doc.rebuild(fields.as_ref(), None)
                });
                (ops, text)
            })
        };
        match outcome {
            None => tracing::debug!(path, "No Related section"),
            Some((ops, text)) => {
                result.record_operations(ops);
                match text {
                    Some(Ok(text)) => {
                        self.write_if_changed(&doc, text, &mut result).await;
                    }
                    Some(Err(e)) => result.record_error(e),
                    None => {}
                }
            }
        }
        drop(guard);

        result.merge(self.propagate(&id, neighbors).await);
        result
    }

    /// Leaving a document flushes its pending edit immediately.
    pub async fn on_close(&self, path: &str) -> SyncResult {
        self.debouncer.cancel(path);
        self.sync_from_markdown(path, true).await
    }

    /// Drop a deleted document's contact with every edge touching it, then
    /// re-encode the former neighbors without it.
    pub async fn on_delete(&self, path: &str) -> SyncResult {
        self.debouncer.cancel(path);
        let mut result = SyncResult::new();
        let guard = self.locks.acquire(path).await;
        note_reclaim(&guard, &mut result);

        let dropped = {
            let mut graph = self.graph.write();
            let mut index = self.index.write();
            index.remove_path(path).map(|id| {
                let neighbors = graph.drop_node(&id);
                (id, neighbors)
            })
        };
        drop(guard);

        let Some((id, neighbors)) = dropped else {
            tracing::debug!(path, "Deleted document was not a known contact");
            return result;
        };
        tracing::info!(path, contact = %id, neighbors = neighbors.len(), "Contact deleted");
        result.merge(self.propagate(&id, neighbors.into_iter().collect()).await);
        result
    }

    /// Follow a moved document and re-render every contact linking to it.
    pub async fn on_rename(&self, from: &str, to: &str) -> SyncResult {
        self.debouncer.cancel(from);
        let Some(old_id) = self.id_of(from) else {
            return self.sync_open(to).await;
        };

        let mut result = SyncResult::new();
        let guard = self.locks.acquire(to).await;
        note_reclaim(&guard, &mut result);

        let doc = match self.load(to).await {
            Ok(doc) => doc,
            Err(e) => {
                result.record_error(e);
                return result;
            }
        };
        self.index.write().remove_path(from);
        let identity = self.identify(to, &doc.front.fields);
        let mut neighbors = self.register(to, &identity);
        {
            let mut graph = self.graph.write();
            if old_id != identity.id {
                neighbors.extend(graph.rekey(&old_id, &identity.id));
            }
            neighbors.extend(graph.sources_of(&identity.id));
        }
        drop(guard);

        tracing::info!(from, to, contact = %identity.id, "Contact document renamed");
        result.merge(self.propagate(&identity.id, neighbors).await);
        result
    }

    // ── Consistency ───────────────────────────────────────────

    pub fn check_consistency(&self) -> Vec<MissingReciprocal> {
        self.graph.read().check_consistency()
    }

    /// Add every missing reciprocal edge and re-encode the affected documents.
    pub async fn repair(&self) -> SyncResult {
        let mut result = SyncResult::new();
        let affected = {
            let mut graph = self.graph.write();
            let ops: Vec<SyncOperation> = graph
                .check_consistency()
                .iter()
                .map(|m| SyncOperation::add(m.source_id.clone(), &graph.reference_for(&m.target_id), &m.kind))
                .collect();
            result.record_operations(ops);
            graph.repair_consistency()
        };
        let paths: Vec<String> = {
            let index = self.index.read();
            let mut paths: Vec<String> = affected
                .iter()
                .filter_map(|id| index.by_id.get(id).cloned())
                .collect();
            paths.sort();
            paths
        };
        for path in paths {
            let render_markdown = !self.debouncer.is_pending(&path);
            result.merge(self.reencode(&path, render_markdown, true).await);
        }
        result
    }

    // ── Internals ─────────────────────────────────────────────

    pub(crate) async fn load(&self, path: &str) -> Result<Document> {
        let text = self
            .store
            .read(path)
            .await
            .map_err(|e| SyncError::store(path, e))?;
        Document::parse(path, text)
    }

    pub(crate) fn move_indexed(&self, from: &str, to: &str) {
        self.debouncer.cancel(from);
        self.index.write().move_path(from, to);
    }

    pub(crate) fn indexed_paths(&self) -> Vec<String> {
        self.index.read().paths()
    }

    fn identify(&self, path: &str, fields: &FieldMap) -> Identity {
        let name = fields
            .get_ignore_case(&self.config.name_field)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| file_stem(path));
        let id = match fields
            .get_ignore_case(&self.config.uid_field)
            .map(str::trim)
            .filter(|u| !u.is_empty())
        {
            Some(uid) => ContactId::from_uid(uid),
            None => ContactId::from_name(&name),
        };
        let gender = fields
            .get_ignore_case(&self.config.gender_field)
            .and_then(|raw| match raw.parse::<Gender>() {
                Ok(gender) => Some(gender),
                Err(e) => {
                    tracing::debug!(path, error = %e, "Ignoring gender field");
                    None
                }
            });
        Identity { id, name, gender }
    }

    /// Put a document's contact into the graph and index.
    ///
    /// A name-only phantom carrying the same display name is merged into the
    /// document's contact. Returns the contacts whose documents render this
    /// one and need re-encoding.
    fn register(&self, path: &str, identity: &Identity) -> BTreeSet<ContactId> {
        let mut graph = self.graph.write();
        let mut index = self.index.write();
        let mut touched = BTreeSet::new();
        let id = &identity.id;

        if let Some(previous) = index.insert(path, id.clone()).filter(|p| p != id) {
            touched.extend(graph.rekey(&previous, id));
        }

        let is_phantom = |candidate: &ContactId| {
            candidate != id && candidate.is_name_based() && !index.by_id.contains_key(candidate)
        };
        let phantom = graph
            .resolve_name(&identity.name)
            .filter(|c| is_phantom(c))
            .or_else(|| {
                let by_name = ContactId::from_name(&identity.name);
                (graph.contains(&by_name) && is_phantom(&by_name)).then_some(by_name)
            });

        let renamed = graph
            .contact(id)
            .is_some_and(|node| node.display_name != identity.name);
        graph.add_contact(id.clone(), &identity.name, None);
        if let Some(phantom) = phantom {
            tracing::debug!(phantom = %phantom, contact = %id, "Promoting phantom contact");
            touched.extend(graph.rekey(&phantom, id));
        }
        let regendered = match identity.gender {
            Some(gender) => graph.set_gender(id, Some(gender)),
            None => false,
        };
        if renamed || regendered {
            touched.extend(graph.sources_of(id));
        }
        touched.remove(id);
        touched
    }

    /// Re-encoded fields for `id`, or `None` when nothing would change.
    ///
    /// Relationship fields are regenerated in place of the first existing
    /// one. The revision is bumped only when the fields differ.
    fn encode_fields(&self, graph: &ContactGraph, id: &ContactId, fields: &FieldMap) -> Option<FieldMap> {
        let encoded = FrontMatterCodec::encode(&graph.get_contact_relationships(id));
        let anchor = fields
            .keys()
            .position(FrontMatterCodec::is_relationship_key)
            .unwrap_or(fields.len());

        let mut next = fields.clone();
        next.retain(|key, _| !FrontMatterCodec::is_relationship_key(key));
        next.splice_at(
            anchor,
            encoded.iter().map(|(k, v)| (k.to_string(), v.to_string())),
        );

        if self.config.write_inferred_gender
            && graph.gender_inferred(id)
            && next.get_ignore_case(&self.config.gender_field).is_none()
        {
            if let Some(gender) = graph.contact(id).and_then(|n| n.gender) {
                next.insert(self.config.gender_field.clone(), gender.code());
            }
        }

        if &next == fields {
            return None;
        }
        let rev_key = next
            .keys()
            .find(|k| k.eq_ignore_ascii_case(&self.config.revision_field))
            .unwrap_or(self.config.revision_field.as_str())
            .to_string();
        next.insert(rev_key, format_revision(Utc::now()));
        Some(next)
    }

    fn render_markdown(&self, graph: &ContactGraph, id: &ContactId, body: &str) -> String {
        let relationships = graph.get_contact_relationships(id);
        self.markdown
            .render_into(body, &relationships, self.config.create_missing_section)
    }

    /// Re-encode one document from the graph.
    ///
    /// `wait` queues for the document lock; otherwise a busy document is
    /// reported as contention and skipped.
    async fn reencode(&self, path: &str, render_markdown: bool, wait: bool) -> SyncResult {
        let mut result = SyncResult::new();
        let guard = if wait {
            self.locks.acquire(path).await
        } else {
            match self.locks.try_acquire(path) {
                Ok(guard) => guard,
                Err(e) => {
                    tracing::debug!(path, "Neighbor busy, leaving it for its own pass");
                    return SyncResult::failed(e);
                }
            }
        };
        note_reclaim(&guard, &mut result);

        let doc = match self.load(path).await {
            Ok(doc) => doc,
            Err(e) => {
                result.record_error(e);
                return result;
            }
        };
        let Some(id) = self.id_of(path) else {
            return result;
        };
        let text = {
            let graph = self.graph.read();
            let fields = self.encode_fields(&graph, &id, &doc.front.fields);
            let body = render_markdown.then(|| self.render_markdown(&graph, &id, &doc.front.body));
            doc.rebuild(fields.as_ref(), body.as_deref())
        };
        match text {
            Ok(text) => {
                self.write_if_changed(&doc, text, &mut result).await;
            }
            Err(e) => result.record_error(e),
        }
        drop(guard);
        result
    }

    /// Re-encode the documents of `neighbors`, skipping `origin`.
    ///
    /// A neighbor with a pending edit keeps its Related section; its own
    /// pass will follow.
    async fn propagate(&self, origin: &ContactId, neighbors: BTreeSet<ContactId>) -> SyncResult {
        let mut result = SyncResult::new();
        let paths: Vec<String> = {
            let index = self.index.read();
            neighbors
                .iter()
                .filter(|n| *n != origin)
                .filter_map(|n| index.by_id.get(n).cloned())
                .collect()
        };
        for path in paths {
            let render_markdown = !self.debouncer.is_pending(&path);
            result.merge(self.reencode(&path, render_markdown, false).await);
        }
        result
    }

    pub(crate) async fn write_if_changed(&self, doc: &Document, text: String, result: &mut SyncResult) -> bool {
        if text == doc.text {
            tracing::debug!(path = %doc.path, "Document unchanged");
            return false;
        }
        match self.store.write(&doc.path, &text).await {
            Ok(()) => {
                tracing::debug!(path = %doc.path, bytes = text.len(), "Document written");
                result.record_write(&doc.path);
                true
            }
            Err(e) => {
                result.record_error(SyncError::store(&doc.path, e));
                false
            }
        }
    }
}

/// Apply operations in order. Returns whether any changed the graph.
fn apply_all(graph: &mut ContactGraph, ops: &[SyncOperation]) -> bool {
    let mut changed = false;
    for op in ops {
        changed |= graph.apply(op);
    }
    changed
}

fn file_stem(path: &str) -> String {
    Path::new(path)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

pub(crate) fn note_reclaim(guard: &LockGuard, result: &mut SyncResult) {
    if let Some(e) = guard.reclaimed() {
        result.record_error(e);
    }
}

fn log_summary(result: &SyncResult) {
    if result.documents_updated.is_empty() && result.errors.is_empty() {
        return;
    }
    tracing::info!(
        success = result.success,
        updated = result.documents_updated.len(),
        operations = result.operations.len(),
        errors = result.errors.len(),
        "Sync pass complete"
    );
}
