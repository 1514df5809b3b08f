//! Applying external contact records to the vault.
//!
//! A record is matched to a document by UID (by display name when it has
//! none). Unknown records become new documents. Known documents are only
//! replaced by a strictly newer revision, and replacement is whole-document:
//! anything in the body outside the Related section is lost, which is why
//! an ambiguous revision always declines the update.

use std::path::Path;

use kinship_codec::slug::FALLBACK_NAME;
use kinship_codec::{document_path, parse_revision, should_update, slugify, FrontMatter};
use kinship_core::{ContactId, FieldMap};

use crate::coordinator::{note_reclaim, SyncCoordinator};
use crate::error::{Result, SyncError, StoreError};
use crate::result::SyncResult;

const RECORD_SOURCE: &str = "<record>";

impl SyncCoordinator {
    /// Create or update the document for an external record.
    pub async fn apply_record(&self, record: FieldMap) -> SyncResult {
        let name = record
            .get_ignore_case(&self.config.name_field)
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .map(str::to_string);
        let uid = record
            .get_ignore_case(&self.config.uid_field)
            .map(str::trim)
            .filter(|u| !u.is_empty());

        let id = match (uid, name.as_deref()) {
            (Some(uid), _) => ContactId::from_uid(uid),
            (None, Some(name)) => ContactId::from_name(name),
            (None, None) => {
                return SyncResult::failed(SyncError::ParseFailure {
                    path: RECORD_SOURCE.to_string(),
                    detail: "record has neither a UID nor a name".to_string(),
                })
            }
        };
        let name = name.unwrap_or_else(|| FALLBACK_NAME.to_string());

        match self.path_of(&id) {
            Some(path) => self.update_from_record(&path, &name, record).await,
            None => self.create_from_record(&id, &name, record).await,
        }
    }

    async fn create_from_record(&self, id: &ContactId, name: &str, record: FieldMap) -> SyncResult {
        let mut result = SyncResult::new();
        let path = match self.free_path(name).await {
            Ok(path) => path,
            Err(e) => return SyncResult::failed(e),
        };

        let text = match record_text(record) {
            Ok(text) => text,
            Err(e) => return SyncResult::failed(e),
        };
        {
            let guard = self.locks().acquire(&path).await;
            note_reclaim(&guard, &mut result);
            if let Err(e) = self.store.write(&path, &text).await {
                result.record_error(SyncError::store(&path, e));
                return result;
            }
        }
        result.record_write(&path);
        tracing::info!(path, contact = %id, "Created contact from record");

        result.merge(self.sync_open(&path).await);
        result
    }

    async fn update_from_record(&self, path: &str, name: &str, record: FieldMap) -> SyncResult {
        let mut result = SyncResult::new();
        let rev_field = self.config.revision_field.clone();
        let current = {
            let guard = self.locks().acquire(path).await;
            note_reclaim(&guard, &mut result);

            let doc = match self.load(path).await {
                Ok(doc) => doc,
                Err(e) => {
                    result.record_error(e);
                    return result;
                }
            };
            let incoming = record.get_ignore_case(&rev_field).map(str::to_string);
            let existing = doc.front.fields.get_ignore_case(&rev_field).map(str::to_string);
            if !should_update(incoming.as_deref(), existing.as_deref()) {
                if is_ambiguous(incoming.as_deref()) || is_ambiguous(existing.as_deref()) {
                    result.record_error(SyncError::RevisionAmbiguous { incoming, existing });
                } else {
                    tracing::debug!(path, "Existing document is as new as the record");
                }
                return result;
            }

            let text = match record_text(record) {
                Ok(text) => text,
                Err(e) => {
                    result.record_error(e);
                    return result;
                }
            };
            let target = sibling_path(path, &slugify(name));
            let mut current = path.to_string();
            if target != path {
                match self.store.rename(path, &target).await {
                    Ok(()) => {
                        self.move_indexed(path, &target);
                        tracing::info!(from = path, to = %target, "Renamed contact to match record");
                        current = target;
                    }
                    Err(StoreError::AlreadyExists(_)) => {
                        result.record_error(SyncError::RenameConflict {
                            from: path.to_string(),
                            to: target,
                        });
                        return result;
                    }
                    Err(e) => {
                        result.record_error(SyncError::store(path, e));
                        return result;
                    }
                }
            }

            if let Err(e) = self.store.write(&current, &text).await {
                result.record_error(SyncError::store(&current, e));
                return result;
            }
            result.record_write(&current);
            drop(guard);
            current
        };

        result.merge(self.sync_open(&current).await);
        result
    }

    /// The front-matter fields of one contact document, named.
    pub async fn export_record(&self, path: &str) -> Result<FieldMap> {
        let doc = self.load(path).await?;
        let mut fields = doc.front.fields;
        if fields.get_ignore_case(&self.config.name_field).is_none() {
            let stem = Path::new(path)
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            fields.splice_at(0, [(self.config.name_field.clone(), stem)]);
        }
        Ok(fields)
    }

    /// Every indexed contact document as a record, in path order.
    pub async fn export_records(&self) -> Result<Vec<FieldMap>> {
        let mut records = Vec::new();
        for path in self.indexed_paths() {
            records.push(self.export_record(&path).await?);
        }
        Ok(records)
    }

    /// A document path for `name` that is not yet taken.
    async fn free_path(&self, name: &str) -> Result<String> {
        let folder = &self.config.contacts_folder;
        let mut candidate = document_path(folder, name);
        let mut n = 1;
        loop {
            match self.store.exists(&candidate).await {
                Ok(false) => return Ok(candidate),
                Ok(true) => {
                    n += 1;
                    candidate = document_path(folder, &format!("{} {n}", slugify(name)));
                }
                Err(e) => return Err(SyncError::store(&candidate, e)),
            }
        }
    }
}

fn record_text(record: FieldMap) -> Result<String> {
    FrontMatter::new(record, String::new())
        .render()
        .map_err(|e| SyncError::parse(RECORD_SOURCE, e))
}

fn is_ambiguous(revision: Option<&str>) -> bool {
    revision.map_or(true, |r| parse_revision(r).is_err())
}

/// `stem.md` in the same folder as `path`.
fn sibling_path(path: &str, stem: &str) -> String {
    match path.rsplit_once('/') {
        Some((folder, _)) => format!("{folder}/{stem}.md"),
        None => format!("{stem}.md"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_path() {
        assert_eq!(sibling_path("Contacts/Family/Jane.md", "Jane Doe"), "Contacts/Family/Jane Doe.md");
        assert_eq!(sibling_path("Jane.md", "Jane Doe"), "Jane Doe.md");
    }

    #[test]
    fn test_ambiguity() {
        assert!(is_ambiguous(None));
        assert!(is_ambiguous(Some("soon")));
        assert!(!is_ambiguous(Some("20240101T000000Z")));
    }

    #[test]
    fn test_record_text() {
        let record: FieldMap = [("UID", "u-1"), ("FN", "Jane")].into_iter().collect();
        assert_eq!(record_text(record).unwrap(), "---\nUID: u-1\nFN: Jane\n---\n");
    }
}
