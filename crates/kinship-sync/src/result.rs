//! Aggregate outcome of a coordinator operation.

use kinship_core::SyncOperation;
use serde::Serialize;

use crate::error::SyncError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    /// False when any fatal error was recorded.
    pub success: bool,
    /// Paths written, in write order, without repeats.
    pub documents_updated: Vec<String>,
    pub operations: Vec<SyncOperation>,
    pub errors: Vec<SyncError>,
}

impl Default for SyncResult {
    fn default() -> Self {
        Self {
            success: true,
            documents_updated: Vec::new(),
            operations: Vec::new(),
            errors: Vec::new(),
        }
    }
}

impl SyncResult {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failed(error: SyncError) -> Self {
        let mut result = Self::new();
        result.record_error(error);
        result
    }

    pub fn record_write(&mut self, path: &str) {
        if !self.documents_updated.iter().any(|p| p == path) {
            self.documents_updated.push(path.to_string());
        }
    }

    pub fn record_operations(&mut self, ops: impl IntoIterator<Item = SyncOperation>) {
        self.operations.extend(ops);
    }

    /// Record an error. A reclaimed stale lock is reported but not fatal.
    pub fn record_error(&mut self, error: SyncError) {
        if !matches!(error, SyncError::LockTimeout { .. }) {
            self.success = false;
        }
        self.errors.push(error);
    }

    pub fn merge(&mut self, other: SyncResult) {
        for path in &other.documents_updated {
            self.record_write(path);
        }
        self.operations.extend(other.operations);
        for error in other.errors {
            self.record_error(error);
        }
    }

    pub fn wrote(&self, path: &str) -> bool {
        self.documents_updated.iter().any(|p| p == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_timeout_is_not_fatal() {
        let mut result = SyncResult::new();
        result.record_error(SyncError::LockTimeout {
            path: "a.md".to_string(),
            held_for_ms: 30_000,
        });
        assert!(result.success);
        result.record_error(SyncError::LockContention {
            path: "b.md".to_string(),
        });
        assert!(!result.success);
    }

    #[test]
    fn test_merge_dedupes_writes() {
        let mut a = SyncResult::new();
        a.record_write("x.md");
        let mut b = SyncResult::new();
        b.record_write("x.md");
        b.record_write("y.md");
        a.merge(b);
        assert_eq!(a.documents_updated, vec!["x.md", "y.md"]);
        assert!(a.success);
    }

    #[test]
    fn test_serializes_errors_with_tag() {
        let result = SyncResult::failed(SyncError::NotFound {
            path: "gone.md".to_string(),
        });
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errors"][0]["error"], "not_found");
        assert_eq!(json["errors"][0]["path"], "gone.md");
    }
}
