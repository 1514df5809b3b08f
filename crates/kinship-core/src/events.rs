//! Change notifications delivered to the sync coordinator.
//!
//! Events come from the host document store (file lifecycle), the editor
//! (open/close) or an external contact source (records).

use serde::{Deserialize, Serialize};

use crate::types::FieldMap;

/// A change notification addressed to one document, tagged by type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event_type", rename_all = "snake_case")]
pub enum DocumentEvent {
    // ── Store lifecycle ──────────────────────────────────────
    Created { path: String },
    Modified { path: String },
    Deleted { path: String },
    Renamed { from: String, to: String },

    // ── Editor lifecycle ─────────────────────────────────────
    /// A document was opened; its front matter is authoritative.
    Opened { path: String },
    /// The editor left a document; flush pending markdown edits.
    Closed { path: String },

    // ── External source ──────────────────────────────────────
    /// A contact record arrived from an external source.
    ExternalRecord { fields: FieldMap },
}

impl DocumentEvent {
    /// The document path this event concerns, if it names one.
    pub fn path(&self) -> Option<&str> {
        match self {
            DocumentEvent::Created { path }
            | DocumentEvent::Modified { path }
            | DocumentEvent::Deleted { path }
            | DocumentEvent::Opened { path }
            | DocumentEvent::Closed { path } => Some(path),
            DocumentEvent::Renamed { to, .. } => Some(to),
            DocumentEvent::ExternalRecord { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_tags() {
        let event = DocumentEvent::Renamed {
            from: "Contacts/A.md".to_string(),
            to: "Contacts/B.md".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event_type\":\"renamed\""));
        assert_eq!(event.path(), Some("Contacts/B.md"));
    }

    #[test]
    fn external_record_roundtrip() {
        let fields: FieldMap = vec![("UID", "u-1"), ("FN", "Alice")].into_iter().collect();
        let event = DocumentEvent::ExternalRecord { fields };
        let json = serde_json::to_string(&event).unwrap();
        let back: DocumentEvent = serde_json::from_str(&json).unwrap();
        match back {
            DocumentEvent::ExternalRecord { fields } => assert_eq!(fields.get("FN"), Some("Alice")),
            other => panic!("unexpected event {other:?}"),
        }
        assert!(event.path().is_none());
    }
}
