//! On-disk trace document, as written by the upstream normalizer.

use crate::event::TraceEvent;
use cityscape_core::CoreResult;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use tracing::debug;

/// A normalized trace file: instrumenter metadata plus the event list.
///
/// Loading re-stamps every event's `index` with its position, so downstream
/// code can treat the index as replay time regardless of what the wire `id`
/// fields said.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceDocument {
    /// Instrumenter-recorded metadata, passed through untouched
    #[serde(default)]
    pub metadata: IndexMap<String, String>,
    /// The events, in emission order
    #[serde(rename = "traces")]
    pub events: Vec<TraceEvent>,
}

impl TraceDocument {
    /// Document over the given events, re-stamped, with no metadata
    #[must_use]
    pub fn new(events: Vec<TraceEvent>) -> Self {
        let mut document = Self {
            metadata: IndexMap::new(),
            events,
        };
        document.restamp();
        document
    }

    /// Parses a document from JSON text.
    ///
    /// # Errors
    ///
    /// Returns an error when the text is not a valid trace document.
    pub fn from_json(text: &str) -> CoreResult<Self> {
        let mut document: Self = serde_json::from_str(text)?;
        document.restamp();
        debug!(events = document.events.len(), "parsed trace document");
        Ok(document)
    }

    /// Parses a document from a reader.
    ///
    /// # Errors
    ///
    /// Returns an error when reading fails or the content is not a valid
    /// trace document.
    pub fn from_reader(reader: impl Read) -> CoreResult<Self> {
        let mut document: Self = serde_json::from_reader(reader)?;
        document.restamp();
        debug!(events = document.events.len(), "parsed trace document");
        Ok(document)
    }

    /// Loads a document from a file on disk.
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be opened or parsed.
    pub fn from_path(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let document = Self::from_reader(BufReader::new(file))?;
        debug!(path = %path.display(), "loaded trace document");
        Ok(document)
    }

    /// Number of events in the document
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the document holds no events
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    fn restamp(&mut self) {
        for (position, event) in self.events.iter_mut().enumerate() {
            event.index = position;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventKind;

    #[test]
    fn test_parses_normalizer_output() {
        let json = r#"{
            "metadata": {"language": "c", "source": "loops.c"},
            "traces": [
                {"type": "CALL", "subject": "main", "stack_depth": 0},
                {"type": "RETURN", "subject": "main", "stack_depth": 0}
            ]
        }"#;
        let document = TraceDocument::from_json(json).unwrap();
        assert_eq!(document.len(), 2);
        assert_eq!(document.metadata.get("language").map(String::as_str), Some("c"));
        assert_eq!(document.events[0].kind, EventKind::Call);
        assert_eq!(document.events[1].kind, EventKind::Return);
    }

    #[test]
    fn test_loading_restamps_indices() {
        let json = r#"{
            "traces": [
                {"id": 40, "type": "CALL", "subject": "main"},
                {"id": 41, "type": "RETURN", "subject": "main"}
            ]
        }"#;
        let document = TraceDocument::from_json(json).unwrap();
        assert_eq!(document.events[0].index, 0);
        assert_eq!(document.events[1].index, 1);
    }

    #[test]
    fn test_metadata_is_optional() {
        let document = TraceDocument::from_json(r#"{"traces": []}"#).unwrap();
        assert!(document.is_empty());
        assert!(document.metadata.is_empty());
    }

    #[test]
    fn test_rejects_non_document_json() {
        assert!(TraceDocument::from_json("[1, 2, 3]").is_err());
        assert!(TraceDocument::from_json("not json").is_err());
    }

    #[test]
    fn test_new_restamps() {
        let events = vec![
            TraceEvent::new(EventKind::Call).with_index(9),
            TraceEvent::new(EventKind::Return).with_index(9),
        ];
        let document = TraceDocument::new(events);
        assert_eq!(document.events[0].index, 0);
        assert_eq!(document.events[1].index, 1);
    }

    #[test]
    fn test_round_trips_through_json() {
        let json = r#"{
            "metadata": {"source": "a.c"},
            "traces": [{"type": "DECL", "subject": "x", "value": "1"}]
        }"#;
        let document = TraceDocument::from_json(json).unwrap();
        let text = serde_json::to_string(&document).unwrap();
        let back = TraceDocument::from_json(&text).unwrap();
        assert_eq!(document, back);
    }
}
