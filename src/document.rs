//! Document types consumed from external storage.
//!
//! Parsing (PDF/HTML/DOCX/source → text) and persistence are out of scope
//! for this crate; this module only defines the shape the engine expects
//! to receive. The engine treats `content` as opaque text, it never
//! inspects or re-parses it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single parsed document handed to [`crate::engine::Engine::query`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    /// Human-readable name, used in context metadata and sub-call framing.
    pub name: String,
    /// Opaque document text.
    pub content: String,
    /// Source format, e.g. `"pdf"`, `"html"`, `"txt"` (informational only).
    pub format: String,
    /// Arbitrary caller-supplied metadata.
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// `content.chars().count()`, cached by the caller rather than
    /// recomputed on every access.
    pub char_count: usize,
}

impl ParsedDocument {
    /// Construct a document, deriving `char_count` from `content`.
    pub fn new(name: impl Into<String>, content: impl Into<String>, format: impl Into<String>) -> Self {
        let content = content.into();
        let char_count = content.chars().count();
        Self {
            name: name.into(),
            content,
            format: format.into(),
            metadata: HashMap::new(),
            char_count,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_count_derived() {
        let doc = ParsedDocument::new("a.txt", "hello", "txt");
        assert_eq!(doc.char_count, 5);
        assert!(doc.metadata.is_empty());
    }
}
