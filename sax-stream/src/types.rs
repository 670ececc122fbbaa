//! Core types for the stream parser library
//!
//! This module defines the event and error types the parser emits while
//! walking a document. Every event carries owned data - nothing borrows
//! from the parser or from the native engine's short-lived buffers.

use std::fmt;
use std::path::PathBuf;

/// Result type for parser operations
pub type Result<T> = std::result::Result<T, StreamError>;

/// A single parsing event, delivered in strict document order
///
/// Events own their payloads: the bytes the native engine reports are
/// copied (and, where the event carries `String`s, validated as UTF-8)
/// before the event is handed to user code, so events remain valid for
/// as long as the caller keeps them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// The document has started; always the first event of a session
    DocumentStart,
    /// The document ended without a fatal error; always the last event
    DocumentEnd,
    /// An element start tag (also emitted for self-closing elements)
    ElementStart {
        name: String,
        /// Attributes in document order, duplicates preserved
        attributes: Vec<Attribute>,
    },
    /// An element end tag (also emitted for self-closing elements)
    ElementEnd { name: String },
    /// Character data between tags, references already expanded
    Characters(String),
    /// A comment body, delimiters stripped
    Comment(String),
    /// A CDATA section as raw bytes, exactly as written
    Cdata(Vec<u8>),
    /// A processing instruction; `data` is `None` when the instruction
    /// had nothing after its target
    ProcessingInstruction {
        target: String,
        data: Option<String>,
    },
}

impl StreamEvent {
    /// Element name for start and end events
    pub fn element_name(&self) -> Option<&str> {
        match self {
            StreamEvent::ElementStart { name, .. } => Some(name),
            StreamEvent::ElementEnd { name } => Some(name),
            _ => None,
        }
    }

    /// Textual payload for character and comment events
    pub fn text(&self) -> Option<&str> {
        match self {
            StreamEvent::Characters(text) => Some(text),
            StreamEvent::Comment(text) => Some(text),
            _ => None,
        }
    }

    /// True for the document boundary events
    pub fn is_document_boundary(&self) -> bool {
        matches!(self, StreamEvent::DocumentStart | StreamEvent::DocumentEnd)
    }
}

/// A single attribute from an element start tag
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    /// Decoded value; empty for attributes that appeared without one
    pub value: String,
}

impl Attribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Attribute {
            name: name.into(),
            value: value.into(),
        }
    }
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}=\"{}\"", self.name, self.value)
    }
}

/// Errors that can occur while parsing
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// The engine reported a fatal problem; parsing stopped at it
    #[error("Parse error at line {line}, column {column}: {message}")]
    Parse {
        message: String,
        line: u32,
        column: u32,
    },

    #[error("File not found: {0:?}")]
    FileNotFound(PathBuf),

    #[error("Invalid chunk size: {0} bytes")]
    InvalidChunkSize(usize),

    #[error("Failed to create a parser context")]
    ContextCreation,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A non-fatal problem noted while parsing
///
/// Warnings come from two places: the engine downgrades recoverable
/// structural problems in recovery mode, and the event builder notes
/// byte sequences it had to replace while decoding UTF-8. Engine
/// reports carry a position; decode notes do not.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseWarning {
    pub message: String,
    /// 1-based line of the engine report, if the engine attributed one
    pub line: Option<u32>,
    pub column: Option<u32>,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.line, self.column) {
            (Some(line), Some(column)) => {
                write!(f, "line {}, column {}: {}", line, column, self.message)
            }
            _ => write!(f, "{}", self.message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_accessors() {
        let start = StreamEvent::ElementStart {
            name: String::from("book"),
            attributes: vec![Attribute::new("id", "42")],
        };
        assert_eq!(start.element_name(), Some("book"));
        assert_eq!(start.text(), None);
        assert!(!start.is_document_boundary());

        let text = StreamEvent::Characters(String::from("hello"));
        assert_eq!(text.text(), Some("hello"));
        assert!(StreamEvent::DocumentEnd.is_document_boundary());
    }

    #[test]
    fn test_attribute_display() {
        let attr = Attribute::new("lang", "en");
        assert_eq!(format!("{}", attr), "lang=\"en\"");
    }

    #[test]
    fn test_parse_error_display() {
        let err = StreamError::Parse {
            message: String::from("Opening and ending tag mismatch: b line 1 and a"),
            line: 1,
            column: 8,
        };
        assert_eq!(
            format!("{}", err),
            "Parse error at line 1, column 8: Opening and ending tag mismatch: b line 1 and a"
        );
    }

    #[test]
    fn test_warning_display_with_and_without_position() {
        let positioned = ParseWarning {
            message: String::from("Entity 'nbsp' not defined"),
            line: Some(3),
            column: Some(7),
        };
        assert_eq!(
            format!("{}", positioned),
            "line 3, column 7: Entity 'nbsp' not defined"
        );

        let bare = ParseWarning {
            message: String::from("Invalid UTF-8 in element name"),
            line: None,
            column: None,
        };
        assert_eq!(format!("{}", bare), "Invalid UTF-8 in element name");
    }
}
