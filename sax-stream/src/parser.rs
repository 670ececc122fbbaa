//! High-level streaming parser
//!
//! `StreamParser` owns the user's handler and a configuration, reads
//! input sources in chunks and drives the native push engine through
//! one session per parse call. All event payloads the handler sees are
//! owned; nothing borrowed from the engine survives a callback.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::config::{ChunkSize, ParserConfig};
use crate::handler::EventHandler;
use crate::session;
use crate::types::{ParseWarning, Result, StreamError};

/// What a finished parse did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseSummary {
    /// Number of events delivered to the handler
    pub events_dispatched: u64,
    /// True when the handler stopped the parse before the document ended
    pub stopped: bool,
    /// Number of warnings noted during this parse
    pub warnings: usize,
}

/// Streaming XML parser
///
/// # Example Usage
///
/// ```
/// use sax_stream::{EventCollector, StreamParser};
///
/// let mut parser = StreamParser::new(EventCollector::new());
/// parser.parse_str("<root><item id=\"1\"/></root>").unwrap();
/// for event in parser.handler().events() {
///     println!("{:?}", event);
/// }
/// ```
pub struct StreamParser<H: EventHandler> {
    handler: H,
    config: ParserConfig,
    chunk_bytes: usize,
    warnings: Vec<ParseWarning>,
}

impl<H: EventHandler> StreamParser<H> {
    /// Create a parser with default configuration
    pub fn new(handler: H) -> Self {
        StreamParser {
            handler,
            config: ParserConfig::default(),
            chunk_bytes: ChunkSize::default().in_bytes(),
            warnings: Vec::new(),
        }
    }

    /// Create a parser with the given configuration
    ///
    /// Fails when the configured chunk size cannot be fed to the
    /// native engine (zero bytes, or beyond `i32::MAX`).
    pub fn with_config(handler: H, config: ParserConfig) -> Result<Self> {
        let chunk_bytes = config.chunk_size.validated_bytes()?;
        Ok(StreamParser {
            handler,
            config,
            chunk_bytes,
            warnings: Vec::new(),
        })
    }

    /// The active configuration
    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse a complete document held in memory
    pub fn parse_bytes(&mut self, bytes: &[u8]) -> Result<ParseSummary> {
        self.parse_reader(bytes)
    }

    /// Parse a complete document held in a string
    pub fn parse_str(&mut self, text: &str) -> Result<ParseSummary> {
        self.parse_reader(text.as_bytes())
    }

    /// Parse everything a reader yields, feeding the engine chunk by
    /// chunk until end of input
    pub fn parse_reader<R: Read>(&mut self, reader: R) -> Result<ParseSummary> {
        self.warnings.clear();
        session::run_parse(
            &mut self.handler,
            &self.config,
            self.chunk_bytes,
            reader,
            &mut self.warnings,
        )
    }

    /// Parse an XML file
    pub fn parse_file(&mut self, path: &Path) -> Result<ParseSummary> {
        log::info!("Parsing file: {:?}", path);
        if !path.exists() {
            return Err(StreamError::FileNotFound(path.to_path_buf()));
        }
        let file = File::open(path)?;
        self.parse_reader(file)
    }

    /// Warnings noted by the most recent parse call
    pub fn warnings(&self) -> &[ParseWarning] {
        &self.warnings
    }

    /// Borrow the handler
    pub fn handler(&self) -> &H {
        &self.handler
    }

    /// Borrow the handler mutably
    pub fn handler_mut(&mut self) -> &mut H {
        &mut self.handler
    }

    /// Consume the parser and take the handler back
    pub fn into_handler(self) -> H {
        self.handler
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::EventCollector;
    use crate::types::StreamEvent;

    #[test]
    fn test_parse_str_collects_events() {
        let mut parser = StreamParser::new(EventCollector::new());
        let summary = parser.parse_str("<a><b>x</b></a>").unwrap();
        assert!(!summary.stopped);
        assert_eq!(summary.warnings, 0);
        let events = parser.into_handler().into_events();
        assert_eq!(events.len(), summary.events_dispatched as usize);
        assert!(matches!(events[0], StreamEvent::DocumentStart));
        assert!(matches!(events.last(), Some(StreamEvent::DocumentEnd)));
    }

    #[test]
    fn test_parse_file_missing() {
        let mut parser = StreamParser::new(EventCollector::new());
        let result = parser.parse_file(Path::new("/nonexistent/document.xml"));
        assert!(matches!(result, Err(StreamError::FileNotFound(_))));
    }

    #[test]
    fn test_invalid_chunk_size_rejected() {
        let config = ParserConfig::new().with_chunk_size(ChunkSize::Bytes(0));
        let result = StreamParser::with_config(EventCollector::new(), config);
        assert!(matches!(result, Err(StreamError::InvalidChunkSize(0))));
    }

    #[test]
    fn test_warnings_reset_between_parses() {
        let config = ParserConfig::lenient();
        let mut parser = StreamParser::with_config(EventCollector::new(), config).unwrap();
        parser.parse_str("<a checked></a>").unwrap();
        assert_eq!(parser.warnings().len(), 1);
        parser.parse_str("<a></a>").unwrap();
        assert!(parser.warnings().is_empty());
    }

    #[test]
    fn test_handler_access() {
        let mut parser = StreamParser::new(EventCollector::new());
        parser.parse_str("<only/>").unwrap();
        assert!(!parser.handler().is_empty());
        parser.handler_mut().take_events();
        assert!(parser.handler().is_empty());
    }
}
