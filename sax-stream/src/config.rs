//! Parser configuration types
//!
//! This module defines the knobs the parser accepts. The set is
//! intentionally small - anything that would require interpreting the
//! document (filtering, selection, transformation) belongs in the
//! handler, not here.

use serde::{Deserialize, Serialize};

use crate::types::{Result, StreamError};

/// How much input to hand the engine per push
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChunkSize {
    Bytes(usize),
    Kilobytes(usize),
    Megabytes(usize),
}

impl ChunkSize {
    /// Size in bytes
    pub fn in_bytes(&self) -> usize {
        match self {
            ChunkSize::Bytes(n) => *n,
            ChunkSize::Kilobytes(n) => n.saturating_mul(1024),
            ChunkSize::Megabytes(n) => n.saturating_mul(1024 * 1024),
        }
    }

    /// Size in bytes, checked against what the engine accepts per call
    ///
    /// The engine takes chunk lengths as a C `int`, so a chunk must fit
    /// in `i32` and be at least one byte.
    pub fn validated_bytes(&self) -> Result<usize> {
        let bytes = self.in_bytes();
        if bytes == 0 || bytes > i32::MAX as usize {
            return Err(StreamError::InvalidChunkSize(bytes));
        }
        Ok(bytes)
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        ChunkSize::Kilobytes(64)
    }
}

/// Configuration for the stream parser
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParserConfig {
    /// Keep parsing after recoverable problems (mismatched end tags,
    /// valueless attributes, unknown entities), collecting them as
    /// warnings instead of failing
    #[serde(default)]
    pub recover: bool,

    /// Drop character events that consist of whitespace only
    #[serde(default)]
    pub skip_blank_text: bool,

    /// Chunk size used when feeding readers and files
    #[serde(default)]
    pub chunk_size: ChunkSize,
}

impl ParserConfig {
    /// Create a configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Preset for parsing documents of questionable quality: recovery
    /// on, whitespace-only text dropped
    pub fn lenient() -> Self {
        Self::new().with_recovery(true).with_skip_blank_text(true)
    }

    /// Builder method: enable or disable recovery
    pub fn with_recovery(mut self, enabled: bool) -> Self {
        self.recover = enabled;
        self
    }

    /// Builder method: enable or disable blank text skipping
    pub fn with_skip_blank_text(mut self, enabled: bool) -> Self {
        self.skip_blank_text = enabled;
        self
    }

    /// Builder method: set the chunk size
    pub fn with_chunk_size(mut self, chunk_size: ChunkSize) -> Self {
        self.chunk_size = chunk_size;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = ParserConfig::new()
            .with_recovery(true)
            .with_skip_blank_text(true)
            .with_chunk_size(ChunkSize::Bytes(10));

        assert!(config.recover);
        assert!(config.skip_blank_text);
        assert_eq!(config.chunk_size.in_bytes(), 10);
    }

    #[test]
    fn test_lenient_preset() {
        let config = ParserConfig::lenient();
        assert!(config.recover);
        assert!(config.skip_blank_text);
        assert_eq!(config.chunk_size, ChunkSize::default());
    }

    #[test]
    fn test_chunk_size_units() {
        assert_eq!(ChunkSize::Bytes(512).in_bytes(), 512);
        assert_eq!(ChunkSize::Kilobytes(4).in_bytes(), 4096);
        assert_eq!(ChunkSize::Megabytes(1).in_bytes(), 1_048_576);
    }

    #[test]
    fn test_chunk_size_validation() {
        assert_eq!(ChunkSize::Bytes(1).validated_bytes().unwrap(), 1);
        assert!(ChunkSize::Bytes(0).validated_bytes().is_err());
        assert!(ChunkSize::Megabytes(4096).validated_bytes().is_err());
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: ParserConfig = serde_json::from_str("{}").expect("parse config");
        assert!(!config.recover);
        assert!(!config.skip_blank_text);
        assert_eq!(config.chunk_size, ChunkSize::Kilobytes(64));

        let config: ParserConfig = serde_json::from_str(
            r#"{"recover": true, "chunk_size": {"bytes": 10}}"#,
        )
        .expect("parse config");
        assert!(config.recover);
        assert_eq!(config.chunk_size, ChunkSize::Bytes(10));
    }
}
