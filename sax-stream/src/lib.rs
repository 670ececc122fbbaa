//! # SAX Stream
//!
//! Safe streaming XML parsing on top of a native push engine.
//!
//! The engine underneath ([`sax_engine`]) speaks C: a callback table
//! of function pointers, an opaque context pointer threaded through
//! every call, and borrowed buffers that die when each callback
//! returns. This crate wraps that surface into an owned, ordered event
//! stream a plain Rust handler can consume without ever seeing a raw
//! pointer.
//!
//! ## Architecture
//!
//! The crate is organized in layers:
//!
//! - **Types** ([`types`]): owned event and error types shared by the
//!   whole crate
//! - **Handler** ([`handler`]): the [`EventHandler`] trait, its closure
//!   adapter and the ready-made [`EventCollector`]
//! - **Config** ([`config`]): parser options and chunk sizing
//! - **Parser** ([`parser`]): [`StreamParser`], which owns the handler
//!   and drives the engine over strings, byte slices, readers and files
//!
//! Behind the public surface, a per-parse session carries handler
//! state across the C boundary under an opaque token, trampolines fill
//! the engine's callback table, and a dispatch layer copies every
//! borrowed buffer into owned payloads before the handler runs.
//!
//! What this crate does NOT do:
//!
//! - No DOM or tree building; events are forwarded and forgotten
//! - No namespace resolution, DTD validation or XPath
//! - No async surface; parsing is synchronous on the calling thread
//!
//! Event order mirrors the document: one `DocumentStart`, balanced
//! element events, one `DocumentEnd` on success. The first fatal error
//! ends delivery and becomes the returned `Err`; warnings accumulate
//! without interrupting the stream.
//!
//! ## Example Usage
//!
//! ```
//! use sax_stream::{Flow, StreamEvent, StreamParser};
//!
//! let mut depth = 0usize;
//! let mut max_depth = 0usize;
//! let mut parser = StreamParser::new(|event: StreamEvent| {
//!     match event {
//!         StreamEvent::ElementStart { .. } => {
//!             depth += 1;
//!             max_depth = max_depth.max(depth);
//!         }
//!         StreamEvent::ElementEnd { .. } => depth -= 1,
//!         _ => {}
//!     }
//!     Flow::Continue
//! });
//! parser.parse_str("<a><b><c/></b></a>")?;
//! drop(parser);
//! assert_eq!(max_depth, 3);
//! # Ok::<(), sax_stream::StreamError>(())
//! ```

pub mod config;
pub mod handler;
pub mod parser;
pub mod types;

mod dispatch;
mod session;
mod trampoline;

pub use config::{ChunkSize, ParserConfig};
pub use handler::{EventCollector, EventHandler, Flow};
pub use parser::{ParseSummary, StreamParser};
pub use types::{Attribute, ParseWarning, Result, StreamError, StreamEvent};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_collector_round() {
        let mut parser = StreamParser::new(EventCollector::new());
        let summary = parser.parse_str("<doc><p>hello</p></doc>").unwrap();
        assert_eq!(summary.events_dispatched, 7);
        assert!(!summary.stopped);
    }
}
