//! Push XML Parser Engine
//!
//! A small, incremental XML parser exposed through a C-style SAX
//! interface: a table of callback function pointers, an opaque
//! user-data pointer threaded through every callback, and a chunked
//! push entry point.
//!
//! # Architecture
//!
//! The engine is deliberately minimal:
//! - Accepts input in arbitrary chunks and never reports torn tokens
//! - Reports start/end of document and elements, character data,
//!   comments, CDATA sections and processing instructions
//! - Enforces well-formedness (tag matching, single root, placement)
//! - Renders ready-to-display error messages with line/column info
//!
//! The engine does NOT:
//! - Build a document tree
//! - Resolve DTDs, schemas or external entities
//! - Transcode input (content is passed through as UTF-8 bytes)
//!
//! Callback arguments point into engine-owned buffers and are valid
//! only for the duration of each callback; callers that keep data must
//! copy it out before returning.
//!
//! # Example Usage
//!
//! ```no_run
//! use std::ptr;
//! use sax_engine::{
//!     sax_free_ctxt, sax_parse_chunk, sax_push_ctxt_create, SaxHandler,
//! };
//!
//! let handler = SaxHandler::default(); // install callbacks as needed
//! let ctxt = unsafe { sax_push_ctxt_create(&handler, ptr::null_mut(), 0) };
//! let chunk = b"<doc>hello</doc>";
//! unsafe {
//!     sax_parse_chunk(ctxt, chunk.as_ptr() as *const _, chunk.len() as i32, 0);
//!     sax_parse_chunk(ctxt, ptr::null(), 0, 1);
//!     sax_free_ctxt(ctxt);
//! }
//! ```

// Public modules
pub mod ctxt;
pub mod sax;

// Re-export the C-style surface for convenience
pub use ctxt::{
    sax_free_ctxt, sax_last_error, sax_parse_chunk, sax_push_ctxt_create, sax_stop_parser,
    SaxPushCtxt,
};
pub use sax::{
    SaxErrCode, SaxErrorInfo, SaxErrorLevel, SaxHandler, SAX_OPT_NO_BLANKS, SAX_OPT_RECOVER,
};

// Internal modules (not exposed in public API)
mod entities;
mod scanner;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
