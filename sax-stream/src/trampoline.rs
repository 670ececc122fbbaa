//! C-ABI trampolines installed into the engine's callback table
//!
//! Fixed free functions with no captured state: each one forwards its
//! raw arguments straight to the dispatch layer, which owns all
//! pointer interpretation. Keeping these bodies trivial means the
//! whole callback surface can be audited in one screen.

use std::os::raw::{c_char, c_int, c_void};

use sax_engine::{SaxErrorInfo, SaxHandler};

use crate::dispatch;

unsafe extern "C" fn document_start(ctx: *mut c_void) {
    dispatch::document_start(ctx);
}

unsafe extern "C" fn document_end(ctx: *mut c_void) {
    dispatch::document_end(ctx);
}

unsafe extern "C" fn element_start(
    ctx: *mut c_void,
    name: *const c_char,
    attrs: *const *const c_char,
) {
    dispatch::element_start(ctx, name, attrs);
}

unsafe extern "C" fn element_end(ctx: *mut c_void, name: *const c_char) {
    dispatch::element_end(ctx, name);
}

unsafe extern "C" fn characters(ctx: *mut c_void, ch: *const c_char, len: c_int) {
    dispatch::characters(ctx, ch, len);
}

unsafe extern "C" fn comment(ctx: *mut c_void, value: *const c_char) {
    dispatch::comment(ctx, value);
}

unsafe extern "C" fn cdata_block(ctx: *mut c_void, value: *const c_char, len: c_int) {
    dispatch::cdata_block(ctx, value, len);
}

unsafe extern "C" fn processing_instruction(
    ctx: *mut c_void,
    target: *const c_char,
    data: *const c_char,
) {
    dispatch::processing_instruction(ctx, target, data);
}

unsafe extern "C" fn parse_error(ctx: *mut c_void, report: *const SaxErrorInfo) {
    dispatch::parse_error(ctx, report);
}

/// The full callback table wired to this crate's dispatch layer
pub(crate) fn handler_table() -> SaxHandler {
    SaxHandler {
        start_document: Some(document_start),
        end_document: Some(document_end),
        start_element: Some(element_start),
        end_element: Some(element_end),
        characters: Some(characters),
        comment: Some(comment),
        cdata_block: Some(cdata_block),
        processing_instruction: Some(processing_instruction),
        error: Some(parse_error),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_slot_is_installed() {
        let table = handler_table();
        assert!(table.start_document.is_some());
        assert!(table.end_document.is_some());
        assert!(table.start_element.is_some());
        assert!(table.end_element.is_some());
        assert!(table.characters.is_some());
        assert!(table.comment.is_some());
        assert!(table.cdata_block.is_some());
        assert!(table.processing_instruction.is_some());
        assert!(table.error.is_some());
    }
}
