//! C-style SAX callback interface
//!
//! This module defines the callback table and error reporting types that
//! consumers hand to the push parser. The layout follows the classic SAX
//! C API shape: a struct of optional function pointers plus an opaque
//! user-data pointer that is passed back verbatim on every invocation.

use std::os::raw::{c_char, c_int, c_uint, c_void};

/// Invoked once before any other callback for a document.
pub type StartDocumentFn = unsafe extern "C" fn(ctx: *mut c_void);

/// Invoked once after the last content callback of a well-formed document.
pub type EndDocumentFn = unsafe extern "C" fn(ctx: *mut c_void);

/// Invoked for each element start tag.
///
/// `name` is NUL-terminated. `attrs` is either null (no attributes) or a
/// flat array of alternating name/value pointers terminated by a null
/// name entry. A null value pointer marks an attribute that appeared
/// without a value; the name pointers themselves are never null before
/// the terminator.
pub type StartElementFn =
    unsafe extern "C" fn(ctx: *mut c_void, name: *const c_char, attrs: *const *const c_char);

/// Invoked for each element end tag (and after `StartElementFn` for
/// self-closing elements).
pub type EndElementFn = unsafe extern "C" fn(ctx: *mut c_void, name: *const c_char);

/// Invoked for character data between tags.
///
/// `ch` points at `len` bytes that are NOT NUL-terminated and remain
/// valid only for the duration of the call. Long runs may be reported
/// through several consecutive invocations.
pub type CharactersFn = unsafe extern "C" fn(ctx: *mut c_void, ch: *const c_char, len: c_int);

/// Invoked for a comment. `value` is the NUL-terminated comment body.
pub type CommentFn = unsafe extern "C" fn(ctx: *mut c_void, value: *const c_char);

/// Invoked for a CDATA section with the raw, unescaped byte content.
pub type CdataBlockFn = unsafe extern "C" fn(ctx: *mut c_void, value: *const c_char, len: c_int);

/// Invoked for a processing instruction. `data` is null when the
/// instruction had no content after its target.
pub type ProcessingInstructionFn =
    unsafe extern "C" fn(ctx: *mut c_void, target: *const c_char, data: *const c_char);

/// Invoked for warnings and fatal errors alike; `report` distinguishes
/// them and is only valid for the duration of the call.
pub type ErrorFn = unsafe extern "C" fn(ctx: *mut c_void, report: *const SaxErrorInfo);

/// Callback table installed when creating a push parser context.
///
/// Every slot is optional; the parser skips reporting for empty slots.
/// The table is copied at context creation, so the caller may drop its
/// own copy immediately afterwards.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct SaxHandler {
    pub start_document: Option<StartDocumentFn>,
    pub end_document: Option<EndDocumentFn>,
    pub start_element: Option<StartElementFn>,
    pub end_element: Option<EndElementFn>,
    pub characters: Option<CharactersFn>,
    pub comment: Option<CommentFn>,
    pub cdata_block: Option<CdataBlockFn>,
    pub processing_instruction: Option<ProcessingInstructionFn>,
    pub error: Option<ErrorFn>,
}

/// Severity of a reported problem.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaxErrorLevel {
    Warning = 1,
    Fatal = 2,
}

/// Outcome codes returned by the parse functions and attached to error
/// reports. `Ok` means the call consumed its input without a fatal
/// problem; everything else halts the context.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaxErrCode {
    Ok = 0,
    NullContext = 1,
    Internal = 2,
    DocumentEmpty = 3,
    StartTagExpected = 4,
    ExtraContent = 5,
    InvalidName = 6,
    UnfinishedTag = 7,
    TagMismatch = 8,
    AttributeWithoutValue = 9,
    AttValueExpected = 10,
    UnescapedLt = 11,
    UnfinishedComment = 12,
    DoubleHyphen = 13,
    UnfinishedCdata = 14,
    UnfinishedPi = 15,
    MalformedReference = 16,
    UndeclaredEntity = 17,
    InvalidCharRef = 18,
    MisplacedXmlDecl = 19,
    UnsupportedEncoding = 20,
    PrematureEnd = 21,
    UserStop = 22,
}

/// Error report passed to [`ErrorFn`] and returned by `sax_last_error`.
///
/// `message` is a NUL-terminated, pre-rendered description including any
/// offending names. For callback reports it is valid only during the
/// call; for `sax_last_error` it stays valid until the context is freed.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct SaxErrorInfo {
    pub level: SaxErrorLevel,
    pub code: SaxErrCode,
    pub message: *const c_char,
    /// 1-based line of the offending construct.
    pub line: c_uint,
    /// 1-based column of the offending construct.
    pub column: c_uint,
}

/// Keep going after recoverable structural problems (mismatched end
/// tags, valueless attributes, unknown entities), downgrading them to
/// warnings where possible.
pub const SAX_OPT_RECOVER: c_int = 1 << 0;

/// Suppress character callbacks for whitespace-only runs.
pub const SAX_OPT_NO_BLANKS: c_int = 1 << 1;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_default_is_empty() {
        let handler = SaxHandler::default();
        assert!(handler.start_document.is_none());
        assert!(handler.error.is_none());
    }

    #[test]
    fn test_error_codes_are_stable() {
        // The numeric values are part of the C interface contract.
        assert_eq!(SaxErrCode::Ok as c_int, 0);
        assert_eq!(SaxErrCode::UserStop as c_int, 22);
        assert_eq!(SaxErrorLevel::Warning as c_int, 1);
        assert_eq!(SaxErrorLevel::Fatal as c_int, 2);
    }

    #[test]
    fn test_option_flags_do_not_overlap() {
        assert_eq!(SAX_OPT_RECOVER & SAX_OPT_NO_BLANKS, 0);
    }
}
