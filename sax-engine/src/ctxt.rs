//! Push parser context and C-style entry points
//!
//! A context owns the chunk scanner, the element stack and the callback
//! table, and turns scanned constructs into callback invocations. The
//! entry points mirror a classic C push API: create a context, feed it
//! chunks, terminate, inspect the last error, free it.
//!
//! Callbacks may legally re-enter the context through `sax_stop_parser`
//! and `sax_last_error` while a parse call is still on the stack, so
//! all mutable state lives behind `Cell`/`RefCell` and every entry
//! point works through shared references.

use std::cell::{Cell, RefCell};
use std::ffi::CString;
use std::os::raw::{c_char, c_int, c_void};
use std::ptr;
use std::slice;

use crate::sax::{
    SaxErrCode, SaxErrorInfo, SaxErrorLevel, SaxHandler, SAX_OPT_NO_BLANKS, SAX_OPT_RECOVER,
};
use crate::scanner::{Construct, ScanError, Scanner};

/// An element opened but not yet closed.
struct OpenTag {
    name: Vec<u8>,
    line: u32,
}

/// Reusable buffers for NUL-terminated callback arguments.
///
/// The pointers handed to callbacks point into these buffers and are
/// valid only until the callback returns.
#[derive(Default)]
struct Scratch {
    name: Vec<u8>,
    data: Vec<u8>,
    attr_store: Vec<u8>,
    attr_ptrs: Vec<*const c_char>,
}

struct StoredError {
    /// Keeps the message bytes alive for `info.message`.
    #[allow(dead_code)]
    message: CString,
    info: Box<SaxErrorInfo>,
}

/// Push parser context. Not thread-safe; drive it from one thread.
pub struct SaxPushCtxt {
    sax: SaxHandler,
    user_data: *mut c_void,
    recover: bool,
    no_blanks: bool,
    scanner: RefCell<Scanner>,
    open: RefCell<Vec<OpenTag>>,
    scratch: RefCell<Scratch>,
    started: Cell<bool>,
    decl_seen: Cell<bool>,
    root_seen: Cell<bool>,
    root_done: Cell<bool>,
    halted: Cell<bool>,
    stopped: Cell<bool>,
    pumping: Cell<bool>,
    code: Cell<SaxErrCode>,
    last_error: RefCell<Option<StoredError>>,
}

/// Creates a push parser context with a copy of `sax` installed.
///
/// `user_data` is passed back verbatim as the first argument of every
/// callback. Returns null when `sax` is null. The context must be
/// released with [`sax_free_ctxt`].
///
/// # Safety
///
/// `sax` must point to a valid callback table for the duration of the
/// call. All installed callbacks must stay valid until the context is
/// freed.
pub unsafe fn sax_push_ctxt_create(
    sax: *const SaxHandler,
    user_data: *mut c_void,
    options: c_int,
) -> *mut SaxPushCtxt {
    if sax.is_null() {
        return ptr::null_mut();
    }
    let recover = options & SAX_OPT_RECOVER != 0;
    let ctxt = SaxPushCtxt {
        sax: *sax,
        user_data,
        recover,
        no_blanks: options & SAX_OPT_NO_BLANKS != 0,
        scanner: RefCell::new(Scanner::new(recover)),
        open: RefCell::new(Vec::new()),
        scratch: RefCell::new(Scratch::default()),
        started: Cell::new(false),
        decl_seen: Cell::new(false),
        root_seen: Cell::new(false),
        root_done: Cell::new(false),
        halted: Cell::new(false),
        stopped: Cell::new(false),
        pumping: Cell::new(false),
        code: Cell::new(SaxErrCode::Ok),
        last_error: RefCell::new(None),
    };
    log::debug!("sax: push context created (options={:#x})", options);
    Box::into_raw(Box::new(ctxt))
}

/// Feeds `len` bytes to the context and reports everything that became
/// complete. A non-zero `terminate` marks the end of input; pass it on
/// the final call (a null `data` with `len` 0 is the idiomatic finish).
///
/// Returns `Ok` while parsing can continue. After a fatal problem the
/// context stays halted and every further call returns the same code.
///
/// # Safety
///
/// `ctxt` must be a live context from [`sax_push_ctxt_create`]. `data`
/// must point to at least `len` readable bytes unless it is null.
pub unsafe fn sax_parse_chunk(
    ctxt: *mut SaxPushCtxt,
    data: *const c_char,
    len: c_int,
    terminate: c_int,
) -> SaxErrCode {
    if ctxt.is_null() {
        return SaxErrCode::NullContext;
    }
    let ctxt = &*ctxt;
    if len < 0 {
        log::warn!("sax: negative chunk length rejected");
        return SaxErrCode::Internal;
    }
    let bytes: &[u8] = if data.is_null() || len == 0 {
        &[]
    } else {
        slice::from_raw_parts(data as *const u8, len as usize)
    };
    ctxt.feed(bytes, terminate != 0)
}

/// Requests that parsing stop. Safe to call from inside a callback;
/// the current parse call returns once the callback does, and later
/// calls report [`SaxErrCode::UserStop`].
///
/// # Safety
///
/// `ctxt` must be null or a live context.
pub unsafe fn sax_stop_parser(ctxt: *mut SaxPushCtxt) {
    if ctxt.is_null() {
        return;
    }
    let ctxt = &*ctxt;
    ctxt.stopped.set(true);
    ctxt.halted.set(true);
    if ctxt.code.get() == SaxErrCode::Ok {
        ctxt.code.set(SaxErrCode::UserStop);
    }
    log::debug!("sax: parser stopped on request");
}

/// Returns the first fatal error recorded by the context, or null when
/// none occurred. The pointed-to report (and its message) stays valid
/// until the context is freed.
///
/// # Safety
///
/// `ctxt` must be null or a live context.
pub unsafe fn sax_last_error(ctxt: *mut SaxPushCtxt) -> *const SaxErrorInfo {
    if ctxt.is_null() {
        return ptr::null();
    }
    let ctxt = &*ctxt;
    let guard = ctxt.last_error.borrow();
    match guard.as_ref() {
        Some(stored) => &*stored.info as *const SaxErrorInfo,
        None => ptr::null(),
    }
}

/// Releases a context. Null is ignored.
///
/// # Safety
///
/// `ctxt` must be null or a live context; it must not be used again.
pub unsafe fn sax_free_ctxt(ctxt: *mut SaxPushCtxt) {
    if !ctxt.is_null() {
        drop(Box::from_raw(ctxt));
        log::debug!("sax: push context freed");
    }
}

impl SaxPushCtxt {
    fn feed(&self, data: &[u8], terminate: bool) -> SaxErrCode {
        if self.pumping.get() {
            log::error!("sax: re-entrant parse call rejected");
            return SaxErrCode::Internal;
        }
        if self.halted.get() {
            return self.code.get();
        }
        if !data.is_empty() {
            self.scanner.borrow_mut().push(data);
        }
        self.pumping.set(true);
        self.pump(terminate);
        self.pumping.set(false);
        log::trace!(
            "sax: chunk done, {} bytes pending",
            self.scanner.borrow().pending()
        );
        self.code.get()
    }

    fn pump(&self, terminate: bool) {
        loop {
            if self.halted.get() {
                return;
            }
            let pos = self.scanner.borrow().position();
            let step = self.scanner.borrow_mut().next(terminate);
            self.flush_warnings();
            match step {
                Ok(Some(construct)) => self.deliver(construct, pos),
                Ok(None) => break,
                Err(e) => {
                    self.fatal(e);
                    return;
                }
            }
        }
        if terminate && !self.halted.get() {
            self.finalize();
        }
    }

    fn finalize(&self) {
        let (line, column) = self.scanner.borrow().position();
        if !self.root_seen.get() {
            self.fatal(ScanError {
                code: SaxErrCode::DocumentEmpty,
                message: String::from("Document is empty"),
                line,
                column,
            });
            return;
        }
        let unclosed = {
            let open = self.open.borrow();
            open.last().map(|t| (t.name.clone(), t.line))
        };
        if let Some((name, tag_line)) = unclosed {
            self.fatal(ScanError {
                code: SaxErrCode::PrematureEnd,
                message: format!(
                    "Premature end of data in tag {} line {}",
                    String::from_utf8_lossy(&name),
                    tag_line
                ),
                line,
                column,
            });
            return;
        }
        self.emit_end_document();
        self.halted.set(true);
        log::debug!("sax: document complete");
    }

    fn deliver(&self, construct: Construct, pos: (u32, u32)) {
        match construct {
            Construct::XmlDecl { encoding } => {
                if self.started.get() || self.decl_seen.get() {
                    self.fatal(at(
                        pos,
                        SaxErrCode::MisplacedXmlDecl,
                        "XML declaration allowed only at the start of the document",
                    ));
                    return;
                }
                self.decl_seen.set(true);
                if let Some(enc) = encoding {
                    if !enc.eq_ignore_ascii_case(b"utf-8") && !enc.eq_ignore_ascii_case(b"utf8") {
                        self.warn(at(
                            pos,
                            SaxErrCode::UnsupportedEncoding,
                            format!("Unsupported encoding {}", String::from_utf8_lossy(&enc)),
                        ));
                    }
                }
            }
            Construct::Doctype => {
                self.ensure_started();
            }
            Construct::StartTag {
                name,
                attrs,
                self_closing,
            } => {
                self.ensure_started();
                if self.halted.get() {
                    return;
                }
                if self.root_done.get() {
                    self.fatal(at(
                        pos,
                        SaxErrCode::ExtraContent,
                        "Extra content at the end of the document",
                    ));
                    return;
                }
                self.root_seen.set(true);
                self.emit_start_element(&name, &attrs);
                if self.halted.get() {
                    return;
                }
                if self_closing {
                    self.emit_end_element(&name);
                    if self.open.borrow().is_empty() {
                        self.root_done.set(true);
                    }
                } else {
                    self.open.borrow_mut().push(OpenTag { name, line: pos.0 });
                }
            }
            Construct::EndTag { name } => {
                self.ensure_started();
                if self.halted.get() {
                    return;
                }
                if self.root_done.get() {
                    self.fatal(at(
                        pos,
                        SaxErrCode::ExtraContent,
                        "Extra content at the end of the document",
                    ));
                    return;
                }
                self.close_tag(name, pos);
            }
            Construct::Text { bytes, blank } => {
                if self.open.borrow().is_empty() {
                    if blank {
                        return;
                    }
                    self.ensure_started();
                    if self.halted.get() {
                        return;
                    }
                    self.fatal(self.content_outside_root(pos));
                    return;
                }
                if blank && self.no_blanks {
                    return;
                }
                self.emit_characters(&bytes);
            }
            Construct::Comment { bytes } => {
                self.ensure_started();
                if self.halted.get() {
                    return;
                }
                self.emit_comment(&bytes);
            }
            Construct::Cdata { bytes } => {
                if self.open.borrow().is_empty() {
                    self.ensure_started();
                    if self.halted.get() {
                        return;
                    }
                    self.fatal(self.content_outside_root(pos));
                    return;
                }
                self.emit_cdata(&bytes);
            }
            Construct::Pi { target, data } => {
                self.ensure_started();
                if self.halted.get() {
                    return;
                }
                self.emit_pi(&target, data.as_deref());
            }
        }
    }

    /// Matches an end tag against the open element stack.
    fn close_tag(&self, name: Vec<u8>, pos: (u32, u32)) {
        let top = {
            let open = self.open.borrow();
            open.last().map(|t| (t.name.clone(), t.line))
        };

        let (top_name, top_line) = match top {
            Some(t) => t,
            None => {
                // Stray end tag before the root element.
                let message =
                    format!("Unexpected end tag : {}", String::from_utf8_lossy(&name));
                if self.recover {
                    self.warn(at(pos, SaxErrCode::TagMismatch, message));
                } else {
                    self.fatal(at(pos, SaxErrCode::TagMismatch, message));
                }
                return;
            }
        };

        if top_name == name {
            self.open.borrow_mut().pop();
            self.emit_end_element(&name);
            if self.halted.get() {
                return;
            }
            if self.open.borrow().is_empty() {
                self.root_done.set(true);
            }
            return;
        }

        let message = format!(
            "Opening and ending tag mismatch: {} line {} and {}",
            String::from_utf8_lossy(&top_name),
            top_line,
            String::from_utf8_lossy(&name)
        );
        if !self.recover {
            self.fatal(at(pos, SaxErrCode::TagMismatch, message));
            return;
        }

        self.warn(at(pos, SaxErrCode::TagMismatch, message));
        if self.halted.get() {
            return;
        }

        // Close intervening elements when a matching ancestor exists;
        // otherwise swallow the stray end tag.
        let has_ancestor = self.open.borrow().iter().any(|t| t.name == name);
        if !has_ancestor {
            return;
        }
        loop {
            let popped = match self.open.borrow_mut().pop() {
                Some(t) => t,
                None => break,
            };
            self.emit_end_element(&popped.name);
            if self.halted.get() {
                return;
            }
            if popped.name == name {
                break;
            }
        }
        if self.open.borrow().is_empty() {
            self.root_done.set(true);
        }
    }

    fn content_outside_root(&self, pos: (u32, u32)) -> ScanError {
        if self.root_done.get() {
            at(
                pos,
                SaxErrCode::ExtraContent,
                "Extra content at the end of the document",
            )
        } else {
            at(
                pos,
                SaxErrCode::StartTagExpected,
                "Start tag expected, '<' not found",
            )
        }
    }

    fn ensure_started(&self) {
        if self.started.get() {
            return;
        }
        self.started.set(true);
        self.emit_start_document();
    }

    fn flush_warnings(&self) {
        let warnings = self.scanner.borrow_mut().take_warnings();
        for w in warnings {
            if self.halted.get() {
                break;
            }
            self.warn(w);
        }
    }

    fn warn(&self, e: ScanError) {
        log::debug!("sax warning at {}:{}: {}", e.line, e.column, e.message);
        self.report(SaxErrorLevel::Warning, &e);
    }

    fn fatal(&self, e: ScanError) {
        if self.code.get() != SaxErrCode::Ok {
            return;
        }
        log::debug!("sax error at {}:{}: {}", e.line, e.column, e.message);
        self.code.set(e.code);
        self.store_last_error(&e);
        self.report(SaxErrorLevel::Fatal, &e);
        self.halted.set(true);
    }

    fn store_last_error(&self, e: &ScanError) {
        let message = CString::new(e.message.replace('\0', " ")).unwrap_or_default();
        let info = Box::new(SaxErrorInfo {
            level: SaxErrorLevel::Fatal,
            code: e.code,
            message: message.as_ptr(),
            line: e.line,
            column: e.column,
        });
        *self.last_error.borrow_mut() = Some(StoredError { message, info });
    }

    fn report(&self, level: SaxErrorLevel, e: &ScanError) {
        let cb = match self.sax.error {
            Some(cb) => cb,
            None => return,
        };
        let message = CString::new(e.message.replace('\0', " ")).unwrap_or_default();
        let info = SaxErrorInfo {
            level,
            code: e.code,
            message: message.as_ptr(),
            line: e.line,
            column: e.column,
        };
        unsafe { cb(self.user_data, &info) };
    }

    fn emit_start_document(&self) {
        log::trace!("sax: start document");
        if let Some(cb) = self.sax.start_document {
            unsafe { cb(self.user_data) };
        }
    }

    fn emit_end_document(&self) {
        log::trace!("sax: end document");
        if let Some(cb) = self.sax.end_document {
            unsafe { cb(self.user_data) };
        }
    }

    fn emit_start_element(&self, name: &[u8], attrs: &[(Vec<u8>, Option<Vec<u8>>)]) {
        let cb = match self.sax.start_element {
            Some(cb) => cb,
            None => return,
        };
        let mut guard = self.scratch.borrow_mut();
        let scratch = &mut *guard;
        scratch.name.clear();
        scratch.name.extend_from_slice(name);
        scratch.name.push(0);

        scratch.attr_store.clear();
        scratch.attr_ptrs.clear();
        let mut offsets = Vec::with_capacity(attrs.len());
        for (attr_name, attr_value) in attrs {
            let name_off = scratch.attr_store.len();
            scratch.attr_store.extend_from_slice(attr_name);
            scratch.attr_store.push(0);
            let value_off = attr_value.as_ref().map(|v| {
                let off = scratch.attr_store.len();
                scratch.attr_store.extend_from_slice(v);
                scratch.attr_store.push(0);
                off
            });
            offsets.push((name_off, value_off));
        }
        // Pointers are taken only after the store stops growing.
        let base = scratch.attr_store.as_ptr();
        for (name_off, value_off) in offsets {
            scratch
                .attr_ptrs
                .push(unsafe { base.add(name_off) } as *const c_char);
            match value_off {
                Some(off) => scratch
                    .attr_ptrs
                    .push(unsafe { base.add(off) } as *const c_char),
                None => scratch.attr_ptrs.push(ptr::null()),
            }
        }
        scratch.attr_ptrs.push(ptr::null());

        let attrs_ptr = if attrs.is_empty() {
            ptr::null()
        } else {
            scratch.attr_ptrs.as_ptr()
        };
        unsafe { cb(self.user_data, scratch.name.as_ptr() as *const c_char, attrs_ptr) };
    }

    fn emit_end_element(&self, name: &[u8]) {
        let cb = match self.sax.end_element {
            Some(cb) => cb,
            None => return,
        };
        let mut scratch = self.scratch.borrow_mut();
        scratch.name.clear();
        scratch.name.extend_from_slice(name);
        scratch.name.push(0);
        unsafe { cb(self.user_data, scratch.name.as_ptr() as *const c_char) };
    }

    fn emit_characters(&self, bytes: &[u8]) {
        let cb = match self.sax.characters {
            Some(cb) => cb,
            None => return,
        };
        // A run accumulated across many chunks can exceed c_int.
        for piece in bytes.chunks(c_int::MAX as usize) {
            unsafe { cb(self.user_data, piece.as_ptr() as *const c_char, piece.len() as c_int) };
            if self.halted.get() {
                return;
            }
        }
    }

    fn emit_cdata(&self, bytes: &[u8]) {
        let cb = match self.sax.cdata_block {
            Some(cb) => cb,
            None => return,
        };
        if bytes.is_empty() {
            // An empty section still gets its callback.
            unsafe { cb(self.user_data, bytes.as_ptr() as *const c_char, 0) };
            return;
        }
        for piece in bytes.chunks(c_int::MAX as usize) {
            unsafe { cb(self.user_data, piece.as_ptr() as *const c_char, piece.len() as c_int) };
            if self.halted.get() {
                return;
            }
        }
    }

    fn emit_comment(&self, bytes: &[u8]) {
        let cb = match self.sax.comment {
            Some(cb) => cb,
            None => return,
        };
        let mut scratch = self.scratch.borrow_mut();
        scratch.data.clear();
        scratch.data.extend_from_slice(bytes);
        scratch.data.push(0);
        unsafe { cb(self.user_data, scratch.data.as_ptr() as *const c_char) };
    }

    fn emit_pi(&self, target: &[u8], data: Option<&[u8]>) {
        let cb = match self.sax.processing_instruction {
            Some(cb) => cb,
            None => return,
        };
        let mut guard = self.scratch.borrow_mut();
        let scratch = &mut *guard;
        scratch.name.clear();
        scratch.name.extend_from_slice(target);
        scratch.name.push(0);
        let data_ptr = match data {
            Some(d) => {
                scratch.data.clear();
                scratch.data.extend_from_slice(d);
                scratch.data.push(0);
                scratch.data.as_ptr() as *const c_char
            }
            None => ptr::null(),
        };
        unsafe { cb(self.user_data, scratch.name.as_ptr() as *const c_char, data_ptr) };
    }
}

fn at(pos: (u32, u32), code: SaxErrCode, message: impl Into<String>) -> ScanError {
    ScanError {
        code,
        message: message.into(),
        line: pos.0,
        column: pos.1,
    }
}
