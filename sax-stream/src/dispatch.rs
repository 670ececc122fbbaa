//! Callback dispatch and the session registry
//!
//! The engine never sees a Rust reference: each parse registers its
//! session under an opaque numeric token and hands the token to the
//! engine as the context pointer. Every callback resolves the token
//! back through a process-wide registry before touching anything. A
//! token that does not resolve (stale, zero, foreign) is counted and
//! the event is dropped; no callback ever dereferences unregistered
//! memory.
//!
//! All engine-owned buffers are copied into owned `String`/`Vec<u8>`
//! payloads here, before the handler runs. Invalid UTF-8 is replaced
//! lossily and noted as a warning on the session.

use std::collections::HashMap;
use std::ffi::CStr;
use std::os::raw::{c_char, c_int, c_void};
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{LazyLock, Mutex, MutexGuard};

use sax_engine::{SaxErrorInfo, SaxErrorLevel};

use crate::session::Session;
use crate::types::{Attribute, StreamEvent};

/// Sessions are registered only for the span of one parse call; the
/// erased lifetime never outlives that call.
type ErasedSession = Session<'static>;

struct SessionPtr(*const ErasedSession);

// Pointers sit in the map while their parse runs on another thread;
// they are only ever dereferenced on the thread that registered them.
unsafe impl Send for SessionPtr {}

static SESSIONS: LazyLock<Mutex<HashMap<u64, SessionPtr>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

/// Monotonic token source. Tokens are never reused and zero is never
/// handed out, so a stale token simply fails to resolve.
static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

static CONSISTENCY_FAILURES: AtomicU64 = AtomicU64::new(0);

pub(crate) fn register(session: &Session<'_>) -> u64 {
    let token = NEXT_TOKEN.fetch_add(1, Ordering::Relaxed);
    let ptr = SessionPtr((session as *const Session<'_>).cast());
    sessions().insert(token, ptr);
    log::trace!("session {} registered", token);
    token
}

pub(crate) fn unregister(token: u64) {
    sessions().remove(&token);
    log::trace!("session {} unregistered", token);
}

pub(crate) fn token_to_user_data(token: u64) -> *mut c_void {
    token as usize as *mut c_void
}

fn sessions() -> MutexGuard<'static, HashMap<u64, SessionPtr>> {
    // A poisoned registry still holds valid entries.
    SESSIONS.lock().unwrap_or_else(|e| e.into_inner())
}

/// Callbacks dropped because their token or session state could not
/// accept them.
#[allow(dead_code)]
pub(crate) fn consistency_failures() -> u64 {
    CONSISTENCY_FAILURES.load(Ordering::Relaxed)
}

pub(crate) fn note_consistency_failure(what: &str) {
    CONSISTENCY_FAILURES.fetch_add(1, Ordering::Relaxed);
    log::error!("event dropped: {}", what);
}

/// Resolves an opaque context pointer back to its session.
///
/// # Safety
/// The returned reference is valid only while the matching parse call
/// keeps the session registered. Callers are the engine callbacks,
/// which run strictly inside that window.
unsafe fn resolve<'a>(ctx: *mut c_void) -> Option<&'a ErasedSession> {
    let token = ctx as usize as u64;
    let ptr = sessions().get(&token).map(|entry| entry.0);
    match ptr {
        Some(session) => Some(&*session),
        None => {
            note_consistency_failure("unknown session token");
            None
        }
    }
}

pub(crate) unsafe fn document_start(ctx: *mut c_void) {
    if let Some(session) = resolve(ctx) {
        session.dispatch(StreamEvent::DocumentStart);
    }
}

pub(crate) unsafe fn document_end(ctx: *mut c_void) {
    if let Some(session) = resolve(ctx) {
        session.dispatch(StreamEvent::DocumentEnd);
    }
}

pub(crate) unsafe fn element_start(
    ctx: *mut c_void,
    name: *const c_char,
    attrs: *const *const c_char,
) {
    let session = match resolve(ctx) {
        Some(session) => session,
        None => return,
    };
    if !session.accepting() {
        return;
    }
    let name = match required_string(session, name, "element name") {
        Some(name) => name,
        None => return,
    };
    let attributes = collect_attributes(session, attrs);
    session.dispatch(StreamEvent::ElementStart { name, attributes });
}

pub(crate) unsafe fn element_end(ctx: *mut c_void, name: *const c_char) {
    let session = match resolve(ctx) {
        Some(session) => session,
        None => return,
    };
    if !session.accepting() {
        return;
    }
    if let Some(name) = required_string(session, name, "element name") {
        session.dispatch(StreamEvent::ElementEnd { name });
    }
}

pub(crate) unsafe fn characters(ctx: *mut c_void, ch: *const c_char, len: c_int) {
    let session = match resolve(ctx) {
        Some(session) => session,
        None => return,
    };
    if !session.accepting() {
        return;
    }
    if ch.is_null() || len < 0 {
        note_consistency_failure("character data with invalid buffer");
        return;
    }
    let bytes = slice::from_raw_parts(ch as *const u8, len as usize);
    let text = lossy_string(session, bytes, "character data");
    session.dispatch(StreamEvent::Characters(text));
}

pub(crate) unsafe fn comment(ctx: *mut c_void, value: *const c_char) {
    let session = match resolve(ctx) {
        Some(session) => session,
        None => return,
    };
    if !session.accepting() {
        return;
    }
    if let Some(text) = required_string(session, value, "comment") {
        session.dispatch(StreamEvent::Comment(text));
    }
}

pub(crate) unsafe fn cdata_block(ctx: *mut c_void, value: *const c_char, len: c_int) {
    let session = match resolve(ctx) {
        Some(session) => session,
        None => return,
    };
    if !session.accepting() {
        return;
    }
    if value.is_null() || len < 0 {
        note_consistency_failure("CDATA with invalid buffer");
        return;
    }
    // CDATA stays as raw bytes; no decoding is applied.
    let bytes = slice::from_raw_parts(value as *const u8, len as usize).to_vec();
    session.dispatch(StreamEvent::Cdata(bytes));
}

pub(crate) unsafe fn processing_instruction(
    ctx: *mut c_void,
    target: *const c_char,
    data: *const c_char,
) {
    let session = match resolve(ctx) {
        Some(session) => session,
        None => return,
    };
    if !session.accepting() {
        return;
    }
    let target = match required_string(session, target, "instruction target") {
        Some(target) => target,
        None => return,
    };
    let data = if data.is_null() {
        None
    } else {
        Some(lossy_string(
            session,
            CStr::from_ptr(data).to_bytes(),
            "instruction data",
        ))
    };
    session.dispatch(StreamEvent::ProcessingInstruction { target, data });
}

pub(crate) unsafe fn parse_error(ctx: *mut c_void, report: *const SaxErrorInfo) {
    let session = match resolve(ctx) {
        Some(session) => session,
        None => return,
    };
    if report.is_null() {
        note_consistency_failure("error report missing");
        return;
    }
    let report = &*report;
    let message = if report.message.is_null() {
        String::from("Unknown parse error")
    } else {
        CStr::from_ptr(report.message)
            .to_string_lossy()
            .into_owned()
    };
    session.record_report(
        report.level == SaxErrorLevel::Fatal,
        message,
        report.line,
        report.column,
    );
}

/// Copies a NUL-terminated engine string into an owned one. A null
/// pointer counts as a consistency failure and drops the event.
unsafe fn required_string(
    session: &ErasedSession,
    ptr: *const c_char,
    what: &str,
) -> Option<String> {
    if ptr.is_null() {
        note_consistency_failure("null name pointer");
        return None;
    }
    Some(lossy_string(session, CStr::from_ptr(ptr).to_bytes(), what))
}

fn lossy_string(session: &ErasedSession, bytes: &[u8], what: &str) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_owned(),
        Err(_) => {
            session.note_decode_warning(format!(
                "Invalid UTF-8 in {}; offending bytes replaced",
                what
            ));
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// Walks the flat name/value pointer array up to the null-name
/// sentinel. A null value marks an attribute without one; it comes
/// through as an empty string.
unsafe fn collect_attributes(
    session: &ErasedSession,
    attrs: *const *const c_char,
) -> Vec<Attribute> {
    let mut out = Vec::new();
    if attrs.is_null() {
        return out;
    }
    let mut i = 0usize;
    loop {
        let name_ptr = *attrs.add(i);
        if name_ptr.is_null() {
            break;
        }
        let value_ptr = *attrs.add(i + 1);
        let name = lossy_string(session, CStr::from_ptr(name_ptr).to_bytes(), "attribute name");
        let value = if value_ptr.is_null() {
            String::new()
        } else {
            lossy_string(
                session,
                CStr::from_ptr(value_ptr).to_bytes(),
                "attribute value",
            )
        };
        out.push(Attribute { name, value });
        i += 2;
    }
    out
}
