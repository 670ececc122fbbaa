//! Parsing session state and the native drive loop
//!
//! A session is the per-parse bundle the callbacks need: the user's
//! handler, the lifecycle state, the first fatal error, accumulated
//! warnings and the stop flag. Callbacks arrive synchronously on the
//! driving thread while the engine call is still on the stack, so
//! interior mutability is enough; the registry only ever hands out
//! shared references.
//!
//! Handler panics are caught at the dispatch boundary, the engine is
//! stopped, and the payload is re-thrown here once every native frame
//! has returned.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::ffi::CStr;
use std::io::Read;
use std::os::raw::{c_char, c_int};
use std::panic;
use std::ptr;

use sax_engine::{
    sax_free_ctxt, sax_last_error, sax_parse_chunk, sax_push_ctxt_create, sax_stop_parser,
    SaxErrCode, SaxPushCtxt, SAX_OPT_NO_BLANKS, SAX_OPT_RECOVER,
};

use crate::config::ParserConfig;
use crate::dispatch;
use crate::handler::{EventHandler, Flow};
use crate::parser::ParseSummary;
use crate::types::{ParseWarning, Result, StreamError, StreamEvent};

/// Lifecycle of one parse run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SessionState {
    Idle,
    InProgress,
    Completed,
    Failed,
}

/// First fatal report captured from the engine
pub(crate) struct CapturedError {
    pub message: String,
    pub line: u32,
    pub column: u32,
}

/// Per-parse state shared between the drive loop and the callbacks
pub(crate) struct Session<'h> {
    pub(crate) handler: RefCell<&'h mut dyn EventHandler>,
    pub(crate) state: Cell<SessionState>,
    pub(crate) error: RefCell<Option<CapturedError>>,
    pub(crate) warnings: RefCell<Vec<ParseWarning>>,
    pub(crate) stop_requested: Cell<bool>,
    pub(crate) panic_payload: RefCell<Option<Box<dyn Any + Send>>>,
    pub(crate) engine_ctxt: Cell<*mut SaxPushCtxt>,
    pub(crate) events_dispatched: Cell<u64>,
}

impl<'h> Session<'h> {
    pub(crate) fn new(handler: &'h mut dyn EventHandler) -> Self {
        Session {
            handler: RefCell::new(handler),
            state: Cell::new(SessionState::Idle),
            error: RefCell::new(None),
            warnings: RefCell::new(Vec::new()),
            stop_requested: Cell::new(false),
            panic_payload: RefCell::new(None),
            engine_ctxt: Cell::new(ptr::null_mut()),
            events_dispatched: Cell::new(0),
        }
    }

    /// True while events should still be built and delivered
    pub(crate) fn accepting(&self) -> bool {
        self.state.get() == SessionState::InProgress && !self.stop_requested.get()
    }

    /// Forwards one event to the handler, honouring failure and stop
    pub(crate) fn dispatch(&self, event: StreamEvent) {
        if !self.accepting() {
            return;
        }
        let mut handler = match self.handler.try_borrow_mut() {
            Ok(handler) => handler,
            Err(_) => {
                // Re-entered while a previous event is still being
                // handled; drop the event instead of panicking inside
                // a native frame.
                dispatch::note_consistency_failure("handler re-entered");
                return;
            }
        };
        let outcome =
            panic::catch_unwind(panic::AssertUnwindSafe(|| handler.handle_event(event)));
        drop(handler);
        match outcome {
            Ok(Flow::Continue) => {
                self.events_dispatched.set(self.events_dispatched.get() + 1);
            }
            Ok(Flow::Stop) => {
                self.events_dispatched.set(self.events_dispatched.get() + 1);
                log::debug!("handler requested stop");
                self.stop_requested.set(true);
                self.stop_engine();
            }
            Err(payload) => {
                *self.panic_payload.borrow_mut() = Some(payload);
                self.state.set(SessionState::Failed);
                self.stop_engine();
            }
        }
    }

    /// Records an engine report. Warnings accumulate; the first fatal
    /// marks the session failed and ends delivery.
    pub(crate) fn record_report(&self, fatal: bool, message: String, line: u32, column: u32) {
        if fatal {
            log::debug!("parse error at {}:{}: {}", line, column, message);
            let mut slot = self.error.borrow_mut();
            if slot.is_none() {
                *slot = Some(CapturedError {
                    message,
                    line,
                    column,
                });
            }
            drop(slot);
            self.state.set(SessionState::Failed);
        } else {
            log::warn!("parse warning at {}:{}: {}", line, column, message);
            self.warnings.borrow_mut().push(ParseWarning {
                message,
                line: Some(line),
                column: Some(column),
            });
        }
    }

    /// Notes a byte sequence replaced while decoding UTF-8
    pub(crate) fn note_decode_warning(&self, message: String) {
        log::warn!("{}", message);
        self.warnings.borrow_mut().push(ParseWarning {
            message,
            line: None,
            column: None,
        });
    }

    fn stop_engine(&self) {
        let ctxt = self.engine_ctxt.get();
        if !ctxt.is_null() {
            unsafe { sax_stop_parser(ctxt) };
        }
    }
}

/// Unregisters the session and frees the engine context on every exit
/// path, including reader errors and re-thrown handler panics.
struct DriverGuard {
    token: u64,
    ctxt: *mut SaxPushCtxt,
}

impl Drop for DriverGuard {
    fn drop(&mut self) {
        dispatch::unregister(self.token);
        if !self.ctxt.is_null() {
            unsafe { sax_free_ctxt(self.ctxt) };
        }
    }
}

/// Runs one complete parse: registers the session, feeds the reader to
/// the engine chunk by chunk, finishes the document and translates the
/// outcome.
pub(crate) fn run_parse<R: Read>(
    handler: &mut dyn EventHandler,
    config: &ParserConfig,
    chunk_bytes: usize,
    mut reader: R,
    warnings_out: &mut Vec<ParseWarning>,
) -> Result<ParseSummary> {
    let session = Session::new(handler);
    let token = dispatch::register(&session);
    let mut guard = DriverGuard {
        token,
        ctxt: ptr::null_mut(),
    };

    let table = crate::trampoline::handler_table();
    let ctxt = unsafe {
        sax_push_ctxt_create(&table, dispatch::token_to_user_data(token), engine_options(config))
    };
    if ctxt.is_null() {
        return Err(StreamError::ContextCreation);
    }
    guard.ctxt = ctxt;
    session.engine_ctxt.set(ctxt);
    session.state.set(SessionState::InProgress);

    let mut buf = vec![0u8; chunk_bytes];
    let mut rc = SaxErrCode::Ok;
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        rc = unsafe { sax_parse_chunk(ctxt, buf.as_ptr() as *const c_char, n as c_int, 0) };
        if rc != SaxErrCode::Ok {
            break;
        }
    }
    if rc == SaxErrCode::Ok {
        rc = unsafe { sax_parse_chunk(ctxt, ptr::null(), 0, 1) };
    }

    // Handler panics resume only after the native frames are gone.
    let payload = session.panic_payload.borrow_mut().take();
    if let Some(payload) = payload {
        drop(guard);
        panic::resume_unwind(payload);
    }

    let warning_count = {
        let mut warnings = session.warnings.borrow_mut();
        let count = warnings.len();
        warnings_out.append(&mut warnings);
        count
    };
    let events_dispatched = session.events_dispatched.get();
    let stopped = session.stop_requested.get();
    let fatal = session.error.borrow_mut().take();

    match fatal {
        Some(e) => Err(StreamError::Parse {
            message: e.message,
            line: e.line,
            column: e.column,
        }),
        None if rc == SaxErrCode::Ok || (rc == SaxErrCode::UserStop && stopped) => {
            session.state.set(SessionState::Completed);
            log::debug!(
                "parse finished: {} events, stopped={}, warnings={}",
                events_dispatched,
                stopped,
                warning_count
            );
            Ok(ParseSummary {
                events_dispatched,
                stopped,
                warnings: warning_count,
            })
        }
        None => {
            // The engine failed without routing a report through the
            // error callback; fall back to its stored last error.
            session.state.set(SessionState::Failed);
            Err(engine_last_error(ctxt, rc))
        }
    }
}

fn engine_options(config: &ParserConfig) -> c_int {
    let mut options = 0;
    if config.recover {
        options |= SAX_OPT_RECOVER;
    }
    if config.skip_blank_text {
        options |= SAX_OPT_NO_BLANKS;
    }
    options
}

fn engine_last_error(ctxt: *mut SaxPushCtxt, rc: SaxErrCode) -> StreamError {
    let report = unsafe { sax_last_error(ctxt) };
    if report.is_null() {
        return StreamError::Parse {
            message: format!("Parse failed ({:?})", rc),
            line: 0,
            column: 0,
        };
    }
    let report = unsafe { &*report };
    let message = if report.message.is_null() {
        format!("Parse failed ({:?})", rc)
    } else {
        unsafe { CStr::from_ptr(report.message) }
            .to_string_lossy()
            .into_owned()
    };
    StreamError::Parse {
        message,
        line: report.line,
        column: report.column,
    }
}
