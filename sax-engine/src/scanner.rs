//! Incremental XML tokenizer
//!
//! Accumulates pushed chunks and carves complete constructs off the
//! front of the buffer. A construct that is still missing its closing
//! delimiter stays buffered until more input arrives (or the final call
//! declares the input finished), so callers can feed byte-sized chunks
//! without ever seeing a torn token.

use memchr::{memchr, memmem};

use crate::entities;
use crate::sax::SaxErrCode;

const UTF8_BOM: [u8; 3] = [0xEF, 0xBB, 0xBF];

/// One complete construct cut from the input stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Construct {
    /// `<?xml ...?>` declaration; only the encoding name is retained.
    XmlDecl { encoding: Option<Vec<u8>> },
    /// `<!DOCTYPE ...>` including any internal subset, content dropped.
    Doctype,
    StartTag {
        name: Vec<u8>,
        /// Name/value pairs in document order; `None` marks an attribute
        /// that appeared without a value (recovery mode only).
        attrs: Vec<(Vec<u8>, Option<Vec<u8>>)>,
        self_closing: bool,
    },
    EndTag {
        name: Vec<u8>,
    },
    Text {
        /// Content with entity and character references expanded.
        bytes: Vec<u8>,
        /// True when the run is XML whitespace only.
        blank: bool,
    },
    Comment {
        bytes: Vec<u8>,
    },
    Cdata {
        bytes: Vec<u8>,
    },
    Pi {
        target: Vec<u8>,
        data: Option<Vec<u8>>,
    },
}

/// A structural problem, positioned at its offending construct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ScanError {
    pub code: SaxErrCode,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

struct ScanHit {
    construct: Construct,
    consumed: usize,
    warnings: Vec<ScanError>,
}

/// Chunk accumulator and tokenizer.
pub(crate) struct Scanner {
    buf: Vec<u8>,
    /// Start of the unconsumed region; compacted on the next push.
    off: usize,
    line: u32,
    column: u32,
    recover: bool,
    warnings: Vec<ScanError>,
    bom_checked: bool,
}

impl Scanner {
    pub fn new(recover: bool) -> Self {
        Scanner {
            buf: Vec::new(),
            off: 0,
            line: 1,
            column: 1,
            recover,
            warnings: Vec::new(),
            bom_checked: false,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        if self.off > 0 {
            self.buf.drain(..self.off);
            self.off = 0;
        }
        self.buf.extend_from_slice(data);
    }

    /// Cuts the next complete construct off the buffer.
    ///
    /// `Ok(None)` means more input is needed (or, with `terminate`, that
    /// the buffer is exhausted). Downgraded problems are queued and must
    /// be collected through [`Scanner::take_warnings`].
    pub fn next(&mut self, terminate: bool) -> Result<Option<Construct>, ScanError> {
        if !self.bom_checked && !self.skip_bom(terminate) {
            return Ok(None);
        }

        let view = &self.buf[self.off..];
        if view.is_empty() {
            return Ok(None);
        }

        let hit = match scan_construct(
            view,
            self.recover,
            (self.line, self.column),
            terminate,
        )? {
            Some(hit) => hit,
            None => return Ok(None),
        };

        self.warnings.extend(hit.warnings);
        self.consume(hit.consumed);
        Ok(Some(hit.construct))
    }

    pub fn take_warnings(&mut self) -> Vec<ScanError> {
        std::mem::take(&mut self.warnings)
    }

    /// Current cursor position, 1-based.
    pub fn position(&self) -> (u32, u32) {
        (self.line, self.column)
    }

    /// Bytes buffered but not yet consumed.
    pub fn pending(&self) -> usize {
        self.buf.len() - self.off
    }

    /// Returns false while the buffer could still turn out to start
    /// with a byte order mark.
    fn skip_bom(&mut self, terminate: bool) -> bool {
        let view = &self.buf[self.off..];
        if view.len() >= UTF8_BOM.len() {
            if view[..UTF8_BOM.len()] == UTF8_BOM {
                self.off += UTF8_BOM.len();
            }
            self.bom_checked = true;
        } else if terminate || !UTF8_BOM.starts_with(view) {
            self.bom_checked = true;
        }
        self.bom_checked
    }

    fn consume(&mut self, n: usize) {
        let (line, column) = advance(
            (self.line, self.column),
            &self.buf[self.off..self.off + n],
        );
        self.line = line;
        self.column = column;
        self.off += n;
    }
}

/// Advances a 1-based line/column pair over `bytes`.
fn advance(pos: (u32, u32), bytes: &[u8]) -> (u32, u32) {
    let (mut line, mut column) = pos;
    for &b in bytes {
        if b == b'\n' {
            line += 1;
            column = 1;
        } else {
            column += 1;
        }
    }
    (line, column)
}

fn pos_at(base: (u32, u32), view: &[u8], off: usize) -> (u32, u32) {
    advance(base, &view[..off])
}

fn err_at(pos: (u32, u32), code: SaxErrCode, message: impl Into<String>) -> ScanError {
    ScanError {
        code,
        message: message.into(),
        line: pos.0,
        column: pos.1,
    }
}

fn is_xml_ws(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n')
}

fn name_start_ok(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_' || b == b':' || b >= 0x80
}

fn trim_xml_ws(bytes: &[u8]) -> &[u8] {
    let start = bytes
        .iter()
        .position(|&b| !is_xml_ws(b))
        .unwrap_or(bytes.len());
    let end = bytes
        .iter()
        .rposition(|&b| !is_xml_ws(b))
        .map_or(start, |p| p + 1);
    &bytes[start..end]
}

fn scan_construct(
    view: &[u8],
    recover: bool,
    pos: (u32, u32),
    terminate: bool,
) -> Result<Option<ScanHit>, ScanError> {
    if view[0] != b'<' {
        return scan_text(view, recover, pos, terminate);
    }
    if view.len() < 2 {
        return if terminate {
            Err(err_at(
                pos,
                SaxErrCode::UnfinishedTag,
                "Couldn't find end of Start Tag",
            ))
        } else {
            Ok(None)
        };
    }
    match view[1] {
        b'?' => scan_pi(view, pos, terminate),
        b'!' => scan_bang(view, pos, terminate),
        b'/' => scan_end_tag(view, pos, terminate),
        _ => scan_start_tag(view, recover, pos, terminate),
    }
}

fn scan_text(
    view: &[u8],
    recover: bool,
    pos: (u32, u32),
    terminate: bool,
) -> Result<Option<ScanHit>, ScanError> {
    let raw = match memchr(b'<', view) {
        Some(idx) => &view[..idx],
        None if terminate => view,
        None => return Ok(None),
    };

    let (bytes, ref_warnings) = entities::decode(raw, recover).map_err(|e| {
        let p = pos_at(pos, view, e.offset);
        err_at(p, e.code, e.message)
    })?;

    let warnings = ref_warnings
        .into_iter()
        .map(|e| {
            let p = pos_at(pos, view, e.offset);
            err_at(p, e.code, e.message)
        })
        .collect();

    let blank = bytes.iter().all(|&b| is_xml_ws(b));
    Ok(Some(ScanHit {
        construct: Construct::Text { bytes, blank },
        consumed: raw.len(),
        warnings,
    }))
}

fn scan_pi(view: &[u8], pos: (u32, u32), terminate: bool) -> Result<Option<ScanHit>, ScanError> {
    let rel = match memmem::find(&view[2..], b"?>") {
        Some(rel) => rel,
        None if terminate => {
            let target: Vec<u8> = view[2..]
                .iter()
                .copied()
                .take_while(|&b| !is_xml_ws(b))
                .take(32)
                .collect();
            let message = if target.is_empty() {
                String::from("ParsePI: PI never end")
            } else {
                format!("ParsePI: PI {} never end", String::from_utf8_lossy(&target))
            };
            return Err(err_at(pos, SaxErrCode::UnfinishedPi, message));
        }
        None => return Ok(None),
    };

    let inner = &view[2..2 + rel];
    let consumed = 2 + rel + 2;

    let target_end = inner
        .iter()
        .position(|&b| is_xml_ws(b))
        .unwrap_or(inner.len());
    let target = &inner[..target_end];

    if target.is_empty() || !name_start_ok(target[0]) {
        return Err(err_at(
            pos,
            SaxErrCode::InvalidName,
            "ParsePI: PI name expected",
        ));
    }

    let data = if target_end < inner.len() {
        let rest = &inner[target_end..];
        let trimmed = rest
            .iter()
            .position(|&b| !is_xml_ws(b))
            .map(|start| &rest[start..])
            .unwrap_or(&[]);
        Some(trimmed.to_vec())
    } else {
        None
    };

    if target.eq_ignore_ascii_case(b"xml") {
        let encoding = data.as_deref().and_then(xml_decl_encoding);
        return Ok(Some(ScanHit {
            construct: Construct::XmlDecl { encoding },
            consumed,
            warnings: Vec::new(),
        }));
    }

    Ok(Some(ScanHit {
        construct: Construct::Pi {
            target: target.to_vec(),
            data,
        },
        consumed,
        warnings: Vec::new(),
    }))
}

/// Pulls the encoding name out of an XML declaration body, if present.
fn xml_decl_encoding(data: &[u8]) -> Option<Vec<u8>> {
    let start = memmem::find(data, b"encoding")?;
    let mut k = start + b"encoding".len();
    while k < data.len() && is_xml_ws(data[k]) {
        k += 1;
    }
    if k >= data.len() || data[k] != b'=' {
        return None;
    }
    k += 1;
    while k < data.len() && is_xml_ws(data[k]) {
        k += 1;
    }
    if k >= data.len() || (data[k] != b'"' && data[k] != b'\'') {
        return None;
    }
    let quote = data[k];
    k += 1;
    let vstart = k;
    let vlen = memchr(quote, &data[vstart..])?;
    Some(data[vstart..vstart + vlen].to_vec())
}

fn scan_bang(view: &[u8], pos: (u32, u32), terminate: bool) -> Result<Option<ScanHit>, ScanError> {
    const CANDIDATES: [&[u8]; 3] = [b"<!--", b"<![CDATA[", b"<!DOCTYPE"];

    if view.starts_with(b"<!--") {
        return scan_comment(view, pos, terminate);
    }
    if view.starts_with(b"<![CDATA[") {
        return scan_cdata(view, pos, terminate);
    }
    if view.starts_with(b"<!DOCTYPE") {
        return scan_doctype(view, pos, terminate);
    }

    let could_grow = CANDIDATES
        .iter()
        .any(|prefix| prefix.len() > view.len() && prefix.starts_with(view));
    if could_grow {
        return if terminate {
            Err(err_at(
                pos,
                SaxErrCode::PrematureEnd,
                "Premature end of data in markup declaration",
            ))
        } else {
            Ok(None)
        };
    }

    Err(err_at(
        pos,
        SaxErrCode::InvalidName,
        "Markup declaration expected",
    ))
}

fn scan_comment(
    view: &[u8],
    pos: (u32, u32),
    terminate: bool,
) -> Result<Option<ScanHit>, ScanError> {
    let rel = match memmem::find(&view[4..], b"-->") {
        Some(rel) => rel,
        None if terminate => {
            return Err(err_at(
                pos,
                SaxErrCode::UnfinishedComment,
                "Comment not terminated",
            ))
        }
        None => return Ok(None),
    };

    let content = &view[4..4 + rel];
    if let Some(bad) = memmem::find(content, b"--") {
        let p = pos_at(pos, view, 4 + bad);
        return Err(err_at(
            p,
            SaxErrCode::DoubleHyphen,
            "Double hyphen within comment",
        ));
    }
    if content.last() == Some(&b'-') {
        let p = pos_at(pos, view, 4 + content.len() - 1);
        return Err(err_at(
            p,
            SaxErrCode::DoubleHyphen,
            "Double hyphen within comment",
        ));
    }

    Ok(Some(ScanHit {
        construct: Construct::Comment {
            bytes: content.to_vec(),
        },
        consumed: 4 + rel + 3,
        warnings: Vec::new(),
    }))
}

fn scan_cdata(
    view: &[u8],
    pos: (u32, u32),
    terminate: bool,
) -> Result<Option<ScanHit>, ScanError> {
    let rel = match memmem::find(&view[9..], b"]]>") {
        Some(rel) => rel,
        None if terminate => {
            return Err(err_at(
                pos,
                SaxErrCode::UnfinishedCdata,
                "CData section not finished",
            ))
        }
        None => return Ok(None),
    };

    Ok(Some(ScanHit {
        construct: Construct::Cdata {
            bytes: view[9..9 + rel].to_vec(),
        },
        consumed: 9 + rel + 3,
        warnings: Vec::new(),
    }))
}

fn scan_doctype(
    view: &[u8],
    pos: (u32, u32),
    terminate: bool,
) -> Result<Option<ScanHit>, ScanError> {
    // The internal subset may nest brackets and quote '>' characters.
    let mut depth = 0usize;
    let mut quote: Option<u8> = None;
    for (i, &b) in view.iter().enumerate().skip(9) {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'[' => depth += 1,
                b']' => depth = depth.saturating_sub(1),
                b'>' if depth == 0 => {
                    return Ok(Some(ScanHit {
                        construct: Construct::Doctype,
                        consumed: i + 1,
                        warnings: Vec::new(),
                    }));
                }
                _ => {}
            },
        }
    }

    if terminate {
        Err(err_at(
            pos,
            SaxErrCode::PrematureEnd,
            "DOCTYPE improperly terminated",
        ))
    } else {
        Ok(None)
    }
}

fn scan_end_tag(
    view: &[u8],
    pos: (u32, u32),
    terminate: bool,
) -> Result<Option<ScanHit>, ScanError> {
    let rel = match memchr(b'>', &view[2..]) {
        Some(rel) => rel,
        None if terminate => {
            return Err(err_at(pos, SaxErrCode::UnfinishedTag, "expected '>'"))
        }
        None => return Ok(None),
    };

    let name = trim_xml_ws(&view[2..2 + rel]);
    let valid = !name.is_empty()
        && name_start_ok(name[0])
        && !name.iter().any(|&b| is_xml_ws(b) || b == b'<');
    if !valid {
        return Err(err_at(
            pos,
            SaxErrCode::InvalidName,
            "EndTag: invalid element name",
        ));
    }

    Ok(Some(ScanHit {
        construct: Construct::EndTag {
            name: name.to_vec(),
        },
        consumed: 2 + rel + 1,
        warnings: Vec::new(),
    }))
}

fn scan_start_tag(
    view: &[u8],
    recover: bool,
    pos: (u32, u32),
    terminate: bool,
) -> Result<Option<ScanHit>, ScanError> {
    // Find the closing '>', honouring quoted attribute values.
    let mut end = None;
    let mut quote: Option<u8> = None;
    for (i, &b) in view.iter().enumerate().skip(1) {
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None => match b {
                b'"' | b'\'' => quote = Some(b),
                b'>' => {
                    end = Some(i);
                    break;
                }
                b'<' => {
                    let p = pos_at(pos, view, i);
                    return Err(err_at(
                        p,
                        SaxErrCode::InvalidName,
                        "error parsing attribute name",
                    ));
                }
                _ => {}
            },
        }
    }

    let end = match end {
        Some(end) => end,
        None if terminate => {
            let name: Vec<u8> = view[1..]
                .iter()
                .copied()
                .take_while(|&b| !is_xml_ws(b) && b != b'/')
                .take(32)
                .collect();
            return Err(err_at(
                pos,
                SaxErrCode::UnfinishedTag,
                format!(
                    "Couldn't find end of Start Tag {} line {}",
                    String::from_utf8_lossy(&name),
                    pos.0
                ),
            ));
        }
        None => return Ok(None),
    };

    let mut raw = &view[1..end];
    let self_closing = raw.last() == Some(&b'/');
    if self_closing {
        raw = &raw[..raw.len() - 1];
    }

    if raw.is_empty() || !name_start_ok(raw[0]) {
        return Err(err_at(
            pos,
            SaxErrCode::InvalidName,
            "StartTag: invalid element name",
        ));
    }

    let name_end = raw
        .iter()
        .position(|&b| is_xml_ws(b))
        .unwrap_or(raw.len());
    let name = raw[..name_end].to_vec();

    let mut warnings = Vec::new();
    let mut attrs = Vec::new();
    let mut k = name_end;

    loop {
        while k < raw.len() && is_xml_ws(raw[k]) {
            k += 1;
        }
        if k >= raw.len() {
            break;
        }

        let attr_pos = pos_at(pos, view, 1 + k);
        if !name_start_ok(raw[k]) {
            return Err(err_at(
                attr_pos,
                SaxErrCode::InvalidName,
                "error parsing attribute name",
            ));
        }

        let attr_start = k;
        while k < raw.len() && !is_xml_ws(raw[k]) && raw[k] != b'=' {
            k += 1;
        }
        let attr_name = &raw[attr_start..k];

        while k < raw.len() && is_xml_ws(raw[k]) {
            k += 1;
        }

        if k >= raw.len() || raw[k] != b'=' {
            // Attribute without a value.
            let message = format!(
                "Specification mandates value for attribute {}",
                String::from_utf8_lossy(attr_name)
            );
            if !recover {
                return Err(err_at(attr_pos, SaxErrCode::AttributeWithoutValue, message));
            }
            warnings.push(err_at(
                attr_pos,
                SaxErrCode::AttributeWithoutValue,
                message,
            ));
            attrs.push((attr_name.to_vec(), None));
            continue;
        }

        k += 1;
        while k < raw.len() && is_xml_ws(raw[k]) {
            k += 1;
        }
        if k >= raw.len() || (raw[k] != b'"' && raw[k] != b'\'') {
            return Err(err_at(
                attr_pos,
                SaxErrCode::AttValueExpected,
                "AttValue: \" or ' expected",
            ));
        }

        let value_quote = raw[k];
        k += 1;
        let vstart = k;
        while k < raw.len() && raw[k] != value_quote {
            k += 1;
        }
        // The '>' scan above only ends outside quotes, so the closing
        // quote is guaranteed to be present here.
        let value_raw = &raw[vstart..k];
        k += 1;

        if memchr(b'<', value_raw).is_some() {
            return Err(err_at(
                attr_pos,
                SaxErrCode::UnescapedLt,
                "Unescaped '<' not allowed in attributes values",
            ));
        }

        let (value, ref_warnings) = entities::decode(value_raw, recover).map_err(|e| {
            let p = pos_at(pos, view, 1 + vstart + e.offset);
            err_at(p, e.code, e.message)
        })?;
        warnings.extend(ref_warnings.into_iter().map(|e| {
            let p = pos_at(pos, view, 1 + vstart + e.offset);
            err_at(p, e.code, e.message)
        }));

        attrs.push((attr_name.to_vec(), Some(value)));
    }

    Ok(Some(ScanHit {
        construct: Construct::StartTag {
            name,
            attrs,
            self_closing,
        },
        consumed: end + 1,
        warnings,
    }))
}
