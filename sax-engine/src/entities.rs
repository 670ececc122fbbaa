//! Entity and character reference decoding
//!
//! Resolves the five predefined entities and numeric character
//! references inside character data and attribute values. There is no
//! DTD support, so any other named entity is undeclared by definition.

use crate::sax::SaxErrCode;

/// Longest reference body we will scan before declaring it malformed.
const MAX_REF_LEN: usize = 64;

/// A problem found while decoding references.
///
/// `offset` is the byte position of the introducing `&` relative to the
/// start of the decoded input; the caller maps it to a line/column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RefError {
    pub code: SaxErrCode,
    pub message: String,
    pub offset: usize,
}

/// Replaces references in `input` with their expansions.
///
/// In recovery mode problems are downgraded: the reference text is kept
/// literally (or replaced with U+FFFD for out-of-range character
/// references) and reported through the returned warning list. In
/// strict mode the first problem aborts the decode.
pub(crate) fn decode(input: &[u8], recover: bool) -> Result<(Vec<u8>, Vec<RefError>), RefError> {
    let mut out = Vec::with_capacity(input.len());
    let mut warnings = Vec::new();
    let mut i = 0;

    while i < input.len() {
        if input[i] != b'&' {
            out.push(input[i]);
            i += 1;
            continue;
        }

        match scan_reference(&input[i..], i) {
            Ok((expansion, consumed)) => {
                out.extend_from_slice(&expansion);
                i += consumed;
            }
            Err(err) if recover => {
                match err.code {
                    SaxErrCode::InvalidCharRef => {
                        // Keep the document flowing with a replacement char.
                        out.extend_from_slice("\u{FFFD}".as_bytes());
                        let consumed = reference_span(&input[i..]);
                        warnings.push(err);
                        i += consumed;
                    }
                    SaxErrCode::UndeclaredEntity => {
                        let consumed = reference_span(&input[i..]);
                        out.extend_from_slice(&input[i..i + consumed]);
                        warnings.push(err);
                        i += consumed;
                    }
                    _ => {
                        // Malformed reference: pass the bare ampersand through.
                        out.push(b'&');
                        warnings.push(err);
                        i += 1;
                    }
                }
            }
            Err(err) => return Err(err),
        }
    }

    Ok((out, warnings))
}

/// Parses one reference starting at `input[0] == b'&'`.
///
/// Returns the expansion bytes and the number of input bytes consumed.
fn scan_reference(input: &[u8], base: usize) -> Result<(Vec<u8>, usize), RefError> {
    let semi = match input
        .iter()
        .take(MAX_REF_LEN)
        .position(|&b| b == b';')
    {
        Some(pos) if pos > 1 => pos,
        _ => {
            return Err(RefError {
                code: SaxErrCode::MalformedReference,
                message: String::from("EntityRef: expecting ';'"),
                offset: base,
            })
        }
    };

    let body = &input[1..semi];
    let consumed = semi + 1;

    if body[0] == b'#' {
        let value = parse_char_ref(&body[1..]).ok_or_else(|| RefError {
            code: SaxErrCode::InvalidCharRef,
            message: String::from("CharRef: invalid value"),
            offset: base,
        })?;
        let ch = char::from_u32(value)
            .filter(|&c| is_xml_char(c))
            .ok_or_else(|| RefError {
                code: SaxErrCode::InvalidCharRef,
                message: format!("CharRef: invalid xmlChar value {}", value),
                offset: base,
            })?;
        let mut buf = [0u8; 4];
        return Ok((ch.encode_utf8(&mut buf).as_bytes().to_vec(), consumed));
    }

    match body {
        b"amp" => Ok((b"&".to_vec(), consumed)),
        b"lt" => Ok((b"<".to_vec(), consumed)),
        b"gt" => Ok((b">".to_vec(), consumed)),
        b"apos" => Ok((b"'".to_vec(), consumed)),
        b"quot" => Ok((b"\"".to_vec(), consumed)),
        _ if is_reference_name(body) => Err(RefError {
            code: SaxErrCode::UndeclaredEntity,
            message: format!("Entity '{}' not defined", String::from_utf8_lossy(body)),
            offset: base,
        }),
        _ => Err(RefError {
            code: SaxErrCode::MalformedReference,
            message: String::from("EntityRef: expecting ';'"),
            offset: base,
        }),
    }
}

/// Bytes spanned by the (possibly broken) reference at `input[0] == b'&'`,
/// used to skip it during recovery. Falls back to the lone ampersand.
fn reference_span(input: &[u8]) -> usize {
    match input.iter().take(MAX_REF_LEN).position(|&b| b == b';') {
        Some(pos) => pos + 1,
        None => 1,
    }
}

fn parse_char_ref(body: &[u8]) -> Option<u32> {
    let (digits, radix) = match body.first() {
        Some(b'x') | Some(b'X') => (&body[1..], 16),
        Some(_) => (body, 10),
        None => return None,
    };
    if digits.is_empty() || !digits.iter().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let text = std::str::from_utf8(digits).ok()?;
    u32::from_str_radix(text, radix).ok()
}

/// Characters permitted in XML content. Excludes NUL, most C0 controls
/// and the two permanent non-characters; surrogates never get this far
/// because `char` cannot hold them.
fn is_xml_char(c: char) -> bool {
    matches!(
        c,
        '\u{9}' | '\u{A}' | '\u{D}' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}'
    )
}

fn is_reference_name(body: &[u8]) -> bool {
    let Some(&first) = body.first() else {
        return false;
    };
    if !(first.is_ascii_alphabetic() || first == b'_' || first == b':') {
        return false;
    }
    body.iter().all(|&b| {
        b.is_ascii_alphanumeric() || matches!(b, b'_' | b':' | b'-' | b'.')
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_strict(input: &str) -> Result<String, RefError> {
        decode(input.as_bytes(), false)
            .map(|(bytes, _)| String::from_utf8(bytes).expect("utf8"))
    }

    #[test]
    fn test_predefined_entities() {
        assert_eq!(decode_strict("a &amp; b").unwrap(), "a & b");
        assert_eq!(decode_strict("&lt;tag&gt;").unwrap(), "<tag>");
        assert_eq!(decode_strict("&quot;&apos;").unwrap(), "\"'");
    }

    #[test]
    fn test_numeric_character_references() {
        assert_eq!(decode_strict("&#65;&#x42;").unwrap(), "AB");
        assert_eq!(decode_strict("&#x263A;").unwrap(), "\u{263A}");
    }

    #[test]
    fn test_undeclared_entity_is_fatal_in_strict_mode() {
        let err = decode_strict("&nbsp;").unwrap_err();
        assert_eq!(err.code, SaxErrCode::UndeclaredEntity);
        assert_eq!(err.message, "Entity 'nbsp' not defined");
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn test_undeclared_entity_kept_literally_in_recovery() {
        let (bytes, warnings) = decode(b"x &nbsp; y", true).unwrap();
        assert_eq!(bytes, b"x &nbsp; y");
        assert_eq!(warnings.len(), 1);
        assert_eq!(warnings[0].offset, 2);
    }

    #[test]
    fn test_bare_ampersand() {
        let err = decode_strict("fish & chips").unwrap_err();
        assert_eq!(err.code, SaxErrCode::MalformedReference);
        assert_eq!(err.offset, 5);

        let (bytes, warnings) = decode(b"fish & chips", true).unwrap();
        assert_eq!(bytes, b"fish & chips");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_surrogate_char_ref_is_invalid() {
        let err = decode_strict("&#xD800;").unwrap_err();
        assert_eq!(err.code, SaxErrCode::InvalidCharRef);

        let (bytes, warnings) = decode(b"&#xD800;", true).unwrap();
        assert_eq!(String::from_utf8(bytes).unwrap(), "\u{FFFD}");
        assert_eq!(warnings.len(), 1);
    }

    #[test]
    fn test_forbidden_control_char_refs() {
        let err = decode_strict("&#0;").unwrap_err();
        assert_eq!(err.code, SaxErrCode::InvalidCharRef);
        assert_eq!(err.message, "CharRef: invalid xmlChar value 0");
        assert!(decode_strict("&#x1;").is_err());
        // Tab, LF and CR are the permitted controls.
        assert_eq!(decode_strict("&#9;&#10;&#13;").unwrap(), "\t\n\r");
    }

    #[test]
    fn test_unterminated_reference_hits_length_cap() {
        let long = format!("&{};", "a".repeat(80));
        let err = decode_strict(&long).unwrap_err();
        assert_eq!(err.code, SaxErrCode::MalformedReference);
    }
}
