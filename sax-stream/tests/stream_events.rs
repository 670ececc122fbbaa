// End-to-end event stream tests against the public parser API
use std::io::Write;
use std::panic;
use std::thread;

use sax_stream::{
    Attribute, ChunkSize, EventCollector, Flow, ParserConfig, StreamError, StreamEvent,
    StreamParser,
};

fn element(name: &str, attrs: &[(&str, &str)]) -> StreamEvent {
    StreamEvent::ElementStart {
        name: name.to_string(),
        attributes: attrs
            .iter()
            .map(|(n, v)| Attribute::new(*n, *v))
            .collect(),
    }
}

fn end(name: &str) -> StreamEvent {
    StreamEvent::ElementEnd {
        name: name.to_string(),
    }
}

fn text(value: &str) -> StreamEvent {
    StreamEvent::Characters(value.to_string())
}

#[test]
fn test_simple_document_event_sequence() {
    let mut parser = StreamParser::new(EventCollector::new());
    let summary = parser.parse_str("<a><b>x</b></a>").unwrap();

    let events = parser.into_handler().into_events();
    assert_eq!(
        events,
        vec![
            StreamEvent::DocumentStart,
            element("a", &[]),
            element("b", &[]),
            text("x"),
            end("b"),
            end("a"),
            StreamEvent::DocumentEnd,
        ]
    );
    assert_eq!(summary.events_dispatched, 7);
    assert!(!summary.stopped);
}

#[test]
fn test_attributes_keep_document_order_including_duplicates() {
    let mut parser = StreamParser::new(EventCollector::new());
    parser
        .parse_str(r#"<r one="1" two="2" one="3"/>"#)
        .unwrap();

    let events = parser.into_handler().into_events();
    assert_eq!(
        events[1],
        element("r", &[("one", "1"), ("two", "2"), ("one", "3")])
    );
}

#[test]
fn test_character_data_with_embedded_nul() {
    let mut parser = StreamParser::new(EventCollector::new());
    parser.parse_bytes(b"<a>x\0y</a>").unwrap();

    let events = parser.into_handler().into_events();
    match &events[2] {
        StreamEvent::Characters(value) => {
            assert_eq!(value.len(), 3);
            assert_eq!(value, "x\u{0}y");
        }
        other => panic!("unexpected event: {:?}", other),
    }
}

#[test]
fn test_mismatched_tags_fail_after_prefix_is_delivered() {
    let mut parser = StreamParser::new(EventCollector::new());
    let err = parser.parse_str("<a><b></a>").unwrap_err();

    match err {
        StreamError::Parse { message, line, .. } => {
            assert_eq!(message, "Opening and ending tag mismatch: b line 1 and a");
            assert_eq!(line, 1);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    // Everything before the failure point was still delivered, and
    // delivery stopped with it; no DocumentEnd.
    let events = parser.into_handler().into_events();
    assert_eq!(
        events,
        vec![StreamEvent::DocumentStart, element("a", &[]), element("b", &[])]
    );
}

#[test]
fn test_event_payloads_outlive_the_parser() {
    let mut parser = StreamParser::new(EventCollector::new());
    parser.parse_str(r#"<msg kind="greeting">hello</msg>"#).unwrap();
    let events = parser.into_handler().into_events();

    // The parser and its engine context are gone; the payloads are
    // plain owned data.
    match &events[1] {
        StreamEvent::ElementStart { name, attributes } => {
            assert_eq!(name, "msg");
            assert_eq!(attributes[0].to_string(), r#"kind="greeting""#);
        }
        other => panic!("unexpected event: {:?}", other),
    }
    assert_eq!(events[2], text("hello"));
}

#[test]
fn test_concurrent_sessions_stay_isolated() {
    let handles: Vec<_> = (0..4)
        .map(|i| {
            thread::spawn(move || {
                let document = format!("<doc><n>{}</n><n>{}</n></doc>", i, i * 10);
                let mut parser = StreamParser::new(EventCollector::new());
                parser.parse_str(&document).unwrap();
                let texts: Vec<String> = parser
                    .into_handler()
                    .into_events()
                    .into_iter()
                    .filter_map(|event| match event {
                        StreamEvent::Characters(value) => Some(value),
                        _ => None,
                    })
                    .collect();
                assert_eq!(texts, vec![i.to_string(), (i * 10).to_string()]);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_chunked_file_parse_reassembles_tokens() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"<data><item>First</item><item>Second</item></data>")
        .unwrap();

    // Ten-byte chunks land inside tag names and text runs.
    let config = ParserConfig::new().with_chunk_size(ChunkSize::Bytes(10));
    let mut parser = StreamParser::with_config(EventCollector::new(), config).unwrap();
    parser.parse_file(file.path()).unwrap();

    let texts: Vec<String> = parser
        .into_handler()
        .into_events()
        .into_iter()
        .filter_map(|event| match event {
            StreamEvent::Characters(value) => Some(value),
            _ => None,
        })
        .collect();
    assert_eq!(texts, vec!["First", "Second"]);
}

#[test]
fn test_invalid_utf8_is_replaced_with_warning() {
    let mut parser = StreamParser::new(EventCollector::new());
    let summary = parser.parse_bytes(b"<a>h\xFFi</a>").unwrap();

    assert_eq!(summary.warnings, 1);
    assert!(parser.warnings()[0].message.contains("Invalid UTF-8"));
    let events = parser.into_handler().into_events();
    assert_eq!(events[2], text("h\u{FFFD}i"));
}

#[test]
fn test_lenient_mode_keeps_going_past_valueless_attribute() {
    let mut parser =
        StreamParser::with_config(EventCollector::new(), ParserConfig::lenient()).unwrap();
    let summary = parser.parse_str("<form disabled></form>").unwrap();

    assert_eq!(summary.warnings, 1);
    assert!(parser.warnings()[0]
        .message
        .contains("Specification mandates value for attribute disabled"));
    let events = parser.into_handler().into_events();
    assert_eq!(events[1], element("form", &[("disabled", "")]));
    assert_eq!(events.last(), Some(&StreamEvent::DocumentEnd));
}

#[test]
fn test_handler_stop_ends_parse_cleanly() {
    let mut names = Vec::new();
    let mut parser = StreamParser::new(|event: StreamEvent| {
        if let StreamEvent::ElementStart { name, .. } = event {
            names.push(name);
            if names.len() == 2 {
                return Flow::Stop;
            }
        }
        Flow::Continue
    });
    let summary = parser
        .parse_str("<a><b/><c/><d/><e/></a>")
        .unwrap();
    assert!(summary.stopped);
    drop(parser);
    assert_eq!(names, vec!["a", "b"]);
}

#[test]
fn test_handler_panic_escapes_parse_call() {
    let outcome = panic::catch_unwind(|| {
        let mut parser = StreamParser::new(|event: StreamEvent| {
            if matches!(event, StreamEvent::ElementStart { .. }) {
                panic!("handler gave up");
            }
            Flow::Continue
        });
        let _ = parser.parse_str("<a><b/></a>");
    });

    let payload = outcome.expect_err("panic should surface from parse_str");
    assert_eq!(payload.downcast_ref::<&str>(), Some(&"handler gave up"));

    // The aborted session left nothing behind; a fresh parse runs clean.
    let mut parser = StreamParser::new(EventCollector::new());
    parser.parse_str("<ok/>").unwrap();
    let events = parser.into_handler().into_events();
    assert_eq!(events.last(), Some(&StreamEvent::DocumentEnd));
}

#[test]
fn test_cdata_arrives_as_raw_bytes() {
    let mut parser = StreamParser::new(EventCollector::new());
    parser
        .parse_str("<a><![CDATA[1 < 2 & 3]]></a>")
        .unwrap();

    let events = parser.into_handler().into_events();
    assert_eq!(events[2], StreamEvent::Cdata(b"1 < 2 & 3".to_vec()));
}

#[test]
fn test_comment_and_processing_instruction() {
    let mut parser = StreamParser::new(EventCollector::new());
    parser
        .parse_str("<?go here?><a><!-- note --></a>")
        .unwrap();

    let events = parser.into_handler().into_events();
    assert_eq!(
        events[1],
        StreamEvent::ProcessingInstruction {
            target: "go".to_string(),
            data: Some("here".to_string()),
        }
    );
    assert_eq!(events[3], StreamEvent::Comment(" note ".to_string()));
}

#[test]
fn test_entities_decode_in_text_and_attributes() {
    let mut parser = StreamParser::new(EventCollector::new());
    parser
        .parse_str(r#"<a title="a&amp;b">&lt;p&gt; &#169;</a>"#)
        .unwrap();

    let events = parser.into_handler().into_events();
    assert_eq!(events[1], element("a", &[("title", "a&b")]));
    assert_eq!(events[2], text("<p> \u{A9}"));
}

#[test]
fn test_blank_text_can_be_skipped() {
    let config = ParserConfig::new().with_skip_blank_text(true);
    let mut parser = StreamParser::with_config(EventCollector::new(), config).unwrap();
    parser
        .parse_str("<a>\n  <b>kept</b>\n</a>")
        .unwrap();

    let events = parser.into_handler().into_events();
    assert_eq!(
        events,
        vec![
            StreamEvent::DocumentStart,
            element("a", &[]),
            element("b", &[]),
            text("kept"),
            end("b"),
            end("a"),
            StreamEvent::DocumentEnd,
        ]
    );
}

#[test]
fn test_empty_input_is_an_error() {
    let mut parser = StreamParser::new(EventCollector::new());
    let err = parser.parse_str("").unwrap_err();
    match err {
        StreamError::Parse { message, .. } => assert_eq!(message, "Document is empty"),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[test]
fn test_truncated_document_names_open_tag() {
    let mut parser = StreamParser::new(EventCollector::new());
    let err = parser.parse_str("<a><b>never closed").unwrap_err();
    match err {
        StreamError::Parse { message, .. } => {
            assert_eq!(message, "Premature end of data in tag b line 1");
        }
        other => panic!("unexpected error: {:?}", other),
    }
}
