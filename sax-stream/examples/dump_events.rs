//! Standalone XML event dump tool
//!
//! Streams an XML file through the parser and prints every event with
//! its nesting depth, followed by a summary of what the document
//! contained.
//!
//! Usage:
//!   dump_events <file.xml> [--lenient] [--skip-blanks] [--limit <count>] [--quiet]
//!
//! Example:
//!   dump_events catalog.xml --skip-blanks --limit 200

use std::env;
use std::path::PathBuf;

use sax_stream::{ChunkSize, Flow, ParserConfig, StreamEvent, StreamParser};

struct StreamStats {
    elements: usize,
    text_bytes: usize,
    cdata_bytes: usize,
    comments: usize,
    instructions: usize,
    attributes: usize,
    max_depth: usize,
}

impl StreamStats {
    fn new() -> Self {
        Self {
            elements: 0,
            text_bytes: 0,
            cdata_bytes: 0,
            comments: 0,
            instructions: 0,
            attributes: 0,
            max_depth: 0,
        }
    }

    fn print_summary(&self) {
        println!("\n=== DOCUMENT SUMMARY ===");
        println!("Elements: {}", self.elements);
        println!("Attributes: {}", self.attributes);
        println!("Character data: {} bytes", self.text_bytes);
        println!("CDATA: {} bytes", self.cdata_bytes);
        println!("Comments: {}", self.comments);
        println!("Processing instructions: {}", self.instructions);
        println!("Maximum depth: {}", self.max_depth);
    }
}

fn preview(text: &str) -> String {
    let collapsed: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() > 60 {
        let short: String = collapsed.chars().take(60).collect();
        format!("{}...", short)
    } else {
        collapsed
    }
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        eprintln!(
            "Usage: {} <file.xml> [--lenient] [--skip-blanks] [--limit <count>] [--quiet]",
            args[0]
        );
        eprintln!("\nExample:");
        eprintln!("  {} catalog.xml --skip-blanks --limit 200", args[0]);
        std::process::exit(1);
    }

    let file = PathBuf::from(&args[1]);
    let mut config = ParserConfig::new().with_chunk_size(ChunkSize::Kilobytes(64));
    let mut limit: Option<usize> = None;
    let mut quiet = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--lenient" => {
                config = config.with_recovery(true);
            }
            "--skip-blanks" => {
                config = config.with_skip_blank_text(true);
            }
            "--limit" => {
                i += 1;
                if i < args.len() {
                    limit = Some(args[i].parse()?);
                }
            }
            "--quiet" | "-q" => {
                quiet = true;
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
            }
        }
        i += 1;
    }

    println!("=== XML EVENT DUMP ===");
    println!("File: {:?}", file);
    println!("Lenient: {}", config.recover);
    println!("Skip blank text: {}", config.skip_blank_text);
    if let Some(n) = limit {
        println!("Limit: {} events", n);
    }
    println!();

    let mut stats = StreamStats::new();
    let mut depth = 0usize;
    let mut printed = 0usize;
    let mut truncated = false;

    let mut parser = StreamParser::with_config(
        |event: StreamEvent| {
            if let Some(max) = limit {
                if printed >= max {
                    truncated = true;
                    return Flow::Stop;
                }
            }

            let indent = "  ".repeat(depth);
            match &event {
                StreamEvent::DocumentStart => {
                    if !quiet {
                        println!("{}START DOCUMENT", indent);
                    }
                }
                StreamEvent::DocumentEnd => {
                    if !quiet {
                        println!("{}END DOCUMENT", indent);
                    }
                }
                StreamEvent::ElementStart { name, attributes } => {
                    stats.elements += 1;
                    stats.attributes += attributes.len();
                    if !quiet {
                        let attrs: Vec<String> =
                            attributes.iter().map(|a| a.to_string()).collect();
                        if attrs.is_empty() {
                            println!("{}<{}>", indent, name);
                        } else {
                            println!("{}<{} {}>", indent, name, attrs.join(" "));
                        }
                    }
                    depth += 1;
                    stats.max_depth = stats.max_depth.max(depth);
                }
                StreamEvent::ElementEnd { name } => {
                    depth = depth.saturating_sub(1);
                    if !quiet {
                        println!("{}</{}>", "  ".repeat(depth), name);
                    }
                }
                StreamEvent::Characters(text) => {
                    stats.text_bytes += text.len();
                    if !quiet {
                        println!("{}text: \"{}\"", indent, preview(text));
                    }
                }
                StreamEvent::Cdata(bytes) => {
                    stats.cdata_bytes += bytes.len();
                    if !quiet {
                        println!("{}cdata: {} bytes", indent, bytes.len());
                    }
                }
                StreamEvent::Comment(text) => {
                    stats.comments += 1;
                    if !quiet {
                        println!("{}<!--{}-->", indent, preview(text));
                    }
                }
                StreamEvent::ProcessingInstruction { target, data } => {
                    stats.instructions += 1;
                    if !quiet {
                        println!("{}<?{} {}?>", indent, target, data.as_deref().unwrap_or(""));
                    }
                }
            }
            printed += 1;
            Flow::Continue
        },
        config,
    )?;

    let summary = parser.parse_file(&file)?;

    if !parser.warnings().is_empty() {
        println!("\n=== WARNINGS ===");
        for warning in parser.warnings() {
            println!("  {}", warning);
        }
    }

    drop(parser);

    if truncated {
        println!("\n... (limit reached, parse stopped)");
    }
    println!("\nEvents delivered: {}", summary.events_dispatched);
    stats.print_summary();

    Ok(())
}
