//! Event handler trait and ready-made implementations

use crate::types::StreamEvent;

/// What the parser should do after an event has been handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep delivering events
    Continue,
    /// Stop parsing; the session still finishes cleanly
    Stop,
}

/// Receives parsing events in document order
///
/// Handlers are called synchronously from inside the parse call: the
/// engine does not advance until the handler returns. Returning
/// [`Flow::Stop`] halts the engine; no further events are delivered
/// and the parse call reports a stopped (not failed) outcome.
///
/// Closures with the right shape implement this trait, so quick jobs
/// do not need a dedicated type:
///
/// ```
/// use sax_stream::{Flow, StreamEvent, StreamParser};
///
/// let mut names = Vec::new();
/// let mut parser = StreamParser::new(|event: StreamEvent| {
///     if let StreamEvent::ElementStart { name, .. } = event {
///         names.push(name);
///     }
///     Flow::Continue
/// });
/// parser.parse_str("<a><b/></a>").unwrap();
/// drop(parser);
/// assert_eq!(names, vec!["a", "b"]);
/// ```
pub trait EventHandler {
    fn handle_event(&mut self, event: StreamEvent) -> Flow;
}

impl<F> EventHandler for F
where
    F: FnMut(StreamEvent) -> Flow,
{
    fn handle_event(&mut self, event: StreamEvent) -> Flow {
        self(event)
    }
}

/// Handler that stores every event it receives
///
/// Useful in tests and for small documents where random access to the
/// event stream is more convenient than reacting on the fly.
#[derive(Debug, Default)]
pub struct EventCollector {
    events: Vec<StreamEvent>,
}

impl EventCollector {
    pub fn new() -> Self {
        EventCollector { events: Vec::new() }
    }

    /// Events collected so far, in delivery order
    pub fn events(&self) -> &[StreamEvent] {
        &self.events
    }

    /// Consumes the collector, returning the events
    pub fn into_events(self) -> Vec<StreamEvent> {
        self.events
    }

    /// Drains the collected events, leaving the collector empty
    pub fn take_events(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

impl EventHandler for EventCollector {
    fn handle_event(&mut self, event: StreamEvent) -> Flow {
        self.events.push(event);
        Flow::Continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collector_stores_in_order() {
        let mut collector = EventCollector::new();
        assert!(collector.is_empty());

        collector.handle_event(StreamEvent::DocumentStart);
        collector.handle_event(StreamEvent::Characters(String::from("x")));
        collector.handle_event(StreamEvent::DocumentEnd);

        assert_eq!(collector.len(), 3);
        assert_eq!(collector.events()[0], StreamEvent::DocumentStart);
        assert_eq!(collector.events()[2], StreamEvent::DocumentEnd);

        let events = collector.take_events();
        assert_eq!(events.len(), 3);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_closures_are_handlers() {
        let mut seen = 0usize;
        let mut handler = |_event: StreamEvent| {
            seen += 1;
            Flow::Continue
        };
        assert_eq!(handler.handle_event(StreamEvent::DocumentStart), Flow::Continue);
        drop(handler);
        assert_eq!(seen, 1);
    }
}
