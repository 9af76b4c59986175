//! Progress events and per-run observer fan-out
//!
//! Every step reports through a [`Reporter`] owned by the run that created
//! it. Sinks are registered up front and the reporter is passed down to
//! each stage, so two concurrent runs never share observers.
//!
//! Delivery: events are dispatched synchronously, in the order the work
//! happens. Sinks may ignore `ShortMessage` (it duplicates a `LongMessage`
//! in compact form); `Started`, `Ended` and `ErrorMessage` are delivered to
//! every sink.

use std::fmt;
use std::sync::Arc;

/// One progress event emitted by a build step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A step began. Carries the step's human-readable name.
    Started(String),
    /// Compact progress text for constrained displays.
    ShortMessage(String),
    /// Full log line.
    LongMessage(String),
    /// A failure diagnostic.
    ErrorMessage(String),
    /// A step finished (successfully or not). Carries the step's name.
    Ended(String),
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Event::Started(name) => write!(f, "> {name}"),
            Event::ShortMessage(text) => write!(f, "{text}"),
            Event::LongMessage(text) => write!(f, "{text}"),
            Event::ErrorMessage(text) => write!(f, "error: {text}"),
            Event::Ended(name) => write!(f, "> {name} done"),
        }
    }
}

/// Receiver of progress events. Implementations must tolerate being
/// called from whichever thread drives the run.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: &Event);
}

/// Per-run event broadcaster handed down to every step.
///
/// Cheap to clone; all clones share the same sink list.
#[derive(Clone)]
pub struct Reporter {
    sinks: Arc<[Arc<dyn EventSink>]>,
}

impl Reporter {
    pub fn new(sinks: Vec<Arc<dyn EventSink>>) -> Self {
        Self {
            sinks: sinks.into(),
        }
    }

    /// Reporter with no sinks; events are dropped.
    pub fn discard() -> Self {
        Self::new(Vec::new())
    }

    pub fn emit(&self, event: Event) {
        for sink in self.sinks.iter() {
            sink.emit(&event);
        }
    }

    pub fn started(&self, step: &str) {
        self.emit(Event::Started(step.to_string()));
    }

    pub fn ended(&self, step: &str) {
        self.emit(Event::Ended(step.to_string()));
    }

    pub fn short(&self, text: impl Into<String>) {
        self.emit(Event::ShortMessage(text.into()));
    }

    pub fn long(&self, text: impl Into<String>) {
        self.emit(Event::LongMessage(text.into()));
    }

    /// Emit the same text as both a short and a long message, for status
    /// lines that matter on every display.
    pub fn message(&self, text: &str) {
        self.short(text);
        self.long(text);
    }

    pub fn error(&self, text: impl Into<String>) {
        self.emit(Event::ErrorMessage(text.into()));
    }
}

impl Default for Reporter {
    fn default() -> Self {
        Self::discard()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use std::sync::Mutex;

    /// Sink that records every event, for assertions on ordering.
    #[derive(Default)]
    pub struct CollectingSink {
        events: Mutex<Vec<Event>>,
    }

    impl CollectingSink {
        pub fn events(&self) -> Vec<Event> {
            self.events.lock().unwrap().clone()
        }
    }

    impl EventSink for CollectingSink {
        fn emit(&self, event: &Event) {
            self.events.lock().unwrap().push(event.clone());
        }
    }
}
