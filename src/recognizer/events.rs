//! Events posted by the recognizer and the listener interface.
//!
//! Three families, one per kind of source:
//!
//! - [`EngineEvent`]: engine state transitions, source is the recognizer.
//! - [`GrammarEvent`]: activation flips and committed changes of one grammar.
//! - [`ResultEvent`]: the life of one [`RecognitionResult`].
//!
//! Every event records the engine (or result) state before and after the
//! transition that produced it.

use super::result::{RecognitionResult, ResultId, ResultState};
use super::state::EngineState;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineEventKind {
    AllocatingResources,
    Allocated,
    DeallocatingResources,
    Deallocated,
    Paused,
    Resumed,
    Suspended,
    Processing,
    Listening,
    ChangesCommitted,
    FocusGained,
    FocusLost,
}

#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub kind: EngineEventKind,
    pub old_state: EngineState,
    pub new_state: EngineState,
    /// Set on a `ChangesCommitted` whose commit failed.
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl EngineEvent {
    pub(crate) fn new(kind: EngineEventKind, old_state: EngineState, new_state: EngineState) -> Self {
        Self { kind, old_state, new_state, error: None, timestamp: Utc::now() }
    }

    pub(crate) fn with_error(mut self, error: impl ToString) -> Self {
        self.error = Some(error.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GrammarEventKind {
    Activated,
    Deactivated,
    ChangesCommitted,
}

#[derive(Debug, Clone)]
pub struct GrammarEvent {
    pub grammar: String,
    pub kind: GrammarEventKind,
    pub timestamp: DateTime<Utc>,
}

impl GrammarEvent {
    pub(crate) fn new(grammar: &str, kind: GrammarEventKind) -> Self {
        Self { grammar: grammar.to_string(), kind, timestamp: Utc::now() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultEventKind {
    Created,
    GrammarFinalized,
    Accepted,
    Rejected,
}

#[derive(Debug, Clone)]
pub struct ResultEvent {
    pub kind: ResultEventKind,
    /// The result as it was right after the transition.
    pub result: Arc<RecognitionResult>,
    pub old_state: ResultState,
    pub new_state: ResultState,
    pub timestamp: DateTime<Utc>,
}

impl ResultEvent {
    pub(crate) fn new(kind: ResultEventKind, result: &RecognitionResult, old_state: ResultState) -> Self {
        Self {
            kind,
            result: Arc::new(result.clone()),
            old_state,
            new_state: result.state(),
            timestamp: Utc::now(),
        }
    }
}

/// Who an event is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SourceId {
    Recognizer,
    Grammar(String),
    Result(ResultId),
}

#[derive(Debug, Clone)]
pub enum Event {
    Engine(EngineEvent),
    Grammar(GrammarEvent),
    Result(ResultEvent),
}

impl Event {
    pub fn source(&self) -> SourceId {
        match self {
            Event::Engine(_) => SourceId::Recognizer,
            Event::Grammar(e) => SourceId::Grammar(e.grammar.clone()),
            Event::Result(e) => SourceId::Result(e.result.id()),
        }
    }

    pub fn as_engine(&self) -> Option<&EngineEvent> {
        match self {
            Event::Engine(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_grammar(&self) -> Option<&GrammarEvent> {
        match self {
            Event::Grammar(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_result(&self) -> Option<&ResultEvent> {
        match self {
            Event::Result(e) => Some(e),
            _ => None,
        }
    }
}

impl From<EngineEvent> for Event {
    fn from(value: EngineEvent) -> Self {
        Event::Engine(value)
    }
}

impl From<GrammarEvent> for Event {
    fn from(value: GrammarEvent) -> Self {
        Event::Grammar(value)
    }
}

impl From<ResultEvent> for Event {
    fn from(value: ResultEvent) -> Self {
        Event::Result(value)
    }
}

/// Receives events. Closures taking `&Event` are listeners too.
///
/// Listeners must not block for long: with inline delivery they run on the
/// thread that triggered the event.
pub trait Listener: Send + Sync {
    fn on_event(&self, event: &Event);
}

impl<F> Listener for F
where
    F: Fn(&Event) + Send + Sync,
{
    fn on_event(&self, event: &Event) {
        self(event)
    }
}

/// What a listener is attached to.
///
/// A `Recognizer` listener hears every event; a `Grammar` listener hears that
/// grammar's events and the results finalized against it; a `Result` listener
/// hears one result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    Recognizer,
    Grammar(String),
    Result(ResultId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub(crate) u64);
