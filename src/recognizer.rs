//! Recognizer lifecycle.
//!
//! A [`Recognizer`] owns the grammars of one engine, the engine state and the
//! listeners. It decides when grammar edits take effect (commit), which
//! grammars are active, and turns hypotheses from an upstream recognizer into
//! results.
//!
//! ```text
//!            allocate                       deallocate
//! DEALLOCATED ──> ALLOCATING ──> ALLOCATED ──> DEALLOCATING ──> DEALLOCATED
//!                                   │
//!          suspend / commit         │        process_utterance
//!   LISTENING <──────────> SUSPENDED    LISTENING ──> PROCESSING ──> LISTENING
//!   FOCUS_ON <── request_focus / release_focus ──> FOCUS_OFF
//! ```
//!
//! ## Locking
//!
//! Two locks, always taken in this order: the engine state (`Mutex` plus a
//! `Condvar` for [`Recognizer::wait_engine_state`]) and the grammar registry
//! (`RwLock`). Every state change is a table-checked [`Transition`] applied
//! under the state lock. Events produced while the locks are held are
//! enqueued before the state lock is released, which fixes their order, and
//! delivered after both locks are released, so listeners may call back into
//! the recognizer.
//!
//! ## Commit
//!
//! Linking and simplification run first; if either fails the commit changes
//! nothing (no activation flips, no hooks) and reports the error both to the
//! caller and on the `ChangesCommitted` event. Commit while an utterance is
//! being processed is an `IllegalState` error.

#[path = "recognizer/dispatch.rs"]
mod dispatch;
#[path = "recognizer/events.rs"]
mod events;
#[path = "recognizer/result.rs"]
mod result;
#[path = "recognizer/state.rs"]
mod state;

pub use events::{
    EngineEvent, EngineEventKind, Event, GrammarEvent, GrammarEventKind, Listener, ListenerId, ResultEvent,
    ResultEventKind, Scope, SourceId,
};
pub use result::{Hypothesis, RecognitionResult, ResultId, ResultState};
pub use state::{EngineState, Transition, TransitionRule};

use crate::Rule;
use crate::config::RecognizerConfig;
use crate::engine::{CrossReferenceIndex, RuleMatcher, RuleParse, link_grammar, simplify_with, warn_once};
use crate::error::{GrammarError, RecognizerError, RecognizerResult};
use crate::grammar::{ActivationMode, Grammar};
use crate::snapshot;
use crate::source::{JsonSourceParser, SourceLoader, SourceParser};
use crate::store::GrammarStore;
use dispatch::EventDispatcher;
use std::io::{Read, Write};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Extension points called while committing, in this order:
/// `start_grammar_changes`, one `change_rule` per changed rule,
/// `end_grammar_changes` (the three only when something changed), then
/// `change_enabled` with every enabled rule (`gram.rule`).
///
/// Hooks run with the recognizer locks held and must not call back into it.
pub trait RecognizerHooks: Send + Sync {
    fn start_grammar_changes(&self) {}

    /// `rule` is `None` for a deleted rule.
    fn change_rule(&self, _grammar: &str, _rule_name: &str, _rule: Option<&Rule>, _public: bool) {}

    fn end_grammar_changes(&self) {}

    fn change_enabled(&self, _enabled: &[String]) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoHooks;

impl RecognizerHooks for NoHooks {}

struct Registry {
    store: GrammarStore,
    /// An enabled RecognizerModal grammar exists (as of the last commit).
    has_modal: bool,
}

/// One recognition engine: its state, grammars and listeners.
pub struct Recognizer {
    config: RecognizerConfig,
    state: Mutex<EngineState>,
    state_changed: Condvar,
    registry: RwLock<Registry>,
    dispatcher: EventDispatcher,
    hooks: Box<dyn RecognizerHooks>,
    loader: Option<SourceLoader>,
    next_result_id: AtomicU64,
}

impl Recognizer {
    pub fn new(config: RecognizerConfig) -> Self {
        Self::with_hooks(config, NoHooks)
    }

    pub fn with_hooks(config: RecognizerConfig, hooks: impl RecognizerHooks + 'static) -> Self {
        let store = GrammarStore::new(config.case_sensitive_grammar_names);
        Self {
            dispatcher: EventDispatcher::new(config.delivery, config.case_sensitive_grammar_names),
            config,
            state: Mutex::new(EngineState::DEALLOCATED),
            state_changed: Condvar::new(),
            registry: RwLock::new(Registry { store, has_modal: false }),
            hooks: Box::new(hooks),
            loader: None,
            next_result_id: AtomicU64::new(1),
        }
    }

    /// Source loader used by [`load_grammar`](Self::load_grammar) and for imports.
    pub fn with_source_loader(mut self, loader: SourceLoader) -> Self {
        self.loader = Some(loader);
        self
    }

    pub fn config(&self) -> &RecognizerConfig {
        &self.config
    }

    // --- Engine state ---------------------------------------------------------

    pub fn engine_state(&self) -> EngineState {
        *self.lock_state()
    }

    /// True when every flag of `flags` is set.
    pub fn test_engine_state(&self, flags: EngineState) -> bool {
        self.lock_state().test(flags)
    }

    /// Block until every flag of `flags` is set.
    pub fn wait_engine_state(&self, flags: EngineState) {
        let guard = self.lock_state();
        let _guard = self
            .state_changed
            .wait_while(guard, |state| !state.test(flags))
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Like [`wait_engine_state`](Self::wait_engine_state) with a deadline.
    /// Returns false on timeout.
    pub fn wait_engine_state_timeout(&self, flags: EngineState, timeout: Duration) -> bool {
        let guard = self.lock_state();
        let (_guard, result) = self
            .state_changed
            .wait_timeout_while(guard, timeout, |state| !state.test(flags))
            .unwrap_or_else(PoisonError::into_inner);
        !result.timed_out()
    }

    pub fn allocate(&self) -> RecognizerResult<()> {
        {
            let mut state = self.lock_state();
            if state.test(EngineState::ALLOCATED) {
                return Ok(());
            }
            let mut events: Vec<Event> = Vec::new();
            let (old, new) = self.apply(&mut state, Transition::BeginAllocation, "allocate")?;
            events.push(EngineEvent::new(EngineEventKind::AllocatingResources, old, new).into());
            let (old, new) = self.apply(&mut state, Transition::CompleteAllocation, "allocate")?;
            events.push(EngineEvent::new(EngineEventKind::Allocated, old, new).into());
            recompute_activation(&mut self.write_registry(), new, &mut events);
            self.dispatcher.enqueue(events);
        }
        self.dispatcher.dispatch();
        Ok(())
    }

    /// Release focus if held, then free every grammar.
    pub fn deallocate(&self) -> RecognizerResult<()> {
        {
            let mut state = self.lock_state();
            if state.test(EngineState::DEALLOCATED) {
                return Ok(());
            }
            let mut events: Vec<Event> = Vec::new();
            if state.test(EngineState::FOCUS_ON) {
                let (old, new) = self.apply(&mut state, Transition::LoseFocus, "deallocate")?;
                events.push(EngineEvent::new(EngineEventKind::FocusLost, old, new).into());
                recompute_activation(&mut self.write_registry(), new, &mut events);
            }
            let (old, new) = self.apply(&mut state, Transition::BeginDeallocation, "deallocate")?;
            events.push(EngineEvent::new(EngineEventKind::DeallocatingResources, old, new).into());
            {
                let mut registry = self.write_registry();
                registry.store.clear();
                registry.has_modal = false;
            }
            let (old, new) = self.apply(&mut state, Transition::CompleteDeallocation, "deallocate")?;
            events.push(EngineEvent::new(EngineEventKind::Deallocated, old, new).into());
            self.dispatcher.enqueue(events);
        }
        self.dispatcher.dispatch();
        Ok(())
    }

    pub fn pause(&self) -> RecognizerResult<()> {
        self.simple_transition("pause", EngineState::PAUSED, Transition::Pause, EngineEventKind::Paused)
    }

    pub fn resume(&self) -> RecognizerResult<()> {
        self.simple_transition("resume", EngineState::RESUMED, Transition::Resume, EngineEventKind::Resumed)
    }

    /// Stop listening until the next commit.
    pub fn suspend(&self) -> RecognizerResult<()> {
        self.simple_transition("suspend", EngineState::SUSPENDED, Transition::Suspend, EngineEventKind::Suspended)
    }

    pub fn request_focus(&self) -> RecognizerResult<()> {
        self.focus_transition("request_focus", EngineState::FOCUS_ON, Transition::GainFocus, EngineEventKind::FocusGained)
    }

    pub fn release_focus(&self) -> RecognizerResult<()> {
        self.focus_transition("release_focus", EngineState::FOCUS_OFF, Transition::LoseFocus, EngineEventKind::FocusLost)
    }

    /// Apply pending grammar edits. See the module docs for the protocol.
    pub fn commit_changes(&self) -> RecognizerResult<()> {
        let outcome = {
            let mut state = self.lock_state();
            self.check_allocated("commit_changes", *state)?;
            if state.test(EngineState::PROCESSING) {
                return Err(RecognizerError::illegal_state("commit_changes", *state));
            }
            let before = *state;
            let mut events: Vec<Event> = Vec::new();
            if state.test(EngineState::LISTENING) {
                let (old, new) = self.apply(&mut state, Transition::Suspend, "commit_changes")?;
                events.push(EngineEvent::new(EngineEventKind::Suspended, old, new).into());
            }

            let outcome = {
                let mut registry = self.write_registry();
                self.commit_locked(&mut registry, *state, &mut events)
            };

            let (_, after) = self.apply(&mut state, Transition::Listen, "commit_changes")?;
            let mut committed = EngineEvent::new(EngineEventKind::ChangesCommitted, before, after);
            if let Err(err) = &outcome {
                log::warn!("[recognizer] commit failed: {}", err);
                committed = committed.with_error(err);
            }
            events.push(committed.into());
            self.dispatcher.enqueue(events);
            outcome
        };
        self.dispatcher.dispatch();
        outcome.map_err(RecognizerError::from)
    }

    fn commit_locked(
        &self,
        registry: &mut Registry,
        state: EngineState,
        events: &mut Vec<Event>,
    ) -> Result<(), GrammarError> {
        let grammars = registry.store.list_all();
        for grammar in &grammars {
            link_grammar(grammar, &registry.store)?;
        }
        let view = if self.config.needs_simplification() {
            simplify_with(
                &grammars,
                self.config.case_sensitive_grammar_names,
                !self.config.supports_null,
                !self.config.supports_void,
            )?
        } else {
            grammars
        };

        registry.has_modal =
            registry.store.list_all().iter().any(|g| g.is_enabled() && g.activation_mode() == ActivationMode::RecognizerModal);
        recompute_activation(registry, state, events);

        let changed: Vec<&Arc<Grammar>> = view.iter().filter(|g| g.changed()).collect();
        if !changed.is_empty() {
            self.hooks.start_grammar_changes();
            for grammar in &changed {
                if self.config.reload_all {
                    for (name, entry) in grammar.rules() {
                        self.hooks.change_rule(grammar.name(), name, Some(&entry.rule), entry.public);
                    }
                } else {
                    for (name, entry) in grammar.changed_rules() {
                        self.hooks.change_rule(
                            grammar.name(),
                            name,
                            entry.map(|e| &e.rule),
                            entry.is_some_and(|e| e.public),
                        );
                    }
                }
            }
            self.hooks.end_grammar_changes();
        }
        let enabled: Vec<String> = view.iter().flat_map(|g| g.enabled_rule_names()).collect();
        self.hooks.change_enabled(&enabled);

        for grammar in registry.store.iter_mut() {
            if grammar.changed() {
                let grammar = Arc::make_mut(grammar);
                grammar.mark_committed();
                log::debug!("[recognizer] committed grammar {} at generation {}", grammar.name(), grammar.generation());
                events.push(GrammarEvent::new(grammar.name(), GrammarEventKind::ChangesCommitted).into());
            }
        }
        Ok(())
    }

    // --- Grammars -------------------------------------------------------------

    /// Create an empty grammar.
    pub fn new_grammar(&self, name: &str) -> RecognizerResult<Arc<Grammar>> {
        self.check_allocated_now("new_grammar")?;
        let mut registry = self.write_registry();
        if registry.store.contains(name) {
            return Err(RecognizerError::DuplicateGrammar(name.to_string()));
        }
        let grammar = Arc::new(Grammar::new(name));
        registry.store.store(name, grammar.clone());
        Ok(grammar)
    }

    /// Add a grammar built elsewhere, replacing one of the same name.
    pub fn store_grammar(&self, grammar: Grammar) -> RecognizerResult<()> {
        self.check_allocated_now("store_grammar")?;
        let name = grammar.name().to_string();
        self.write_registry().store.store(&name, grammar);
        Ok(())
    }

    /// Edit a stored grammar. Edits take effect at the next commit.
    pub fn edit_grammar<R>(&self, name: &str, edit: impl FnOnce(&mut Grammar) -> R) -> RecognizerResult<R> {
        self.check_allocated_now("edit_grammar")?;
        let mut registry = self.write_registry();
        let grammar = registry.store.retrieve_mut(name).ok_or_else(|| RecognizerError::UnknownGrammar(name.to_string()))?;
        Ok(edit(grammar))
    }

    pub fn grammar(&self, name: &str) -> Option<Arc<Grammar>> {
        self.read_registry().store.retrieve(name).cloned()
    }

    /// Remove a grammar and its listeners.
    pub fn delete_grammar(&self, name: &str) -> RecognizerResult<()> {
        self.check_allocated_now("delete_grammar")?;
        let removed = self.write_registry().store.delete(name);
        let grammar = removed.ok_or_else(|| RecognizerError::UnknownGrammar(name.to_string()))?;
        self.dispatcher.unsubscribe_scope(&Scope::Grammar(grammar.name().to_string()));
        Ok(())
    }

    pub fn list_grammars(&self) -> Vec<Arc<Grammar>> {
        self.read_registry().store.list_all()
    }

    /// Activation as of the last commit or focus change.
    pub fn is_active(&self, name: &str) -> bool {
        self.read_registry().store.retrieve(name).is_some_and(|g| g.is_active())
    }

    /// Load `name` through the source loader, then every grammar it imports
    /// that is not loaded yet.
    pub fn load_grammar(&self, name: &str) -> RecognizerResult<Arc<Grammar>> {
        self.check_allocated_now("load_grammar")?;
        let loader = self.source_loader(name)?;
        let grammar = Arc::new(loader.load(name)?);
        let mut registry = self.write_registry();
        registry.store.store(name, grammar.clone());
        registry.store.load_imports(name, loader, true, false, None)?;
        Ok(grammar)
    }

    /// Parse a grammar source from `reader` and store it; imports are loaded
    /// through the source loader when one is configured.
    pub fn load_grammar_from(&self, source_name: &str, reader: &mut dyn Read) -> RecognizerResult<Arc<Grammar>> {
        self.check_allocated_now("load_grammar_from")?;
        let grammar = match &self.loader {
            Some(loader) => loader.parse_reader(source_name, reader)?,
            None => Grammar::from_parsed(JsonSourceParser.parse_source(source_name, reader)?),
        };
        let grammar = Arc::new(grammar);
        let name = grammar.name().to_string();
        let mut registry = self.write_registry();
        registry.store.store(&name, grammar.clone());
        if let Some(loader) = &self.loader {
            registry.store.load_imports(&name, loader, true, false, None)?;
        }
        Ok(grammar)
    }

    /// Load the missing imports of every stored grammar.
    pub fn load_all_imports(&self) -> RecognizerResult<()> {
        self.check_allocated_now("load_all_imports")?;
        let loader = self.source_loader("imports")?;
        let mut registry = self.write_registry();
        let names: Vec<String> = registry.store.names().into_iter().map(str::to_string).collect();
        for name in names {
            registry.store.load_imports(&name, loader, false, false, None)?;
        }
        Ok(())
    }

    pub fn cross_reference_index(&self) -> CrossReferenceIndex {
        self.read_registry().store.build_cross_reference_index()
    }

    // --- Matching and results -------------------------------------------------

    /// Every full parse of `tokens` by `grammar` (one rule, or every enabled
    /// public rule). Rule references are resolved against all stored grammars.
    pub fn mparse(&self, tokens: &[String], grammar: &str, rule: Option<&str>) -> RecognizerResult<Vec<RuleParse>> {
        let registry = self.read_registry();
        let target = registry.store.retrieve(grammar).ok_or_else(|| RecognizerError::UnknownGrammar(grammar.to_string()))?;
        Ok(RuleMatcher::new(&registry.store).mparse(tokens, target, rule)?)
    }

    /// First full parse by a public rule.
    pub fn parse(&self, tokens: &[String], grammar: &str, rule: Option<&str>) -> RecognizerResult<Option<RuleParse>> {
        let registry = self.read_registry();
        let target = registry.store.retrieve(grammar).ok_or_else(|| RecognizerError::UnknownGrammar(grammar.to_string()))?;
        Ok(RuleMatcher::new(&registry.store).parse(tokens, target, rule)?)
    }

    /// Interpret one utterance against the active grammars.
    ///
    /// The engine goes Listening -> Processing -> Listening around it. The
    /// result is accepted by the first active grammar (in name order) with a
    /// full parse and rejected otherwise; it is never an error not to match.
    pub fn process_utterance(&self, hypothesis: Hypothesis) -> RecognizerResult<Arc<RecognitionResult>> {
        {
            let mut state = self.lock_state();
            self.check_allocated("process_utterance", *state)?;
            if !state.test(EngineState::LISTENING) {
                return Err(RecognizerError::illegal_state("process_utterance", *state));
            }
            let (old, new) = self.apply(&mut state, Transition::StartProcessing, "process_utterance")?;
            self.dispatcher.enqueue([Event::Engine(EngineEvent::new(EngineEventKind::Processing, old, new))]);
        }
        self.dispatcher.dispatch();

        let mut events: Vec<Event> = Vec::new();
        let result = match hypothesis {
            Hypothesis::Words(tokens) => {
                let parse = self.interpret(&tokens);
                self.finish_result(tokens, None, parse, &mut events)
            }
            Hypothesis::Reject => self.finish_result(Vec::new(), None, None, &mut events),
        };

        {
            let mut state = self.lock_state();
            // A suspend() issued meanwhile wins.
            if state.test(EngineState::PROCESSING) {
                let (old, new) = self.apply(&mut state, Transition::Listen, "process_utterance")?;
                events.push(EngineEvent::new(EngineEventKind::Listening, old, new).into());
            }
            self.dispatcher.enqueue(events);
        }
        self.dispatcher.dispatch();
        result
    }

    /// Post a result for `words`, finalized against `grammar` when given
    /// (accepted if that grammar parses the words) or against the active
    /// grammars otherwise. The engine state is left alone.
    pub fn notify_result(&self, grammar: Option<&str>, words: &[String]) -> RecognizerResult<Arc<RecognitionResult>> {
        let parse = match grammar {
            Some(name) => {
                let registry = self.read_registry();
                let target =
                    registry.store.retrieve(name).ok_or_else(|| RecognizerError::UnknownGrammar(name.to_string()))?;
                match RuleMatcher::new(&registry.store).parse(words, target, None) {
                    Ok(parse) => parse,
                    Err(err) => {
                        warn_once(err.to_string());
                        None
                    }
                }
            }
            None => self.interpret(words),
        };
        let mut events: Vec<Event> = Vec::new();
        let result = self.finish_result(words.to_vec(), grammar.map(str::to_string), parse, &mut events);
        self.dispatcher.post_all(events);
        result
    }

    /// Post an empty, rejected result.
    pub fn reject_utterance(&self) -> RecognizerResult<Arc<RecognitionResult>> {
        let mut events: Vec<Event> = Vec::new();
        let result = self.finish_result(Vec::new(), None, None, &mut events);
        self.dispatcher.post_all(events);
        result
    }

    fn interpret(&self, tokens: &[String]) -> Option<RuleParse> {
        let registry = self.read_registry();
        let matcher = RuleMatcher::new(&registry.store);
        for grammar in registry.store.list_all().iter().filter(|g| g.is_active()) {
            match matcher.parse(tokens, grammar, None) {
                Ok(Some(parse)) => return Some(parse),
                Ok(None) => {}
                Err(err) => {
                    warn_once(err.to_string());
                }
            }
        }
        None
    }

    fn finish_result(
        &self,
        tokens: Vec<String>,
        finalized_by: Option<String>,
        parse: Option<RuleParse>,
        events: &mut Vec<Event>,
    ) -> RecognizerResult<Arc<RecognitionResult>> {
        let id = self.next_result_id.fetch_add(1, Ordering::Relaxed);
        let mut result = RecognitionResult::new(id, tokens);
        events.push(ResultEvent::new(ResultEventKind::Created, &result, ResultState::Unfinalized).into());

        if let Some(grammar) = parse.as_ref().map(|p| p.grammar.clone()).or(finalized_by) {
            result.set_grammar(&grammar, parse.as_ref());
            events.push(ResultEvent::new(ResultEventKind::GrammarFinalized, &result, ResultState::Unfinalized).into());
        }

        let accepted = parse.is_some();
        let old = result.finalize(accepted)?;
        let kind = if accepted { ResultEventKind::Accepted } else { ResultEventKind::Rejected };
        events.push(ResultEvent::new(kind, &result, old).into());
        log::debug!("[recognizer] result {} {:?}: '{}'", id, result.state(), result.text());
        Ok(Arc::new(result))
    }

    // --- Listeners ------------------------------------------------------------

    pub fn subscribe(&self, scope: Scope, listener: impl Listener + 'static) -> ListenerId {
        self.dispatcher.subscribe(scope, Arc::new(listener))
    }

    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        self.dispatcher.unsubscribe(id)
    }

    /// Wait until every event posted so far reached its listeners.
    pub fn flush_events(&self) {
        self.dispatcher.flush();
    }

    /// Events posted since construction.
    pub fn events_posted(&self) -> u64 {
        self.dispatcher.posted()
    }

    // --- Vendor snapshots -----------------------------------------------------

    pub fn write_vendor_grammar(&self, writer: &mut dyn Write, name: &str) -> RecognizerResult<()> {
        let grammar = self.grammar(name).ok_or_else(|| RecognizerError::UnknownGrammar(name.to_string()))?;
        snapshot::write_grammar(writer, &grammar)
    }

    /// Decode a grammar snapshot. The grammar is not stored.
    pub fn read_vendor_grammar(&self, reader: &mut dyn Read) -> RecognizerResult<Grammar> {
        snapshot::read_grammar(reader)
    }

    pub fn write_vendor_result(&self, writer: &mut dyn Write, result: &RecognitionResult) -> RecognizerResult<()> {
        snapshot::write_result(writer, result)
    }

    pub fn read_vendor_result(&self, reader: &mut dyn Read) -> RecognizerResult<RecognitionResult> {
        snapshot::read_result(reader)
    }

    // --- Internals ------------------------------------------------------------

    fn lock_state(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn read_registry(&self) -> RwLockReadGuard<'_, Registry> {
        self.registry.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_registry(&self) -> RwLockWriteGuard<'_, Registry> {
        self.registry.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn source_loader(&self, name: &str) -> RecognizerResult<&SourceLoader> {
        self.loader.as_ref().ok_or_else(|| GrammarError::source(name, "no source loader configured").into())
    }

    fn apply(
        &self,
        state: &mut MutexGuard<'_, EngineState>,
        transition: Transition,
        operation: &'static str,
    ) -> RecognizerResult<(EngineState, EngineState)> {
        let old = **state;
        let new = transition.apply(old).ok_or_else(|| RecognizerError::illegal_state(operation, old))?;
        **state = new;
        self.state_changed.notify_all();
        log::debug!("[recognizer] {:?}: {:?} -> {:?}", transition, old, new);
        Ok((old, new))
    }

    fn check_allocated(&self, operation: &'static str, state: EngineState) -> RecognizerResult<()> {
        if state.test(EngineState::ALLOCATED) {
            Ok(())
        } else {
            Err(RecognizerError::illegal_state(operation, state))
        }
    }

    fn check_allocated_now(&self, operation: &'static str) -> RecognizerResult<()> {
        let state = self.engine_state();
        self.check_allocated(operation, state)
    }

    fn simple_transition(
        &self,
        operation: &'static str,
        target: EngineState,
        transition: Transition,
        kind: EngineEventKind,
    ) -> RecognizerResult<()> {
        {
            let mut state = self.lock_state();
            self.check_allocated(operation, *state)?;
            if state.test(target) {
                return Ok(());
            }
            let (old, new) = self.apply(&mut state, transition, operation)?;
            self.dispatcher.enqueue([Event::Engine(EngineEvent::new(kind, old, new))]);
        }
        self.dispatcher.dispatch();
        Ok(())
    }

    fn focus_transition(
        &self,
        operation: &'static str,
        target: EngineState,
        transition: Transition,
        kind: EngineEventKind,
    ) -> RecognizerResult<()> {
        {
            let mut state = self.lock_state();
            self.check_allocated(operation, *state)?;
            if state.test(target) {
                return Ok(());
            }
            let (old, new) = self.apply(&mut state, transition, operation)?;
            let mut events = vec![Event::Engine(EngineEvent::new(kind, old, new))];
            recompute_activation(&mut self.write_registry(), new, &mut events);
            self.dispatcher.enqueue(events);
        }
        self.dispatcher.dispatch();
        Ok(())
    }
}

impl Default for Recognizer {
    fn default() -> Self {
        Self::new(RecognizerConfig::default())
    }
}

/// Whether `grammar` takes part in recognition.
fn grammar_is_active(grammar: &Grammar, focus: bool, has_modal: bool) -> bool {
    if !grammar.is_enabled() {
        return false;
    }
    match grammar.activation_mode() {
        ActivationMode::Global => true,
        ActivationMode::RecognizerModal => focus,
        ActivationMode::Local => focus && !has_modal,
    }
}

/// Recompute every grammar's activation, recording one event per flip.
fn recompute_activation(registry: &mut Registry, state: EngineState, events: &mut Vec<Event>) {
    let focus = state.test(EngineState::FOCUS_ON);
    let has_modal = registry.has_modal;
    for grammar in registry.store.iter_mut() {
        let active = grammar_is_active(grammar, focus, has_modal);
        if grammar.is_active() == active {
            continue;
        }
        let grammar = Arc::make_mut(grammar);
        grammar.set_active(active);
        let kind = if active { GrammarEventKind::Activated } else { GrammarEventKind::Deactivated };
        log::debug!("[recognizer] grammar {} {:?}", grammar.name(), kind);
        events.push(GrammarEvent::new(grammar.name(), kind).into());
    }
}
