//! Event dispatch.
//!
//! Posting never touches the listener list while it can change under a running
//! callback: each dispatch takes a snapshot of the matching subscriptions
//! (cloned `Arc`s) under a read lock, releases the lock and only then calls
//! the listeners. A listener may therefore subscribe or unsubscribe from inside
//! its callback; the change applies from the next event on.
//!
//! Posting is split in two. [`EventDispatcher::enqueue`] fixes the order and is
//! called while the recognizer still holds its state lock, so events leave in
//! the order their transitions happened. [`EventDispatcher::dispatch`] runs the
//! listeners and is called once the locks are released.
//!
//! With [`Delivery::Inline`] enqueued events wait in a FIFO that one thread at a
//! time drains. A thread that finds another one draining leaves its events to
//! it, and a listener that posts from inside its callback has its events
//! delivered right after the current one.
//!
//! With [`Delivery::Queued`] enqueueing is the send on an unbounded crossbeam
//! channel to one delivery thread. One channel and one consumer keep events in
//! posting order. Nothing is ever dropped; [`EventDispatcher::flush`] waits
//! until everything posted before it was delivered.

use super::events::{Event, Listener, ListenerId, Scope};
use crate::config::Delivery;
use crossbeam_channel::{Sender, unbounded};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle, ThreadId};

struct Subscription {
    id: ListenerId,
    scope: Scope,
    listener: Arc<dyn Listener>,
}

type Subscriptions = Arc<RwLock<Vec<Subscription>>>;

enum Message {
    Deliver(Event),
    Flush(Sender<()>),
}

struct Worker {
    sender: Option<Sender<Message>>,
    handle: Option<JoinHandle<()>>,
    thread: ThreadId,
}

#[derive(Default)]
struct Pending {
    events: VecDeque<Event>,
    /// Thread currently delivering `events`.
    drainer: Option<ThreadId>,
}

pub(crate) struct EventDispatcher {
    subscriptions: Subscriptions,
    case_sensitive: bool,
    next_id: AtomicU64,
    posted: AtomicU64,
    pending: Mutex<Pending>,
    drained: Condvar,
    worker: Option<Worker>,
}

impl EventDispatcher {
    pub(crate) fn new(delivery: Delivery, case_sensitive: bool) -> Self {
        let subscriptions: Subscriptions = Arc::new(RwLock::new(Vec::new()));
        let worker = match delivery {
            Delivery::Inline => None,
            Delivery::Queued => Some(spawn_worker(subscriptions.clone(), case_sensitive)),
        };
        Self {
            subscriptions,
            case_sensitive,
            next_id: AtomicU64::new(1),
            posted: AtomicU64::new(0),
            pending: Mutex::new(Pending::default()),
            drained: Condvar::new(),
            worker,
        }
    }

    pub(crate) fn subscribe(&self, scope: Scope, listener: Arc<dyn Listener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.subscriptions.write().unwrap_or_else(PoisonError::into_inner).push(Subscription { id, scope, listener });
        id
    }

    pub(crate) fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut subscriptions = self.subscriptions.write().unwrap_or_else(PoisonError::into_inner);
        let before = subscriptions.len();
        subscriptions.retain(|s| s.id != id);
        subscriptions.len() != before
    }

    /// Drop every subscription attached to `scope`.
    pub(crate) fn unsubscribe_scope(&self, scope: &Scope) {
        self.subscriptions.write().unwrap_or_else(PoisonError::into_inner).retain(|s| &s.scope != scope);
    }

    /// Fix the delivery order of `events` without calling any listener. Never
    /// blocks on a listener, so it may run under the caller's locks.
    pub(crate) fn enqueue(&self, events: impl IntoIterator<Item = Event>) {
        let sender = self.worker.as_ref().and_then(|w| w.sender.as_ref());
        let mut pending = self.lock_pending();
        for event in events {
            self.posted.fetch_add(1, Ordering::Relaxed);
            let Some(sender) = sender else {
                pending.events.push_back(event);
                continue;
            };
            if let Err(err) = sender.send(Message::Deliver(event)) {
                log::warn!("[events] delivery thread gone, delivering inline");
                if let Message::Deliver(event) = err.into_inner() {
                    pending.events.push_back(event);
                }
            }
        }
    }

    /// Deliver what was enqueued inline, unless another thread (or an outer
    /// call on this one) is already doing so.
    pub(crate) fn dispatch(&self) {
        let me = thread::current().id();
        {
            let mut pending = self.lock_pending();
            if pending.drainer.is_some() || pending.events.is_empty() {
                return;
            }
            pending.drainer = Some(me);
        }
        let _release = DrainGuard { dispatcher: self, thread: me };
        loop {
            let event = {
                let mut pending = self.lock_pending();
                match pending.events.pop_front() {
                    Some(event) => event,
                    None => {
                        pending.drainer = None;
                        self.drained.notify_all();
                        return;
                    }
                }
            };
            deliver(&self.subscriptions, self.case_sensitive, &event);
        }
    }

    pub(crate) fn post(&self, event: Event) {
        self.post_all([event]);
    }

    pub(crate) fn post_all(&self, events: impl IntoIterator<Item = Event>) {
        self.enqueue(events);
        self.dispatch();
    }

    /// Block until every event posted so far was delivered. Returns at once
    /// when called from a listener.
    pub(crate) fn flush(&self) {
        self.dispatch();
        let me = thread::current().id();
        {
            let pending = self.lock_pending();
            let _pending = self
                .drained
                .wait_while(pending, |p| p.drainer.is_some_and(|id| id != me))
                .unwrap_or_else(PoisonError::into_inner);
        }

        let Some(worker) = &self.worker else {
            return;
        };
        if thread::current().id() == worker.thread {
            return;
        }
        let Some(sender) = &worker.sender else {
            return;
        };
        let (ack, done) = crossbeam_channel::bounded(1);
        if sender.send(Message::Flush(ack)).is_ok() {
            let _ = done.recv();
        }
    }

    pub(crate) fn posted(&self) -> u64 {
        self.posted.load(Ordering::Relaxed)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Pending> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Hands the inline queue back if a listener panics mid-drain.
struct DrainGuard<'a> {
    dispatcher: &'a EventDispatcher,
    thread: ThreadId,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        let mut pending = self.dispatcher.lock_pending();
        if pending.drainer == Some(self.thread) {
            pending.drainer = None;
            self.dispatcher.drained.notify_all();
        }
    }
}

impl Drop for EventDispatcher {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.as_mut() {
            // Closing the channel lets the thread drain what is left and exit.
            worker.sender.take();
            if let Some(handle) = worker.handle.take() {
                if handle.thread().id() != thread::current().id() {
                    let _ = handle.join();
                }
            }
        }
    }
}

fn spawn_worker(subscriptions: Subscriptions, case_sensitive: bool) -> Worker {
    let (sender, receiver) = unbounded::<Message>();
    let handle = thread::Builder::new()
        .name("rulegram-events".to_string())
        .spawn(move || {
            for message in receiver {
                match message {
                    Message::Deliver(event) => deliver(&subscriptions, case_sensitive, &event),
                    Message::Flush(ack) => {
                        let _ = ack.send(());
                    }
                }
            }
            log::debug!("[events] delivery thread stopped");
        });
    match handle {
        Ok(handle) => Worker { thread: handle.thread().id(), sender: Some(sender), handle: Some(handle) },
        Err(err) => {
            log::warn!("[events] cannot start delivery thread ({}), delivering inline", err);
            Worker { sender: None, handle: None, thread: thread::current().id() }
        }
    }
}

/// Call the listeners interested in `event`, most specific scope first.
fn deliver(subscriptions: &Subscriptions, case_sensitive: bool, event: &Event) {
    let same_grammar = |a: &str, b: &str| if case_sensitive { a == b } else { a.eq_ignore_ascii_case(b) };
    let rank = |scope: &Scope| -> Option<u8> {
        match (scope, event) {
            (Scope::Result(id), Event::Result(e)) if *id == e.result.id() => Some(0),
            (Scope::Grammar(name), Event::Result(e)) if e.result.grammar().is_some_and(|g| same_grammar(g, name)) => {
                Some(1)
            }
            (Scope::Grammar(name), Event::Grammar(e)) if same_grammar(&e.grammar, name) => Some(1),
            (Scope::Recognizer, _) => Some(2),
            _ => None,
        }
    };

    let mut targets: Vec<(u8, Arc<dyn Listener>)> = {
        let subscriptions = subscriptions.read().unwrap_or_else(PoisonError::into_inner);
        subscriptions.iter().filter_map(|s| rank(&s.scope).map(|r| (r, s.listener.clone()))).collect()
    };
    // Stable: subscription order is kept within a rank.
    targets.sort_by_key(|(rank, _)| *rank);

    for (_, listener) in targets {
        listener.on_event(event);
    }
}
