//! Collection sources - asynchronous providers of ordered collections.
//!
//! The engine tracks exactly one active [`CollectionSource`] at a time and
//! consumes it through a plain observer callback: every emission is a full
//! snapshot wrapped in `Rc` so repeated emission of the identical reference
//! can be de-duplicated cheaply. Sources must support re-subscription, since
//! swapping sources on an engine unsubscribes and later source swaps may come
//! back.
//!
//! [`SharedSource`] is the bundled provider: it multicasts to any number of
//! observers and replays the latest emission to late subscribers.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::SourceTermination;

/// One notification from a collection source.
pub enum SourceEvent<T> {
    /// A new snapshot of the collection.
    Next(Rc<Vec<T>>),
    /// The source ended normally and will emit no further snapshots.
    Complete,
    /// The source ended with an error.
    Error(SourceTermination),
}

impl<T> Clone for SourceEvent<T> {
    fn clone(&self) -> Self {
        match self {
            Self::Next(items) => Self::Next(items.clone()),
            Self::Complete => Self::Complete,
            Self::Error(err) => Self::Error(err.clone()),
        }
    }
}

/// Observer callback registered with a source.
pub type SourceObserver<T> = Rc<dyn Fn(SourceEvent<T>)>;

/// An asynchronous provider of ordered collection snapshots.
pub trait CollectionSource<T> {
    /// Register `observer` for future (and possibly replayed) events.
    fn subscribe(&self, observer: SourceObserver<T>) -> Subscription;
}

/// Cancellation handle for one subscription. Cancels on drop.
pub struct Subscription {
    cancel: RefCell<Option<Box<dyn FnOnce()>>>,
}

impl Subscription {
    /// Wrap a cancellation callback.
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: RefCell::new(Some(Box::new(cancel))),
        }
    }

    /// A subscription with nothing to cancel.
    pub fn empty() -> Self {
        Self {
            cancel: RefCell::new(None),
        }
    }

    /// Cancel the subscription. Idempotent.
    pub fn unsubscribe(&self) {
        if let Some(cancel) = self.cancel.borrow_mut().take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Multicasting source that replays the latest snapshot to new subscribers.
pub struct SharedSource<T> {
    observers: Rc<RefCell<HashMap<u64, SourceObserver<T>>>>,
    next_id: Cell<u64>,
    latest: RefCell<Option<Rc<Vec<T>>>>,
    terminal: RefCell<Option<SourceEvent<T>>>,
}

impl<T: 'static> SharedSource<T> {
    /// Create a source with no emissions yet.
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            observers: Rc::new(RefCell::new(HashMap::new())),
            next_id: Cell::new(0),
            latest: RefCell::new(None),
            terminal: RefCell::new(None),
        })
    }

    /// Emit a snapshot to every observer and cache it for late subscribers.
    pub fn emit(&self, items: Rc<Vec<T>>) {
        if self.terminal.borrow().is_some() {
            tracing::warn!("emit on terminated source ignored");
            return;
        }
        self.latest.replace(Some(items.clone()));
        self.notify(SourceEvent::Next(items));
    }

    /// Emit a snapshot from a plain vec.
    pub fn emit_vec(&self, items: Vec<T>) {
        self.emit(Rc::new(items));
    }

    /// End the source normally.
    pub fn complete(&self) {
        if self.terminal.borrow().is_some() {
            return;
        }
        self.terminal.replace(Some(SourceEvent::Complete));
        self.notify(SourceEvent::Complete);
    }

    /// End the source with an error.
    pub fn fail(&self, error: SourceTermination) {
        if self.terminal.borrow().is_some() {
            return;
        }
        self.terminal.replace(Some(SourceEvent::Error(error.clone())));
        self.notify(SourceEvent::Error(error));
    }

    /// Number of currently registered observers.
    pub fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    fn notify(&self, event: SourceEvent<T>) {
        // Snapshot the observer list so callbacks can unsubscribe freely.
        let observers: Vec<SourceObserver<T>> =
            self.observers.borrow().values().cloned().collect();
        for observer in observers {
            observer(event.clone());
        }
    }
}

impl<T: 'static> CollectionSource<T> for SharedSource<T> {
    fn subscribe(&self, observer: SourceObserver<T>) -> Subscription {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.observers.borrow_mut().insert(id, observer.clone());

        // Replay the latest snapshot, then any terminal event.
        if let Some(items) = self.latest.borrow().clone() {
            observer(SourceEvent::Next(items));
        }
        if let Some(terminal) = self.terminal.borrow().clone() {
            observer(terminal);
        }

        let observers = self.observers.clone();
        Subscription::new(move || {
            observers.borrow_mut().remove(&id);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_events(source: &Rc<SharedSource<i32>>) -> (Rc<RefCell<Vec<String>>>, Subscription) {
        let log: Rc<RefCell<Vec<String>>> = Rc::new(RefCell::new(Vec::new()));
        let l = log.clone();
        let sub = source.subscribe(Rc::new(move |event| {
            let entry = match event {
                SourceEvent::Next(items) => format!("next:{:?}", items),
                SourceEvent::Complete => "complete".to_string(),
                SourceEvent::Error(err) => format!("error:{}", err.reason()),
            };
            l.borrow_mut().push(entry);
        }));
        (log, sub)
    }

    #[test]
    fn test_emit_reaches_observers() {
        let source = SharedSource::new();
        let (log, _sub) = collect_events(&source);
        source.emit_vec(vec![1, 2]);
        assert_eq!(log.borrow().as_slice(), ["next:[1, 2]"]);
    }

    #[test]
    fn test_late_subscriber_gets_latest() {
        let source = SharedSource::new();
        source.emit_vec(vec![1]);
        source.emit_vec(vec![1, 2]);
        let (log, _sub) = collect_events(&source);
        assert_eq!(
            log.borrow().as_slice(),
            ["next:[1, 2]"],
            "only the latest snapshot is replayed"
        );
    }

    #[test]
    fn test_unsubscribe_stops_events() {
        let source = SharedSource::new();
        let (log, sub) = collect_events(&source);
        sub.unsubscribe();
        source.emit_vec(vec![1]);
        assert!(log.borrow().is_empty());
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let source = SharedSource::new();
        {
            let (_log, _sub) = collect_events(&source);
            assert_eq!(source.observer_count(), 1);
        }
        assert_eq!(source.observer_count(), 0);
    }

    #[test]
    fn test_failure_is_terminal() {
        let source = SharedSource::new();
        let (log, _sub) = collect_events(&source);
        source.fail(SourceTermination::new("boom"));
        source.emit_vec(vec![1]);
        assert_eq!(log.borrow().as_slice(), ["error:boom"]);

        // terminal event replays to late subscribers
        let (late, _sub2) = collect_events(&source);
        assert_eq!(late.borrow().as_slice(), ["error:boom"]);
    }

    #[test]
    fn test_resubscription_after_unsubscribe() {
        let source = SharedSource::new();
        let (_, sub) = collect_events(&source);
        sub.unsubscribe();
        source.emit_vec(vec![7]);
        let (log, _sub) = collect_events(&source);
        assert_eq!(log.borrow().as_slice(), ["next:[7]"]);
    }
}
