// ============================================================================
// spark-chain - Consumers
// Ready-made consumers: closure sinks and event recorders
// ============================================================================

use std::fmt;
use std::marker::PhantomData;

use crate::core::sync::{Lock, MaybeSend, MaybeSync, Shared};
use crate::core::types::Consumer;

// =============================================================================
// EVENT
// =============================================================================

/// One thing a consumer can observe through a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event<T, E> {
    Value(T),
    /// End of stream; `None` for graceful completion
    Terminated(Option<E>),
}

impl<T, E> Event<T, E> {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Event::Terminated(_))
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Event::Value(value) => Some(value),
            Event::Terminated(_) => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Event::Value(value) => Some(value),
            Event::Terminated(_) => None,
        }
    }
}

// =============================================================================
// FN CONSUMER
// =============================================================================

/// A consumer backed by a closure. See [`sink`].
///
/// The closure is `Fn` because consumers are shared: it may be re-entered
/// when handling one event causes another on a different connection. Events
/// on the same connection never overlap; the connection queues them. Keep
/// mutable state behind a lock.
pub struct FnConsumer<T, E, F> {
    handler: F,
    _event: PhantomData<fn(Event<T, E>)>,
}

impl<T, E, F> FnConsumer<T, E, F>
where
    F: Fn(Event<T, E>),
{
    pub fn new(handler: F) -> Self {
        Self {
            handler,
            _event: PhantomData,
        }
    }
}

impl<T, E, F> Consumer<T, E> for FnConsumer<T, E, F>
where
    T: 'static,
    E: 'static,
    F: Fn(Event<T, E>) + MaybeSend + MaybeSync + 'static,
{
    fn receive_value(&self, value: T) {
        (self.handler)(Event::Value(value));
    }

    fn receive_termination(&self, error: Option<E>) {
        (self.handler)(Event::Terminated(error));
    }
}

impl<T, E, F> fmt::Debug for FnConsumer<T, E, F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnConsumer").finish_non_exhaustive()
    }
}

/// Adapt a closure into a consumer.
///
/// # Example
///
/// ```
/// use spark_chain::{sink, Event, Producer};
///
/// let producer: Producer<&str, ()> = Producer::new();
/// producer.connect(sink(|event: Event<&str, ()>| {
///     if let Event::Value(word) = event {
///         println!("got {word}");
///     }
/// }));
/// producer.emit("hello").unwrap();
/// ```
pub fn sink<T, E, F>(handler: F) -> FnConsumer<T, E, F>
where
    F: Fn(Event<T, E>),
{
    FnConsumer::new(handler)
}

// =============================================================================
// RECORDER
// =============================================================================

/// A consumer that keeps every event it receives, in order.
///
/// Clones share the same log, so keep one clone and connect another.
pub struct Recorder<T, E> {
    events: Shared<Lock<Vec<Event<T, E>>>>,
}

impl<T, E> Clone for Recorder<T, E> {
    fn clone(&self) -> Self {
        Self {
            events: self.events.clone(),
        }
    }
}

impl<T, E> Default for Recorder<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, E> Recorder<T, E> {
    pub fn new() -> Self {
        Self {
            events: Shared::new(Lock::new(Vec::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn is_terminated(&self) -> bool {
        self.events.lock().last().is_some_and(Event::is_terminal)
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Number of live handles sharing this log, connections included.
    pub fn handle_count(&self) -> usize {
        Shared::strong_count(&self.events)
    }
}

impl<T: Clone, E: Clone> Recorder<T, E> {
    pub fn events(&self) -> Vec<Event<T, E>> {
        self.events.lock().clone()
    }

    /// The received values, without the terminal event.
    pub fn values(&self) -> Vec<T> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| event.value().cloned())
            .collect()
    }

    /// The terminal signal, if one arrived.
    pub fn termination(&self) -> Option<Option<E>> {
        self.events.lock().iter().find_map(|event| match event {
            Event::Terminated(error) => Some(error.clone()),
            Event::Value(_) => None,
        })
    }
}

impl<T, E> Consumer<T, E> for Recorder<T, E>
where
    T: MaybeSend + 'static,
    E: MaybeSend + 'static,
{
    fn receive_value(&self, value: T) {
        self.events.lock().push(Event::Value(value));
    }

    fn receive_termination(&self, error: Option<E>) {
        self.events.lock().push(Event::Terminated(error));
    }
}

impl<T: fmt::Debug, E: fmt::Debug> fmt::Debug for Recorder<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Recorder")
            .field("events", &*self.events.lock())
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
