// ============================================================================
// spark-chain - Derivation Operators
// New producers built from existing ones
// ============================================================================
//
// A derived producer is an ordinary Producer plus a relay consumer attached
// to each of its sources. Nothing is overridden: the relay only calls the
// public primitives (`emit`, `finish`) on its target.
//
// Ownership:
//
//     source --registry--> Connection --strong--> Relay --weak--> derived
//     derived --upstream list--> Connection --strong--> source
//
// The relay never keeps the derived producer alive. Dropping the last handle
// to a derived producer with no listeners drops it, and its Drop closes the
// upstream connections. Finishing it closes them too.
// ============================================================================

use std::convert::Infallible;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::debug;

use crate::core::error::MisuseError;
use crate::core::sync::{MaybeSend, MaybeSync, Payload, Shared};
use crate::core::types::Consumer;
use crate::pipeline::transform::{map_fn, try_fn, Transform};
use crate::primitives::consumer::Event;
use crate::primitives::producer::{Producer, WeakProducer};

// =============================================================================
// RELAY
// =============================================================================

/// Consumer side of a derived producer: turns upstream events into calls on
/// its target.
struct Relay<U, X, F> {
    target: WeakProducer<U, X>,
    forward: F,
}

impl<T, E, U, X, F> Consumer<T, E> for Relay<U, X, F>
where
    U: Payload,
    X: Payload,
    F: Fn(&Producer<U, X>, Event<T, E>) -> Result<(), MisuseError>
        + MaybeSend
        + MaybeSync
        + 'static,
{
    fn receive_value(&self, value: T) {
        self.relay(Event::Value(value));
    }

    fn receive_termination(&self, error: Option<E>) {
        self.relay(Event::Terminated(error));
    }
}

impl<U: Payload, X: Payload, F> Relay<U, X, F> {
    fn relay<T, E>(&self, event: Event<T, E>)
    where
        F: Fn(&Producer<U, X>, Event<T, E>) -> Result<(), MisuseError>,
    {
        let Some(target) = self.target.upgrade() else {
            debug!("derived producer dropped, discarding upstream event");
            return;
        };

        // Only reachable when the target was finished from outside while an
        // upstream delivery was already in flight.
        if let Err(error) = (self.forward)(&target, event) {
            debug!(%error, derived = %target.id(), "derived producer rejected upstream event");
        }
    }
}

// =============================================================================
// OPERATORS
// =============================================================================

impl<T: Payload, E: Payload> Producer<T, E> {
    /// Build a derived producer fed by this one.
    ///
    /// `forward` receives the derived producer and each upstream event, and
    /// decides what to emit or how to finish. All other operators are
    /// written on top of this.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_chain::{Event, Producer, Recorder};
    ///
    /// let source: Producer<i32, String> = Producer::new();
    /// let pairs = source.derive(|out: &Producer<(i32, i32), String>, event| match event {
    ///     Event::Value(v) => out.emit((v, v * v)),
    ///     Event::Terminated(error) => out.finish(error),
    /// });
    ///
    /// let recorder = Recorder::new();
    /// pairs.connect(recorder.clone());
    /// source.emit(3).unwrap();
    /// assert_eq!(recorder.values(), vec![(3, 9)]);
    /// ```
    pub fn derive<U, X, F>(&self, forward: F) -> Producer<U, X>
    where
        U: Payload,
        X: Payload,
        F: Fn(&Producer<U, X>, Event<T, E>) -> Result<(), MisuseError>
            + MaybeSend
            + MaybeSync
            + 'static,
    {
        let derived = Producer::new();
        attach(self, &derived, forward);
        derived
    }

    /// Apply an infallible [`Transform`] to every value.
    pub fn transform<X>(&self, transform: X) -> Producer<X::Output, E>
    where
        X: Transform<T, Error = Infallible>,
        X::Output: Payload,
    {
        self.derive(move |out, event| match event {
            Event::Value(value) => match transform.apply(value) {
                Ok(output) => out.emit(output),
                Err(never) => match never {},
            },
            Event::Terminated(error) => out.finish(error),
        })
    }

    /// Apply a fallible [`Transform`] to every value.
    ///
    /// The first failure finishes the derived producer with
    /// `E::from(failure)` and detaches it from this one.
    pub fn try_transform<X>(&self, transform: X) -> Producer<X::Output, E>
    where
        X: Transform<T>,
        X::Output: Payload,
        E: From<X::Error>,
    {
        self.derive(move |out, event| match event {
            Event::Value(value) => match transform.apply(value) {
                Ok(output) => out.emit(output),
                Err(failure) => out.finish(Some(E::from(failure))),
            },
            Event::Terminated(error) => out.finish(error),
        })
    }

    /// Map every value through `func`.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_chain::{Producer, Recorder};
    ///
    /// let source: Producer<i32, String> = Producer::new();
    /// let labels = source.map(|n| format!("#{n}"));
    ///
    /// let recorder = Recorder::new();
    /// labels.connect(recorder.clone());
    /// source.emit(7).unwrap();
    /// assert_eq!(recorder.values(), vec!["#7".to_string()]);
    /// ```
    pub fn map<U, F>(&self, func: F) -> Producer<U, E>
    where
        U: Payload,
        F: Fn(T) -> U + MaybeSend + MaybeSync + 'static,
    {
        self.transform(map_fn(func))
    }

    /// Map every value through a fallible `func`; see [`try_transform`](Self::try_transform).
    pub fn try_map<U, Y, F>(&self, func: F) -> Producer<U, E>
    where
        U: Payload,
        E: From<Y>,
        F: Fn(T) -> Result<U, Y> + MaybeSend + MaybeSync + 'static,
    {
        self.try_transform(try_fn(func))
    }

    /// Re-emit only the values for which `predicate` holds.
    pub fn filter<F>(&self, predicate: F) -> Producer<T, E>
    where
        F: Fn(&T) -> bool + MaybeSend + MaybeSync + 'static,
    {
        self.derive(move |out, event| match event {
            Event::Value(value) if predicate(&value) => out.emit(value),
            Event::Value(_) => Ok(()),
            Event::Terminated(error) => out.finish(error),
        })
    }

    /// Re-emit values unchanged and convert the terminal error, e.g. to wrap
    /// it with context.
    ///
    /// # Example
    ///
    /// ```
    /// use spark_chain::{Producer, Recorder, StreamError};
    ///
    /// let source: Producer<u8, StreamError> = Producer::new();
    /// let framed = source.map_err(|e| e.context("reading frame"));
    ///
    /// let recorder = Recorder::new();
    /// framed.connect(recorder.clone());
    /// source.fail(StreamError::msg("eof")).unwrap();
    ///
    /// let error = recorder.termination().flatten().unwrap();
    /// assert_eq!(error.to_string(), "reading frame: eof");
    /// ```
    pub fn map_err<X, F>(&self, func: F) -> Producer<T, X>
    where
        X: Payload,
        F: Fn(E) -> X + MaybeSend + MaybeSync + 'static,
    {
        self.derive(move |out, event| match event {
            Event::Value(value) => out.emit(value),
            Event::Terminated(error) => out.finish(error.map(&func)),
        })
    }
}

/// Emit the values of all `sources` through one producer.
///
/// The merged producer completes once every source completed, and fails as
/// soon as any source fails (detaching from the rest). Merging nothing
/// yields a producer that has already completed.
///
/// # Example
///
/// ```
/// use spark_chain::{merge, Producer, Recorder};
///
/// let a: Producer<i32, String> = Producer::new();
/// let b: Producer<i32, String> = Producer::new();
/// let both = merge([a.clone(), b.clone()]);
///
/// let recorder = Recorder::new();
/// both.connect(recorder.clone());
/// a.emit(1).unwrap();
/// b.emit(2).unwrap();
/// a.complete().unwrap();
/// assert_eq!(recorder.termination(), None);
/// b.complete().unwrap();
///
/// assert_eq!(recorder.values(), vec![1, 2]);
/// assert_eq!(recorder.termination(), Some(None));
/// ```
pub fn merge<T, E, I>(sources: I) -> Producer<T, E>
where
    T: Payload,
    E: Payload,
    I: IntoIterator<Item = Producer<T, E>>,
{
    let sources: Vec<_> = sources.into_iter().collect();
    if sources.is_empty() {
        return Producer::finished(None);
    }

    let merged = Producer::new();

    let remaining = Shared::new(AtomicUsize::new(sources.len()));
    for source in &sources {
        if merged.is_finished() {
            break;
        }
        let remaining = remaining.clone();
        attach(source, &merged, move |out: &Producer<T, E>, event| match event {
            Event::Value(value) => out.emit(value),
            Event::Terminated(Some(error)) => out.finish(Some(error)),
            Event::Terminated(None) => {
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    out.finish(None)
                } else {
                    Ok(())
                }
            }
        });
    }
    merged
}

/// Connect a relay from `source` to `derived` and hand the upstream
/// connection to `derived`.
fn attach<T, E, U, X, F>(source: &Producer<T, E>, derived: &Producer<U, X>, forward: F)
where
    T: Payload,
    E: Payload,
    U: Payload,
    X: Payload,
    F: Fn(&Producer<U, X>, Event<T, E>) -> Result<(), MisuseError>
        + MaybeSend
        + MaybeSync
        + 'static,
{
    let relay = Relay {
        target: derived.downgrade(),
        forward,
    };
    // If `source` already finished, this delivers the recorded termination
    // to the relay right away and `derived` finishes before adopting.
    let upstream = source.connect(relay);
    derived.adopt_upstream(Box::new(upstream));
}

// =============================================================================
// TESTS
// =============================================================================
