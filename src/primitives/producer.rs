// ============================================================================
// spark-chain - Producer
// The value source: connection registry, emission and termination
// ============================================================================
//
// A producer is Active until `finish` is called once, then Finished forever.
// The Finished state records the terminal signal so late consumers still see
// the outcome: connecting to a finished producer delivers the recorded
// termination immediately and returns an already-closed connection.
//
// Fan-out rules:
// - the registry is snapshotted under the lock, the lock is released, then
//   the snapshot is walked in registration order
// - each connection checks its own liveness right before delivery, so a
//   consumer that closes itself (or another connection) mid-emit stops
//   receiving at once while everyone else in the snapshot is unaffected
// - no lock is held while a consumer runs, so consumers may connect,
//   disconnect, emit or finish re-entrantly
// ============================================================================

use std::fmt;
use std::mem;

use tracing::{trace, warn};

use crate::core::error::MisuseError;
use crate::core::sync::{Lock, Payload, Shared, WeakShared};
use crate::core::types::{
    AnyConnection, ConnectOptions, ConnectionId, Consumer, ConsumerRef, ProducerId,
};
use crate::primitives::connection::Connection;

// =============================================================================
// PRODUCER STATE
// =============================================================================

enum Lifecycle<E> {
    Active,
    /// Terminal signal: `None` for graceful completion
    Finished(Option<E>),
}

struct ProducerState<T, E> {
    lifecycle: Lifecycle<E>,

    /// Live connections in registration order. Always empty once finished.
    connections: Vec<Connection<T, E>>,

    /// Connections this producer holds to its own sources (derived producers)
    upstream: Vec<Box<dyn AnyConnection>>,

    last_value: Option<T>,

    value_count: u64,
}

/// The shared state behind every [`Producer`] handle.
pub struct ProducerInner<T, E> {
    id: ProducerId,
    state: Lock<ProducerState<T, E>>,
}

impl<T, E> Drop for ProducerInner<T, E> {
    fn drop(&mut self) {
        // Nothing downstream can observe this producer anymore, so a derived
        // producer lets go of its sources.
        let upstream = mem::take(&mut self.state.get_mut().upstream);
        for connection in upstream {
            connection.close();
        }
    }
}

// =============================================================================
// PRODUCER
// =============================================================================

/// A source of values of type `T` that ends with an optional error `E`.
///
/// `Producer` is a cheap handle; clones share the same stream. Every open
/// [`Connection`] also holds a handle, so a producer stays alive for as long
/// as anyone listens to it.
///
/// # Example
///
/// ```
/// use spark_chain::{Producer, Recorder};
///
/// let numbers: Producer<i32, String> = Producer::new();
/// let recorder = Recorder::new();
/// numbers.connect(recorder.clone());
///
/// numbers.emit(1).unwrap();
/// numbers.emit(2).unwrap();
/// numbers.finish(None).unwrap();
///
/// assert_eq!(recorder.values(), vec![1, 2]);
/// assert_eq!(recorder.termination(), Some(None));
/// ```
pub struct Producer<T, E> {
    inner: Shared<ProducerInner<T, E>>,
}

impl<T, E> Clone for Producer<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Payload, E: Payload> Default for Producer<T, E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload, E: Payload> Producer<T, E> {
    /// Create an active producer with no connections.
    pub fn new() -> Self {
        Self {
            inner: Shared::new(ProducerInner {
                id: ProducerId::next(),
                state: Lock::new(ProducerState {
                    lifecycle: Lifecycle::Active,
                    connections: Vec::new(),
                    upstream: Vec::new(),
                    last_value: None,
                    value_count: 0,
                }),
            }),
        }
    }

    /// Create a producer that has already finished with `error`.
    pub fn finished(error: Option<E>) -> Self {
        let producer = Self::new();
        producer.inner.state.lock().lifecycle = Lifecycle::Finished(error);
        producer
    }

    pub fn id(&self) -> ProducerId {
        self.inner.id
    }

    // =========================================================================
    // CONNECTING
    // =========================================================================

    /// Attach a consumer, owned by the new connection.
    pub fn connect<C>(&self, consumer: C) -> Connection<T, E>
    where
        C: Consumer<T, E>,
    {
        self.connect_with(Shared::new(consumer), ConnectOptions::default())
    }

    /// Attach a shared consumer with explicit options.
    ///
    /// With [`ReferencePolicy::Weak`](crate::ReferencePolicy::Weak) the
    /// connection does not keep `consumer` alive; once the last outside
    /// handle is dropped the connection closes itself.
    pub fn connect_with(
        &self,
        consumer: Shared<dyn Consumer<T, E>>,
        options: ConnectOptions,
    ) -> Connection<T, E> {
        let connection = Connection::new(self.clone(), ConsumerRef::new(consumer, options.consumer));

        let recorded = {
            let mut state = self.inner.state.lock();
            match &state.lifecycle {
                Lifecycle::Active => {
                    state.connections.push(connection.clone());
                    None
                }
                Lifecycle::Finished(error) => Some(error.clone()),
            }
        };

        match recorded {
            None => {
                trace!(producer = %self.inner.id, connection = %connection.id(), "connected");
            }
            Some(error) => {
                trace!(
                    producer = %self.inner.id,
                    connection = %connection.id(),
                    "connected after finish, replaying termination"
                );
                connection.deliver_termination(error);
            }
        }

        connection
    }

    /// Producer-initiated removal of one of its own connections.
    ///
    /// Idempotent: disconnecting an already-closed connection is a no-op.
    /// Handing over another producer's connection is a misuse.
    pub fn disconnect(&self, connection: &Connection<T, E>) -> Result<(), MisuseError> {
        if connection.producer_id() != self.inner.id {
            let error = MisuseError::ForeignConnection {
                producer: self.inner.id,
                connection: connection.id(),
            };
            warn!(%error, "disconnect misuse");
            return Err(error);
        }

        connection.close();
        Ok(())
    }

    /// Removal hook used by [`Connection::close`].
    pub(crate) fn remove_connection(&self, id: ConnectionId) {
        let removed = {
            let mut state = self.inner.state.lock();
            let index = state.connections.iter().position(|c| c.id() == id);
            index.map(|index| state.connections.remove(index))
        };

        if removed.is_some() {
            trace!(producer = %self.inner.id, connection = %id, "disconnected");
        }
    }

    // =========================================================================
    // EMITTING
    // =========================================================================

    /// Send `value` to every open connection, in registration order.
    ///
    /// Fails with [`MisuseError::EmitAfterFinish`] once the producer finished.
    pub fn emit(&self, value: T) -> Result<(), MisuseError> {
        let snapshot = {
            let mut state = self.inner.state.lock();
            if matches!(state.lifecycle, Lifecycle::Finished(_)) {
                drop(state);
                let error = MisuseError::EmitAfterFinish(self.inner.id);
                warn!(%error, "emit misuse");
                return Err(error);
            }
            state.last_value = Some(value.clone());
            state.value_count += 1;
            state.connections.clone()
        };

        for connection in &snapshot {
            connection.deliver_value(value.clone());
        }

        Ok(())
    }

    /// Terminate the stream. `None` is a graceful completion, `Some(error)`
    /// a failure.
    ///
    /// Every registered connection receives the terminal signal in
    /// registration order and is closed; the registry is left empty for good.
    /// Of several concurrent calls exactly one wins; the rest fail with
    /// [`MisuseError::FinishAfterFinish`] and deliver nothing.
    pub fn finish(&self, error: Option<E>) -> Result<(), MisuseError> {
        let (connections, upstream) = {
            let mut state = self.inner.state.lock();
            if matches!(state.lifecycle, Lifecycle::Finished(_)) {
                drop(state);
                let misuse = MisuseError::FinishAfterFinish(self.inner.id);
                warn!(error = %misuse, "finish misuse");
                return Err(misuse);
            }
            state.lifecycle = Lifecycle::Finished(error.clone());
            (
                mem::take(&mut state.connections),
                mem::take(&mut state.upstream),
            )
        };

        trace!(
            producer = %self.inner.id,
            connections = connections.len(),
            failed = error.is_some(),
            "finished"
        );

        for connection in &connections {
            connection.deliver_termination(error.clone());
        }
        for connection in upstream {
            connection.close();
        }

        Ok(())
    }

    /// `finish(None)`
    pub fn complete(&self) -> Result<(), MisuseError> {
        self.finish(None)
    }

    /// `finish(Some(error))`
    pub fn fail(&self, error: E) -> Result<(), MisuseError> {
        self.finish(Some(error))
    }

    // =========================================================================
    // INTROSPECTION
    // =========================================================================

    pub fn is_finished(&self) -> bool {
        matches!(self.inner.state.lock().lifecycle, Lifecycle::Finished(_))
    }

    /// The recorded terminal signal: `None` while active, `Some(None)` after a
    /// graceful finish, `Some(Some(error))` after a failure.
    pub fn termination(&self) -> Option<Option<E>> {
        match &self.inner.state.lock().lifecycle {
            Lifecycle::Active => None,
            Lifecycle::Finished(error) => Some(error.clone()),
        }
    }

    /// Number of registered connections.
    ///
    /// Weak connections whose consumer has been dropped are closed first, so
    /// a quiet producer does not count listeners that no longer exist.
    pub fn connection_count(&self) -> usize {
        let snapshot = self.inner.state.lock().connections.clone();
        for connection in snapshot.iter().filter(|c| c.has_weak_consumer()) {
            connection.close_if_consumer_dropped();
        }
        self.inner.state.lock().connections.len()
    }

    /// Most recently emitted value.
    pub fn last_value(&self) -> Option<T> {
        self.inner.state.lock().last_value.clone()
    }

    /// Number of successful `emit` calls.
    pub fn value_count(&self) -> u64 {
        self.inner.state.lock().value_count
    }

    /// True if both handles refer to the same producer.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Shared::ptr_eq(&self.inner, &other.inner)
    }

    pub fn downgrade(&self) -> WeakProducer<T, E> {
        WeakProducer {
            inner: Shared::downgrade(&self.inner),
        }
    }

    // =========================================================================
    // UPSTREAM (derived producers)
    // =========================================================================

    /// Take ownership of a connection to one of this producer's sources.
    ///
    /// It is closed when this producer finishes or is dropped. If that
    /// already happened, it is closed right away.
    pub(crate) fn adopt_upstream(&self, connection: Box<dyn AnyConnection>) {
        let rejected = {
            let mut state = self.inner.state.lock();
            let active = matches!(state.lifecycle, Lifecycle::Active);
            if active && connection.is_open() {
                state.upstream.push(connection);
                None
            } else {
                Some(connection)
            }
        };

        if let Some(connection) = rejected {
            connection.close();
        }
    }

    /// Number of source connections a derived producer still holds.
    pub fn upstream_count(&self) -> usize {
        self.inner.state.lock().upstream.len()
    }
}

impl<T, E> fmt::Debug for Producer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Producer")
            .field("id", &self.inner.id)
            .field("finished", &matches!(state.lifecycle, Lifecycle::Finished(_)))
            .field("connections", &state.connections.len())
            .field("values", &state.value_count)
            .finish()
    }
}

// =============================================================================
// WEAK PRODUCER
// =============================================================================

/// Non-owning handle to a producer.
pub struct WeakProducer<T, E> {
    inner: WeakShared<ProducerInner<T, E>>,
}

impl<T, E> Clone for WeakProducer<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T, E> WeakProducer<T, E> {
    pub fn upgrade(&self) -> Option<Producer<T, E>> {
        self.inner.upgrade().map(|inner| Producer { inner })
    }
}

impl<T, E> fmt::Debug for WeakProducer<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakProducer")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
