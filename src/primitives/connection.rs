// ============================================================================
// spark-chain - Connection
// The live link between one producer and one consumer
// ============================================================================
//
// State machine:
//
//     OPEN --close() / producer finish / consumer dropped--> CLOSED
//
// CLOSED is terminal. The transition is a compare-and-set on the flag word,
// so exactly one caller wins it no matter how many ends race to close.
//
// While OPEN a connection holds a strong handle to its producer (keeping the
// producer alive while someone listens) and the consumer reference chosen by
// its ReferencePolicy. Both are released on the way to CLOSED, which is what
// breaks the producer <-> connection cycle.
//
// Delivery never blocks and never holds a lock while the consumer runs. The
// first caller to deliver becomes the runner; anything that arrives while it
// runs (a nested emit from the consumer itself, or another thread) is queued
// on the connection and handed over by the runner, in order, once the
// current call returns. Queued values are re-checked against OPEN before
// hand-over, so closing stops them too. A queued termination is always
// handed over: it only gets queued by the caller that closed the connection.
// ============================================================================

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, trace};

use crate::core::constants::*;
use crate::core::sync::{Lock, Payload, Shared};
use crate::core::types::{AnyConnection, ConnectionId, ConsumerRef, ProducerId};
use crate::primitives::consumer::Event;
use crate::primitives::producer::Producer;

// =============================================================================
// CONNECTION INNER
// =============================================================================

pub struct ConnectionInner<T, E> {
    id: ConnectionId,

    /// Fixed at creation so ownership can be checked after the producer
    /// handle has been released.
    producer_id: ProducerId,

    /// OPEN | CLOSED plus attribute bits (TERMINATED, WEAK_CONSUMER)
    flags: AtomicU32,

    /// Runner flag and events waiting for the runner
    delivery: Lock<Delivery<T, E>>,

    /// Owning producer, `None` once closed
    producer: Lock<Option<Producer<T, E>>>,

    /// Target consumer, `None` once closed
    consumer: Lock<Option<ConsumerRef<T, E>>>,
}

struct Delivery<T, E> {
    running: bool,
    pending: VecDeque<Event<T, E>>,
}

// =============================================================================
// CONNECTION
// =============================================================================

/// Handle to a producer/consumer link.
///
/// Returned by [`Producer::connect`]. Cloning the handle does not create a new
/// connection; all clones observe and control the same link. Dropping every
/// handle does not close it either: the producer keeps it registered until it
/// is closed or the producer finishes.
pub struct Connection<T, E> {
    inner: Shared<ConnectionInner<T, E>>,
}

impl<T, E> Clone for Connection<T, E> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: Payload, E: Payload> Connection<T, E> {
    pub(crate) fn new(producer: Producer<T, E>, consumer: ConsumerRef<T, E>) -> Self {
        let mut flags = OPEN;
        if matches!(consumer, ConsumerRef::Weak(_)) {
            flags |= WEAK_CONSUMER;
        }

        Self {
            inner: Shared::new(ConnectionInner {
                id: ConnectionId::next(),
                producer_id: producer.id(),
                flags: AtomicU32::new(flags),
                delivery: Lock::new(Delivery {
                    running: false,
                    pending: VecDeque::new(),
                }),
                producer: Lock::new(Some(producer)),
                consumer: Lock::new(Some(consumer)),
            }),
        }
    }

    pub fn id(&self) -> ConnectionId {
        self.inner.id
    }

    /// Id of the producer this connection was created by.
    pub fn producer_id(&self) -> ProducerId {
        self.inner.producer_id
    }

    fn flags(&self) -> u32 {
        self.inner.flags.load(Ordering::Acquire)
    }

    pub fn is_open(&self) -> bool {
        self.flags() & OPEN != 0
    }

    pub fn is_closed(&self) -> bool {
        self.flags() & CLOSED != 0
    }

    /// True if the connection closed because its producer finished, as
    /// opposed to a detach request from either end.
    pub fn was_terminated(&self) -> bool {
        self.flags() & TERMINATED != 0
    }

    /// True if the connection holds only a weak reference to its consumer.
    pub fn has_weak_consumer(&self) -> bool {
        self.flags() & WEAK_CONSUMER != 0
    }

    /// The owning producer, while the connection is open.
    pub fn producer(&self) -> Option<Producer<T, E>> {
        self.inner.producer.lock().clone()
    }

    /// Flip OPEN -> CLOSED, adding `reason` bits. Returns true for the single
    /// caller that performed the transition.
    fn try_close(&self, reason: u32) -> bool {
        let mut current = self.inner.flags.load(Ordering::Acquire);
        loop {
            if current & OPEN == 0 {
                return false;
            }
            let next = (current & STATE_MASK) | CLOSED | reason;
            match self.inner.flags.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return true,
                Err(actual) => current = actual,
            }
        }
    }

    /// Stop all future deliveries and detach from the producer.
    ///
    /// Idempotent. The consumer receives no termination signal: the stream
    /// did not end, this end just stopped listening. The producer's removal
    /// hook runs exactly once, whichever end closes first.
    pub fn close(&self) {
        if !self.try_close(0) {
            return;
        }

        let producer = self.inner.producer.lock().take();
        let consumer = self.inner.consumer.lock().take();

        if let Some(producer) = producer {
            producer.remove_connection(self.inner.id);
        }
        trace!(connection = %self.inner.id, producer = %self.inner.producer_id, "connection closed");

        // Released last, outside every lock: the consumer's Drop may run
        // arbitrary code, including touching this producer again.
        drop(consumer);
    }

    /// Hand one value to the consumer. No-op once closed.
    pub(crate) fn deliver_value(&self, value: T) {
        if !self.is_open() {
            return;
        }
        self.dispatch(Event::Value(value));
    }

    /// Deliver the terminal signal and close. At most once per connection.
    ///
    /// Only called by the producer after it removed this connection from its
    /// registry, so the removal hook is skipped here.
    pub(crate) fn deliver_termination(&self, error: Option<E>) {
        if !self.try_close(TERMINATED) {
            return;
        }

        let producer = self.inner.producer.lock().take();
        self.dispatch(Event::Terminated(error));
        drop(producer);
    }

    /// Close the connection if its weakly held consumer is gone.
    pub(crate) fn close_if_consumer_dropped(&self) -> bool {
        let dropped = self
            .inner
            .consumer
            .lock()
            .as_ref()
            .is_some_and(|consumer| !consumer.is_alive());

        if dropped && self.is_open() {
            debug!(connection = %self.inner.id, "consumer dropped, closing connection");
            self.close();
        }
        dropped
    }

    /// Run `event` now, or queue it for the call already running.
    fn dispatch(&self, event: Event<T, E>) {
        {
            let mut delivery = self.inner.delivery.lock();
            if delivery.running {
                delivery.pending.push_back(event);
                return;
            }
            delivery.running = true;
        }

        let mut event = event;
        loop {
            self.hand_over(event);

            // Popping and clearing the runner flag happen under one lock, so
            // nothing queued in between is left behind.
            let mut delivery = self.inner.delivery.lock();
            match delivery.pending.pop_front() {
                Some(next) => event = next,
                None => {
                    delivery.running = false;
                    return;
                }
            }
        }
    }

    fn hand_over(&self, event: Event<T, E>) {
        match event {
            Event::Value(value) => {
                if !self.is_open() {
                    return;
                }
                let consumer = self
                    .inner
                    .consumer
                    .lock()
                    .as_ref()
                    .and_then(ConsumerRef::upgrade);

                match consumer {
                    Some(consumer) => consumer.receive_value(value),
                    // Closed concurrently since the check above.
                    None if !self.is_open() => {}
                    None => {
                        debug!(connection = %self.inner.id, "consumer dropped, closing connection");
                        self.close();
                    }
                }
            }
            Event::Terminated(error) => {
                let consumer = self
                    .inner
                    .consumer
                    .lock()
                    .take()
                    .and_then(|consumer| consumer.upgrade());

                if let Some(consumer) = consumer {
                    consumer.receive_termination(error);
                }
            }
        }
    }
}

impl<T: Payload, E: Payload> AnyConnection for Connection<T, E> {
    fn id(&self) -> ConnectionId {
        self.inner.id
    }

    fn is_open(&self) -> bool {
        Connection::is_open(self)
    }

    fn close(&self) {
        Connection::close(self)
    }
}

impl<T, E> fmt::Debug for Connection<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flags = self.inner.flags.load(Ordering::Acquire);
        f.debug_struct("Connection")
            .field("id", &self.inner.id)
            .field("producer", &self.inner.producer_id)
            .field("open", &(flags & OPEN != 0))
            .field("terminated", &(flags & TERMINATED != 0))
            .finish()
    }
}

// =============================================================================
// TESTS
// =============================================================================
