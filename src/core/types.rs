// ============================================================================
// spark-chain - Type Definitions
// Identities, the consumer contract, and type-erased connection handles
// ============================================================================

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use super::sync::{MaybeSend, MaybeSync, Shared, WeakShared};

// =============================================================================
// IDENTITIES
// =============================================================================

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Stable identity of a producer. Producers have no value equality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ProducerId(u64);

impl ProducerId {
    pub(crate) fn next() -> Self {
        Self(next_id())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProducerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p#{}", self.0)
    }
}

/// Stable identity of a connection; the registry key inside its producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub(crate) fn next() -> Self {
        Self(next_id())
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c#{}", self.0)
    }
}

// =============================================================================
// CONSUMER CONTRACT
// =============================================================================

/// Anything that can receive a producer's values and its terminal signal.
///
/// Through one connection a consumer sees zero or more `receive_value` calls,
/// then at most one `receive_termination`, and nothing after that. A
/// `None` termination is a graceful completion; `Some(error)` is a failure.
///
/// Both methods take `&self` so the same consumer can be re-entered, e.g.
/// when receiving a value makes it emit on another producer that feeds it.
/// Keep state behind interior mutability.
pub trait Consumer<T, E>: MaybeSend + MaybeSync + 'static {
    fn receive_value(&self, value: T);

    fn receive_termination(&self, error: Option<E>);
}

impl<T, E, C> Consumer<T, E> for Shared<C>
where
    C: Consumer<T, E> + ?Sized,
    Shared<C>: MaybeSend + MaybeSync + 'static,
{
    fn receive_value(&self, value: T) {
        (**self).receive_value(value)
    }

    fn receive_termination(&self, error: Option<E>) {
        (**self).receive_termination(error)
    }
}

// =============================================================================
// CONSUMER REFERENCE POLICY
// =============================================================================

/// How a connection holds on to its consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReferencePolicy {
    /// The connection keeps the consumer alive until it closes.
    #[default]
    Strong,
    /// The consumer's lifetime is managed elsewhere. A dropped consumer is
    /// noticed lazily: the connection closes itself (without a termination)
    /// at the next delivery attempt, or when the producer's
    /// `connection_count` sweeps its registry, whichever comes first.
    Weak,
}

/// Options for attaching a consumer to a producer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectOptions {
    pub consumer: ReferencePolicy,
}

impl ConnectOptions {
    pub fn strong() -> Self {
        Self {
            consumer: ReferencePolicy::Strong,
        }
    }

    pub fn weak() -> Self {
        Self {
            consumer: ReferencePolicy::Weak,
        }
    }
}

/// The consumer end as stored inside a connection.
pub(crate) enum ConsumerRef<T, E> {
    Strong(Shared<dyn Consumer<T, E>>),
    Weak(WeakShared<dyn Consumer<T, E>>),
}

impl<T, E> ConsumerRef<T, E> {
    pub(crate) fn new(consumer: Shared<dyn Consumer<T, E>>, policy: ReferencePolicy) -> Self {
        match policy {
            ReferencePolicy::Strong => ConsumerRef::Strong(consumer),
            ReferencePolicy::Weak => ConsumerRef::Weak(Shared::downgrade(&consumer)),
        }
    }

    /// The consumer, if it is still alive.
    pub(crate) fn upgrade(&self) -> Option<Shared<dyn Consumer<T, E>>> {
        match self {
            ConsumerRef::Strong(consumer) => Some(consumer.clone()),
            ConsumerRef::Weak(weak) => weak.upgrade(),
        }
    }

    /// False once a weakly held consumer has been dropped.
    pub(crate) fn is_alive(&self) -> bool {
        match self {
            ConsumerRef::Strong(_) => true,
            ConsumerRef::Weak(weak) => weak.strong_count() > 0,
        }
    }
}

// =============================================================================
// TYPE-ERASED CONNECTION
// =============================================================================
//
// A derived producer owns connections to its sources, whose value and error
// types differ from its own. It only ever needs to close them, so they are
// stored behind this trait.
// =============================================================================

/// Type-erased view of a connection.
pub trait AnyConnection: MaybeSend + MaybeSync {
    fn id(&self) -> ConnectionId;

    fn is_open(&self) -> bool;

    /// Close the connection. Idempotent.
    fn close(&self);
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    #[cfg(not(feature = "sync"))]
    use std::cell::RefCell;

    #[test]
    fn ids_are_unique_and_increasing() {
        let a = ConnectionId::next();
        let b = ConnectionId::next();
        let p = ProducerId::next();
        assert!(a < b);
        assert!(b.get() < p.get());
        assert_eq!(a.to_string(), format!("c#{}", a.get()));
        assert_eq!(p.to_string(), format!("p#{}", p.get()));
    }

    #[test]
    fn default_policy_is_strong() {
        assert_eq!(ConnectOptions::default(), ConnectOptions::strong());
        assert_eq!(ConnectOptions::weak().consumer, ReferencePolicy::Weak);
    }

    #[cfg(not(feature = "sync"))]
    struct Last(RefCell<Option<i32>>);

    #[cfg(not(feature = "sync"))]
    impl Consumer<i32, ()> for Last {
        fn receive_value(&self, value: i32) {
            *self.0.borrow_mut() = Some(value);
        }

        fn receive_termination(&self, _error: Option<()>) {}
    }

    #[cfg(not(feature = "sync"))]
    #[test]
    fn weak_consumer_ref_dies_with_consumer() {
        let consumer: Shared<dyn Consumer<i32, ()>> = Shared::new(Last(RefCell::new(None)));
        let weak = ConsumerRef::new(consumer.clone(), ReferencePolicy::Weak);
        assert!(weak.upgrade().is_some());

        let strong = ConsumerRef::new(consumer, ReferencePolicy::Strong);
        assert!(weak.upgrade().is_some());
        assert!(weak.is_alive() && strong.is_alive());

        drop(strong);
        assert!(weak.upgrade().is_none());
        assert!(!weak.is_alive());
    }

    #[cfg(not(feature = "sync"))]
    #[test]
    fn shared_consumer_forwards() {
        let last = Shared::new(Last(RefCell::new(None)));
        let forwarding = last.clone();
        Consumer::<i32, ()>::receive_value(&forwarding, 7);
        assert_eq!(*last.0.borrow(), Some(7));
    }
}
