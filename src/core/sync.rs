// ============================================================================
// spark-chain - Sharing Primitives
// Pointer and lock selection for the two concurrency postures
// ============================================================================
//
// Everything in the crate that is shared or mutated through a shared handle
// goes through the aliases below. The default build is single-threaded:
// Rc + RefCell, no locking, handles are !Send. With the `sync` feature the
// same code compiles against Arc + parking_lot, and every consumer, transform
// and payload must be Send + Sync.
//
// Re-entrancy rules are the same in both postures: a lock is never held while
// calling into a consumer.
// ============================================================================

// =============================================================================
// SHARED POINTERS
// =============================================================================

#[cfg(not(feature = "sync"))]
pub use std::rc::{Rc as Shared, Weak as WeakShared};

#[cfg(feature = "sync")]
pub use std::sync::{Arc as Shared, Weak as WeakShared};

// =============================================================================
// THREAD-SAFETY MARKERS
// =============================================================================

/// `Send` under the `sync` feature, implemented for every type otherwise.
#[cfg(feature = "sync")]
pub trait MaybeSend: Send {}
#[cfg(feature = "sync")]
impl<T: Send + ?Sized> MaybeSend for T {}

/// `Send` under the `sync` feature, implemented for every type otherwise.
#[cfg(not(feature = "sync"))]
pub trait MaybeSend {}
#[cfg(not(feature = "sync"))]
impl<T: ?Sized> MaybeSend for T {}

/// `Sync` under the `sync` feature, implemented for every type otherwise.
#[cfg(feature = "sync")]
pub trait MaybeSync: Sync {}
#[cfg(feature = "sync")]
impl<T: Sync + ?Sized> MaybeSync for T {}

/// `Sync` under the `sync` feature, implemented for every type otherwise.
#[cfg(not(feature = "sync"))]
pub trait MaybeSync {}
#[cfg(not(feature = "sync"))]
impl<T: ?Sized> MaybeSync for T {}

/// Bound for values and termination errors carried through a producer.
///
/// Fan-out hands every open connection its own clone, so payloads must be
/// `Clone`. Under the `sync` feature they must also cross threads.
pub trait Payload: Clone + MaybeSend + MaybeSync + 'static {}
impl<T: Clone + MaybeSend + MaybeSync + 'static> Payload for T {}

// =============================================================================
// LOCK
// =============================================================================

/// Interior-mutability cell: `RefCell` by default, `parking_lot::Mutex` with `sync`.
///
/// Guards are short-lived. Holding one across a call into a consumer is a bug
/// (a panic with `RefCell`, a deadlock with `Mutex`).
pub struct Lock<T> {
    #[cfg(not(feature = "sync"))]
    cell: std::cell::RefCell<T>,
    #[cfg(feature = "sync")]
    cell: parking_lot::Mutex<T>,
}

#[cfg(not(feature = "sync"))]
pub type LockGuard<'a, T> = std::cell::RefMut<'a, T>;

#[cfg(feature = "sync")]
pub type LockGuard<'a, T> = parking_lot::MutexGuard<'a, T>;

impl<T> Lock<T> {
    pub fn new(value: T) -> Self {
        Self {
            #[cfg(not(feature = "sync"))]
            cell: std::cell::RefCell::new(value),
            #[cfg(feature = "sync")]
            cell: parking_lot::Mutex::new(value),
        }
    }

    /// Acquire exclusive access.
    #[cfg(not(feature = "sync"))]
    pub fn lock(&self) -> LockGuard<'_, T> {
        self.cell.borrow_mut()
    }

    /// Acquire exclusive access.
    #[cfg(feature = "sync")]
    pub fn lock(&self) -> LockGuard<'_, T> {
        self.cell.lock()
    }

    /// Mutable access without locking; `&mut self` already proves exclusivity.
    pub fn get_mut(&mut self) -> &mut T {
        self.cell.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.cell.into_inner()
    }
}

impl<T: Default> Default for Lock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

// =============================================================================
// TESTS
// =============================================================================
