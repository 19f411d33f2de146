// ============================================================================
// spark-chain - Producer/Connection Value Propagation for Rust
// ============================================================================
//
// A producer emits values, then one terminal signal, to every consumer
// attached to it through a connection. Derived producers (map, filter, ...)
// are built only from the public connect/emit/finish primitives.
//
// Default build: single-threaded (Rc + RefCell).
// Feature `sync`: thread-safe (Arc + parking_lot).
// ============================================================================

#[macro_use]
mod macros;

pub mod core;
pub mod pipeline;
pub mod primitives;

// Re-export core items at crate root for ergonomic access
pub use self::core::constants;
pub use self::core::error::{MisuseError, StreamError};
pub use self::core::sync::{MaybeSend, MaybeSync, Payload, Shared, WeakShared};
pub use self::core::types::{
    AnyConnection, ConnectOptions, ConnectionId, Consumer, ProducerId, ReferencePolicy,
};

// Re-export primitives at crate root
pub use primitives::connection::Connection;
pub use primitives::consumer::{sink, Event, FnConsumer, Recorder};
pub use primitives::producer::{Producer, WeakProducer};

// Re-export pipeline
pub use pipeline::operators::merge;
pub use pipeline::transform::{map_fn, try_fn, MapFn, Transform, TryFn};

// =============================================================================
// TESTS
// =============================================================================
