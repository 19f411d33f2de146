// ============================================================================
// spark-chain - Primitives Module
// Producer, connection and ready-made consumers
// ============================================================================

pub mod connection;
pub mod consumer;
pub mod producer;

// Re-export for convenience
pub use connection::{Connection, ConnectionInner};
pub use consumer::{sink, Event, FnConsumer, Recorder};
pub use producer::{Producer, ProducerInner, WeakProducer};
