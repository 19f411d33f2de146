// ============================================================================
// spark-chain - Core Module
// Flags, sharing primitives, type-erased traits and errors
// ============================================================================

pub mod constants;
pub mod error;
pub mod sync;
pub mod types;

// Re-export commonly used items
pub use constants::*;
pub use error::{MisuseError, StreamError};
pub use sync::{MaybeSend, MaybeSync, Payload, Shared, WeakShared};
pub use types::{
    AnyConnection, ConnectOptions, ConnectionId, Consumer, ProducerId, ReferencePolicy,
};
