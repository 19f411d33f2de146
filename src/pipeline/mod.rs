// ============================================================================
// spark-chain - Pipeline Module
// Transform contract and derivation operators
// ============================================================================

pub mod operators;
pub mod transform;

pub use operators::merge;
pub use transform::{map_fn, try_fn, MapFn, Transform, TryFn};
