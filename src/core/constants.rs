// ============================================================================
// spark-chain - Constants
// Flag constants for connection liveness
// ============================================================================

// =============================================================================
// CONNECTION STATE FLAGS
// =============================================================================

/// Connection is open and delivers values
pub const OPEN: u32 = 1 << 0;

/// Connection is closed (terminal, no transition leaves it)
pub const CLOSED: u32 = 1 << 1;

// =============================================================================
// CLOSE REASON FLAGS
// =============================================================================

/// Connection was closed by its producer finishing, not by a detach request
pub const TERMINATED: u32 = 1 << 2;

// =============================================================================
// CONSUMER REFERENCE FLAGS
// =============================================================================

/// Connection holds only a weak reference to its consumer
pub const WEAK_CONSUMER: u32 = 1 << 3;

// =============================================================================
// STATE MASK (for clearing state bits)
// =============================================================================

/// Mask to clear the liveness bits (OPEN, CLOSED)
pub const STATE_MASK: u32 = !(OPEN | CLOSED);

// =============================================================================
// TESTS
// =============================================================================
