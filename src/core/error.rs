// ============================================================================
// spark-chain - Errors
// Misuse errors for producer contract violations, and a ready-made stream error
// ============================================================================

use std::sync::Arc;

use thiserror::Error;

use super::types::{ConnectionId, ProducerId};

// =============================================================================
// MISUSE ERROR
// =============================================================================

/// A producer contract violation by the caller.
///
/// These indicate a defect in whoever drives the producer, not a runtime
/// condition. They are returned instead of being silently ignored, so the
/// misuse shows up at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MisuseError {
    /// `emit` was called on a producer that already finished.
    #[error("value emitted on producer {0} after it finished")]
    EmitAfterFinish(ProducerId),

    /// `finish` was called on a producer that already finished.
    #[error("producer {0} finished more than once")]
    FinishAfterFinish(ProducerId),

    /// `disconnect` was handed a connection that belongs to another producer.
    #[error("connection {connection} does not belong to producer {producer}")]
    ForeignConnection {
        producer: ProducerId,
        connection: ConnectionId,
    },
}

// =============================================================================
// STREAM ERROR
// =============================================================================

/// General-purpose termination error.
///
/// Producers are generic over their error type; this one exists for streams
/// that don't need a domain error of their own. It is cheap to clone, which
/// matters because a terminal error is cloned once per connection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamError {
    #[error("{0}")]
    Message(Arc<str>),

    /// An upstream error wrapped by a derived producer.
    #[error("{context}: {source}")]
    Context {
        context: Arc<str>,
        #[source]
        source: Arc<StreamError>,
    },
}

impl StreamError {
    pub fn msg(message: impl Into<Arc<str>>) -> Self {
        StreamError::Message(message.into())
    }

    /// Wrap this error with a description of where it passed through.
    pub fn context(self, context: impl Into<Arc<str>>) -> Self {
        StreamError::Context {
            context: context.into(),
            source: Arc::new(self),
        }
    }

    /// The innermost error, skipping every layer of context.
    pub fn root(&self) -> &StreamError {
        match self {
            StreamError::Message(_) => self,
            StreamError::Context { source, .. } => source.root(),
        }
    }
}

impl From<&str> for StreamError {
    fn from(message: &str) -> Self {
        StreamError::msg(message)
    }
}

impl From<String> for StreamError {
    fn from(message: String) -> Self {
        StreamError::msg(message)
    }
}

// =============================================================================
// TESTS
// =============================================================================
