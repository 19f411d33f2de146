// ============================================================================
// spark-chain - Ergonomic Macros
// ============================================================================

/// Helper macro to clone variables into a move closure.
///
/// This reduces the boilerplate of manually cloning `Producer`, `Recorder` or
/// other shared handles before moving them into a closure.
///
/// # Usage
///
/// ```rust
/// use spark_chain::{cloned, sink, Event, Producer};
///
/// let source: Producer<i32, ()> = Producer::new();
/// let mirror: Producer<i32, ()> = Producer::new();
///
/// source.connect(sink(cloned!(mirror => move |event: Event<i32, ()>| {
///     if let Event::Value(n) = event {
///         mirror.emit(n).unwrap();
///     }
/// })));
///
/// source.emit(1).unwrap();
/// assert_eq!(mirror.last_value(), Some(1));
/// ```
#[macro_export]
macro_rules! cloned {
    ($($n:ident),+ => $e:expr) => {
        {
            $( let $n = $n.clone(); )+
            $e
        }
    };
}

/// Create a closure consumer with automatic variable capturing.
///
/// Wraps `sink(cloned!(... => move |event| ...))`.
///
/// # Usage
///
/// ```rust
/// use spark_chain::{sink, Consumer, Event, Producer, Recorder};
///
/// let source: Producer<i32, ()> = Producer::new();
/// let seen = Recorder::<i32, ()>::new();
///
/// source.connect(sink!(seen => |event: Event<i32, ()>| {
///     if let Event::Value(n) = event {
///         seen.receive_value(n * 10);
///     }
/// }));
///
/// source.emit(4).unwrap();
/// assert_eq!(seen.values(), vec![40]);
/// ```
#[macro_export]
macro_rules! sink {
    // Case 1: With captures
    ($($deps:ident),+ => |$event:ident $(: $ty:ty)?| $body:expr) => {
        $crate::sink($crate::cloned!($($deps),+ => move |$event $(: $ty)?| $body))
    };
    // Case 2: No captures
    (|$event:ident $(: $ty:ty)?| $body:expr) => {
        $crate::sink(move |$event $(: $ty)?| $body)
    };
}
