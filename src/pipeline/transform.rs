// ============================================================================
// spark-chain - Transform Contract
// Pure value functions applied by derivation operators
// ============================================================================
//
// A transform maps one input value to an output value or a failure. It must
// be pure: no side effects and no contact with any producer or connection.
// Derived producers call it once per upstream value and never during
// teardown.
//
// Per-type transform libraries (geometry, strings, numbers, ...) live outside
// this crate; anything that satisfies the trait plugs in.
// ============================================================================

use std::convert::Infallible;
use std::fmt;
use std::marker::PhantomData;

use crate::core::sync::{MaybeSend, MaybeSync};

// =============================================================================
// TRANSFORM TRAIT
// =============================================================================

/// A pure function from `T` to `Result<Self::Output, Self::Error>`.
pub trait Transform<T>: MaybeSend + MaybeSync + 'static {
    type Output;

    /// Failure type; [`Infallible`] for transforms that cannot fail.
    type Error;

    fn apply(&self, value: T) -> Result<Self::Output, Self::Error>;
}

// =============================================================================
// CLOSURE TRANSFORMS
// =============================================================================

/// Infallible transform built from a closure. See [`map_fn`].
pub struct MapFn<F, T> {
    func: F,
    _input: PhantomData<fn(T)>,
}

impl<F, T, U> Transform<T> for MapFn<F, T>
where
    F: Fn(T) -> U + MaybeSend + MaybeSync + 'static,
    T: 'static,
{
    type Output = U;
    type Error = Infallible;

    fn apply(&self, value: T) -> Result<U, Infallible> {
        Ok((self.func)(value))
    }
}

/// Fallible transform built from a closure. See [`try_fn`].
pub struct TryFn<F, T> {
    func: F,
    _input: PhantomData<fn(T)>,
}

impl<F, T, U, X> Transform<T> for TryFn<F, T>
where
    F: Fn(T) -> Result<U, X> + MaybeSend + MaybeSync + 'static,
    T: 'static,
{
    type Output = U;
    type Error = X;

    fn apply(&self, value: T) -> Result<U, X> {
        (self.func)(value)
    }
}

/// Wrap `func` as an infallible [`Transform`].
pub fn map_fn<T, U, F>(func: F) -> MapFn<F, T>
where
    F: Fn(T) -> U,
{
    MapFn {
        func,
        _input: PhantomData,
    }
}

/// Wrap `func` as a fallible [`Transform`].
pub fn try_fn<T, U, X, F>(func: F) -> TryFn<F, T>
where
    F: Fn(T) -> Result<U, X>,
{
    TryFn {
        func,
        _input: PhantomData,
    }
}

impl<F, T> fmt::Debug for MapFn<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapFn").finish_non_exhaustive()
    }
}

impl<F, T> fmt::Debug for TryFn<F, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TryFn").finish_non_exhaustive()
    }
}

// =============================================================================
// TESTS
// =============================================================================
