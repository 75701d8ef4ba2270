//! Handler - payload から結果を計算する部分
//!
//! The worker knows nothing about what it computes; it hands every payload
//! to a [`Handler`] and delivers whatever comes back.

use std::marker::PhantomData;

use async_trait::async_trait;

use crate::error::HandlerError;

/// Computation plugged into a worker.
///
/// # 使用例
/// ```ignore
/// struct Double;
///
/// #[async_trait]
/// impl Handler for Double {
///     type Input = i64;
///     type Output = i64;
///
///     async fn handle(&self, input: i64) -> Result<i64, HandlerError> {
///         input.checked_mul(2).ok_or_else(|| HandlerError::new("overflow"))
///     }
/// }
/// ```
///
/// An `Err` (or a panic) only affects the item being handled.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    type Input: Send + 'static;
    type Output: Send + 'static;

    async fn handle(&self, input: Self::Input) -> Result<Self::Output, HandlerError>;
}

/// Returns every payload unchanged.
pub struct Passthrough<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> Passthrough<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for Passthrough<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Send + 'static> Handler for Passthrough<T> {
    type Input = T;
    type Output = T;

    async fn handle(&self, input: T) -> Result<T, HandlerError> {
        Ok(input)
    }
}

/// Adapter that turns a synchronous closure into a [`Handler`].
pub struct FnHandler<F, I, O> {
    f: F,
    _marker: PhantomData<fn(I) -> O>,
}

/// Wrap `f` so it can be given to a worker.
pub fn handler_fn<F, I, O>(f: F) -> FnHandler<F, I, O>
where
    F: Fn(I) -> Result<O, HandlerError> + Send + Sync + 'static,
{
    FnHandler {
        f,
        _marker: PhantomData,
    }
}

#[async_trait]
impl<F, I, O> Handler for FnHandler<F, I, O>
where
    F: Fn(I) -> Result<O, HandlerError> + Send + Sync + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    type Input = I;
    type Output = O;

    async fn handle(&self, input: I) -> Result<O, HandlerError> {
        (self.f)(input)
    }
}
