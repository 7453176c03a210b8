//! # Action abstraction and function-backed implementation.
//!
//! This module defines the [`Action`] trait (the asynchronous unit of work a
//! [`Command`](crate::Command) wraps) and a convenient closure-backed
//! implementation, [`ActionFn`]. The common handle type is [`ActionRef`], an
//! `Arc<dyn Action>` suitable for sharing across commands and combinators.
//!
//! An action reports failure by returning `Err`; the owning command contains
//! the failure and never lets it reach the invoking caller.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::CommandError;

/// Shared handle to an action.
pub type ActionRef<I, O> = Arc<dyn Action<I, O>>;

/// # Asynchronous, fallible unit of work.
///
/// Implement this on a service type when the work needs its own state, or use
/// [`ActionFn`] to wrap a closure.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use statebus::{Action, CommandError};
///
/// struct Doubler;
///
/// #[async_trait]
/// impl Action<i32, i32> for Doubler {
///     async fn run(&self, input: i32) -> Result<i32, CommandError> {
///         Ok(input * 2)
///     }
/// }
/// ```
#[async_trait]
pub trait Action<I, O>: Send + Sync + 'static
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Executes the work for one invocation.
    async fn run(&self, input: I) -> Result<O, CommandError>;
}

/// Function-backed action implementation.
///
/// Wraps a closure that *creates* a new future per invocation, so there is no
/// hidden shared mutation between runs; share state explicitly with `Arc`
/// inside the closure when needed.
pub struct ActionFn<F> {
    f: F,
}

impl<F> ActionFn<F> {
    /// Creates a new function-backed action.
    ///
    /// Prefer [`ActionFn::arc`] when you immediately need an [`ActionRef`].
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the action and returns it as a shared handle.
    ///
    /// ## Example
    /// ```rust
    /// use statebus::{ActionFn, ActionRef, CommandError};
    ///
    /// let double: ActionRef<i32, i32> =
    ///     ActionFn::arc(|x: i32| async move { Ok::<_, CommandError>(x * 2) });
    /// ```
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut, I, O> Action<I, O> for ActionFn<F>
where
    F: Fn(I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<O, CommandError>> + Send + 'static,
    I: Send + 'static,
    O: Send + 'static,
{
    async fn run(&self, input: I) -> Result<O, CommandError> {
        (self.f)(input).await
    }
}
