//! # Builder for configuring commands.
//!
//! [`CommandBuilder`] bundles the optional pieces of a command: the external
//! gate, the simultaneous-execution policy, the result-stream capacity, and
//! the default output used for suppressed or failed invocations.
//!
//! ## Defaults
//! - no external gate (always invokable while idle)
//! - `allow_simultaneous = false` (mutual exclusion)
//! - `result_capacity = 16` (clamped to a minimum of 1)
//! - default output: `O::default()` via [`build`](CommandBuilder::build), or
//!   an explicit factory via
//!   [`build_with_default`](CommandBuilder::build_with_default)
//!
//! ## Example
//! ```rust
//! use statebus::{ActionFn, Command, CommandError};
//! use tokio::sync::watch;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let (enable, enabled) = watch::channel(true);
//!     let save = Command::builder(ActionFn::arc(|name: String| async move {
//!         Ok::<_, CommandError>(format!("saved {name}"))
//!     }))
//!     .gate(enabled)
//!     .build_with_default(|| String::from("not saved"));
//!
//!     assert_eq!(save.invoke("notes".into()).await, "saved notes");
//!
//!     enable.send(false).unwrap();
//!     assert_eq!(save.invoke("notes".into()).await, "not saved");
//! }
//! ```

use std::sync::Arc;

use tokio::sync::watch;

use crate::command::action::ActionRef;
use crate::command::core::Command;

/// Result-stream capacity used unless overridden.
pub(crate) const DEFAULT_RESULT_CAPACITY: usize = 16;

/// Consuming builder for [`Command`].
pub struct CommandBuilder<I, O> {
    action: ActionRef<I, O>,
    gate: Option<watch::Receiver<bool>>,
    allow_simultaneous: bool,
    result_capacity: usize,
}

impl<I, O> CommandBuilder<I, O>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
{
    pub(crate) fn new(action: ActionRef<I, O>) -> Self {
        Self {
            action,
            gate: None,
            allow_simultaneous: false,
            result_capacity: DEFAULT_RESULT_CAPACITY,
        }
    }

    /// Sets the external gate; the command may only run while the latest
    /// gate value is `true`.
    pub fn gate(mut self, gate: watch::Receiver<bool>) -> Self {
        self.gate = Some(gate);
        self
    }

    /// Allows overlapping invocations. When `false` (the default) a second
    /// invocation during execution returns the default output instead.
    pub fn allow_simultaneous(mut self, allow: bool) -> Self {
        self.allow_simultaneous = allow;
        self
    }

    /// Capacity of the result broadcast stream (minimum 1). Slow result
    /// subscribers that lag behind more than this many outcomes skip the
    /// oldest ones.
    pub fn result_capacity(mut self, capacity: usize) -> Self {
        self.result_capacity = capacity;
        self
    }

    /// Builds with `O::default()` as the suppressed/failed output.
    pub fn build(self) -> Command<I, O>
    where
        O: Default,
    {
        self.build_with_default(O::default)
    }

    /// Builds with an explicit default-output factory.
    pub fn build_with_default(
        self,
        default: impl Fn() -> O + Send + Sync + 'static,
    ) -> Command<I, O> {
        Command::assemble(
            self.action,
            self.gate,
            Arc::new(default),
            self.allow_simultaneous,
            self.result_capacity,
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::command::action::ActionFn;
    use crate::error::CommandError;

    use super::*;

    #[tokio::test]
    async fn test_build_uses_output_default() {
        let command = Command::builder(ActionFn::arc(|_: ()| async {
            Err::<i32, _>(CommandError::failed("no"))
        }))
        .build();
        assert_eq!(command.invoke(()).await, 0);
    }

    #[tokio::test]
    async fn test_build_with_default_overrides() {
        let command = Command::builder(ActionFn::arc(|_: ()| async {
            Err::<i32, _>(CommandError::failed("no"))
        }))
        .build_with_default(|| -7);
        assert_eq!(command.invoke(()).await, -7);
    }

    #[tokio::test]
    async fn test_result_capacity_is_clamped() {
        let command = Command::builder(ActionFn::arc(|x: i32| async move {
            Ok::<_, CommandError>(x)
        }))
        .result_capacity(0)
        .build();
        let mut results = command.results();
        command.invoke(3).await;
        assert_eq!(results.try_recv().unwrap(), Ok(3));
    }
}
