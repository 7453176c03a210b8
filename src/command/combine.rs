//! # Combinators: building commands out of commands.
//!
//! Pure functions over commands producing new commands. A combined command
//! invokes its operands through their public `invoke`, so each operand's own
//! gating, default output, and error containment apply unchanged — a
//! combinator never bypasses a gate. The combined command itself carries the
//! default policy (no external gate, mutual exclusion on).
//!
//! ## Example
//! ```rust
//! use statebus::Command;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     let double = Command::from_fn(|x: i32| x * 2);
//!     let increment = Command::from_fn(|x: i32| x + 1);
//!
//!     // 5 * 2 = 10, then 10 + 1.
//!     assert_eq!(double.pipe(&increment).invoke(5).await, 11);
//! }
//! ```

use crate::command::action::ActionFn;
use crate::command::builder::DEFAULT_RESULT_CAPACITY;
use crate::command::core::Command;

impl<I, O> Command<I, O>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
{
    /// Runs `self` to completion, then `second`, handing the same input to
    /// both. The combined output is `second`'s; its default output is shared
    /// with `second`.
    pub fn sequence<O2>(&self, second: &Command<I, O2>) -> Command<I, O2>
    where
        I: Clone,
        O2: Clone + Send + 'static,
    {
        let first = self.clone();
        let next = second.clone();
        let action = ActionFn::arc(move |input: I| {
            let first = first.clone();
            let next = next.clone();
            async move {
                first.invoke(input.clone()).await;
                Ok(next.invoke(input).await)
            }
        });
        Command::assemble(
            action,
            None,
            second.default_factory(),
            false,
            DEFAULT_RESULT_CAPACITY,
        )
    }

    /// Runs `self`, feeding its output as `second`'s input.
    ///
    /// If `self` is suppressed by its own gate, its default output is what
    /// flows into `second` — the same value a direct caller would have seen.
    pub fn pipe<O2>(&self, second: &Command<O, O2>) -> Command<I, O2>
    where
        O2: Clone + Send + 'static,
    {
        let first = self.clone();
        let next = second.clone();
        let action = ActionFn::arc(move |input: I| {
            let first = first.clone();
            let next = next.clone();
            async move {
                let mid = first.invoke(input).await;
                Ok(next.invoke(mid).await)
            }
        });
        Command::assemble(
            action,
            None,
            second.default_factory(),
            false,
            DEFAULT_RESULT_CAPACITY,
        )
    }

    /// Adapts to a unit-input command by invoking with `I::default()`.
    ///
    /// Useful when wiring a parameterized command where an input-less one is
    /// expected.
    pub fn adapt_to_unit_input(&self) -> Command<(), O>
    where
        I: Default,
    {
        let this = self.clone();
        let action = ActionFn::arc(move |_: ()| {
            let this = this.clone();
            async move { Ok(this.invoke(I::default()).await) }
        });
        Command::assemble(
            action,
            None,
            self.default_factory(),
            false,
            DEFAULT_RESULT_CAPACITY,
        )
    }

    /// Invokes and drops the output, yielding an output-less command.
    pub fn discard_output(&self) -> Command<I, ()> {
        let this = self.clone();
        let action = ActionFn::arc(move |input: I| {
            let this = this.clone();
            async move {
                this.invoke(input).await;
                Ok(())
            }
        });
        Command::assemble(
            action,
            None,
            std::sync::Arc::new(|| ()),
            false,
            DEFAULT_RESULT_CAPACITY,
        )
    }
}
