//! # statebus
//!
//! **statebus** is the reactive core of a desktop utility: an in-process
//! broadcast bus for immutable state snapshots, plus a gated, observable
//! command abstraction for asynchronous actions.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   Producers (any thread)                       Consumers
//! ┌─────────────────────┐
//! │  file-load complete │──┐
//! │  IPC signal arrived │──┼─ dispatch() ─► ┌──────────────────────────────┐
//! │  UI edit event      │──┘    (inline)    │ Dispatcher                   │
//! └─────────────────────┘                   │  - delivery guard (ordered,  │
//!                                           │    reentrant)                │
//!                                           │  - Registration list         │
//!                                           └──┬─────────────┬────────────┘
//!                                              ▼             ▼
//!                                      Registration #1   Registration #N
//!                                      (queue + active)  (queue + active)
//!                                              ▼             ▼
//!                                        batch handler   batch handler
//!
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ ViewDispatcher<S> = Dispatcher + last_state: Option<Arc<S>>          │
//! │   internal register_last::<S> tracker records every delivered S      │
//! └──────────────────────────────────────────────────────────────────────┘
//!
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │ Command<I, O>                                                        │
//! │   gate (watch) ──┐                                                   │
//! │   executing flag ┴─► can_invoke (watch, replay-last)                 │
//! │   invoke(input) ───► action ───► results (broadcast of Ok/Err)       │
//! │                         └──────► is_executing (watch, replay-last)   │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Lifecycle
//! ```text
//! Registration: active ⇄ paused, then unregistered (terminal)
//!   - active: every matching state flushes to the handler immediately
//!   - paused: matching states buffer in order, nothing is lost
//!   - resume: the accumulated batch is delivered as one call
//!
//! Command: Idle → Executing → Idle (reusable, no terminal state)
//!   - gate closed  → invoke returns the default, nothing toggles
//!   - gate open    → is_executing: true … false, even on failure
//! ```
//!
//! ## Features
//! | Area            | Description                                              | Key types                         |
//! |-----------------|----------------------------------------------------------|-----------------------------------|
//! | **Broadcast**   | Ordered inline fan-out of immutable state snapshots.     | [`Dispatcher`], [`StateObject`]   |
//! | **Backpressure**| Per-subscriber pause/resume with lossless buffering.     | [`Registration`]                  |
//! | **View state**  | Latest-snapshot tracking for a UI surface.               | [`ViewDispatcher`]                |
//! | **Commands**    | Gated, observable async actions with combinators.        | [`Command`], [`Action`]           |
//! | **Errors**      | Clonable failure values on command result streams.       | [`CommandError`]                  |
//!
//! ## Example
//! ```rust
//! use statebus::{Command, Dispatcher, StateObject};
//!
//! #[derive(Debug, Clone)]
//! struct DocumentState {
//!     text: String,
//! }
//! impl StateObject for DocumentState {}
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() {
//!     // One bus for the whole composition root; clones share the stream.
//!     let bus = Dispatcher::new();
//!
//!     let render = bus.register_last::<DocumentState>(|state| {
//!         println!("render: {}", state.text);
//!     });
//!
//!     bus.dispatch(DocumentState { text: "hello".into() });
//!
//!     // A command with dynamic enablement and contained failures.
//!     let word_count = Command::from_fn(|text: String| text.split_whitespace().count());
//!     assert_eq!(word_count.invoke("one two three".into()).await, 3);
//!
//!     render.unregister();
//! }
//! ```

mod command;
mod dispatch;
mod error;
mod state;

// ---- Public re-exports ----

pub use command::{Action, ActionFn, ActionRef, Command, CommandBuilder};
pub use dispatch::{Dispatcher, Registration, ViewDispatcher};
pub use error::CommandError;
pub use state::{StateObject, StateRef};
