//! State broadcast: dispatcher, registrations, and the view specialization.
//!
//! This module groups the broadcast **stream** ([`Dispatcher`]), the
//! per-subscriber **handle** ([`Registration`]) with its pause/resume
//! buffering, and the **last-value tracker** ([`ViewDispatcher`]) that backs
//! a UI surface with a single immutable snapshot.
//!
//! ## Quick reference
//! - **Producers**: anything holding a (cloned) dispatcher handle; `dispatch`
//!   is callable from any thread and delivers inline.
//! - **Consumers**: register with `register_all` / `register_filtered` for
//!   ordered batches, or `register_last::<S>` for last-write-wins snapshots.
//!
//! See the crate docs for the system-level wiring diagram.

mod dispatcher;
mod registration;
mod view;

pub use dispatcher::Dispatcher;
pub use registration::Registration;
pub use view::ViewDispatcher;
