//! # Broadcastable state: marker trait and erased handle.
//!
//! A state object is an immutable snapshot: once constructed no field is ever
//! mutated, and new states are produced by copy-with-modification. The bus
//! shares states behind [`Arc`] handles and never clones or touches payloads.
//!
//! ## Opting a type in
//! ```rust
//! use statebus::StateObject;
//!
//! #[derive(Debug, Clone)]
//! struct EditorState {
//!     message: String,
//!     cursor: usize,
//! }
//!
//! impl StateObject for EditorState {}
//! ```
//!
//! ## Rules
//! - Dispatch entry points are generic over `S: StateObject`, so only opted-in
//!   types enter a bus.
//! - Inside the bus a state travels as a [`StateRef`]; typed subscription
//!   helpers recover `Arc<S>` via a downcast, so filtering stays a static
//!   type check at the registration site.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Marker capability for immutable, broadcastable state.
///
/// Implement with an empty `impl` block. The `Debug` bound lets dispatch
/// sites trace outgoing states before type erasure.
pub trait StateObject: fmt::Debug + Send + Sync + 'static {}

/// Shared, type-erased handle to a dispatched state.
///
/// Batch handlers registered with
/// [`Dispatcher::register_all`](crate::Dispatcher::register_all) receive
/// slices of these; `StateRef::downcast_ref::<S>()` recovers a concrete view.
pub type StateRef = Arc<dyn Any + Send + Sync>;
