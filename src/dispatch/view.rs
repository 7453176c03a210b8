//! # ViewDispatcher: a bus that remembers the latest state of one type.
//!
//! [`ViewDispatcher<S>`] fills the role a view model usually plays, but holds
//! no individual properties: the whole surface is represented by the most
//! recent `S` snapshot. It owns a private [`Dispatcher`] plus a tracker
//! registration, installed at construction, that records every delivered `S`
//! into `last_state` — synchronously, during `dispatch`.
//!
//! Typical use: a view constructs one, dispatches an initial state right
//! away, registers its render callback with
//! [`register_last`](ViewDispatcher::register_last), and pauses/resumes that
//! registration as the surface hides and shows. Because the view's state is a
//! single immutable object, a destroyed surface can be rebuilt from
//! [`last_state`](ViewDispatcher::last_state) and resumed seamlessly.
//!
//! Operation states of other types may be dispatched on the same instance;
//! only `S` values touch `last_state`.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::state::{StateObject, StateRef};

use super::dispatcher::Dispatcher;
use super::registration::Registration;

/// A [`Dispatcher`] specialized to track the most recent `S`.
///
/// Clones share the same stream and the same tracked state.
///
/// ## Example
/// ```rust
/// use statebus::{StateObject, ViewDispatcher};
///
/// #[derive(Debug, Clone)]
/// struct EditorState { message: String }
/// impl StateObject for EditorState {}
///
/// let view = ViewDispatcher::<EditorState>::new();
/// assert!(view.last_state().is_none());
///
/// view.dispatch(EditorState { message: "hello".into() });
/// assert_eq!(view.last_state().unwrap().message, "hello");
/// ```
pub struct ViewDispatcher<S: StateObject> {
    bus: Dispatcher,
    last: Arc<RwLock<Option<Arc<S>>>>,
}

impl<S: StateObject> Clone for ViewDispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            last: Arc::clone(&self.last),
        }
    }
}

impl<S: StateObject> Default for ViewDispatcher<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: StateObject> ViewDispatcher<S> {
    /// Creates the bus and installs the internal last-state tracker.
    pub fn new() -> Self {
        let bus = Dispatcher::new();
        let last: Arc<RwLock<Option<Arc<S>>>> = Arc::new(RwLock::new(None));
        let sink = Arc::clone(&last);
        let _tracker = bus.register_last::<S>(move |state| {
            *sink.write() = Some(state);
        });
        Self { bus, last }
    }

    /// The most recently dispatched `S`, or `None` before the first one.
    pub fn last_state(&self) -> Option<Arc<S>> {
        self.last.read().clone()
    }

    /// The underlying bus, for wiring that needs the plain handle.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.bus
    }

    /// See [`Dispatcher::dispatch`].
    pub fn dispatch<T: StateObject>(&self, state: T) {
        self.bus.dispatch(state);
    }

    /// See [`Dispatcher::dispatch_shared`].
    pub fn dispatch_shared<T: StateObject>(&self, state: Arc<T>) {
        self.bus.dispatch_shared(state);
    }

    /// See [`Dispatcher::register_all`].
    pub fn register_all(
        &self,
        handler: impl Fn(&[StateRef]) + Send + Sync + 'static,
    ) -> Registration {
        self.bus.register_all(handler)
    }

    /// See [`Dispatcher::register_filtered`].
    pub fn register_filtered(
        &self,
        predicate: impl Fn(&StateRef) -> bool + Send + Sync + 'static,
        handler: impl Fn(&[StateRef]) + Send + Sync + 'static,
    ) -> Registration {
        self.bus.register_filtered(predicate, handler)
    }

    /// See [`Dispatcher::register_last`].
    pub fn register_last<T: StateObject>(
        &self,
        handler: impl Fn(Arc<T>) + Send + Sync + 'static,
    ) -> Registration {
        self.bus.register_last(handler)
    }

    /// See [`Dispatcher::register_last_filtered`].
    pub fn register_last_filtered<T: StateObject>(
        &self,
        predicate: impl Fn(&T) -> bool + Send + Sync + 'static,
        handler: impl Fn(Arc<T>) + Send + Sync + 'static,
    ) -> Registration {
        self.bus.register_last_filtered(predicate, handler)
    }
}
