//! # Dispatcher: ordered broadcast of immutable state.
//!
//! [`Dispatcher`] owns one broadcast stream of [`StateRef`] values and the
//! registrations subscribed to it. Delivery is synchronous: every
//! currently-active registration receives a state before `dispatch` returns,
//! on the calling thread.
//!
//! ## Architecture
//! ```text
//! Producers (any thread):                Subscribers:
//!   file-load done  ──┐
//!   pipe signal     ──┼── dispatch() ──► [delivery guard]
//!   UI edit event   ──┘                      │  total order, reentrant
//!                                            ├──► Registration #1 ─► batch handler
//!                                            ├──► Registration #2 ─► batch handler
//!                                            └──► Registration #N ─► batch handler
//! ```
//!
//! ## Rules
//! - **Total order**: all registrations of one dispatcher observe states in
//!   the same order; nothing is guaranteed across dispatcher instances.
//! - **Inline delivery**: `dispatch` never suspends and never fails. A
//!   panicking handler is contained by its registration.
//! - **Reentrant**: a handler may call `dispatch` on the same dispatcher;
//!   the nested state is queued and delivered by the in-flight loop once the
//!   current state has reached every registration, keeping the order
//!   identical for all subscribers.
//! - **No marshaling**: delivery happens on whatever thread dispatched.
//!   Hopping onto a UI thread is the consumer's responsibility.
//!
//! Many dispatchers may coexist (one application-wide, one per view); each
//! is an independent stream with independent subscribers and its own locks,
//! so a slow handler on one bus never stalls another.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{ReentrantMutex, RwLock};
use tracing::trace;

use crate::state::{StateObject, StateRef};

use super::registration::{BatchHandler, Predicate, Registration, RegistrationInner};

/// Outbound states plus the flag marking a drain loop in flight, mutated
/// together under the delivery lock.
struct DeliveryQueue {
    delivering: bool,
    pending: VecDeque<StateRef>,
}

/// Shared core of one broadcast stream.
pub(crate) struct BusCore {
    /// Serializes delivery across threads; reentrant so handlers can
    /// dispatch on the same bus from within a delivery.
    delivery: ReentrantMutex<RefCell<DeliveryQueue>>,
    registrations: RwLock<Vec<Arc<RegistrationInner>>>,
    next_id: AtomicU64,
    seq: AtomicU64,
}

impl BusCore {
    fn new() -> Self {
        Self {
            delivery: ReentrantMutex::new(RefCell::new(DeliveryQueue {
                delivering: false,
                pending: VecDeque::new(),
            })),
            registrations: RwLock::new(Vec::new()),
            next_id: AtomicU64::new(0),
            seq: AtomicU64::new(0),
        }
    }

    fn broadcast(&self, state: StateRef) {
        let guard = self.delivery.lock();
        {
            let mut queue = guard.borrow_mut();
            queue.pending.push_back(state);
            if queue.delivering {
                // Dispatched from inside a handler: the in-flight drain loop
                // on this thread picks it up after the current state has
                // reached every registration.
                return;
            }
            queue.delivering = true;
        }
        loop {
            let next = guard.borrow_mut().pending.pop_front();
            let Some(state) = next else { break };
            let seq = self.seq.fetch_add(1, Ordering::Relaxed);
            // Snapshot outside the loop: registering from inside a handler
            // takes effect from the next broadcast, not mid-delivery.
            let snapshot: Vec<Arc<RegistrationInner>> =
                self.registrations.read_recursive().iter().cloned().collect();
            trace!(seq, registrations = snapshot.len(), "broadcasting state");
            for registration in &snapshot {
                registration.offer(&state);
            }
        }
        guard.borrow_mut().delivering = false;
    }

    fn insert(&self, registration: Arc<RegistrationInner>) {
        self.registrations.write().push(registration);
    }

    pub(crate) fn remove(&self, id: u64) {
        self.registrations.write().retain(|r| r.id() != id);
    }

    fn len(&self) -> usize {
        self.registrations.read().len()
    }
}

/// Broadcast stream of immutable state with per-subscriber buffering.
///
/// Cheap to clone; clones share the same stream (the handle wraps an `Arc`).
/// Construct one explicitly and pass it where it is needed; there is no
/// process-wide instance.
///
/// ## Example
/// ```rust
/// use statebus::{Dispatcher, StateObject};
///
/// #[derive(Debug, Clone, PartialEq)]
/// struct Saved { path: String }
/// impl StateObject for Saved {}
///
/// let bus = Dispatcher::new();
/// let reg = bus.register_last::<Saved>(|saved| {
///     assert_eq!(saved.path, "notes.txt");
/// });
/// bus.dispatch(Saved { path: "notes.txt".into() });
/// reg.unregister();
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    core: Arc<BusCore>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    /// Creates an independent broadcast stream.
    pub fn new() -> Self {
        Self {
            core: Arc::new(BusCore::new()),
        }
    }

    /// Pushes a state onto the stream.
    ///
    /// Every currently-active registration whose predicate matches receives
    /// it before this call returns, on the calling thread. Never fails; a
    /// panicking handler degrades only its own registration.
    ///
    /// When called from inside a handler the state is queued behind the one
    /// being delivered and drained before the outermost `dispatch` returns,
    /// so every registration still observes the same order.
    pub fn dispatch<S: StateObject>(&self, state: S) {
        trace!(state = ?state, "dispatch");
        self.core.broadcast(Arc::new(state));
    }

    /// Pushes an already-shared state onto the stream without re-wrapping.
    pub fn dispatch_shared<S: StateObject>(&self, state: Arc<S>) {
        trace!(state = ?state, "dispatch");
        self.core.broadcast(state);
    }

    fn register(&self, predicate: Predicate, handler: BatchHandler) -> Registration {
        let id = self.core.next_id.fetch_add(1, Ordering::Relaxed);
        let inner = Arc::new(RegistrationInner::new(id, predicate, handler));
        self.core.insert(Arc::clone(&inner));
        Registration::new(inner, Arc::downgrade(&self.core))
    }

    /// Subscribes to every state; the handler receives a fresh batch per
    /// delivery (one state while active, the full accumulation on resume).
    pub fn register_all(
        &self,
        handler: impl Fn(&[StateRef]) + Send + Sync + 'static,
    ) -> Registration {
        self.register(Box::new(|_| true), Box::new(handler))
    }

    /// Subscribes to states matching `predicate`, delivered as batches.
    pub fn register_filtered(
        &self,
        predicate: impl Fn(&StateRef) -> bool + Send + Sync + 'static,
        handler: impl Fn(&[StateRef]) + Send + Sync + 'static,
    ) -> Registration {
        self.register(Box::new(predicate), Box::new(handler))
    }

    /// Subscribes to states of type `S`, coalesced last-write-wins.
    ///
    /// Per delivery batch only the **final** `S` reaches the handler; earlier
    /// ones accumulated while paused are intentionally discarded. States are
    /// replacement snapshots, not deltas — a subscriber that missed five
    /// updates only needs the last one.
    pub fn register_last<S: StateObject>(
        &self,
        handler: impl Fn(Arc<S>) + Send + Sync + 'static,
    ) -> Registration {
        self.register(
            Box::new(|state: &StateRef| state.is::<S>()),
            Box::new(move |batch| {
                if let Some(last) = batch.last() {
                    if let Ok(state) = Arc::clone(last).downcast::<S>() {
                        handler(state);
                    }
                }
            }),
        )
    }

    /// As [`register_last`](Dispatcher::register_last), with an additional
    /// value-level predicate on `S`.
    pub fn register_last_filtered<S: StateObject>(
        &self,
        predicate: impl Fn(&S) -> bool + Send + Sync + 'static,
        handler: impl Fn(Arc<S>) + Send + Sync + 'static,
    ) -> Registration {
        self.register(
            Box::new(move |state: &StateRef| {
                state.downcast_ref::<S>().map_or(false, |s| predicate(s))
            }),
            Box::new(move |batch| {
                if let Some(last) = batch.last() {
                    if let Ok(state) = Arc::clone(last).downcast::<S>() {
                        handler(state);
                    }
                }
            }),
        )
    }

    /// Number of live registrations (diagnostic).
    pub fn registration_count(&self) -> usize {
        self.core.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Debug)]
    struct TextState(&'static str);
    impl StateObject for TextState {}

    #[derive(Debug)]
    struct CounterState(u64);
    impl StateObject for CounterState {}

    #[test]
    fn test_predicate_routing() {
        let bus = Dispatcher::new();
        let texts = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&texts);
        let _reg = bus.register_filtered(
            |s| s.is::<TextState>(),
            move |batch| {
                for s in batch {
                    sink.lock().unwrap().push(s.downcast_ref::<TextState>().unwrap().0);
                }
            },
        );

        bus.dispatch(TextState("a"));
        bus.dispatch(CounterState(1));
        bus.dispatch(TextState("b"));

        assert_eq!(*texts.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn test_all_registrations_observe_same_order() {
        let bus = Dispatcher::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        for log in [&first, &second] {
            let sink = Arc::clone(log);
            let _reg = bus.register_all(move |batch| {
                for s in batch {
                    if let Some(c) = s.downcast_ref::<CounterState>() {
                        sink.lock().unwrap().push(c.0);
                    }
                }
            });
        }

        for n in 0..10 {
            bus.dispatch(CounterState(n));
        }

        let first = first.lock().unwrap().clone();
        let second = second.lock().unwrap().clone();
        assert_eq!(first, (0..10).collect::<Vec<_>>());
        assert_eq!(first, second);
    }

    #[test]
    fn test_register_last_coalesces_to_final_value() {
        let bus = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reg = bus.register_last::<TextState>(move |state| {
            sink.lock().unwrap().push(state.0);
        });

        reg.pause();
        bus.dispatch(TextState("x"));
        bus.dispatch(TextState("y"));
        reg.resume();

        assert_eq!(*seen.lock().unwrap(), vec!["y"]);
    }

    #[test]
    fn test_register_last_delivers_each_while_active() {
        let bus = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _reg = bus.register_last::<TextState>(move |state| {
            sink.lock().unwrap().push(state.0);
        });

        bus.dispatch(TextState("x"));
        bus.dispatch(TextState("y"));

        assert_eq!(*seen.lock().unwrap(), vec!["x", "y"]);
    }

    #[test]
    fn test_register_last_filtered_applies_value_predicate() {
        let bus = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _reg = bus.register_last_filtered::<CounterState>(
            |c| c.0 % 2 == 0,
            move |state| {
                sink.lock().unwrap().push(state.0);
            },
        );

        for n in 0..5 {
            bus.dispatch(CounterState(n));
        }

        assert_eq!(*seen.lock().unwrap(), vec![0, 2, 4]);
    }

    #[test]
    fn test_handler_panic_does_not_stop_siblings() {
        let bus = Dispatcher::new();
        let _angry = bus.register_all(|_| panic!("handler bug"));
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let _calm = bus.register_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.dispatch(CounterState(1));
        bus.dispatch(CounterState(2));

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_nested_dispatch_from_handler() {
        let bus = Dispatcher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let echo_bus = bus.clone();
        let _echo = bus.register_last::<TextState>(move |state| {
            // Echo exactly once to avoid unbounded recursion.
            if state.0 == "ping" {
                echo_bus.dispatch(TextState("pong"));
            }
        });

        let sink = Arc::clone(&seen);
        let _log = bus.register_last::<TextState>(move |state| {
            sink.lock().unwrap().push(state.0);
        });

        bus.dispatch(TextState("ping"));

        assert_eq!(*seen.lock().unwrap(), vec!["ping", "pong"]);
    }

    #[test]
    fn test_registration_count_tracks_unregister() {
        let bus = Dispatcher::new();
        let a = bus.register_all(|_| {});
        let b = bus.register_all(|_| {});
        assert_eq!(bus.registration_count(), 2);
        a.unregister();
        assert_eq!(bus.registration_count(), 1);
        b.unregister();
        b.unregister();
        assert_eq!(bus.registration_count(), 0);
    }

    #[test]
    fn test_dispatch_shared_reuses_the_same_allocation() {
        let bus = Dispatcher::new();
        let state = Arc::new(TextState("shared"));
        let witness = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&witness);
        let _reg = bus.register_last::<TextState>(move |s| {
            *sink.lock().unwrap() = Some(s);
        });

        bus.dispatch_shared(Arc::clone(&state));

        let delivered = witness.lock().unwrap().take().unwrap();
        assert!(Arc::ptr_eq(&state, &delivered));
    }

    #[test]
    fn test_concurrent_dispatch_keeps_one_total_order() {
        let bus = Dispatcher::new();
        let first = Arc::new(Mutex::new(Vec::new()));
        let second = Arc::new(Mutex::new(Vec::new()));
        for log in [&first, &second] {
            let sink = Arc::clone(log);
            let _reg = bus.register_all(move |batch| {
                for s in batch {
                    if let Some(c) = s.downcast_ref::<CounterState>() {
                        sink.lock().unwrap().push(c.0);
                    }
                }
            });
        }

        let threads: Vec<_> = (0..4)
            .map(|t| {
                let bus = bus.clone();
                std::thread::spawn(move || {
                    for n in 0..50 {
                        bus.dispatch(CounterState(t * 1000 + n));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }

        let first = first.lock().unwrap().clone();
        let second = second.lock().unwrap().clone();
        assert_eq!(first.len(), 200);
        assert_eq!(first, second);
    }
}
