//! # Registration: one subscriber's view onto a broadcast stream.
//!
//! A [`Registration`] couples a predicate over incoming states with a batch
//! handler and a FIFO buffer. While paused, matching states accumulate in
//! order; on resume the whole accumulation is delivered as a single batch.
//! While active, each arrival is flushed immediately.
//!
//! ## Rules
//! - Buffer and flags are guarded **together** by one per-instance lock;
//!   there is no lock shared between unrelated registrations.
//! - Flush drains the buffer **before** invoking the handler, so delivery is
//!   at-most-once: a panicking handler never re-receives a poisoned batch.
//! - Handler panics are caught and logged; siblings and the dispatch loop
//!   are unaffected.
//! - The delivery lock is reentrant: a handler may dispatch on the same
//!   bus from within its own delivery without deadlocking.
//! - `unregister()` permanently detaches and is idempotent; a detached
//!   registration never observes another state.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use tracing::{error, trace};

use crate::error::panic_reason;
use crate::state::StateRef;

use super::dispatcher::BusCore;

pub(crate) type Predicate = Box<dyn Fn(&StateRef) -> bool + Send + Sync>;
pub(crate) type BatchHandler = Box<dyn Fn(&[StateRef]) + Send + Sync>;

/// Buffer and lifecycle flags, always mutated together under the slot lock.
struct Slot {
    queue: VecDeque<StateRef>,
    active: bool,
    detached: bool,
}

pub(crate) struct RegistrationInner {
    id: u64,
    predicate: Predicate,
    handler: BatchHandler,
    slot: ReentrantMutex<RefCell<Slot>>,
}

impl RegistrationInner {
    pub(crate) fn new(id: u64, predicate: Predicate, handler: BatchHandler) -> Self {
        Self {
            id,
            predicate,
            handler,
            slot: ReentrantMutex::new(RefCell::new(Slot {
                queue: VecDeque::new(),
                active: true,
                detached: false,
            })),
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Offers one broadcast state to this registration.
    ///
    /// Enqueues when the predicate matches; flushes immediately when active.
    /// A panicking predicate is treated as a non-match so the delivery loop
    /// stays intact.
    pub(crate) fn offer(&self, state: &StateRef) {
        let matches = panic::catch_unwind(AssertUnwindSafe(|| (self.predicate)(state)))
            .unwrap_or_else(|payload| {
                error!(
                    registration = self.id,
                    reason = %panic_reason(&*payload),
                    "state predicate panicked"
                );
                false
            });
        if !matches {
            return;
        }
        let guard = self.slot.lock();
        {
            let mut slot = guard.borrow_mut();
            if slot.detached {
                return;
            }
            slot.queue.push_back(Arc::clone(state));
            if !slot.active {
                trace!(registration = self.id, buffered = slot.queue.len(), "buffered while paused");
                return;
            }
        }
        self.flush(&guard);
    }

    /// Drains the buffer and delivers it as one batch, if non-empty.
    ///
    /// The cell borrow is released before the handler runs so the handler may
    /// re-enter the bus (nested dispatch) on the delivering thread.
    fn flush(&self, guard: &ReentrantMutexGuard<'_, RefCell<Slot>>) {
        let batch: Vec<StateRef> = {
            let mut slot = guard.borrow_mut();
            if slot.queue.is_empty() {
                return;
            }
            slot.queue.drain(..).collect()
        };
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| (self.handler)(&batch))) {
            error!(
                registration = self.id,
                batch = batch.len(),
                reason = %panic_reason(&*payload),
                "state handler panicked"
            );
        }
    }

    fn pause(&self) {
        let guard = self.slot.lock();
        let mut slot = guard.borrow_mut();
        if slot.detached {
            return;
        }
        slot.active = false;
    }

    fn resume(&self) {
        let guard = self.slot.lock();
        {
            let mut slot = guard.borrow_mut();
            if slot.detached {
                return;
            }
            slot.active = true;
        }
        self.flush(&guard);
    }

    fn detach(&self) -> bool {
        let guard = self.slot.lock();
        let mut slot = guard.borrow_mut();
        if slot.detached {
            return false;
        }
        slot.detached = true;
        slot.active = false;
        slot.queue.clear();
        true
    }

    fn is_active(&self) -> bool {
        let guard = self.slot.lock();
        let slot = guard.borrow();
        slot.active && !slot.detached
    }
}

/// Handle to one subscription on a [`Dispatcher`](crate::Dispatcher).
///
/// Cloning shares the same subscription. Dropping the handle does **not**
/// detach it; the owning dispatcher keeps delivering until [`unregister`]
/// is called.
///
/// [`unregister`]: Registration::unregister
#[derive(Clone)]
pub struct Registration {
    inner: Arc<RegistrationInner>,
    bus: Weak<BusCore>,
}

impl Registration {
    pub(crate) fn new(inner: Arc<RegistrationInner>, bus: Weak<BusCore>) -> Self {
        Self { inner, bus }
    }

    /// Stops delivery; arriving states accumulate in order until [`resume`].
    ///
    /// Typical use: a view pauses its registrations while hidden so no work
    /// is spent rendering invisible updates.
    ///
    /// [`resume`]: Registration::resume
    pub fn pause(&self) {
        self.inner.pause();
    }

    /// Re-enables delivery and flushes the accumulated buffer as one batch.
    ///
    /// An empty buffer produces no handler call. An arrival racing the flush
    /// either joins the flushed batch or is queued for the next delivery,
    /// never both and never lost.
    pub fn resume(&self) {
        self.inner.resume();
    }

    /// Permanently detaches from the broadcast stream. Idempotent.
    pub fn unregister(&self) {
        if !self.inner.detach() {
            return;
        }
        if let Some(bus) = self.bus.upgrade() {
            bus.remove(self.inner.id());
        }
    }

    /// True while the registration is delivering (not paused, not detached).
    pub fn is_active(&self) -> bool {
        self.inner.is_active()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use crate::dispatch::Dispatcher;
    use crate::state::StateObject;

    #[derive(Debug)]
    struct Tick(u32);
    impl StateObject for Tick {}

    fn collect_ticks(bus: &Dispatcher, log: &Arc<Mutex<Vec<Vec<u32>>>>) -> crate::Registration {
        let log = Arc::clone(log);
        bus.register_all(move |batch| {
            let values = batch
                .iter()
                .filter_map(|s| s.downcast_ref::<Tick>().map(|t| t.0))
                .collect();
            log.lock().unwrap().push(values);
        })
    }

    #[test]
    fn test_active_delivery_is_per_message() {
        let bus = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let _reg = collect_ticks(&bus, &log);

        bus.dispatch(Tick(1));
        bus.dispatch(Tick(2));
        bus.dispatch(Tick(3));

        assert_eq!(*log.lock().unwrap(), vec![vec![1], vec![2], vec![3]]);
    }

    #[test]
    fn test_pause_buffers_and_resume_flushes_once_in_order() {
        let bus = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let reg = collect_ticks(&bus, &log);

        reg.pause();
        bus.dispatch(Tick(1));
        bus.dispatch(Tick(2));
        bus.dispatch(Tick(3));
        assert!(log.lock().unwrap().is_empty());

        reg.resume();
        assert_eq!(*log.lock().unwrap(), vec![vec![1, 2, 3]]);
    }

    #[test]
    fn test_resume_with_empty_buffer_does_not_invoke() {
        let bus = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let reg = bus.register_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        reg.pause();
        reg.resume();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_pause_resume_cycles_lose_nothing() {
        let bus = Dispatcher::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        let reg = collect_ticks(&bus, &log);

        reg.pause();
        bus.dispatch(Tick(1));
        reg.resume();
        reg.pause();
        bus.dispatch(Tick(2));
        bus.dispatch(Tick(3));
        reg.resume();
        bus.dispatch(Tick(4));

        assert_eq!(
            *log.lock().unwrap(),
            vec![vec![1], vec![2, 3], vec![4]]
        );
    }

    #[test]
    fn test_unregister_is_idempotent_and_stops_delivery() {
        let bus = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let reg = bus.register_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        bus.dispatch(Tick(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        reg.unregister();
        reg.unregister();
        assert_eq!(bus.registration_count(), 0);

        bus.dispatch(Tick(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!reg.is_active());
    }

    #[test]
    fn test_unregister_while_paused_discards_buffer() {
        let bus = Dispatcher::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let reg = bus.register_all(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        reg.pause();
        bus.dispatch(Tick(1));
        reg.unregister();
        reg.resume();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_is_active_reflects_lifecycle() {
        let bus = Dispatcher::new();
        let reg = bus.register_all(|_| {});
        assert!(reg.is_active());
        reg.pause();
        assert!(!reg.is_active());
        reg.resume();
        assert!(reg.is_active());
    }
}
