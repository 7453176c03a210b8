//! # Command: gated, observable asynchronous invocation.
//!
//! A [`Command`] wraps an [`Action`](crate::Action) and makes it reusable and
//! observable. Per instance the state machine is `Idle → Executing → Idle`
//! with no terminal state: `is_executing` broadcasts `true` on entry and
//! `false` on return to idle, **including on failure**.
//!
//! ## Invocation sequence
//! ```text
//! invoke(input)
//!   ├─ guard: bootstrap gate watcher (first use, check-then-set)
//!   ├─ guard: effective gate closed? ─► return default (nothing toggles)
//!   ├─ guard: executing = true, refresh can_invoke, is_executing ◄─ true
//!   ├─ run action (cooperative suspension; panics contained)
//!   │     ├─ Ok(value)  ─► results ◄─ Ok(value)
//!   │     └─ Err / panic ─► log, results ◄─ Err(CommandError)
//!   └─ guard: executing = false, refresh can_invoke, is_executing ◄─ false
//!        └─ return value, or the configured default on failure
//! ```
//!
//! ## Gate composition
//! With `allow_simultaneous == false` (the default) the effective gate is
//! `external_gate AND NOT executing`; with `true` it is the external gate
//! alone. Without an external gate the command is always invokable while
//! idle. A gate-denied invocation is not an error: the configured default is
//! returned and observers see no `is_executing` toggle at all.
//!
//! Failures never reach the invoking caller; they surface as
//! `Err(CommandError)` on the result stream, which stays alive for
//! subsequent invocations.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use parking_lot::Mutex;
use tokio::sync::{broadcast, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace, warn};

use crate::command::action::{ActionFn, ActionRef};
use crate::command::builder::CommandBuilder;
use crate::error::{panic_reason, CommandError};

/// Factory for the value returned when an invocation is suppressed or fails.
pub(crate) type DefaultFactory<O> = Arc<dyn Fn() -> O + Send + Sync>;

/// Flags mutated together under the command's own guard.
struct RunState {
    executing: bool,
    watcher_started: bool,
}

pub(crate) struct CommandInner<I, O> {
    action: ActionRef<I, O>,
    default: DefaultFactory<O>,
    allow_simultaneous: bool,
    gate: Option<watch::Receiver<bool>>,
    exec_tx: watch::Sender<bool>,
    exec_rx: watch::Receiver<bool>,
    can_tx: watch::Sender<bool>,
    can_rx: watch::Receiver<bool>,
    results_tx: broadcast::Sender<Result<O, CommandError>>,
    run: Mutex<RunState>,
}

impl<I, O> CommandInner<I, O>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
{
    fn gate_open(&self) -> bool {
        self.gate.as_ref().map_or(true, |g| *g.borrow())
    }

    fn effective_gate(&self, st: &RunState) -> bool {
        self.gate_open() && (self.allow_simultaneous || !st.executing)
    }

    fn refresh_can(&self, st: &RunState) {
        let open = self.effective_gate(st);
        self.can_tx.send_if_modified(|value| {
            if *value != open {
                *value = open;
                true
            } else {
                false
            }
        });
    }

    /// Lazily starts the task mirroring external gate changes into
    /// `can_invoke`. Check-then-set under the guard; retried until a runtime
    /// is available to spawn on.
    fn ensure_watcher(this: &Arc<Self>, st: &mut RunState) {
        if st.watcher_started {
            return;
        }
        let Some(mut gate) = this.gate.clone() else {
            // No external gate: can_invoke derives entirely from `executing`.
            st.watcher_started = true;
            return;
        };
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        st.watcher_started = true;
        let weak = Arc::downgrade(this);
        handle.spawn(async move {
            while gate.changed().await.is_ok() {
                let Some(inner) = weak.upgrade() else { break };
                let st = inner.run.lock();
                inner.refresh_can(&st);
            }
            trace!("gate watcher stopped");
        });
    }
}

/// Reusable, observable unit of asynchronous work.
///
/// Cheap to clone; clones share the action, the gate, and all streams.
/// An output-less command is simply `Command<I, ()>`.
///
/// ## Example
/// ```rust
/// use statebus::Command;
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let double = Command::from_fn(|x: i32| x * 2);
///     assert_eq!(double.invoke(21).await, 42);
/// }
/// ```
pub struct Command<I, O> {
    inner: Arc<CommandInner<I, O>>,
}

impl<I, O> Clone for Command<I, O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<I, O> Command<I, O>
where
    I: Send + 'static,
    O: Clone + Send + 'static,
{
    /// Starts configuring a command around `action`.
    pub fn builder(action: ActionRef<I, O>) -> CommandBuilder<I, O> {
        CommandBuilder::new(action)
    }

    pub(crate) fn assemble(
        action: ActionRef<I, O>,
        gate: Option<watch::Receiver<bool>>,
        default: DefaultFactory<O>,
        allow_simultaneous: bool,
        result_capacity: usize,
    ) -> Self {
        let (exec_tx, exec_rx) = watch::channel(false);
        let initially_open = gate.as_ref().map_or(true, |g| *g.borrow());
        let (can_tx, can_rx) = watch::channel(initially_open);
        let (results_tx, _) = broadcast::channel(result_capacity.max(1));
        Self {
            inner: Arc::new(CommandInner {
                action,
                default,
                allow_simultaneous,
                gate,
                exec_tx,
                exec_rx,
                can_tx,
                can_rx,
                results_tx,
                run: Mutex::new(RunState {
                    executing: false,
                    watcher_started: false,
                }),
            }),
        }
    }

    /// Invokes the action, returning its output.
    ///
    /// When the effective gate is closed the configured default is returned
    /// immediately: the action does **not** run and `is_executing` does not
    /// toggle. When the action fails the default is returned and the failure
    /// is published on [`results`](Command::results); nothing propagates to
    /// the caller.
    pub async fn invoke(&self, input: I) -> O {
        self.run_gated(input, None).await
    }

    /// As [`invoke`](Command::invoke), racing the action against `token`.
    ///
    /// On cancellation the action future is dropped, the result stream sees
    /// `Err(CommandError::Canceled)`, `is_executing` resets, and the default
    /// is returned. With an untriggered token behavior is exactly `invoke`.
    pub async fn invoke_cancellable(&self, input: I, token: CancellationToken) -> O {
        self.run_gated(input, Some(token)).await
    }

    /// Fire-and-forget: starts the invocation and discards its outcome.
    ///
    /// Use only when the caller provably does not need the result; the
    /// command's own streams still observe the run.
    pub fn invoke_detached(&self, input: I) {
        let command = self.clone();
        tokio::spawn(async move {
            let _ = command.invoke(input).await;
        });
    }

    async fn run_gated(&self, input: I, cancel: Option<CancellationToken>) -> O {
        {
            let mut st = self.inner.run.lock();
            CommandInner::ensure_watcher(&self.inner, &mut st);
            if !self.inner.effective_gate(&st) {
                drop(st);
                debug!("invocation suppressed by gate");
                return (self.inner.default)();
            }
            st.executing = true;
            self.inner.refresh_can(&st);
            self.inner.exec_tx.send_replace(true);
        }

        let guarded = AssertUnwindSafe(self.inner.action.run(input)).catch_unwind();
        let outcome = match cancel {
            None => guarded.await,
            Some(token) => tokio::select! {
                res = guarded => res,
                _ = token.cancelled() => Ok(Err(CommandError::Canceled)),
            },
        };

        let value = match outcome {
            Ok(Ok(value)) => {
                let _ = self.inner.results_tx.send(Ok(value.clone()));
                Some(value)
            }
            Ok(Err(err)) => {
                warn!(label = err.as_label(), error = %err, "command action failed");
                let _ = self.inner.results_tx.send(Err(err));
                None
            }
            Err(payload) => {
                let reason = panic_reason(&*payload);
                error!(reason = %reason, "command action panicked");
                let _ = self
                    .inner
                    .results_tx
                    .send(Err(CommandError::Panicked { reason }));
                None
            }
        };

        {
            let mut st = self.inner.run.lock();
            st.executing = false;
            self.inner.refresh_can(&st);
            self.inner.exec_tx.send_replace(false);
        }

        value.unwrap_or_else(|| (self.inner.default)())
    }

    /// Stream of the effective gate.
    ///
    /// Replay semantics: `borrow()` yields the current value immediately,
    /// `changed().await` waits for updates. External gate changes are
    /// mirrored live once the watcher has bootstrapped (first invocation, or
    /// this call when made inside a runtime).
    pub fn can_invoke(&self) -> watch::Receiver<bool> {
        let mut st = self.inner.run.lock();
        CommandInner::ensure_watcher(&self.inner, &mut st);
        self.inner.refresh_can(&st);
        self.inner.can_rx.clone()
    }

    /// Current value of the effective gate, sampled under the guard.
    pub fn can_invoke_now(&self) -> bool {
        let st = self.inner.run.lock();
        self.inner.effective_gate(&st)
    }

    /// Stream of the executing flag; replays the current value to new
    /// observers (`false` before the first invocation).
    pub fn is_executing(&self) -> watch::Receiver<bool> {
        self.inner.exec_rx.clone()
    }

    /// Subscribes to invocation outcomes.
    ///
    /// Successes arrive as `Ok(output)`, failures as `Err(CommandError)`;
    /// the stream stays alive across failures. Only outcomes sent after
    /// subscribing are observed.
    pub fn results(&self) -> broadcast::Receiver<Result<O, CommandError>> {
        self.inner.results_tx.subscribe()
    }

    pub(crate) fn default_factory(&self) -> DefaultFactory<O> {
        Arc::clone(&self.inner.default)
    }
}

impl<I, O> Command<I, O>
where
    I: Send + 'static,
    O: Clone + Default + Send + 'static,
{
    /// Wraps an action with default policy: no external gate, mutual
    /// exclusion on, `O::default()` as the suppressed/failed output.
    pub fn new(action: ActionRef<I, O>) -> Self {
        Self::builder(action).build()
    }

    /// Wraps an async closure. See [`Command::new`] for the policy.
    pub fn from_async<F, Fut>(f: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<O, CommandError>> + Send + 'static,
    {
        Self::new(ActionFn::arc(f))
    }

    /// Wraps an infallible synchronous closure. See [`Command::new`] for the
    /// policy.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: Fn(I) -> O + Send + Sync + 'static,
    {
        Self::new(ActionFn::arc(move |input| std::future::ready(Ok(f(input)))))
    }
}
