// Dispatcher - synchronous call bridge into the UI event loop
//
// Only one thread owns the UI toolkit. Every other thread reaches it through
// the dispatcher: work is boxed, pushed onto the loop's queue and the caller
// waits on a reply channel until the loop has run it. Native toolkit events share
// the same queue (via `EventSender`), so dispatched work and input are
// processed strictly in arrival order.

use crate::error::{Error, Result, panic_message};
use crate::metrics::Metrics;
use crate::ui::context::UiContext;
use crate::ui::toolkit::UiEvent;
use std::cell::RefCell;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc as std_mpsc;
use std::sync::{Arc, PoisonError, RwLock};
use std::thread::{self, ThreadId};
use tokio::sync::{mpsc, oneshot};

/// Work queued for the UI thread.
pub(crate) type Job = Box<dyn FnOnce(&UiContext) + Send>;

/// Everything the UI loop pulls off its queue.
pub(crate) enum UiMessage {
    Call(Job),
    Event(UiEvent),
}

enum LoopState {
    Idle,
    Running {
        tx: mpsc::UnboundedSender<UiMessage>,
        ui_thread: ThreadId,
    },
    Closed,
}

struct DispatcherShared {
    id: u64,
    state: RwLock<LoopState>,
    metrics: Arc<Metrics>,
}

static NEXT_DISPATCHER_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // The context the UI loop on this thread is currently serving, keyed by
    // dispatcher id. Used by inline calls made from the UI thread itself.
    static ACTIVE_UI: RefCell<Option<(u64, Rc<UiContext>)>> = const { RefCell::new(None) };
}

/// Cross-context call bridge into the UI execution context.
///
/// Cheap to clone; every clone talks to the same loop. Created once per
/// [`Session`](crate::session::Session) and unusable (every call returns
/// [`Error::DispatcherUnavailable`]) before the session starts and after it
/// closes.
///
/// # Example
/// ```ignore
/// let status = dispatcher.run_on_ui_context(|ui| {
///     ui.create_widget(PlacementId::ROOT, &WidgetSpec::Label { text: "Ready".into() })
/// })??;
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    shared: Arc<DispatcherShared>,
}

impl Dispatcher {
    pub(crate) fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            shared: Arc::new(DispatcherShared {
                id: NEXT_DISPATCHER_ID.fetch_add(1, Ordering::Relaxed),
                state: RwLock::new(LoopState::Idle),
                metrics,
            }),
        }
    }

    /// Run `work` on the UI thread and return its result.
    ///
    /// Blocks the calling thread until the UI loop has executed the work.
    /// From the UI thread itself the work runs inline instead of being
    /// queued. A panic inside `work` is caught on the UI thread and returned
    /// as [`Error::WorkPanicked`]; an `Err` returned by `work` is handed back
    /// untouched inside `R`.
    ///
    /// The wait is a plain thread block, so this also works from a thread
    /// driving a tokio runtime (it stalls that runtime's other tasks for the
    /// duration; prefer [`run_on_ui_context_async`](Self::run_on_ui_context_async)
    /// there). Must not be called while holding a lock the UI thread may need.
    pub fn run_on_ui_context<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&UiContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_ui_context() {
            return self.run_inline(work);
        }

        let (reply_tx, reply_rx) = std_mpsc::sync_channel(1);
        self.enqueue_call(work, move |outcome| {
            let _ = reply_tx.send(outcome);
        })?;
        Self::settle(reply_rx.recv().ok())
    }

    /// Async flavor of [`run_on_ui_context`](Self::run_on_ui_context).
    pub async fn run_on_ui_context_async<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&UiContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        if self.is_ui_context() {
            return self.run_inline(work);
        }

        let (reply_tx, reply_rx) = oneshot::channel();
        self.enqueue_call(work, move |outcome| {
            // The caller may have given up (its future was dropped).
            let _ = reply_tx.send(outcome);
        })?;
        Self::settle(reply_rx.await.ok())
    }

    /// Queue `work` for the UI thread without waiting for it.
    ///
    /// Always queued, even from the UI thread, so it runs after whatever is
    /// currently executing. Panics are logged and swallowed.
    pub fn post<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(&UiContext) + Send + 'static,
    {
        let metrics = Arc::clone(&self.shared.metrics);
        let job: Job = Box::new(move |ui| {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| work(ui))) {
                metrics.record_work_panic();
                tracing::error!("Posted UI work panicked: {}", panic_message(payload));
            }
        });
        self.send(UiMessage::Call(job))?;
        self.shared.metrics.record_posted();
        Ok(())
    }

    /// True when called on the thread currently running this dispatcher's loop.
    pub fn is_ui_context(&self) -> bool {
        match &*self.read_state() {
            LoopState::Running { ui_thread, .. } => *ui_thread == thread::current().id(),
            _ => false,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(&*self.read_state(), LoopState::Running { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(&*self.read_state(), LoopState::Closed)
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.shared.metrics)
    }

    /// Handle for toolkits to feed native input into the loop.
    pub fn event_sender(&self) -> EventSender {
        EventSender {
            dispatcher: self.clone(),
        }
    }

    /// Switch to running on the current thread and hand back the queue's
    /// receiving end. Fails if the dispatcher was already started.
    pub(crate) fn activate(
        &self,
        ui: Rc<UiContext>,
    ) -> Result<mpsc::UnboundedReceiver<UiMessage>> {
        let mut state = self.write_state();
        if !matches!(&*state, LoopState::Idle) {
            return Err(Error::DispatcherUnavailable);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *state = LoopState::Running {
            tx,
            ui_thread: thread::current().id(),
        };
        drop(state);

        ACTIVE_UI.with(|slot| *slot.borrow_mut() = Some((self.shared.id, ui)));
        tracing::debug!("Dispatcher {} running on {:?}", self.shared.id, thread::current().id());
        Ok(rx)
    }

    /// Stop accepting work. Returns true if this call did the transition.
    pub(crate) fn mark_closed(&self) -> bool {
        let mut state = self.write_state();
        let was_running = matches!(&*state, LoopState::Running { .. });
        *state = LoopState::Closed;
        was_running
    }

    /// Forget the UI context installed by [`activate`](Self::activate).
    pub(crate) fn deactivate(&self) {
        ACTIVE_UI.with(|slot| {
            let mut slot = slot.borrow_mut();
            if matches!(slot.as_ref(), Some((id, _)) if *id == self.shared.id) {
                *slot = None;
            }
        });
    }

    fn run_inline<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&UiContext) -> R,
    {
        let active = ACTIVE_UI
            .with(|slot| {
                slot.borrow()
                    .as_ref()
                    .filter(|(id, _)| *id == self.shared.id)
                    .map(|(_, ui)| Rc::clone(ui))
            })
            .ok_or(Error::DispatcherUnavailable)?;
        let ui: &UiContext = &active;

        self.shared.metrics.record_inline_call();
        catch_unwind(AssertUnwindSafe(|| work(ui))).map_err(|payload| {
            self.shared.metrics.record_work_panic();
            Error::WorkPanicked(panic_message(payload))
        })
    }

    /// Queue `work`; `reply` receives its outcome on the UI thread. If the
    /// loop shuts down first the job is dropped and `reply` never runs.
    fn enqueue_call<F, R, S>(&self, work: F, reply: S) -> Result<()>
    where
        F: FnOnce(&UiContext) -> R + Send + 'static,
        R: Send + 'static,
        S: FnOnce(std::result::Result<R, String>) + Send + 'static,
    {
        let metrics = Arc::clone(&self.shared.metrics);

        let job: Job = Box::new(move |ui| {
            let outcome = catch_unwind(AssertUnwindSafe(|| work(ui))).map_err(|payload| {
                metrics.record_work_panic();
                let message = panic_message(payload);
                tracing::warn!("Dispatched UI work panicked: {}", message);
                message
            });
            reply(outcome);
        });

        self.send(UiMessage::Call(job))?;
        self.shared.metrics.record_dispatched_call();
        Ok(())
    }

    /// `None` means the reply slot was dropped unfilled.
    fn settle<R>(reply: Option<std::result::Result<R, String>>) -> Result<R> {
        match reply {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(Error::WorkPanicked(message)),
            // The job was dropped unexecuted: the loop shut down under us.
            None => Err(Error::SessionClosed),
        }
    }

    pub(crate) fn send(&self, message: UiMessage) -> Result<()> {
        let state = self.read_state();
        match &*state {
            LoopState::Running { tx, .. } => tx.send(message).map_err(|_| {
                self.shared.metrics.record_unavailable();
                Error::DispatcherUnavailable
            }),
            LoopState::Idle | LoopState::Closed => {
                self.shared.metrics.record_unavailable();
                Err(Error::DispatcherUnavailable)
            }
        }
    }

    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, LoopState> {
        self.shared.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, LoopState> {
        self.shared.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.read_state() {
            LoopState::Idle => "idle",
            LoopState::Running { .. } => "running",
            LoopState::Closed => "closed",
        };
        f.debug_struct("Dispatcher")
            .field("id", &self.shared.id)
            .field("state", &state)
            .finish()
    }
}

/// Lightweight handle a toolkit uses to deliver native input to the loop.
#[derive(Clone, Debug)]
pub struct EventSender {
    dispatcher: Dispatcher,
}

impl EventSender {
    /// Queue a native event. Fails with [`Error::DispatcherUnavailable`] when
    /// the loop is not running.
    pub fn send(&self, event: UiEvent) -> Result<()> {
        self.dispatcher.send(UiMessage::Event(event))
    }
}
