// Session - UI loop and logic thread lifecycle
//
// `Session::run` turns the calling thread into the UI thread: it builds the
// initial layout, starts the logic thread, then pumps the dispatcher queue
// until the session is closed. Teardown order matters:
// 1. Stop accepting work (dispatcher closed)
// 2. Drop whatever is still queued, which fails pending calls with SessionClosed
// 3. Close every prompt, which wakes blocked waiters with SessionClosed
// 4. Join the logic thread

use crate::clock::{Clock, MonotonicClock, SharedClock, SystemClock, Timestamp};
use crate::error::{Error, Result, panic_message};
use crate::events::{SessionEvent, SessionEvents};
use crate::metrics::Metrics;
use crate::models::{ClockSource, SessionConfig};
use crate::prompt::{Prompt, PromptSetup};
use crate::ui::bridge::{Dispatcher, EventSender, UiMessage};
use crate::ui::context::UiContext;
use crate::ui::toolkit::{PlacementId, Toolkit};
use anyhow::{Context, anyhow};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info, warn};

/// One UI session: a toolkit, its event loop and a logic thread.
///
/// # Example
/// ```ignore
/// let session = Session::new(HeadlessToolkit::new(), SessionConfig::default());
/// let total = session.run(
///     |_ui| Ok(()),
///     |handle| {
///         let prompt = handle.add_prompt(presets::text_entry("Name?"))?;
///         let answer = prompt.ask()?;
///         handle.close()?;
///         Ok(answer.value.len())
///     },
/// )?;
/// ```
pub struct Session {
    toolkit: Box<dyn Toolkit>,
    handle: SessionHandle,
}

impl Session {
    pub fn new(toolkit: impl Toolkit + 'static, config: SessionConfig) -> Self {
        let clock = match config.clock {
            ClockSource::System => SharedClock::new(SystemClock),
            ClockSource::Monotonic => SharedClock::new(MonotonicClock::new()),
        };
        let metrics = Arc::new(Metrics::new());

        Self {
            toolkit: Box::new(toolkit),
            handle: SessionHandle {
                inner: Arc::new(SessionInner {
                    dispatcher: Dispatcher::new(metrics),
                    clock,
                    events: SessionEvents::new(),
                    config,
                }),
            },
        }
    }

    /// Start with `clock` instead of the configured one.
    pub fn with_clock(self, clock: impl Clock + 'static) -> Self {
        self.handle.inner.clock.replace(clock);
        self
    }

    /// A handle usable before, during and after [`run`](Self::run).
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Run the session on the current thread until it is closed.
    ///
    /// # Arguments
    /// * `initial_layout` - Builds the initial UI, on this thread, before the
    ///   logic starts
    /// * `logic` - Application logic, run on its own thread
    ///
    /// # Returns
    /// The logic's result once the loop has exited and the logic thread has
    /// been joined. A failing initial layout ends the session before the
    /// logic thread is started.
    pub fn run<L, F, R>(self, initial_layout: L, logic: F) -> anyhow::Result<R>
    where
        L: FnOnce(&UiContext) -> Result<()>,
        F: FnOnce(SessionHandle) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let Session {
            mut toolkit,
            handle,
        } = self;
        let inner = &handle.inner;

        toolkit.set_title(&inner.config.title);
        toolkit.set_min_size(inner.config.min_width, inner.config.min_height);
        toolkit.attach(inner.dispatcher.event_sender());

        let ui = Rc::new(UiContext::new(
            toolkit,
            inner.dispatcher.clone(),
            inner.clock.clone(),
            inner.events.clone(),
            inner.config.clone(),
        ));
        let mut rx = inner
            .dispatcher
            .activate(Rc::clone(&ui))
            .context("Session was already started")?;

        info!("Session '{}' started", inner.config.title);
        inner.events.emit(SessionEvent::Started);

        if let Err(e) = initial_layout(ui.as_ref()) {
            Self::teardown(&ui, &mut rx);
            return Err(anyhow::Error::new(e).context("Initial layout failed"));
        }

        let logic_thread = match Self::spawn_logic(handle.clone(), logic) {
            Ok(thread) => thread,
            Err(e) => {
                Self::teardown(&ui, &mut rx);
                return Err(e);
            }
        };

        Self::pump(&ui, &mut rx);
        Self::teardown(&ui, &mut rx);
        drop(ui);

        match logic_thread.join() {
            Ok(outcome) => outcome,
            Err(payload) => Err(anyhow!("Logic thread panicked: {}", panic_message(payload))),
        }
    }

    fn spawn_logic<F, R>(
        handle: SessionHandle,
        logic: F,
    ) -> anyhow::Result<thread::JoinHandle<anyhow::Result<R>>>
    where
        F: FnOnce(SessionHandle) -> anyhow::Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let name = handle.inner.config.logic_thread_name.clone();
        let close_on_exit = handle.inner.config.close_when_logic_exits;

        thread::Builder::new()
            .name(name)
            .spawn(move || {
                let outcome = catch_unwind(AssertUnwindSafe(|| logic(handle.clone())));
                if close_on_exit {
                    if let Err(e) = handle.close() {
                        warn!("Failed to close session after logic exit: {}", e);
                    }
                }
                match outcome {
                    Ok(result) => result,
                    Err(payload) => resume_unwind(payload),
                }
            })
            .context("Failed to spawn logic thread")
    }

    fn pump(ui: &UiContext, rx: &mut mpsc::UnboundedReceiver<UiMessage>) {
        let metrics = ui.dispatcher().metrics();

        while !ui.is_close_requested() {
            let Some(message) = rx.blocking_recv() else {
                break;
            };
            match message {
                UiMessage::Call(job) => job(ui),
                UiMessage::Event(event) => {
                    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| ui.dispatch_event(&event))) {
                        metrics.record_work_panic();
                        error!("Handler for {:?} panicked: {}", event, panic_message(payload));
                    }
                }
            }
        }
    }

    fn teardown(ui: &UiContext, rx: &mut mpsc::UnboundedReceiver<UiMessage>) {
        ui.request_close();
        rx.close();

        let mut dropped = 0;
        while rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            debug!("Dropped {} queued messages at shutdown", dropped);
        }

        ui.registry().close_all(ui);
        ui.dispatcher().deactivate();
        ui.events().emit(SessionEvent::Closed);
        info!("Session '{}' closed", ui.config().title);
        ui.dispatcher().metrics().log_summary();
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session").field("handle", &self.handle).finish()
    }
}

struct SessionInner {
    dispatcher: Dispatcher,
    clock: SharedClock,
    events: SessionEvents,
    config: SessionConfig,
}

/// Cloneable, thread-safe access to a session.
///
/// Everything that touches the UI goes through the dispatcher, so every
/// method may be called from any thread, including the UI thread itself.
#[derive(Clone)]
pub struct SessionHandle {
    inner: Arc<SessionInner>,
}

impl SessionHandle {
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// See [`Dispatcher::run_on_ui_context`].
    pub fn run_on_ui_context<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&UiContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.inner.dispatcher.run_on_ui_context(work)
    }

    /// See [`Dispatcher::run_on_ui_context_async`].
    pub async fn run_on_ui_context_async<F, R>(&self, work: F) -> Result<R>
    where
        F: FnOnce(&UiContext) -> R + Send + 'static,
        R: Send + 'static,
    {
        self.inner.dispatcher.run_on_ui_context_async(work).await
    }

    /// See [`Dispatcher::post`].
    pub fn post<F>(&self, work: F) -> Result<()>
    where
        F: FnOnce(&UiContext) + Send + 'static,
    {
        self.inner.dispatcher.post(work)
    }

    /// Build a prompt under the root placement.
    pub fn add_prompt<V, S>(&self, setup: S) -> Result<Prompt<V>>
    where
        V: Clone + Send + 'static,
        S: PromptSetup<V>,
    {
        self.run_on_ui_context(move |ui| ui.add_prompt(setup))?
    }

    /// Build a prompt under `parent`.
    pub fn add_prompt_in<V, S>(&self, parent: PlacementId, setup: S) -> Result<Prompt<V>>
    where
        V: Clone + Send + 'static,
        S: PromptSetup<V>,
    {
        self.run_on_ui_context(move |ui| ui.add_prompt_in(parent, setup))?
    }

    /// Remove a prompt and its widgets. Removing a detached prompt is a no-op.
    pub fn remove_prompt<V>(&self, prompt: &Prompt<V>) -> Result<()> {
        if prompt.is_detached() {
            return Ok(());
        }
        let id = prompt.id();
        self.run_on_ui_context(move |ui| ui.remove_prompt(id))?
    }

    /// Remove every prompt, in creation order, stopping at the first failure.
    pub fn clear_prompts(&self) -> Result<()> {
        self.run_on_ui_context(|ui| ui.clear_prompts())?
    }

    pub fn enable_all(&self) -> Result<()> {
        self.run_on_ui_context(|ui| ui.set_all_prompts_enabled(true))?
    }

    pub fn disable_all(&self) -> Result<()> {
        self.run_on_ui_context(|ui| ui.set_all_prompts_enabled(false))?
    }

    pub fn prompt_count(&self) -> Result<usize> {
        self.run_on_ui_context(|ui| ui.prompt_count())
    }

    /// Ask the UI loop to exit.
    ///
    /// Once this returns, every dispatcher call fails with
    /// [`Error::DispatcherUnavailable`]. Closing a closed session is `Ok`;
    /// closing one that never started is an error.
    pub fn close(&self) -> Result<()> {
        match self.run_on_ui_context(|ui| ui.request_close()) {
            Ok(()) | Err(Error::SessionClosed) => Ok(()),
            Err(Error::DispatcherUnavailable) if self.inner.dispatcher.is_closed() => Ok(()),
            Err(e) => Err(e),
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.dispatcher.is_running()
    }

    pub fn is_closed(&self) -> bool {
        self.inner.dispatcher.is_closed()
    }

    pub fn clock(&self) -> SharedClock {
        self.inner.clock.clone()
    }

    /// Swap the session clock. Only timestamps taken afterwards use it.
    pub fn set_clock(&self, clock: impl Clock + 'static) -> Arc<dyn Clock> {
        let previous = self.inner.clock.replace(clock);
        self.inner.events.emit(SessionEvent::ClockReplaced);
        debug!("Session clock replaced");
        previous
    }

    pub fn now(&self) -> Timestamp {
        self.inner.clock.now()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    pub fn event_sender(&self) -> EventSender {
        self.inner.dispatcher.event_sender()
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.inner.dispatcher.metrics()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }
}

impl fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHandle")
            .field("title", &self.inner.config.title)
            .field("dispatcher", &self.inner.dispatcher)
            .finish()
    }
}
