// Prompt module - single-slot, resettable response futures
//
// A prompt is built on the UI thread by a setup routine that lays out its
// widgets and wires their events to `submit`. The logic thread then blocks in
// `wait_for_response` until the user answers. Each answer carries the
// response timestamp (read from the clock before anything else happens in
// `submit`) and the presentation timestamp of the round it answers.

pub mod registry;

use crate::clock::{SharedClock, Timestamp};
use crate::error::{Error, Result};
use crate::events::{SessionEvent, SessionEvents};
use crate::models::SubmitPolicy;
use crate::ui::bridge::Dispatcher;
use crate::ui::context::UiContext;
use crate::ui::toolkit::{KeyBindingId, PlacementId, WidgetId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

static NEXT_PROMPT_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PromptId(u64);

impl PromptId {
    fn next() -> Self {
        Self(NEXT_PROMPT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prompt#{}", self.0)
    }
}

/// Observable state of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptState {
    /// Setup has not declared a return type (yet)
    Uninitialized,
    /// Awaiting input; neither `enable` nor `disable` called this round
    Ready,
    Enabled,
    Disabled,
    /// A value has been submitted this round
    Answered,
}

/// What `submit` did with a value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// First answer of the round
    Accepted,
    /// Round already answered, value dropped ([`SubmitPolicy::FirstWins`])
    Ignored,
    /// Round already answered, previous value overwritten ([`SubmitPolicy::LastWins`])
    Replaced,
}

/// One answer to a prompt.
#[derive(Debug, Clone, PartialEq)]
pub struct Response<V> {
    pub value: V,
    /// When `submit` was called
    pub timestamp: Timestamp,
    /// When the answered round was presented
    pub presented_at: Timestamp,
    pub round: u64,
}

impl<V> Response<V> {
    /// Seconds between presentation and response.
    pub fn reaction_time(&self) -> f64 {
        self.timestamp.seconds_since(self.presented_at)
    }

    pub fn into_pair(self) -> (V, Timestamp) {
        (self.value, self.timestamp)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Live,
    Removed,
    Closed,
}

struct Slot<V> {
    return_type: Option<&'static str>,
    setup_open: bool,
    /// Last explicit enable/disable this round
    mode: Option<bool>,
    /// Whether the tracked widgets currently accept input
    enabled: bool,
    presented_at: Timestamp,
    response: Option<Response<V>>,
    round: u64,
    widgets: Vec<WidgetId>,
    keybindings: Vec<KeyBindingId>,
    lifecycle: Lifecycle,
}

impl<V> Slot<V> {
    fn ensure_live(&self, id: PromptId) -> Result<()> {
        match self.lifecycle {
            Lifecycle::Live => Ok(()),
            Lifecycle::Removed => Err(Error::PromptRemoved(id)),
            Lifecycle::Closed => Err(Error::SessionClosed),
        }
    }

    /// Move the presentation timestamp to `now`, never backwards (a clock
    /// swapped for one reading earlier must not rewind it).
    fn restamp(&mut self, now: Timestamp) {
        if now > self.presented_at {
            self.presented_at = now;
        }
    }

    fn ensure_setup(&self, what: &str) -> Result<()> {
        if self.setup_open {
            Ok(())
        } else {
            Err(Error::PromptMisuse(format!(
                "{} is only allowed inside the setup routine",
                what
            )))
        }
    }
}

impl<V: Clone> Slot<V> {
    /// `Some` once a waiter has something to return.
    fn settled(&self, id: PromptId) -> Option<Result<Response<V>>> {
        if let Err(e) = self.ensure_live(id) {
            return Some(Err(e));
        }
        if self.return_type.is_none() && !self.setup_open {
            return Some(Err(Error::PromptNotConfigured(id)));
        }
        self.response.clone().map(Ok)
    }
}

struct PromptShared<V> {
    id: PromptId,
    placement: PlacementId,
    slot: Mutex<Slot<V>>,
    answered: Condvar,
    notify: Notify,
    clock: SharedClock,
    dispatcher: Dispatcher,
    events: SessionEvents,
    policy: SubmitPolicy,
}

/// Handle to a prompt.
///
/// Cloning is cheap and every clone refers to the same prompt. The registry
/// on the UI thread owns the prompt's widgets; handles only expose the
/// public operations and stay valid (but detached) after removal.
pub struct Prompt<V> {
    shared: Arc<PromptShared<V>>,
}

impl<V> Clone for Prompt<V> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<V> fmt::Debug for Prompt<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.lock();
        f.debug_struct("Prompt")
            .field("id", &self.shared.id)
            .field("placement", &self.shared.placement)
            .field("return_type", &slot.return_type)
            .field("round", &slot.round)
            .field("answered", &slot.response.is_some())
            .finish()
    }
}

impl<V> Prompt<V> {
    pub fn id(&self) -> PromptId {
        self.shared.id
    }

    /// The placement the setup routine built into.
    pub fn placement(&self) -> PlacementId {
        self.shared.placement
    }

    pub fn state(&self) -> PromptState {
        let slot = self.lock();
        if slot.return_type.is_none() {
            PromptState::Uninitialized
        } else if slot.response.is_some() {
            PromptState::Answered
        } else {
            match slot.mode {
                None => PromptState::Ready,
                Some(true) => PromptState::Enabled,
                Some(false) => PromptState::Disabled,
            }
        }
    }

    /// Whether the prompt's widgets currently accept input. Input handlers
    /// check this before submitting.
    pub fn is_enabled(&self) -> bool {
        let slot = self.lock();
        slot.lifecycle == Lifecycle::Live && slot.enabled
    }

    pub fn presentation_timestamp(&self) -> Timestamp {
        self.lock().presented_at
    }

    /// Number of completed resets.
    pub fn round(&self) -> u64 {
        self.lock().round
    }

    /// Type name declared by the setup routine, if any.
    pub fn return_type(&self) -> Option<&'static str> {
        self.lock().return_type
    }

    /// True once the prompt was removed or its session closed.
    pub fn is_detached(&self) -> bool {
        self.lock().lifecycle != Lifecycle::Live
    }

    /// Declare that this prompt yields values of type `V`.
    ///
    /// Only valid inside the setup routine, and only once.
    pub fn declare_return_type(&self) -> Result<()> {
        let mut slot = self.lock();
        slot.ensure_setup("declare_return_type")?;
        if let Some(existing) = slot.return_type {
            return Err(Error::PromptMisuse(format!(
                "return type of {} already declared as {}",
                self.shared.id, existing
            )));
        }
        slot.return_type = Some(std::any::type_name::<V>());
        Ok(())
    }

    /// Register a widget that `enable`/`disable` toggle. Setup only.
    pub fn track_interactive_widget(&self, widget: WidgetId) -> Result<()> {
        let mut slot = self.lock();
        slot.ensure_setup("track_interactive_widget")?;
        slot.widgets.push(widget);
        Ok(())
    }

    /// Register a root key binding unbound when the prompt is removed. Setup only.
    pub fn track_root_keybinding(&self, binding: KeyBindingId) -> Result<()> {
        let mut slot = self.lock();
        slot.ensure_setup("track_root_keybinding")?;
        slot.keybindings.push(binding);
        Ok(())
    }

    /// Turn on every tracked widget. Safe from any thread.
    pub fn enable(&self) -> Result<()>
    where
        V: Send + 'static,
    {
        self.dispatch_enabled(true)
    }

    /// Turn off every tracked widget. Safe from any thread.
    pub fn disable(&self) -> Result<()>
    where
        V: Send + 'static,
    {
        self.dispatch_enabled(false)
    }

    fn dispatch_enabled(&self, enabled: bool) -> Result<()>
    where
        V: Send + 'static,
    {
        let prompt = self.clone();
        self.shared
            .dispatcher
            .run_on_ui_context(move |ui| prompt.apply_enabled(ui, enabled, true))?
    }

    /// Toggle the tracked widgets on the UI thread.
    ///
    /// `explicit` distinguishes a user-requested enable/disable (which moves
    /// the prompt to `Enabled`/`Disabled`) from the initial or bulk toggles.
    pub(crate) fn apply_enabled(&self, ui: &UiContext, enabled: bool, explicit: bool) -> Result<()> {
        let widgets = {
            let slot = self.lock();
            slot.ensure_live(self.shared.id)?;
            slot.widgets.clone()
        };

        for widget in widgets {
            ui.set_widget_enabled(widget, enabled)?;
        }

        let mut slot = self.lock();
        slot.enabled = enabled;
        if explicit {
            slot.mode = Some(enabled);
        }
        Ok(())
    }

    /// Close the setup window and stamp presentation. Last step of
    /// installation.
    pub(crate) fn finish_setup(&self) {
        let now = self.shared.clock.now();
        let mut slot = self.lock();
        slot.setup_open = false;
        slot.restamp(now);
    }

    fn detach(&self, lifecycle: Lifecycle) {
        {
            let mut slot = self.lock();
            if slot.lifecycle != Lifecycle::Live {
                return;
            }
            slot.lifecycle = lifecycle;
            slot.setup_open = false;
        }
        self.shared.answered.notify_all();
        self.shared.notify.notify_waiters();
    }

    fn lock(&self) -> MutexGuard<'_, Slot<V>> {
        self.shared.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<V: Clone + Send + 'static> Prompt<V> {
    pub(crate) fn new(placement: PlacementId, ui: &UiContext) -> Self {
        let clock = ui.clock().clone();
        let presented_at = clock.now();
        Self {
            shared: Arc::new(PromptShared {
                id: PromptId::next(),
                placement,
                slot: Mutex::new(Slot {
                    return_type: None,
                    setup_open: true,
                    mode: None,
                    enabled: true,
                    presented_at,
                    response: None,
                    round: 0,
                    widgets: Vec::new(),
                    keybindings: Vec::new(),
                    lifecycle: Lifecycle::Live,
                }),
                answered: Condvar::new(),
                notify: Notify::new(),
                clock,
                dispatcher: ui.dispatcher().clone(),
                events: ui.events().clone(),
                policy: ui.config().submit_policy,
            }),
        }
    }

    /// Record an answer for the current round and wake every waiter.
    ///
    /// Normally called from a widget or key handler on the UI thread, but
    /// safe from anywhere. A second submit in the same round follows the
    /// session's [`SubmitPolicy`].
    pub fn submit(&self, value: V) -> Result<SubmitOutcome> {
        let timestamp = self.shared.clock.now();
        let id = self.shared.id;

        let (outcome, round, presented_at) = {
            let mut slot = self.lock();
            slot.ensure_live(id)?;
            if slot.return_type.is_none() {
                return Err(Error::PromptNotConfigured(id));
            }

            let outcome = match (slot.response.is_some(), self.shared.policy) {
                (false, _) => SubmitOutcome::Accepted,
                (true, SubmitPolicy::FirstWins) => SubmitOutcome::Ignored,
                (true, SubmitPolicy::LastWins) => SubmitOutcome::Replaced,
            };
            if outcome != SubmitOutcome::Ignored {
                slot.response = Some(Response {
                    value,
                    timestamp,
                    presented_at: slot.presented_at,
                    round: slot.round,
                });
            }
            (outcome, slot.round, slot.presented_at)
        };

        let metrics = self.shared.dispatcher.metrics();
        match outcome {
            SubmitOutcome::Accepted => {
                self.shared.answered.notify_all();
                self.shared.notify.notify_waiters();
                let reaction = Duration::try_from_secs_f64(timestamp.seconds_since(presented_at))
                    .unwrap_or_default();
                metrics.record_submit_accepted(reaction);
                tracing::debug!("{} answered at {} (round {})", id, timestamp, round);
            }
            SubmitOutcome::Replaced => {
                self.shared.answered.notify_all();
                self.shared.notify.notify_waiters();
                metrics.record_submit_replaced();
                tracing::debug!("{} answer replaced at {} (round {})", id, timestamp, round);
            }
            SubmitOutcome::Ignored => {
                metrics.record_submit_ignored();
                tracing::debug!("{} already answered, ignoring submit (round {})", id, round);
            }
        }

        self.shared.events.emit(SessionEvent::PromptAnswered {
            prompt: id,
            round,
            timestamp,
            accepted: outcome != SubmitOutcome::Ignored,
        });
        Ok(outcome)
    }

    /// Block until the current round is answered.
    ///
    /// Returns immediately if it already is. Fails with
    /// [`Error::PromptNotConfigured`] if setup never declared a return type,
    /// [`Error::PromptDeadlockRisk`] when called unanswered from the UI
    /// thread, [`Error::PromptRemoved`] or [`Error::SessionClosed`] when the
    /// prompt goes away while waiting.
    pub fn wait_for_response(&self) -> Result<Response<V>> {
        self.wait_until(None)
    }

    /// [`wait_for_response`](Self::wait_for_response) with an upper bound.
    pub fn wait_for_response_timeout(&self, timeout: Duration) -> Result<Response<V>> {
        self.wait_until(Some((Instant::now() + timeout, timeout)))
    }

    fn wait_until(&self, deadline: Option<(Instant, Duration)>) -> Result<Response<V>> {
        let id = self.shared.id;
        let mut slot = self.lock();

        if let Some(outcome) = slot.settled(id) {
            return outcome;
        }
        if self.shared.dispatcher.is_ui_context() {
            return Err(Error::PromptDeadlockRisk(id));
        }

        loop {
            slot = match deadline {
                None => self
                    .shared
                    .answered
                    .wait(slot)
                    .unwrap_or_else(PoisonError::into_inner),
                Some((until, timeout)) => {
                    let remaining = until.saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(Error::Timeout(timeout));
                    }
                    self.shared
                        .answered
                        .wait_timeout(slot, remaining)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0
                }
            };

            if let Some(outcome) = slot.settled(id) {
                return outcome;
            }
        }
    }

    /// Async flavor of [`wait_for_response`](Self::wait_for_response), for
    /// logic running inside a tokio runtime.
    pub async fn wait_for_response_async(&self) -> Result<Response<V>> {
        let id = self.shared.id;
        loop {
            let notified = self.shared.notify.notified();
            tokio::pin!(notified);
            // Register before checking so a submit in between is not lost.
            notified.as_mut().enable();

            if let Some(outcome) = self.lock().settled(id) {
                return outcome;
            }
            if self.shared.dispatcher.is_ui_context() {
                return Err(Error::PromptDeadlockRisk(id));
            }

            notified.await;
        }
    }

    /// The current round's answer, without blocking.
    pub fn try_response(&self) -> Result<Option<Response<V>>> {
        let slot = self.lock();
        slot.ensure_live(self.shared.id)?;
        if slot.return_type.is_none() && !slot.setup_open {
            return Err(Error::PromptNotConfigured(self.shared.id));
        }
        Ok(slot.response.clone())
    }

    /// Enable, wait for an answer, reset for the next round and disable.
    ///
    /// The usual way for logic code to collect one value after another from
    /// the same prompt.
    pub fn ask(&self) -> Result<Response<V>> {
        self.enable()?;
        let answer = self.wait_for_response();
        if answer.is_ok() {
            self.reset()?;
        }
        match (answer, self.disable()) {
            (Ok(response), Ok(())) => Ok(response),
            (Err(e), _) | (Ok(_), Err(e)) => Err(e),
        }
    }

    /// Start a new round: clear the answer, bump the round and re-stamp the
    /// presentation timestamp. Returns `false` (and changes nothing) if the
    /// prompt was not answered.
    ///
    /// Runs on the UI thread through the dispatcher.
    pub fn reset(&self) -> Result<bool> {
        let prompt = self.clone();
        self.shared
            .dispatcher
            .run_on_ui_context(move |_| prompt.reset_in_place())?
    }

    fn reset_in_place(&self) -> Result<bool> {
        let id = self.shared.id;
        let (round, presented_at) = {
            let mut slot = self.lock();
            slot.ensure_live(id)?;
            if slot.response.is_none() {
                return Ok(false);
            }
            slot.response = None;
            slot.mode = None;
            slot.round += 1;
            slot.restamp(self.shared.clock.now());
            (slot.round, slot.presented_at)
        };

        tracing::debug!("{} reset for round {}", id, round);
        self.shared.events.emit(SessionEvent::PromptReset {
            prompt: id,
            round,
            presented_at,
        });
        Ok(true)
    }
}

/// Type-erased view of a prompt, as held by the registry.
pub(crate) trait RegisteredPrompt: Send + Sync {
    fn id(&self) -> PromptId;
    fn placement(&self) -> PlacementId;
    fn keybindings(&self) -> Vec<KeyBindingId>;
    fn set_interactive(&self, ui: &UiContext, enabled: bool) -> Result<()>;
    /// Wake waiters with [`Error::PromptRemoved`].
    fn mark_removed(&self);
    /// Wake waiters with [`Error::SessionClosed`].
    fn mark_closed(&self);
}

impl<V: Clone + Send + 'static> RegisteredPrompt for Prompt<V> {
    fn id(&self) -> PromptId {
        self.shared.id
    }

    fn placement(&self) -> PlacementId {
        self.shared.placement
    }

    fn keybindings(&self) -> Vec<KeyBindingId> {
        self.lock().keybindings.clone()
    }

    fn set_interactive(&self, ui: &UiContext, enabled: bool) -> Result<()> {
        self.apply_enabled(ui, enabled, true)
    }

    fn mark_removed(&self) {
        self.detach(Lifecycle::Removed);
    }

    fn mark_closed(&self) {
        self.detach(Lifecycle::Closed);
    }
}

/// A setup routine: lays out a prompt's widgets inside `placement`, declares
/// its return type and wires input to [`Prompt::submit`].
///
/// Implemented for every matching closure; [`setup_fn`] helps the compiler
/// infer closure argument types.
pub trait PromptSetup<V>: Send + 'static {
    fn build(self, prompt: &Prompt<V>, ui: &UiContext, placement: PlacementId) -> Result<()>;
}

impl<V, F> PromptSetup<V> for F
where
    F: FnOnce(&Prompt<V>, &UiContext, PlacementId) -> Result<()> + Send + 'static,
{
    fn build(self, prompt: &Prompt<V>, ui: &UiContext, placement: PlacementId) -> Result<()> {
        self(prompt, ui, placement)
    }
}

/// Pin a closure to the [`PromptSetup`] signature.
pub fn setup_fn<V, F>(f: F) -> F
where
    F: FnOnce(&Prompt<V>, &UiContext, PlacementId) -> Result<()> + Send + 'static,
{
    f
}
