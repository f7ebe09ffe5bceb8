// Headless toolkit - an in-memory widget tree
//
// Stands in for a real window system in the demo binary, tests and benches.
// `HeadlessProbe` is the other end: it can be sent to any thread to inspect
// the tree and to simulate user input, which enters the session through the
// same event queue a native toolkit would use.

use crate::error::{Error, Result};
use crate::ui::bridge::EventSender;
use crate::ui::toolkit::{
    KeyBindingId, PlacementId, Toolkit, ToolkitError, UiEvent, WidgetId, WidgetSpec,
};
use indexmap::{IndexMap, IndexSet};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Snapshot of one widget in the headless tree.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadlessWidget {
    pub id: WidgetId,
    pub placement: PlacementId,
    pub spec: WidgetSpec,
    pub enabled: bool,
}

impl HeadlessWidget {
    /// Label or button text, if the widget has any.
    pub fn text(&self) -> Option<&str> {
        match &self.spec {
            WidgetSpec::Label { text } | WidgetSpec::Button { text } => Some(text),
            _ => None,
        }
    }
}

#[derive(Default)]
struct HeadlessState {
    title: String,
    min_size: (u32, u32),
    next_id: u64,
    /// placement -> parent
    placements: IndexMap<PlacementId, PlacementId>,
    widgets: IndexMap<WidgetId, HeadlessWidget>,
    keys: IndexSet<KeyBindingId>,
    events: Option<EventSender>,
}

impl HeadlessState {
    fn allocate(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn has_placement(&self, placement: PlacementId) -> bool {
        placement == PlacementId::ROOT || self.placements.contains_key(&placement)
    }
}

struct Shared {
    state: Mutex<HeadlessState>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// In-memory [`Toolkit`].
pub struct HeadlessToolkit {
    shared: Arc<Shared>,
}

impl HeadlessToolkit {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(HeadlessState::default()),
                changed: Condvar::new(),
            }),
        }
    }

    /// A handle for inspecting the tree and driving input from other threads.
    pub fn probe(&self) -> HeadlessProbe {
        HeadlessProbe {
            shared: Arc::clone(&self.shared),
        }
    }

    fn modify<T>(&self, change: impl FnOnce(&mut HeadlessState) -> T) -> T {
        let out = change(&mut self.shared.lock());
        self.shared.changed.notify_all();
        out
    }
}

impl Default for HeadlessToolkit {
    fn default() -> Self {
        Self::new()
    }
}

impl Toolkit for HeadlessToolkit {
    fn attach(&mut self, events: EventSender) {
        self.modify(|state| state.events = Some(events));
    }

    fn set_title(&mut self, title: &str) {
        self.modify(|state| state.title = title.to_string());
    }

    fn set_min_size(&mut self, width: u32, height: u32) {
        self.modify(|state| state.min_size = (width, height));
    }

    fn create_placement(&mut self, parent: PlacementId) -> Result<PlacementId, ToolkitError> {
        self.modify(|state| {
            if !state.has_placement(parent) {
                return Err(ToolkitError::UnknownPlacement(parent));
            }
            let placement = PlacementId::from_raw(state.allocate());
            state.placements.insert(placement, parent);
            Ok(placement)
        })
    }

    fn destroy_placement(&mut self, placement: PlacementId) -> Result<(), ToolkitError> {
        if placement == PlacementId::ROOT {
            return Err(ToolkitError::RootPlacement);
        }
        self.modify(|state| {
            if !state.placements.contains_key(&placement) {
                return Err(ToolkitError::UnknownPlacement(placement));
            }

            let mut doomed = vec![placement];
            let mut cursor = 0;
            while cursor < doomed.len() {
                let current = doomed[cursor];
                doomed.extend(
                    state
                        .placements
                        .iter()
                        .filter(|(_, parent)| **parent == current)
                        .map(|(child, _)| *child),
                );
                cursor += 1;
            }

            state
                .widgets
                .retain(|_, widget| !doomed.contains(&widget.placement));
            state.placements.retain(|id, _| !doomed.contains(id));
            Ok(())
        })
    }

    fn create_widget(
        &mut self,
        placement: PlacementId,
        spec: &WidgetSpec,
    ) -> Result<WidgetId, ToolkitError> {
        self.modify(|state| {
            if !state.has_placement(placement) {
                return Err(ToolkitError::UnknownPlacement(placement));
            }
            let id = WidgetId::from_raw(state.allocate());
            state.widgets.insert(
                id,
                HeadlessWidget {
                    id,
                    placement,
                    spec: spec.clone(),
                    enabled: true,
                },
            );
            Ok(id)
        })
    }

    fn set_widget_enabled(&mut self, widget: WidgetId, enabled: bool) -> Result<(), ToolkitError> {
        self.modify(|state| {
            let entry = state
                .widgets
                .get_mut(&widget)
                .ok_or(ToolkitError::UnknownWidget(widget))?;
            entry.enabled = enabled;
            Ok(())
        })
    }

    fn bind_key(&mut self, binding: KeyBindingId) -> Result<(), ToolkitError> {
        self.modify(|state| state.keys.insert(binding));
        Ok(())
    }

    fn unbind_key(&mut self, binding: KeyBindingId) {
        self.modify(|state| state.keys.shift_remove(&binding));
    }
}

/// Thread-safe view of a [`HeadlessToolkit`].
///
/// Input methods return `Ok(false)` when the target widget is missing,
/// disabled or of the wrong kind, mirroring a real window ignoring clicks on
/// greyed-out controls.
#[derive(Clone)]
pub struct HeadlessProbe {
    shared: Arc<Shared>,
}

impl HeadlessProbe {
    pub fn title(&self) -> String {
        self.shared.lock().title.clone()
    }

    pub fn min_size(&self) -> (u32, u32) {
        self.shared.lock().min_size
    }

    /// Every widget, in creation order.
    pub fn widgets(&self) -> Vec<HeadlessWidget> {
        self.shared.lock().widgets.values().cloned().collect()
    }

    pub fn find_button(&self, text: &str) -> Option<WidgetId> {
        self.shared
            .lock()
            .widgets
            .values()
            .find(|w| matches!(&w.spec, WidgetSpec::Button { text: t } if t == text))
            .map(|w| w.id)
    }

    /// First label or button showing `text`.
    pub fn find_widget(&self, text: &str) -> Option<WidgetId> {
        self.shared
            .lock()
            .widgets
            .values()
            .find(|w| w.text() == Some(text))
            .map(|w| w.id)
    }

    /// First widget matching `spec` exactly.
    pub fn find_spec(&self, spec: &WidgetSpec) -> Option<WidgetId> {
        self.shared
            .lock()
            .widgets
            .values()
            .find(|w| &w.spec == spec)
            .map(|w| w.id)
    }

    pub fn is_enabled(&self, widget: WidgetId) -> bool {
        self.shared
            .lock()
            .widgets
            .get(&widget)
            .is_some_and(|w| w.enabled)
    }

    pub fn placement_count(&self) -> usize {
        self.shared.lock().placements.len()
    }

    pub fn bound_key_count(&self) -> usize {
        self.shared.lock().keys.len()
    }

    /// Block until `widget` exists and is enabled. Returns false on timeout.
    pub fn wait_until_enabled(&self, widget: WidgetId, timeout: Duration) -> bool {
        self.wait_for(timeout, |state| {
            state.widgets.get(&widget).is_some_and(|w| w.enabled)
        })
    }

    /// Block until `widget` is disabled or gone. Returns false on timeout.
    pub fn wait_until_disabled(&self, widget: WidgetId, timeout: Duration) -> bool {
        self.wait_for(timeout, |state| {
            state.widgets.get(&widget).is_none_or(|w| !w.enabled)
        })
    }

    /// Block until a button labelled `text` exists. Returns its id, or `None`
    /// on timeout.
    pub fn wait_for_button(&self, text: &str, timeout: Duration) -> Option<WidgetId> {
        let mut found = None;
        self.wait_for(timeout, |state| {
            found = state
                .widgets
                .values()
                .find(|w| matches!(&w.spec, WidgetSpec::Button { text: t } if t == text))
                .map(|w| w.id);
            found.is_some()
        });
        found
    }

    /// Simulate a click. Only enabled buttons react.
    pub fn click(&self, widget: WidgetId) -> Result<bool> {
        self.deliver(widget, |w| {
            matches!(w.spec, WidgetSpec::Button { .. }).then_some(UiEvent::Activated(w.id))
        })
    }

    /// Simulate typing `text` into an entry and pressing Enter.
    pub fn commit_text(&self, widget: WidgetId, text: &str) -> Result<bool> {
        self.deliver(widget, |w| {
            matches!(w.spec, WidgetSpec::TextEntry)
                .then(|| UiEvent::TextCommitted(w.id, text.to_string()))
        })
    }

    /// Simulate choosing option `index` of a dropdown.
    pub fn select(&self, widget: WidgetId, index: usize) -> Result<bool> {
        self.deliver(widget, |w| {
            matches!(w.spec, WidgetSpec::Dropdown { .. }).then_some(UiEvent::Selected(w.id, index))
        })
    }

    /// Simulate a key press in the root window.
    pub fn press_key(&self, key: char) -> Result<()> {
        self.sender()?.send(UiEvent::Key(key))
    }

    /// Simulate the user closing the window.
    pub fn close_window(&self) -> Result<()> {
        self.sender()?.send(UiEvent::CloseRequested)
    }

    fn deliver(
        &self,
        widget: WidgetId,
        event: impl FnOnce(&HeadlessWidget) -> Option<UiEvent>,
    ) -> Result<bool> {
        let (sender, event) = {
            let state = self.shared.lock();
            let sender = state.events.clone().ok_or(Error::DispatcherUnavailable)?;
            let event = state
                .widgets
                .get(&widget)
                .filter(|w| w.enabled)
                .and_then(event);
            (sender, event)
        };

        match event {
            Some(event) => sender.send(event).map(|()| true),
            None => Ok(false),
        }
    }

    fn sender(&self) -> Result<EventSender> {
        self.shared
            .lock()
            .events
            .clone()
            .ok_or(Error::DispatcherUnavailable)
    }

    fn wait_for(&self, timeout: Duration, mut done: impl FnMut(&HeadlessState) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.lock();
        loop {
            if done(&*state) {
                return true;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            state = self
                .shared
                .changed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl std::fmt::Debug for HeadlessProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.shared.lock();
        f.debug_struct("HeadlessProbe")
            .field("title", &state.title)
            .field("placements", &state.placements.len())
            .field("widgets", &state.widgets.len())
            .finish()
    }
}
