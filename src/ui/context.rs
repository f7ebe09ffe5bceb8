// UiContext - state that lives on, and only on, the UI thread
//
// Wraps the toolkit with the bookkeeping the core needs: which widgets live
// in which placement, the event handlers attached to widgets and root key
// bindings, and the registry of live prompts. Everything is behind `RefCell`
// with short borrows, so handlers can call back into the context (or into the
// dispatcher, which runs inline on this thread) without tripping over a
// borrow held further up the stack.

use crate::clock::{SharedClock, Timestamp};
use crate::error::Result;
use crate::events::{SessionEvent, SessionEvents};
use crate::models::SessionConfig;
use crate::prompt::registry::PromptRegistry;
use crate::prompt::{Prompt, PromptId, PromptSetup};
use crate::ui::bridge::Dispatcher;
use crate::ui::toolkit::{KeyBindingId, PlacementId, Toolkit, ToolkitError, UiEvent, WidgetId, WidgetSpec};
use indexmap::IndexMap;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

type WidgetHandler = Rc<dyn Fn(&UiContext, &UiEvent)>;
type KeyHandler = Rc<dyn Fn(&UiContext, char)>;

struct WidgetEntry {
    placement: PlacementId,
    handler: Option<WidgetHandler>,
}

struct PlacementEntry {
    parent: PlacementId,
    widgets: Vec<WidgetId>,
}

/// The UI execution context.
///
/// Handed by reference to dispatched work, setup routines, initial layouts
/// and event handlers. It is `!Send`: nothing outside the UI thread can hold
/// one.
pub struct UiContext {
    toolkit: RefCell<Box<dyn Toolkit>>,
    widgets: RefCell<HashMap<WidgetId, WidgetEntry>>,
    placements: RefCell<HashMap<PlacementId, PlacementEntry>>,
    key_handlers: RefCell<IndexMap<KeyBindingId, KeyHandler>>,
    next_binding: Cell<u64>,
    registry: PromptRegistry,
    dispatcher: Dispatcher,
    clock: SharedClock,
    events: SessionEvents,
    config: SessionConfig,
    close_requested: Cell<bool>,
}

impl UiContext {
    pub(crate) fn new(
        toolkit: Box<dyn Toolkit>,
        dispatcher: Dispatcher,
        clock: SharedClock,
        events: SessionEvents,
        config: SessionConfig,
    ) -> Self {
        Self {
            toolkit: RefCell::new(toolkit),
            widgets: RefCell::new(HashMap::new()),
            placements: RefCell::new(HashMap::new()),
            key_handlers: RefCell::new(IndexMap::new()),
            next_binding: Cell::new(1),
            registry: PromptRegistry::new(),
            dispatcher,
            clock,
            events,
            config,
            close_requested: Cell::new(false),
        }
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    pub fn now(&self) -> Timestamp {
        self.clock.now()
    }

    pub fn events(&self) -> &SessionEvents {
        &self.events
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub(crate) fn registry(&self) -> &PromptRegistry {
        &self.registry
    }

    // Widget tree

    pub fn create_placement(&self, parent: PlacementId) -> Result<PlacementId> {
        if parent != PlacementId::ROOT && !self.placements.borrow().contains_key(&parent) {
            return Err(ToolkitError::UnknownPlacement(parent).into());
        }

        let placement = self.toolkit.borrow_mut().create_placement(parent)?;
        self.placements.borrow_mut().insert(
            placement,
            PlacementEntry {
                parent,
                widgets: Vec::new(),
            },
        );
        Ok(placement)
    }

    /// Destroy a placement with its widgets, child placements and handlers.
    /// Prompts living anywhere in that subtree are removed as well. Nothing
    /// is forgotten if the toolkit fails.
    pub fn destroy_placement(&self, placement: PlacementId) -> Result<()> {
        if placement == PlacementId::ROOT {
            return Err(ToolkitError::RootPlacement.into());
        }
        if !self.placements.borrow().contains_key(&placement) {
            return Err(ToolkitError::UnknownPlacement(placement).into());
        }

        self.toolkit.borrow_mut().destroy_placement(placement)?;

        let doomed = self.subtree(placement);
        {
            let mut placements = self.placements.borrow_mut();
            let mut widgets = self.widgets.borrow_mut();
            for id in &doomed {
                if let Some(entry) = placements.remove(id) {
                    for widget in entry.widgets {
                        widgets.remove(&widget);
                    }
                }
            }
        }
        self.registry.forget_placements(self, &doomed);
        Ok(())
    }

    pub fn has_placement(&self, placement: PlacementId) -> bool {
        placement == PlacementId::ROOT || self.placements.borrow().contains_key(&placement)
    }

    pub fn create_widget(&self, placement: PlacementId, spec: &WidgetSpec) -> Result<WidgetId> {
        if !self.has_placement(placement) {
            return Err(ToolkitError::UnknownPlacement(placement).into());
        }

        let widget = self.toolkit.borrow_mut().create_widget(placement, spec)?;
        self.widgets.borrow_mut().insert(
            widget,
            WidgetEntry {
                placement,
                handler: None,
            },
        );
        if let Some(entry) = self.placements.borrow_mut().get_mut(&placement) {
            entry.widgets.push(widget);
        }
        Ok(widget)
    }

    /// Attach the handler for events targeting `widget`, replacing any
    /// previous one.
    pub fn on_widget_event<H>(&self, widget: WidgetId, handler: H) -> Result<()>
    where
        H: Fn(&UiContext, &UiEvent) + 'static,
    {
        let mut widgets = self.widgets.borrow_mut();
        let entry = widgets
            .get_mut(&widget)
            .ok_or(ToolkitError::UnknownWidget(widget))?;
        entry.handler = Some(Rc::new(handler));
        Ok(())
    }

    pub fn set_widget_enabled(&self, widget: WidgetId, enabled: bool) -> Result<()> {
        if !self.widgets.borrow().contains_key(&widget) {
            return Err(ToolkitError::UnknownWidget(widget).into());
        }
        self.toolkit
            .borrow_mut()
            .set_widget_enabled(widget, enabled)?;
        Ok(())
    }

    pub fn widget_placement(&self, widget: WidgetId) -> Option<PlacementId> {
        self.widgets.borrow().get(&widget).map(|entry| entry.placement)
    }

    // Root key bindings

    /// Bind a handler to every key pressed in the root window.
    pub fn bind_root_key<H>(&self, handler: H) -> Result<KeyBindingId>
    where
        H: Fn(&UiContext, char) + 'static,
    {
        let binding = KeyBindingId::from_raw(self.next_binding.get());
        self.next_binding.set(binding.raw() + 1);

        self.toolkit.borrow_mut().bind_key(binding)?;
        self.key_handlers
            .borrow_mut()
            .insert(binding, Rc::new(handler));
        Ok(binding)
    }

    /// Remove a root key binding. Unknown bindings are ignored.
    pub fn unbind_root_key(&self, binding: KeyBindingId) {
        if self.key_handlers.borrow_mut().shift_remove(&binding).is_some() {
            self.toolkit.borrow_mut().unbind_key(binding);
        }
    }

    pub fn key_binding_count(&self) -> usize {
        self.key_handlers.borrow().len()
    }

    // Prompts

    /// Create a prompt under the root placement. See
    /// [`add_prompt_in`](Self::add_prompt_in).
    pub fn add_prompt<V, S>(&self, setup: S) -> Result<Prompt<V>>
    where
        V: Clone + Send + 'static,
        S: PromptSetup<V>,
    {
        self.registry.install(self, PlacementId::ROOT, setup)
    }

    /// Create a placement under `parent`, build a prompt in it with `setup`
    /// and register it.
    pub fn add_prompt_in<V, S>(&self, parent: PlacementId, setup: S) -> Result<Prompt<V>>
    where
        V: Clone + Send + 'static,
        S: PromptSetup<V>,
    {
        self.registry.install(self, parent, setup)
    }

    pub fn remove_prompt(&self, prompt: PromptId) -> Result<()> {
        self.registry.remove(self, prompt)
    }

    pub fn clear_prompts(&self) -> Result<()> {
        self.registry.clear(self)
    }

    pub fn set_all_prompts_enabled(&self, enabled: bool) -> Result<()> {
        self.registry.set_all_enabled(self, enabled)
    }

    pub fn prompt_count(&self) -> usize {
        self.registry.len()
    }

    pub fn prompt_ids(&self) -> Vec<PromptId> {
        self.registry.ids()
    }

    // Loop control

    /// Ask the loop to exit after the message being processed. From this
    /// point on the dispatcher rejects new work.
    pub fn request_close(&self) {
        if self.close_requested.replace(true) {
            return;
        }
        self.dispatcher.mark_closed();
        self.events.emit(SessionEvent::Closing);
        tracing::info!("Session close requested");
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_requested.get()
    }

    /// Route a native event to its handler(s). The handler is cloned out of
    /// the map first, so it may freely mutate the context.
    pub(crate) fn dispatch_event(&self, event: &UiEvent) {
        self.dispatcher.metrics().record_native_event();

        match event {
            UiEvent::CloseRequested => self.request_close(),
            UiEvent::Key(key) => {
                let handlers: Vec<KeyHandler> =
                    self.key_handlers.borrow().values().cloned().collect();
                for handler in handlers {
                    handler(self, *key);
                }
            }
            _ => {
                let Some(widget) = event.widget() else {
                    return;
                };
                let handler = self
                    .widgets
                    .borrow()
                    .get(&widget)
                    .and_then(|entry| entry.handler.clone());
                match handler {
                    Some(handler) => handler(self, event),
                    None => tracing::trace!("No handler for {:?}", event),
                }
            }
        }
    }

    /// `placement` and every placement below it.
    fn subtree(&self, placement: PlacementId) -> Vec<PlacementId> {
        let placements = self.placements.borrow();
        let mut found = vec![placement];
        let mut cursor = 0;
        while cursor < found.len() {
            let current = found[cursor];
            found.extend(
                placements
                    .iter()
                    .filter(|(_, entry)| entry.parent == current)
                    .map(|(id, _)| *id),
            );
            cursor += 1;
        }
        found
    }
}

impl fmt::Debug for UiContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UiContext")
            .field("placements", &self.placements.borrow().len())
            .field("widgets", &self.widgets.borrow().len())
            .field("key_bindings", &self.key_handlers.borrow().len())
            .field("prompts", &self.registry.len())
            .field("close_requested", &self.close_requested.get())
            .finish()
    }
}
