// Prompt registry - live prompts of one session, in insertion order
//
// Lives inside the `UiContext`, so only the UI thread ever touches it.
// Removing a prompt destroys its placement first; if that fails the prompt
// stays registered, otherwise keybindings are unbound and the entry dropped
// in the same step. Destroying any placement that holds a prompt (directly
// or further down) removes that prompt the same way.

use crate::error::Result;
use crate::events::SessionEvent;
use crate::prompt::{Prompt, PromptId, PromptSetup, RegisteredPrompt};
use crate::ui::context::UiContext;
use crate::ui::toolkit::PlacementId;
use indexmap::IndexMap;
use std::cell::RefCell;
use std::panic::{AssertUnwindSafe, catch_unwind, resume_unwind};
use std::sync::Arc;
use tracing::{debug, warn};

#[derive(Default)]
pub(crate) struct PromptRegistry {
    prompts: RefCell<IndexMap<PromptId, Arc<dyn RegisteredPrompt>>>,
}

impl PromptRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Build and register a prompt inside a fresh placement under `parent`.
    ///
    /// # Arguments
    /// * `ui` - The context that owns this registry
    /// * `parent` - Placement to create the prompt's placement in
    /// * `setup` - Routine laying out the prompt
    ///
    /// # Returns
    /// The prompt handle, or the setup routine's error. On error (or panic,
    /// which is resumed) the placement is torn down and nothing is
    /// registered.
    pub(crate) fn install<V, S>(
        &self,
        ui: &UiContext,
        parent: PlacementId,
        setup: S,
    ) -> Result<Prompt<V>>
    where
        V: Clone + Send + 'static,
        S: PromptSetup<V>,
    {
        let placement = ui.create_placement(parent)?;
        let prompt = Prompt::<V>::new(placement, ui);

        match catch_unwind(AssertUnwindSafe(|| setup.build(&prompt, ui, placement))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Setup of {} failed: {}", prompt.id(), e);
                Self::discard(ui, &prompt);
                return Err(e);
            }
            Err(payload) => {
                warn!("Setup of {} panicked", prompt.id());
                Self::discard(ui, &prompt);
                resume_unwind(payload);
            }
        }

        if ui.config().start_disabled {
            if let Err(e) = prompt.apply_enabled(ui, false, false) {
                Self::discard(ui, &prompt);
                return Err(e);
            }
        }

        if prompt.return_type().is_none() {
            warn!(
                "Setup of {} never declared a return type; waiting on it will fail",
                prompt.id()
            );
        }

        self.prompts
            .borrow_mut()
            .insert(prompt.id(), Arc::new(prompt.clone()));
        ui.events().emit(SessionEvent::PromptAdded { prompt: prompt.id() });
        ui.dispatcher().metrics().record_prompt_added();
        debug!("Registered {} in {}", prompt.id(), placement);

        prompt.finish_setup();
        Ok(prompt)
    }

    /// Remove a prompt and its UI. Unknown ids are a no-op.
    pub(crate) fn remove(&self, ui: &UiContext, id: PromptId) -> Result<()> {
        let Some(prompt) = self.prompts.borrow().get(&id).cloned() else {
            return Ok(());
        };

        let placement = prompt.placement();
        if ui.has_placement(placement) {
            // Forgets this prompt along with any others in the subtree.
            ui.destroy_placement(placement)?;
        }
        self.forget(ui, id);
        Ok(())
    }

    /// Drop every prompt whose placement is among `placements`, which the
    /// caller has already destroyed.
    pub(crate) fn forget_placements(&self, ui: &UiContext, placements: &[PlacementId]) {
        let orphans: Vec<PromptId> = self
            .prompts
            .borrow()
            .iter()
            .filter(|(_, prompt)| placements.contains(&prompt.placement()))
            .map(|(id, _)| *id)
            .collect();
        for id in orphans {
            self.forget(ui, id);
        }
    }

    /// Unregister a prompt whose placement is gone. Unknown ids are a no-op.
    fn forget(&self, ui: &UiContext, id: PromptId) {
        let Some(prompt) = self.prompts.borrow_mut().shift_remove(&id) else {
            return;
        };
        for binding in prompt.keybindings() {
            ui.unbind_root_key(binding);
        }
        prompt.mark_removed();

        ui.events().emit(SessionEvent::PromptRemoved { prompt: id });
        ui.dispatcher().metrics().record_prompt_removed();
        debug!("Removed {}", id);
    }

    /// Remove every prompt in insertion order, stopping at the first failure.
    /// The failing prompt and all later ones stay registered.
    pub(crate) fn clear(&self, ui: &UiContext) -> Result<()> {
        for id in self.ids() {
            self.remove(ui, id)?;
        }
        Ok(())
    }

    pub(crate) fn set_all_enabled(&self, ui: &UiContext, enabled: bool) -> Result<()> {
        let prompts: Vec<_> = self.prompts.borrow().values().cloned().collect();
        for prompt in prompts {
            prompt.set_interactive(ui, enabled)?;
        }
        Ok(())
    }

    /// Session teardown: wake every waiter with `SessionClosed`, then take
    /// the UI down best-effort.
    pub(crate) fn close_all(&self, ui: &UiContext) {
        let prompts: Vec<_> = self
            .prompts
            .borrow_mut()
            .drain(..)
            .map(|(_, prompt)| prompt)
            .collect();

        for prompt in &prompts {
            prompt.mark_closed();
        }

        for prompt in prompts {
            for binding in prompt.keybindings() {
                ui.unbind_root_key(binding);
            }
            let placement = prompt.placement();
            if ui.has_placement(placement) {
                if let Err(e) = ui.destroy_placement(placement) {
                    warn!("Failed to destroy {} of {}: {}", placement, prompt.id(), e);
                }
            }
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub(crate) fn ids(&self) -> Vec<PromptId> {
        self.prompts.borrow().keys().copied().collect()
    }

    fn discard<V: Clone + Send + 'static>(ui: &UiContext, prompt: &Prompt<V>) {
        for binding in RegisteredPrompt::keybindings(prompt) {
            ui.unbind_root_key(binding);
        }
        if let Err(e) = ui.destroy_placement(prompt.placement()) {
            warn!("Failed to tear down {} after setup failure: {}", prompt.placement(), e);
        }
        RegisteredPrompt::mark_removed(prompt);
    }
}
